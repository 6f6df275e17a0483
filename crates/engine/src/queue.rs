//! Queue build: resolve requested scenario ids and expand repeats into
//! the execution's fixed work list.
//!
//! Resolution policy: an id that doesn't resolve is skipped with a
//! warning — callers often hold stale lists — but a request where
//! *nothing* resolves is a hard build error. Package/category metadata
//! for the distinct references is fetched in parallel; a lookup failure
//! there degrades to an "unknown" placeholder rather than failing the
//! build.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::warn;

use store::{PackageRecord, ScenarioRecord, ScenarioStore};

use crate::models::QueueItem;
use crate::EngineError;

const UNKNOWN_PLACEHOLDER: &str = "unknown";

/// Build the fully expanded queue for one execution.
///
/// Repeats are expanded in full passes — all scenarios at repeat 1,
/// then repeat 2, … — never interleaved per scenario, and `order`
/// increases globally across the whole expansion.
pub async fn build_queue(
    store: Arc<dyn ScenarioStore>,
    scenario_ids: &[String],
    repeat_count: u32,
) -> Result<Vec<QueueItem>, EngineError> {
    // ------------------------------------------------------------------
    // Resolve scenarios; skip what doesn't resolve.
    // ------------------------------------------------------------------
    let mut resolved: Vec<ScenarioRecord> = Vec::with_capacity(scenario_ids.len());
    for id in scenario_ids {
        match store.get_scenario(id).await {
            Ok(record) => resolved.push(record),
            Err(e) => warn!("skipping unresolvable scenario '{id}': {e}"),
        }
    }
    if resolved.is_empty() {
        return Err(EngineError::EmptyQueue);
    }

    // ------------------------------------------------------------------
    // Resolve package/category display metadata in parallel.
    // ------------------------------------------------------------------
    let mut package_ids: Vec<String> = resolved
        .iter()
        .filter_map(|r| r.package_id.clone())
        .collect();
    package_ids.sort();
    package_ids.dedup();

    let mut category_ids: Vec<String> = resolved
        .iter()
        .filter_map(|r| r.category_id.clone())
        .collect();
    category_ids.sort();
    category_ids.dedup();

    let mut package_tasks: JoinSet<(String, Option<PackageRecord>)> = JoinSet::new();
    for id in package_ids {
        let store = Arc::clone(&store);
        package_tasks.spawn(async move {
            let found = store.get_package(&id).await.ok();
            (id, found)
        });
    }

    let mut category_tasks: JoinSet<(String, Option<String>)> = JoinSet::new();
    for id in category_ids {
        let store = Arc::clone(&store);
        category_tasks.spawn(async move {
            let name = store.get_category(&id).await.ok().map(|c| c.name);
            (id, name)
        });
    }

    let mut packages: HashMap<String, PackageRecord> = HashMap::new();
    while let Some(joined) = package_tasks.join_next().await {
        if let Ok((id, found)) = joined {
            match found {
                Some(record) => {
                    packages.insert(id, record);
                }
                None => warn!("package '{id}' did not resolve, using placeholder"),
            }
        }
    }

    let mut categories: HashMap<String, String> = HashMap::new();
    while let Some(joined) = category_tasks.join_next().await {
        if let Ok((id, name)) = joined {
            match name {
                Some(name) => {
                    categories.insert(id, name);
                }
                None => warn!("category '{id}' did not resolve, using placeholder"),
            }
        }
    }

    // ------------------------------------------------------------------
    // Expand repeats: full passes in original order, global ordering.
    // ------------------------------------------------------------------
    let mut queue = Vec::with_capacity(resolved.len() * repeat_count.max(1) as usize);
    let mut order: u32 = 0;
    for repeat_index in 1..=repeat_count.max(1) {
        for record in &resolved {
            order += 1;
            let package = record
                .package_id
                .as_ref()
                .and_then(|id| packages.get(id));
            queue.push(QueueItem {
                order,
                scenario_id: record.id.clone(),
                scenario_name: record.name.clone(),
                repeat_index,
                package_name: package
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| UNKNOWN_PLACEHOLDER.to_string()),
                category_name: record
                    .category_id
                    .as_ref()
                    .and_then(|id| categories.get(id).cloned())
                    .unwrap_or_else(|| UNKNOWN_PLACEHOLDER.to_string()),
                app_package: package.map(|p| p.app_package.clone()),
                definition: record.definition.clone(),
            });
        }
    }

    Ok(queue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use store::{CategoryRecord, MemoryStore};

    fn seeded_store() -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        store.insert_package(PackageRecord {
            id: "pkg-1".into(),
            name: "Shop App".into(),
            app_package: "com.example.shop".into(),
        });
        store.insert_category(CategoryRecord {
            id: "cat-1".into(),
            name: "Smoke".into(),
        });
        for id in ["a", "b"] {
            store.insert_scenario(ScenarioRecord {
                id: id.into(),
                name: format!("Scenario {id}"),
                package_id: Some("pkg-1".into()),
                category_id: Some("cat-1".into()),
                definition: json!({ "nodes": [], "edges": [] }),
            });
        }
        Arc::new(store)
    }

    #[tokio::test]
    async fn repeats_expand_in_full_passes_with_global_order() {
        let store = seeded_store();
        let queue = build_queue(store, &["a".into(), "b".into()], 3)
            .await
            .expect("should build");

        let ids: Vec<(&str, u32)> = queue
            .iter()
            .map(|q| (q.scenario_id.as_str(), q.repeat_index))
            .collect();
        assert_eq!(
            ids,
            vec![("a", 1), ("b", 1), ("a", 2), ("b", 2), ("a", 3), ("b", 3)]
        );
        let orders: Vec<u32> = queue.iter().map(|q| q.order).collect();
        assert_eq!(orders, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn unresolved_ids_are_skipped_not_fatal() {
        let store = seeded_store();
        let queue = build_queue(store, &["ghost".into(), "a".into()], 1)
            .await
            .expect("one id resolves");
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].scenario_id, "a");
        assert_eq!(queue[0].order, 1);
    }

    #[tokio::test]
    async fn zero_resolved_ids_is_a_hard_error() {
        let store = seeded_store();
        let err = build_queue(store, &["ghost".into()], 1)
            .await
            .expect_err("nothing resolves");
        assert!(matches!(err, EngineError::EmptyQueue));
    }

    #[tokio::test]
    async fn metadata_is_denormalized_with_placeholder_fallback() {
        let store = MemoryStore::new();
        store.insert_scenario(ScenarioRecord {
            id: "orphan".into(),
            name: "Orphan".into(),
            package_id: Some("missing-pkg".into()),
            category_id: None,
            definition: json!({ "nodes": [], "edges": [] }),
        });

        let queue = build_queue(Arc::new(store), &["orphan".into()], 1)
            .await
            .unwrap();
        assert_eq!(queue[0].package_name, "unknown");
        assert_eq!(queue[0].category_name, "unknown");
        assert!(queue[0].app_package.is_none());
    }

    #[tokio::test]
    async fn resolved_metadata_lands_on_every_item() {
        let store = seeded_store();
        let queue = build_queue(store, &["a".into()], 2).await.unwrap();
        for item in &queue {
            assert_eq!(item.package_name, "Shop App");
            assert_eq!(item.category_name, "Smoke");
            assert_eq!(item.app_package.as_deref(), Some("com.example.shop"));
        }
    }
}
