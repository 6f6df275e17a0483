//! In-memory store implementations.
//!
//! Back the engine's integration tests and the CLI's local `run`/`serve`
//! modes. All maps are behind plain mutexes; nothing here is on a hot
//! path.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{CategoryRecord, PackageRecord, ReportRecord, ScenarioRecord};
use crate::traits::{MediaStore, ReportWriter, ScenarioStore};
use crate::StoreError;

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Scenario/package/category lookup over in-memory maps.
#[derive(Default)]
pub struct MemoryStore {
    scenarios: Mutex<HashMap<String, ScenarioRecord>>,
    packages: Mutex<HashMap<String, PackageRecord>>,
    categories: Mutex<HashMap<String, CategoryRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_scenario(&self, record: ScenarioRecord) {
        self.scenarios
            .lock()
            .unwrap()
            .insert(record.id.clone(), record);
    }

    pub fn insert_package(&self, record: PackageRecord) {
        self.packages
            .lock()
            .unwrap()
            .insert(record.id.clone(), record);
    }

    pub fn insert_category(&self, record: CategoryRecord) {
        self.categories
            .lock()
            .unwrap()
            .insert(record.id.clone(), record);
    }
}

#[async_trait]
impl ScenarioStore for MemoryStore {
    async fn get_scenario(&self, id: &str) -> Result<ScenarioRecord, StoreError> {
        self.scenarios
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("scenario {id}")))
    }

    async fn get_package(&self, id: &str) -> Result<PackageRecord, StoreError> {
        self.packages
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("package {id}")))
    }

    async fn get_category(&self, id: &str) -> Result<CategoryRecord, StoreError> {
        self.categories
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("category {id}")))
    }
}

// ---------------------------------------------------------------------------
// MemoryReportWriter
// ---------------------------------------------------------------------------

/// Collects written reports; tests assert against `reports()`.
#[derive(Default)]
pub struct MemoryReportWriter {
    reports: Mutex<Vec<ReportRecord>>,
}

impl MemoryReportWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<ReportRecord> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportWriter for MemoryReportWriter {
    async fn write_report(&self, report: ReportRecord) -> Result<(), StoreError> {
        self.reports.lock().unwrap().push(report);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryMediaStore
// ---------------------------------------------------------------------------

/// Stores media blobs in a map keyed by the returned relative path.
#[derive(Default)]
pub struct MemoryMediaStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    counter: Mutex<u64>,
}

impl MemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blob(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(path).cloned()
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    fn save(
        &self,
        kind: &str,
        ext: &str,
        execution_id: Uuid,
        device_id: &str,
        bytes: Vec<u8>,
    ) -> String {
        let mut counter = self.counter.lock().unwrap();
        *counter += 1;
        let path = format!("{kind}/{execution_id}/{device_id}/{counter}.{ext}");
        self.blobs.lock().unwrap().insert(path.clone(), bytes);
        path
    }
}

#[async_trait]
impl MediaStore for MemoryMediaStore {
    async fn save_screenshot(
        &self,
        execution_id: Uuid,
        device_id: &str,
        bytes: Vec<u8>,
    ) -> Result<String, StoreError> {
        Ok(self.save("screenshots", "png", execution_id, device_id, bytes))
    }

    async fn save_video(
        &self,
        execution_id: Uuid,
        device_id: &str,
        bytes: Vec<u8>,
    ) -> Result<String, StoreError> {
        Ok(self.save("videos", "mp4", execution_id, device_id, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn scenario_lookup_round_trip() {
        let store = MemoryStore::new();
        store.insert_scenario(ScenarioRecord {
            id: "login".into(),
            name: "Login flow".into(),
            package_id: Some("pkg-1".into()),
            category_id: None,
            definition: json!({ "nodes": [], "edges": [] }),
        });

        let found = store.get_scenario("login").await.unwrap();
        assert_eq!(found.name, "Login flow");
        assert!(matches!(
            store.get_scenario("missing").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn media_paths_are_unique_per_save() {
        let media = MemoryMediaStore::new();
        let execution_id = Uuid::new_v4();

        let a = media
            .save_screenshot(execution_id, "emu-1", b"a".to_vec())
            .await
            .unwrap();
        let b = media
            .save_screenshot(execution_id, "emu-1", b"b".to_vec())
            .await
            .unwrap();

        assert_ne!(a, b);
        assert_eq!(media.blob(&a).unwrap(), b"a");
        assert_eq!(media.blob_count(), 2);
    }
}
