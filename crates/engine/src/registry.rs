//! Process-wide execution registry.
//!
//! The only place concurrent runs are coordinated: caller threads
//! (start/stop/status) and engine tasks touch the same map, so it is a
//! DashMap. Everything behind each entry is owned by its run. One
//! registry instance is constructed at startup and passed by handle —
//! there is no ambient global.

use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::ExecutionStatus;
use crate::state::ExecutionState;

#[derive(Default)]
pub struct ExecutionRegistry {
    executions: DashMap<Uuid, Arc<ExecutionState>>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, state: Arc<ExecutionState>) {
        self.executions.insert(state.execution_id, state);
    }

    /// Remove a finished execution, returning its state for report
    /// extraction.
    pub fn remove(&self, execution_id: Uuid) -> Option<Arc<ExecutionState>> {
        self.executions.remove(&execution_id).map(|(_, s)| s)
    }

    pub fn lookup(&self, execution_id: Uuid) -> Option<Arc<ExecutionState>> {
        self.executions.get(&execution_id).map(|e| e.clone())
    }

    pub fn active_ids(&self) -> Vec<Uuid> {
        self.executions.iter().map(|e| *e.key()).collect()
    }

    pub fn count(&self) -> usize {
        self.executions.len()
    }

    /// Set the stop flag on one execution. Returns false when the id is
    /// unknown (already finished and removed).
    pub fn request_stop(&self, execution_id: Uuid) -> bool {
        match self.executions.get(&execution_id) {
            Some(state) => {
                state.request_stop();
                true
            }
            None => false,
        }
    }

    pub fn stop_requested(&self, execution_id: Uuid) -> bool {
        self.executions
            .get(&execution_id)
            .map(|s| s.stop_requested())
            .unwrap_or(false)
    }

    /// On-demand status snapshot; `None` when the execution is unknown.
    pub fn status(&self, execution_id: Uuid) -> Option<ExecutionStatus> {
        self.executions.get(&execution_id).map(|s| s.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecutionRequest, QueueItem};

    fn make_state() -> Arc<ExecutionState> {
        Arc::new(ExecutionState::new(
            ExecutionRequest {
                scenario_ids: vec!["s1".into()],
                device_ids: vec!["d1".into()],
                repeat_count: 1,
                interval_ms: None,
            },
            vec![QueueItem {
                order: 1,
                scenario_id: "s1".into(),
                scenario_name: "s1".into(),
                repeat_index: 1,
                package_name: "unknown".into(),
                category_name: "unknown".into(),
                app_package: None,
                definition: serde_json::Value::Null,
            }],
        ))
    }

    #[test]
    fn register_lookup_remove_round_trip() {
        let registry = ExecutionRegistry::new();
        let state = make_state();
        let id = state.execution_id;

        registry.register(state);
        assert_eq!(registry.count(), 1);
        assert!(registry.lookup(id).is_some());
        assert_eq!(registry.active_ids(), vec![id]);

        registry.remove(id);
        assert_eq!(registry.count(), 0);
        assert!(registry.lookup(id).is_none());
    }

    #[test]
    fn stop_scoped_to_one_execution() {
        let registry = ExecutionRegistry::new();
        let a = make_state();
        let b = make_state();
        let (id_a, id_b) = (a.execution_id, b.execution_id);
        registry.register(a);
        registry.register(b);

        assert!(registry.request_stop(id_a));
        assert!(registry.stop_requested(id_a));
        assert!(!registry.stop_requested(id_b));
    }

    #[test]
    fn stop_on_unknown_id_reports_false() {
        let registry = ExecutionRegistry::new();
        assert!(!registry.request_stop(Uuid::new_v4()));
        assert!(registry.status(Uuid::new_v4()).is_none());
    }
}
