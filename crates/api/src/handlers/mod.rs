pub mod executions;

use std::sync::Arc;

use engine::ScenarioEngine;

/// Shared handler state: just the engine handle. Everything an endpoint
/// needs (registry, status, stop) hangs off it.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ScenarioEngine>,
}
