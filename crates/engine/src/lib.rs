//! Scenario execution engine: graph walk, action dispatch, and
//! multi-device orchestration.
//!
//! The crate is organized around one orchestrator and its parts:
//! - [`executor::ScenarioEngine`] drives whole executions.
//! - [`dispatch`] translates action/condition nodes into device calls.
//! - [`navigator`] picks the next node after each step.
//! - [`queue`] resolves and expands the requested scenarios.
//! - [`state`] / [`registry`] hold per-execution and process-wide state.
//! - [`media`] and [`metrics`] collect run artifacts and timings.

pub mod dispatch;
pub mod error;
pub mod executor;
pub mod graph;
pub mod media;
pub mod metrics;
pub mod models;
pub mod navigator;
pub mod queue;
pub mod registry;
pub mod state;

pub use error::EngineError;
pub use executor::{EngineConfig, ScenarioEngine};
pub use media::MediaCoordinator;
pub use models::{
    DeviceStatus, ExecutionReport, ExecutionRequest, ExecutionStatus, ScenarioRunResult,
    StepResult, StepStatus,
};
pub use registry::ExecutionRegistry;
pub use state::ExecutionState;
