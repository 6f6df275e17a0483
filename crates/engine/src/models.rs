//! Core domain models for the scenario engine.
//!
//! These types are the source of truth for what a scenario graph and a
//! run result look like in memory. The graph types deserialize from the
//! JSON `definition` the store hands back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metrics::{RunPerformanceSummary, StepPerformance};

// ---------------------------------------------------------------------------
// Scenario graph
// ---------------------------------------------------------------------------

/// What a node in the flow graph represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Start,
    Action,
    Condition,
    End,
}

/// A single node in a scenario graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioNode {
    /// Unique identifier within this scenario (referenced by edges).
    pub id: String,
    /// Display name shown in step results; defaults to the id.
    #[serde(default)]
    pub name: Option<String>,
    pub kind: NodeKind,
    /// Declarative action/condition parameters, parsed by the dispatcher.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl ScenarioNode {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Directed edge from one node to another.
///
/// `label` carries the "yes"/"no" branch for condition nodes; older
/// graph exports used a `branch` field for the same thing, which the
/// alias accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    #[serde(default, alias = "branch")]
    pub label: Option<String>,
}

/// A complete scenario graph. May be cyclic; the engine's loop guards
/// keep traversal finite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioGraph {
    pub nodes: Vec<ScenarioNode>,
    pub edges: Vec<Edge>,
}

impl ScenarioGraph {
    pub fn node(&self, id: &str) -> Option<&ScenarioNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn start_node(&self) -> Option<&ScenarioNode> {
        self.nodes.iter().find(|n| n.kind == NodeKind::Start)
    }

    /// All edges leaving `id`, in authored order.
    pub fn outgoing(&self, id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.from == id).collect()
    }
}

// ---------------------------------------------------------------------------
// Execution request / queue
// ---------------------------------------------------------------------------

/// One "run N scenarios on M devices" request, as received from the
/// caller-facing surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub scenario_ids: Vec<String>,
    pub device_ids: Vec<String>,
    #[serde(default = "default_repeat_count")]
    pub repeat_count: u32,
    /// Optional pause between scenarios on one device, in milliseconds.
    #[serde(default)]
    pub interval_ms: Option<u64>,
}

fn default_repeat_count() -> u32 {
    1
}

/// One (scenario × repeat-iteration) unit of work.
///
/// Display metadata is denormalized here once at build time so progress
/// reporting never goes back to the store mid-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// Globally increasing across the fully expanded queue, 1-based.
    pub order: u32,
    pub scenario_id: String,
    pub scenario_name: String,
    /// 1-based repeat pass this item belongs to.
    pub repeat_index: u32,
    pub package_name: String,
    pub category_name: String,
    /// Platform application id of the owning package, when known.
    pub app_package: Option<String>,
    /// The authored graph, parsed per run.
    pub definition: serde_json::Value,
}

impl QueueItem {
    /// Key for per-(device, scenario-iteration) media collections.
    pub fn key(&self) -> String {
        format!("{}-{}", self.scenario_id, self.repeat_index)
    }
}

// ---------------------------------------------------------------------------
// Step results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Passed,
    Failed,
    Error,
    /// A polling action has started; a terminal step with the same node
    /// id follows once it resolves.
    Waiting,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Waiting => "waiting",
        }
    }
}

/// Failure context attached to a failed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureAnalysis {
    pub message: String,
    /// Relative path of the best-effort failure screenshot, when one
    /// could be captured.
    pub screenshot_path: Option<String>,
}

/// One visited node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub node_id: String,
    pub node_name: String,
    pub node_kind: NodeKind,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default)]
    pub error: Option<String>,
    /// The evaluated boolean for condition nodes.
    #[serde(default)]
    pub condition_result: Option<bool>,
    #[serde(default)]
    pub performance: Option<StepPerformance>,
    #[serde(default)]
    pub failure: Option<FailureAnalysis>,
}

// ---------------------------------------------------------------------------
// Per-device progress
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Running,
    Completed,
    Failed,
    Stopped,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// The cursor tracking one device's advancement through its queue.
/// Mutated exclusively by the task driving that device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProgress {
    pub queue_index: usize,
    pub current_scenario_id: Option<String>,
    pub current_scenario_name: Option<String>,
    pub completed: u32,
    pub failed: u32,
    pub status: DeviceStatus,
}

impl DeviceProgress {
    pub fn new() -> Self {
        Self {
            queue_index: 0,
            current_scenario_id: None,
            current_scenario_name: None,
            completed: 0,
            failed: 0,
            status: DeviceStatus::Running,
        }
    }
}

impl Default for DeviceProgress {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Scenario run results / media
// ---------------------------------------------------------------------------

/// Outcome of one queue item on one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioRunResult {
    pub scenario_id: String,
    pub scenario_name: String,
    pub repeat_index: u32,
    pub order: u32,
    pub passed: bool,
    /// True when a stop request truncated this run mid-scenario.
    #[serde(default)]
    pub stopped: bool,
    /// True when the device session died during this run; reporting
    /// separates "test failed" from "infrastructure failed" on this.
    #[serde(default)]
    pub session_crash: bool,
    #[serde(default)]
    pub error: Option<String>,
    pub steps: Vec<StepResult>,
    #[serde(default)]
    pub performance: Option<RunPerformanceSummary>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotKind {
    Step,
    Final,
    Failed,
    Highlight,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Screenshot {
    pub node_id: String,
    pub timestamp: DateTime<Utc>,
    pub path: String,
    pub kind: ScreenshotKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoArtifact {
    pub path: String,
    pub recorded_at: DateTime<Utc>,
}

/// Conditions the scenario ran under, captured at scenario start.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSnapshot {
    pub device_id: String,
    pub app_package: Option<String>,
    pub captured_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Final report
// ---------------------------------------------------------------------------

/// Everything one device produced during an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceReport {
    pub status: DeviceStatus,
    pub progress: DeviceProgress,
    pub results: Vec<ScenarioRunResult>,
    /// Keyed by `"scenarioId-repeatIndex"`.
    pub screenshots: std::collections::HashMap<String, Vec<Screenshot>>,
    pub videos: std::collections::HashMap<String, VideoArtifact>,
    pub environments: std::collections::HashMap<String, EnvironmentSnapshot>,
}

/// The finalized contents of an execution, as handed to the report
/// writer when the run ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub execution_id: Uuid,
    pub report_id: Uuid,
    pub request: ExecutionRequest,
    pub devices: std::collections::HashMap<String, DeviceReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Status snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionProgress {
    pub completed: u32,
    pub total: u32,
    pub percentage: u32,
}

/// On-demand view of a running execution, served to status callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStatus {
    pub is_running: bool,
    pub progress: ExecutionProgress,
    pub current_scenario: Option<String>,
}
