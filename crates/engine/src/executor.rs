//! Scenario execution engine.
//!
//! `ScenarioEngine` is the central orchestrator:
//! 1. Builds the expanded queue and registers an `ExecutionState`.
//! 2. Spawns one task per device; each walks the queue sequentially
//!    while devices run fully in parallel.
//! 3. Walks each scenario graph node-by-node, dispatching actions and
//!    conditions and letting the navigator pick the next node.
//! 4. Classifies failures: an ordinary failed step aborts only the
//!    current scenario; a session crash abandons the device's whole
//!    remaining queue.
//! 5. Finalizes the report and removes the execution from the registry
//!    when the run ends.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::task::JoinSet;
use tokio::time::{sleep, Duration};
use tracing::{error, info, instrument, warn};

use device::{DeviceDriver, DeviceProvider};
use events::{EventBus, RunEvent};
use store::{ReportRecord, ReportWriter, ScenarioStore};

use crate::dispatch::{self, ActionOutcome, AppContext};
use crate::graph::parse_graph;
use crate::media::MediaCoordinator;
use crate::metrics::{run_summary, step_performance, StepPerformance};
use crate::models::{
    DeviceStatus, EnvironmentSnapshot, ExecutionRequest, FailureAnalysis, NodeKind, QueueItem,
    ScenarioNode, ScenarioRunResult, ScreenshotKind, StepResult, StepStatus,
};
use crate::navigator::next_node;
use crate::queue::build_queue;
use crate::registry::ExecutionRegistry;
use crate::state::ExecutionState;
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard ceiling on node visits per scenario run. Guards against
    /// graphs with no reachable end node; exceeding it is fatal to that
    /// scenario run only.
    pub max_iterations: u32,
    /// Fallback inter-scenario pause when the request carries none.
    pub default_interval_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            default_interval_ms: None,
        }
    }
}

/// Granularity of the stop-flag poll during inter-scenario pauses.
const INTERVAL_SLICE_MS: u64 = 100;

// ---------------------------------------------------------------------------
// ScenarioEngine
// ---------------------------------------------------------------------------

/// Orchestrates every execution in the process. Constructed once at
/// startup with its collaborators and passed by `Arc`.
pub struct ScenarioEngine {
    registry: Arc<ExecutionRegistry>,
    store: Arc<dyn ScenarioStore>,
    reports: Arc<dyn ReportWriter>,
    provider: Arc<dyn DeviceProvider>,
    media: MediaCoordinator,
    events: EventBus,
    config: EngineConfig,
}

impl ScenarioEngine {
    pub fn new(
        registry: Arc<ExecutionRegistry>,
        store: Arc<dyn ScenarioStore>,
        reports: Arc<dyn ReportWriter>,
        provider: Arc<dyn DeviceProvider>,
        media: MediaCoordinator,
        events: EventBus,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            store,
            reports,
            provider,
            media,
            events,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<ExecutionRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Start an execution: build the queue, register the state, spawn
    /// the run, and return immediately with the execution id.
    ///
    /// # Errors
    /// Fails only when the run can never begin: no devices named, or
    /// zero resolvable scenarios.
    pub async fn start(
        self: &Arc<Self>,
        request: ExecutionRequest,
    ) -> Result<uuid::Uuid, EngineError> {
        if request.device_ids.is_empty() {
            return Err(EngineError::NoDevices);
        }

        let queue = build_queue(
            Arc::clone(&self.store),
            &request.scenario_ids,
            request.repeat_count,
        )
        .await?;

        let state = Arc::new(ExecutionState::new(request, queue));
        let execution_id = state.execution_id;
        self.registry.register(Arc::clone(&state));

        info!(
            %execution_id,
            queue_len = state.queue.len(),
            devices = state.request.device_ids.len(),
            "execution starting"
        );

        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.run_execution(state).await });

        Ok(execution_id)
    }

    /// Run an execution to completion in the current task. The spawned
    /// path goes through here; tests may call it directly and await.
    #[instrument(skip(self, state), fields(execution_id = %state.execution_id))]
    pub async fn run_execution(self: Arc<Self>, state: Arc<ExecutionState>) {
        let mut devices: JoinSet<()> = JoinSet::new();
        for device_id in state.request.device_ids.clone() {
            let engine = Arc::clone(&self);
            let state = Arc::clone(&state);
            devices.spawn(async move { engine.run_device(state, device_id).await });
        }
        while let Some(joined) = devices.join_next().await {
            if let Err(e) = joined {
                error!("device task panicked or was cancelled: {e}");
            }
        }

        let report = state.build_report();
        let record = ReportRecord {
            id: state.report_id,
            execution_id: state.execution_id,
            created_at: Utc::now(),
            payload: serde_json::to_value(&report).unwrap_or(serde_json::Value::Null),
        };
        if let Err(e) = self.reports.write_report(record).await {
            error!("failed to write final report: {e}");
        }

        self.registry.remove(state.execution_id);
        info!("execution finished");
    }

    // -----------------------------------------------------------------------
    // Per-device loop
    // -----------------------------------------------------------------------

    #[instrument(skip(self, state), fields(execution_id = %state.execution_id, device = %device_id))]
    async fn run_device(&self, state: Arc<ExecutionState>, device_id: String) {
        self.events.emit(RunEvent::DeviceStarted {
            execution_id: state.execution_id,
            device_id: device_id.clone(),
        });

        let driver = match self.provider.acquire(&device_id).await {
            Ok(driver) => driver,
            Err(e) => {
                warn!("could not acquire device: {e}");
                state.update_progress(&device_id, |p| p.status = DeviceStatus::Failed);
                self.events.emit(RunEvent::DeviceCompleted {
                    execution_id: state.execution_id,
                    device_id,
                    status: DeviceStatus::Failed.to_string(),
                });
                return;
            }
        };

        let mut any_failed = false;
        let mut crashed = false;
        let mut stopped = false;

        for (index, item) in state.queue.iter().enumerate() {
            if state.stop_requested() {
                stopped = true;
                break;
            }

            state.update_progress(&device_id, |p| {
                p.queue_index = index;
                p.current_scenario_id = Some(item.scenario_id.clone());
                p.current_scenario_name = Some(item.scenario_name.clone());
            });
            self.events.emit(RunEvent::ScenarioStarted {
                execution_id: state.execution_id,
                device_id: device_id.clone(),
                scenario_id: item.scenario_id.clone(),
                repeat_index: item.repeat_index,
            });

            let result = self
                .run_scenario(&state, driver.as_ref(), &device_id, item)
                .await;

            self.events.emit(RunEvent::ScenarioCompleted {
                execution_id: state.execution_id,
                device_id: device_id.clone(),
                scenario_id: item.scenario_id.clone(),
                repeat_index: item.repeat_index,
                passed: result.passed,
            });

            if result.stopped {
                stopped = true;
            } else if result.passed {
                state.update_progress(&device_id, |p| p.completed += 1);
            } else {
                any_failed = true;
                state.update_progress(&device_id, |p| p.failed += 1);
            }

            if result.session_crash {
                crashed = true;
                self.events.emit(RunEvent::SessionCrashed {
                    execution_id: state.execution_id,
                    device_id: device_id.clone(),
                    scenario_id: item.scenario_id.clone(),
                    message: result.error.clone().unwrap_or_default(),
                });
            }

            state.record_result(&device_id, result);

            // A dead session cannot run anything further on this device.
            if crashed || stopped {
                break;
            }

            let interval = state
                .request
                .interval_ms
                .or(self.config.default_interval_ms);
            if let (Some(ms), false) = (interval, index + 1 == state.queue.len()) {
                interval_pause(&state, ms).await;
            }
        }

        let status = if crashed {
            DeviceStatus::Failed
        } else if stopped {
            DeviceStatus::Stopped
        } else if any_failed {
            DeviceStatus::Failed
        } else {
            DeviceStatus::Completed
        };
        state.update_progress(&device_id, |p| p.status = status);

        self.events.emit(RunEvent::DeviceCompleted {
            execution_id: state.execution_id,
            device_id,
            status: status.to_string(),
        });
    }

    // -----------------------------------------------------------------------
    // Per-scenario graph walk
    // -----------------------------------------------------------------------

    async fn run_scenario(
        &self,
        state: &ExecutionState,
        driver: &dyn DeviceDriver,
        device_id: &str,
        item: &QueueItem,
    ) -> ScenarioRunResult {
        let started_at = Utc::now();
        let key = item.key();
        let mut result = ScenarioRunResult {
            scenario_id: item.scenario_id.clone(),
            scenario_name: item.scenario_name.clone(),
            repeat_index: item.repeat_index,
            order: item.order,
            passed: false,
            stopped: false,
            session_crash: false,
            error: None,
            steps: Vec::new(),
            performance: None,
            started_at,
            finished_at: started_at,
        };

        let graph = match parse_graph(&item.definition) {
            Ok(graph) => graph,
            Err(e) => {
                warn!(scenario = %item.scenario_id, "invalid definition: {e}");
                result.error = Some(e.to_string());
                result.finished_at = Utc::now();
                return result;
            }
        };

        state.add_environment(
            device_id,
            &key,
            EnvironmentSnapshot {
                device_id: device_id.to_string(),
                app_package: item.app_package.clone(),
                captured_at: Utc::now(),
            },
        );

        let app = AppContext {
            app_package: item.app_package.clone(),
        };

        // Per-run condition tracking — the shared graph definition is
        // never mutated.
        let mut condition_state: HashMap<String, ConditionTracker> = HashMap::new();
        let mut recording = false;
        let mut failed = false;
        let mut visits: u32 = 0;

        // parse_graph validated that exactly one start node exists.
        let mut current = match graph.start_node() {
            Some(node) => node.id.clone(),
            None => {
                result.error = Some(EngineError::NoStartNode.to_string());
                result.finished_at = Utc::now();
                return result;
            }
        };

        loop {
            if state.stop_requested() {
                result.stopped = true;
                break;
            }

            visits += 1;
            if visits > self.config.max_iterations {
                failed = true;
                result.error = Some(format!(
                    "scenario exceeded the {} node-visit ceiling; the graph has no reachable end",
                    self.config.max_iterations
                ));
                break;
            }

            let Some(node) = graph.node(&current) else {
                failed = true;
                result.error = Some(format!("traversal reached unknown node '{current}'"));
                break;
            };

            self.events.emit(RunEvent::NodeRunning {
                execution_id: state.execution_id,
                device_id: device_id.to_string(),
                node_id: node.id.clone(),
            });

            let next = match node.kind {
                NodeKind::Start => {
                    result.steps.push(trivial_step(node, StepStatus::Passed));
                    next_node(node, &graph.edges, None)
                }
                NodeKind::End => {
                    result.steps.push(trivial_step(node, StepStatus::Passed));
                    if let Some(shot) = self
                        .media
                        .capture_screenshot(
                            driver,
                            state.execution_id,
                            &node.id,
                            ScreenshotKind::Final,
                        )
                        .await
                    {
                        state.add_screenshot(device_id, &key, shot);
                    }
                    break;
                }
                NodeKind::Action => {
                    let ActionNodeOutcome { steps, class } = self
                        .run_action_node(state, driver, device_id, &key, node, &app)
                        .await;
                    result.steps.extend(steps);
                    match class {
                        ActionClass::Passed { launched_app } => {
                            if launched_app && !recording {
                                recording =
                                    self.media.start_recording_after_launch(driver).await;
                            }
                            next_node(node, &graph.edges, None)
                        }
                        ActionClass::Failed { message } => {
                            failed = true;
                            result.error = Some(message);
                            break;
                        }
                        ActionClass::Crashed { message } => {
                            failed = true;
                            result.session_crash = true;
                            result.error = Some(message);
                            break;
                        }
                    }
                }
                NodeKind::Condition => {
                    let tracker = condition_state.entry(node.id.clone()).or_default();
                    tracker.visits += 1;
                    let visit_count = tracker.visits;
                    let last = tracker.last;

                    let max_loops = node
                        .params
                        .get("maxLoops")
                        .and_then(serde_json::Value::as_u64)
                        .map(|v| v as u32);

                    let evaluated = if max_loops.is_some_and(|m| visit_count > m) {
                        // Loop guard: skip evaluation and force the
                        // opposite branch for a deterministic exit.
                        // `last` stays at the genuine evaluation so
                        // repeated forced visits keep forcing the same
                        // branch.
                        let forced = !last;
                        info!(
                            node = %node.id,
                            visits = visit_count,
                            forced,
                            "maxLoops exceeded, forcing opposite branch"
                        );
                        result.steps.push(condition_step(node, forced, None, None));
                        forced
                    } else {
                        let step_started = Utc::now();
                        let timer = Instant::now();
                        match dispatch::evaluate_condition(driver, node).await {
                            Ok(outcome) => {
                                let total_ms = timer.elapsed().as_millis() as u64;
                                let mut step = condition_step(
                                    node,
                                    outcome.passed,
                                    outcome.error,
                                    Some(step_performance(false, total_ms, outcome.hints)),
                                );
                                step.started_at = step_started;
                                result.steps.push(step);
                                if let Some(tracker) = condition_state.get_mut(&node.id) {
                                    tracker.last = outcome.passed;
                                }
                                outcome.passed
                            }
                            Err(crash) => {
                                result.steps.push(error_step(node, crash.to_string()));
                                self.events.emit(RunEvent::NodeFinished {
                                    execution_id: state.execution_id,
                                    device_id: device_id.to_string(),
                                    node_id: node.id.clone(),
                                    status: StepStatus::Error.as_str().to_string(),
                                });
                                failed = true;
                                result.session_crash = true;
                                result.error = Some(crash.to_string());
                                break;
                            }
                        }
                    };

                    if let Some(step) = result.steps.last() {
                        self.events.emit(RunEvent::NodeFinished {
                            execution_id: state.execution_id,
                            device_id: device_id.to_string(),
                            node_id: node.id.clone(),
                            status: step.status.as_str().to_string(),
                        });
                    }

                    next_node(node, &graph.edges, Some(evaluated))
                }
            };

            match next {
                Some(next_id) => current = next_id,
                None => break,
            }
        }

        if recording {
            if let Some(video) = self
                .media
                .finish_recording(driver, state.execution_id)
                .await
            {
                state.add_video(device_id, &key, video);
            }
        }

        result.passed = !failed && !result.stopped;
        result.performance = run_summary(&result.steps);
        result.finished_at = Utc::now();
        result
    }

    /// Execute one action node. Returns the step(s) it produced — a
    /// polling action yields a waiting step ahead of its terminal one —
    /// plus the classification the walk dispatches on.
    async fn run_action_node(
        &self,
        state: &ExecutionState,
        driver: &dyn DeviceDriver,
        device_id: &str,
        key: &str,
        node: &ScenarioNode,
        app: &AppContext,
    ) -> ActionNodeOutcome {
        let parsed = dispatch::parse_action(&node.params).ok();
        let polling = parsed.as_ref().is_some_and(|s| s.is_polling());
        let launches_app = parsed.as_ref().is_some_and(|s| s.is_app_launch());
        let is_screenshot = parsed.as_ref().is_some_and(|s| s.is_screenshot());

        let step_started = Utc::now();
        let timer = Instant::now();
        let mut steps: Vec<StepResult> = Vec::new();

        if polling {
            self.events.emit(RunEvent::NodeWaiting {
                execution_id: state.execution_id,
                device_id: device_id.to_string(),
                node_id: node.id.clone(),
            });
            steps.push(trivial_step(node, StepStatus::Waiting));
        }

        // Explicit screenshot checkpoints route through the media
        // coordinator so the artifact lands in the run's collection.
        // Capture trouble degrades; the checkpoint still passes.
        let outcome = if is_screenshot {
            if let Some(shot) = self
                .media
                .capture_screenshot(driver, state.execution_id, &node.id, ScreenshotKind::Step)
                .await
            {
                state.add_screenshot(device_id, key, shot);
            }
            Ok(ActionOutcome::ok())
        } else {
            dispatch::execute_action(driver, node, app).await
        };

        let total_ms = timer.elapsed().as_millis() as u64;

        let class = match outcome {
            Ok(outcome) if outcome.success => {
                steps.push(StepResult {
                    node_id: node.id.clone(),
                    node_name: node.display_name().to_string(),
                    node_kind: node.kind,
                    status: StepStatus::Passed,
                    started_at: step_started,
                    finished_at: Utc::now(),
                    error: None,
                    condition_result: None,
                    performance: Some(step_performance(polling, total_ms, outcome.hints)),
                    failure: None,
                });
                ActionClass::Passed {
                    launched_app: launches_app,
                }
            }
            Ok(outcome) => {
                let message = outcome
                    .message
                    .unwrap_or_else(|| "action failed".to_string());
                // Best-effort failure screenshot; absence is fine.
                let screenshot_path = match self
                    .media
                    .capture_screenshot(
                        driver,
                        state.execution_id,
                        &node.id,
                        ScreenshotKind::Failed,
                    )
                    .await
                {
                    Some(shot) => {
                        let path = shot.path.clone();
                        state.add_screenshot(device_id, key, shot);
                        Some(path)
                    }
                    None => None,
                };
                steps.push(StepResult {
                    node_id: node.id.clone(),
                    node_name: node.display_name().to_string(),
                    node_kind: node.kind,
                    status: StepStatus::Failed,
                    started_at: step_started,
                    finished_at: Utc::now(),
                    error: Some(message.clone()),
                    condition_result: None,
                    performance: Some(step_performance(polling, total_ms, None)),
                    failure: Some(FailureAnalysis {
                        message: message.clone(),
                        screenshot_path,
                    }),
                });
                ActionClass::Failed { message }
            }
            Err(crash) => {
                let message = crash.to_string();
                steps.push(error_step(node, message.clone()));
                ActionClass::Crashed { message }
            }
        };

        for step in &steps {
            self.events.emit(RunEvent::NodeFinished {
                execution_id: state.execution_id,
                device_id: device_id.to_string(),
                node_id: step.node_id.clone(),
                status: step.status.as_str().to_string(),
            });
        }

        ActionNodeOutcome { steps, class }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ConditionTracker {
    visits: u32,
    last: bool,
}

struct ActionNodeOutcome {
    steps: Vec<StepResult>,
    class: ActionClass,
}

enum ActionClass {
    Passed { launched_app: bool },
    Failed { message: String },
    Crashed { message: String },
}

fn trivial_step(node: &ScenarioNode, status: StepStatus) -> StepResult {
    let now = Utc::now();
    StepResult {
        node_id: node.id.clone(),
        node_name: node.display_name().to_string(),
        node_kind: node.kind,
        status,
        started_at: now,
        finished_at: now,
        error: None,
        condition_result: None,
        performance: None,
        failure: None,
    }
}

fn condition_step(
    node: &ScenarioNode,
    result: bool,
    error: Option<String>,
    performance: Option<StepPerformance>,
) -> StepResult {
    let now = Utc::now();
    StepResult {
        node_id: node.id.clone(),
        node_name: node.display_name().to_string(),
        node_kind: node.kind,
        status: StepStatus::Passed,
        started_at: now,
        finished_at: now,
        error,
        condition_result: Some(result),
        performance,
        failure: None,
    }
}

fn error_step(node: &ScenarioNode, message: String) -> StepResult {
    let now = Utc::now();
    StepResult {
        node_id: node.id.clone(),
        node_name: node.display_name().to_string(),
        node_kind: node.kind,
        status: StepStatus::Error,
        started_at: now,
        finished_at: now,
        error: Some(message),
        condition_result: None,
        performance: None,
        failure: None,
    }
}

/// Sleep `ms` in short slices so a stop request cuts the pause short.
async fn interval_pause(state: &ExecutionState, ms: u64) {
    let mut remaining = ms;
    while remaining > 0 && !state.stop_requested() {
        let slice = remaining.min(INTERVAL_SLICE_MS);
        sleep(Duration::from_millis(slice)).await;
        remaining -= slice;
    }
}
