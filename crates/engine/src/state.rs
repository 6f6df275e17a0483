//! Per-execution state.
//!
//! One `ExecutionState` per "run N scenarios on M devices" request. It
//! owns the expanded queue and everything the run produces. Per-device
//! maps are only ever written by the task driving that device; the
//! registry's status path reads them concurrently, which is why they
//! are DashMaps rather than plain HashMaps. Nothing in here is shared
//! across executions.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::models::{
    DeviceProgress, DeviceReport, DeviceStatus, EnvironmentSnapshot, ExecutionProgress,
    ExecutionReport, ExecutionRequest, ExecutionStatus, QueueItem, ScenarioRunResult, Screenshot,
    VideoArtifact,
};

pub struct ExecutionState {
    pub execution_id: Uuid,
    /// Report id is pre-created so callers can reference it while the
    /// run is still in flight.
    pub report_id: Uuid,
    pub request: ExecutionRequest,
    /// Fixed at build time; executed verbatim per device.
    pub queue: Vec<QueueItem>,
    pub started_at: DateTime<Utc>,
    stop: AtomicBool,
    progress: DashMap<String, DeviceProgress>,
    results: DashMap<String, Vec<ScenarioRunResult>>,
    /// device id → "scenarioId-repeatIndex" → ordered screenshots.
    screenshots: DashMap<String, HashMap<String, Vec<Screenshot>>>,
    videos: DashMap<String, HashMap<String, VideoArtifact>>,
    environments: DashMap<String, HashMap<String, EnvironmentSnapshot>>,
}

impl ExecutionState {
    pub fn new(request: ExecutionRequest, queue: Vec<QueueItem>) -> Self {
        let progress = DashMap::new();
        for device_id in &request.device_ids {
            progress.insert(device_id.clone(), DeviceProgress::new());
        }
        Self {
            execution_id: Uuid::new_v4(),
            report_id: Uuid::new_v4(),
            request,
            queue,
            started_at: Utc::now(),
            stop: AtomicBool::new(false),
            progress,
            results: DashMap::new(),
            screenshots: DashMap::new(),
            videos: DashMap::new(),
            environments: DashMap::new(),
        }
    }

    // ------ Stop flag ------

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    // ------ Per-device mutation (owning task only) ------

    /// Apply a closure to one device's progress cursor.
    pub fn update_progress<F: FnOnce(&mut DeviceProgress)>(&self, device_id: &str, f: F) {
        let mut entry = self.progress.entry(device_id.to_string()).or_default();
        f(entry.value_mut());
    }

    pub fn record_result(&self, device_id: &str, result: ScenarioRunResult) {
        self.results
            .entry(device_id.to_string())
            .or_default()
            .push(result);
    }

    pub fn add_screenshot(&self, device_id: &str, key: &str, shot: Screenshot) {
        self.screenshots
            .entry(device_id.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default()
            .push(shot);
    }

    pub fn add_video(&self, device_id: &str, key: &str, video: VideoArtifact) {
        self.videos
            .entry(device_id.to_string())
            .or_default()
            .insert(key.to_string(), video);
    }

    pub fn add_environment(&self, device_id: &str, key: &str, env: EnvironmentSnapshot) {
        self.environments
            .entry(device_id.to_string())
            .or_default()
            .insert(key.to_string(), env);
    }

    // ------ Read side (status / reporting) ------

    pub fn device_progress(&self, device_id: &str) -> Option<DeviceProgress> {
        self.progress.get(device_id).map(|p| p.clone())
    }

    pub fn is_running(&self) -> bool {
        self.progress
            .iter()
            .any(|p| p.status == DeviceStatus::Running)
    }

    /// Aggregate progress: total is the expanded queue times the device
    /// count; completed counts both passed and failed scenario runs.
    pub fn progress_snapshot(&self) -> ExecutionProgress {
        let total = (self.queue.len() * self.request.device_ids.len()) as u32;
        let completed: u32 = self
            .progress
            .iter()
            .map(|p| p.completed + p.failed)
            .sum();
        let percentage = if total == 0 {
            0
        } else {
            ((completed as f64 / total as f64) * 100.0).round() as u32
        };
        ExecutionProgress {
            completed,
            total,
            percentage,
        }
    }

    pub fn status(&self) -> ExecutionStatus {
        let current_scenario = self
            .progress
            .iter()
            .find(|p| p.status == DeviceStatus::Running)
            .and_then(|p| p.current_scenario_name.clone());
        ExecutionStatus {
            is_running: self.is_running(),
            progress: self.progress_snapshot(),
            current_scenario,
        }
    }

    /// Assemble the final report from everything collected so far.
    pub fn build_report(&self) -> ExecutionReport {
        let mut devices = HashMap::new();
        for device_id in &self.request.device_ids {
            let progress = self
                .device_progress(device_id)
                .unwrap_or_default();
            devices.insert(
                device_id.clone(),
                DeviceReport {
                    status: progress.status,
                    progress,
                    results: self
                        .results
                        .get(device_id)
                        .map(|r| r.clone())
                        .unwrap_or_default(),
                    screenshots: self
                        .screenshots
                        .get(device_id)
                        .map(|s| s.clone())
                        .unwrap_or_default(),
                    videos: self
                        .videos
                        .get(device_id)
                        .map(|v| v.clone())
                        .unwrap_or_default(),
                    environments: self
                        .environments
                        .get(device_id)
                        .map(|e| e.clone())
                        .unwrap_or_default(),
                },
            );
        }
        ExecutionReport {
            execution_id: self.execution_id,
            report_id: self.report_id,
            request: self.request.clone(),
            devices,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(scenarios: usize, devices: usize) -> ExecutionRequest {
        ExecutionRequest {
            scenario_ids: (0..scenarios).map(|i| format!("s{i}")).collect(),
            device_ids: (0..devices).map(|i| format!("d{i}")).collect(),
            repeat_count: 1,
            interval_ms: None,
        }
    }

    fn queue_item(id: &str, order: u32) -> QueueItem {
        QueueItem {
            order,
            scenario_id: id.into(),
            scenario_name: id.into(),
            repeat_index: 1,
            package_name: "unknown".into(),
            category_name: "unknown".into(),
            app_package: None,
            definition: serde_json::Value::Null,
        }
    }

    #[test]
    fn progress_percentage_rounds() {
        let state = ExecutionState::new(
            request(2, 2),
            vec![queue_item("a", 1), queue_item("b", 2)],
        );

        state.update_progress("d0", |p| p.completed = 1);

        let snapshot = state.progress_snapshot();
        assert_eq!(snapshot.total, 4);
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.percentage, 25);
    }

    #[test]
    fn stop_flag_round_trips() {
        let state = ExecutionState::new(request(1, 1), vec![queue_item("a", 1)]);
        assert!(!state.stop_requested());
        state.request_stop();
        assert!(state.stop_requested());
    }

    #[test]
    fn report_includes_all_requested_devices() {
        let state = ExecutionState::new(request(1, 2), vec![queue_item("a", 1)]);
        state.update_progress("d1", |p| p.status = DeviceStatus::Completed);

        let report = state.build_report();
        assert_eq!(report.devices.len(), 2);
        assert_eq!(report.devices["d1"].status, DeviceStatus::Completed);
        assert_eq!(report.devices["d0"].status, DeviceStatus::Running);
    }
}
