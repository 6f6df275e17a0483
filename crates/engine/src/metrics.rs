//! Performance summaries derived from raw timing/match data.
//!
//! Per-step: the total duration is split into wait vs action time —
//! polling actions spend all of it waiting, everything else is action
//! time. Image/OCR sub-metrics attach only when the dispatcher actually
//! produced match metadata. Per-run: aggregates over steps with a
//! positive duration.

use serde::{Deserialize, Serialize};

use crate::models::StepResult;

// ---------------------------------------------------------------------------
// Step-level metrics
// ---------------------------------------------------------------------------

/// Template-image match metadata extracted from a driver result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMetrics {
    pub template_id: String,
    pub confidence: f64,
    pub match_time_ms: u64,
}

/// OCR match metadata extracted from a driver result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrMetrics {
    pub matched_text: String,
    pub confidence: f64,
    pub ocr_time_ms: u64,
    pub match_mode: String,
}

/// Match metadata a dispatcher call happened to produce. Partially
/// populated by design — most actions yield neither block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfHints {
    #[serde(default)]
    pub image: Option<MatchMetrics>,
    #[serde(default)]
    pub ocr: Option<OcrMetrics>,
}

/// The performance block attached to a step result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepPerformance {
    pub total_ms: u64,
    pub action_ms: u64,
    pub wait_ms: u64,
    #[serde(default)]
    pub image: Option<MatchMetrics>,
    #[serde(default)]
    pub ocr: Option<OcrMetrics>,
}

/// Split a step's duration into the wait/action buckets.
pub fn step_performance(polling: bool, total_ms: u64, hints: Option<PerfHints>) -> StepPerformance {
    let (action_ms, wait_ms) = if polling { (0, total_ms) } else { (total_ms, 0) };
    let hints = hints.unwrap_or_default();
    StepPerformance {
        total_ms,
        action_ms,
        wait_ms,
        image: hints.image,
        ocr: hints.ocr,
    }
}

// ---------------------------------------------------------------------------
// Run-level metrics
// ---------------------------------------------------------------------------

/// Aggregate over one scenario run's steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPerformanceSummary {
    pub avg_step_ms: u64,
    pub min_step_ms: u64,
    pub max_step_ms: u64,
    pub total_wait_ms: u64,
    pub total_action_ms: u64,
    #[serde(default)]
    pub avg_image_match_ms: Option<u64>,
    pub image_match_count: u32,
}

/// Summarize a run. Returns `None` when no step carried a positive
/// duration (nothing meaningful to aggregate).
pub fn run_summary(steps: &[StepResult]) -> Option<RunPerformanceSummary> {
    let timed: Vec<&StepPerformance> = steps
        .iter()
        .filter_map(|s| s.performance.as_ref())
        .filter(|p| p.total_ms > 0)
        .collect();

    if timed.is_empty() {
        return None;
    }

    let durations: Vec<u64> = timed.iter().map(|p| p.total_ms).collect();
    let total: u64 = durations.iter().sum();

    let image_times: Vec<u64> = timed
        .iter()
        .filter_map(|p| p.image.as_ref().map(|m| m.match_time_ms))
        .collect();
    let avg_image_match_ms = (!image_times.is_empty())
        .then(|| image_times.iter().sum::<u64>() / image_times.len() as u64);

    Some(RunPerformanceSummary {
        avg_step_ms: total / durations.len() as u64,
        min_step_ms: *durations.iter().min().unwrap_or(&0),
        max_step_ms: *durations.iter().max().unwrap_or(&0),
        total_wait_ms: timed.iter().map(|p| p.wait_ms).sum(),
        total_action_ms: timed.iter().map(|p| p.action_ms).sum(),
        avg_image_match_ms,
        image_match_count: image_times.len() as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NodeKind, StepStatus};
    use chrono::Utc;

    fn step_with(perf: Option<StepPerformance>) -> StepResult {
        StepResult {
            node_id: "n".into(),
            node_name: "n".into(),
            node_kind: NodeKind::Action,
            status: StepStatus::Passed,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            error: None,
            condition_result: None,
            performance: perf,
            failure: None,
        }
    }

    #[test]
    fn polling_step_is_all_wait_time() {
        let perf = step_performance(true, 1500, None);
        assert_eq!(perf.wait_ms, 1500);
        assert_eq!(perf.action_ms, 0);
        assert_eq!(perf.total_ms, 1500);
    }

    #[test]
    fn regular_step_is_all_action_time() {
        let perf = step_performance(false, 300, None);
        assert_eq!(perf.action_ms, 300);
        assert_eq!(perf.wait_ms, 0);
    }

    #[test]
    fn summary_skips_zero_duration_steps() {
        let steps = vec![
            step_with(Some(step_performance(false, 0, None))),
            step_with(Some(step_performance(false, 100, None))),
            step_with(Some(step_performance(true, 300, None))),
        ];

        let summary = run_summary(&steps).expect("two timed steps");
        assert_eq!(summary.avg_step_ms, 200);
        assert_eq!(summary.min_step_ms, 100);
        assert_eq!(summary.max_step_ms, 300);
        assert_eq!(summary.total_action_ms, 100);
        assert_eq!(summary.total_wait_ms, 300);
        assert_eq!(summary.image_match_count, 0);
        assert!(summary.avg_image_match_ms.is_none());
    }

    #[test]
    fn summary_of_untimed_steps_is_none() {
        let steps = vec![step_with(None), step_with(Some(step_performance(false, 0, None)))];
        assert!(run_summary(&steps).is_none());
    }

    #[test]
    fn image_metrics_aggregate_only_when_present() {
        let hints = PerfHints {
            image: Some(MatchMetrics {
                template_id: "tmpl".into(),
                confidence: 0.9,
                match_time_ms: 40,
            }),
            ocr: None,
        };
        let steps = vec![
            step_with(Some(step_performance(false, 100, Some(hints)))),
            step_with(Some(step_performance(false, 100, None))),
        ];

        let summary = run_summary(&steps).unwrap();
        assert_eq!(summary.image_match_count, 1);
        assert_eq!(summary.avg_image_match_ms, Some(40));
    }
}
