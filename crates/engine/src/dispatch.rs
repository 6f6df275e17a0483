//! Maps declarative action/condition nodes onto `DeviceDriver` calls
//! and normalizes the heterogeneous results into one outcome shape.
//!
//! Action and condition kinds are closed, internally-tagged enums, so
//! every kind has exactly one handler and the match is checked at
//! compile time. Graphs authored with a kind this build doesn't know
//! land on the `Unknown` variant: unknown *actions* report a failed
//! outcome (never a thrown error — the engine's failure path stays
//! uniform), unknown *conditions* default to `passed = true`. The
//! permissive condition fallback exists for partially authored graphs
//! and is not a correctness guarantee; do not strengthen it without
//! product sign-off.
//!
//! Error normalization: any driver error becomes `success = false` /
//! `passed = false` — except `SessionCrashed`, which is re-thrown so
//! the engine can abandon the device's queue.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::{sleep, Duration};
use uuid::Uuid;

use device::{
    DeviceDriver, DriverError, ImageMatch, OcrMatch, OcrQuery, Selector, SelectorKind, TextMatch,
};

use crate::metrics::{MatchMetrics, OcrMetrics, PerfHints};
use crate::models::ScenarioNode;

// ---------------------------------------------------------------------------
// Default parameter policy
// ---------------------------------------------------------------------------

fn default_long_press_ms() -> u64 {
    1000
}

fn default_swipe_ms() -> u64 {
    500
}

fn default_wait_ms() -> u64 {
    1000
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_threshold() -> f64 {
    0.8
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_random_text_len() -> usize {
    8
}

// ---------------------------------------------------------------------------
// Outcome shapes
// ---------------------------------------------------------------------------

/// App package context the execution runs under; `launchApp` and
/// friends fall back to it when a node names no package.
#[derive(Debug, Clone, Default)]
pub struct AppContext {
    pub app_package: Option<String>,
}

/// Uniform result of one dispatched action.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: Option<String>,
    pub payload: Option<Value>,
    pub hints: Option<PerfHints>,
}

impl ActionOutcome {
    pub(crate) fn ok() -> Self {
        Self {
            success: true,
            message: None,
            payload: None,
            hints: None,
        }
    }

    fn ok_with_hints(hints: PerfHints) -> Self {
        Self {
            success: true,
            message: None,
            payload: None,
            hints: Some(hints),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            payload: None,
            hints: None,
        }
    }
}

/// Uniform result of one evaluated condition.
#[derive(Debug, Clone)]
pub struct ConditionOutcome {
    pub passed: bool,
    pub error: Option<String>,
    pub hints: Option<PerfHints>,
}

impl ConditionOutcome {
    fn passed(value: bool) -> Self {
        Self {
            passed: value,
            error: None,
            hints: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            passed: false,
            error: Some(error.into()),
            hints: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Action specs
// ---------------------------------------------------------------------------

/// The closed set of action kinds a node can declare.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "actionType", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ActionSpec {
    Tap {
        x: f64,
        y: f64,
    },
    DoubleTap {
        x: f64,
        y: f64,
    },
    LongPress {
        x: f64,
        y: f64,
        #[serde(default = "default_long_press_ms")]
        duration_ms: u64,
    },
    Swipe {
        from_x: f64,
        from_y: f64,
        to_x: f64,
        to_y: f64,
        #[serde(default = "default_swipe_ms")]
        duration_ms: u64,
    },
    InputText {
        selector: String,
        #[serde(default)]
        selector_type: SelectorKind,
        text: String,
    },
    ClearText {
        selector: String,
        #[serde(default)]
        selector_type: SelectorKind,
    },
    TypeRandomText {
        selector: String,
        #[serde(default)]
        selector_type: SelectorKind,
        #[serde(default = "default_random_text_len")]
        length: usize,
    },
    PressKey {
        keycode: String,
    },
    Wait {
        #[serde(default = "default_wait_ms")]
        duration_ms: u64,
    },
    WaitUntilExists {
        selector: String,
        #[serde(default)]
        selector_type: SelectorKind,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    WaitUntilGone {
        selector: String,
        #[serde(default)]
        selector_type: SelectorKind,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    WaitUntilTextExists {
        text: String,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    WaitUntilTextGone {
        text: String,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    TapElement {
        selector: String,
        #[serde(default)]
        selector_type: SelectorKind,
    },
    TapText {
        text: String,
        #[serde(default)]
        match_type: TextMatch,
        #[serde(default)]
        case_sensitive: bool,
    },
    TapImage {
        template_id: String,
        #[serde(default = "default_threshold")]
        threshold: f64,
    },
    WaitUntilImage {
        template_id: String,
        #[serde(default = "default_threshold")]
        threshold: f64,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    WaitUntilImageGone {
        template_id: String,
        #[serde(default = "default_threshold")]
        threshold: f64,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    TapTextOcr {
        text: String,
        #[serde(default = "default_threshold")]
        threshold: f64,
        #[serde(default)]
        match_type: TextMatch,
        #[serde(default)]
        case_sensitive: bool,
        #[serde(default = "default_retry_count")]
        retry_count: u32,
        #[serde(default = "default_retry_delay_ms")]
        retry_delay_ms: u64,
    },
    WaitUntilTextOcr {
        text: String,
        #[serde(default = "default_threshold")]
        threshold: f64,
        #[serde(default)]
        match_type: TextMatch,
        #[serde(default)]
        case_sensitive: bool,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
        #[serde(default)]
        tap_after_wait: bool,
    },
    WaitUntilTextGoneOcr {
        text: String,
        #[serde(default = "default_threshold")]
        threshold: f64,
        #[serde(default)]
        match_type: TextMatch,
        #[serde(default)]
        case_sensitive: bool,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    AssertTextOcr {
        text: String,
        #[serde(default = "default_threshold")]
        threshold: f64,
        #[serde(default)]
        match_type: TextMatch,
        #[serde(default)]
        case_sensitive: bool,
    },
    LaunchApp {
        #[serde(default)]
        package: Option<String>,
    },
    TerminateApp {
        #[serde(default)]
        package: Option<String>,
    },
    ClearData {
        #[serde(default)]
        package: Option<String>,
    },
    ClearCache {
        #[serde(default)]
        package: Option<String>,
    },
    Screenshot,
    /// Any `actionType` this build does not recognize.
    #[serde(other)]
    Unknown,
}

impl ActionSpec {
    /// Whether this action spends its time waiting (drives the
    /// `waiting` step emission and the wait/action time split).
    pub fn is_polling(&self) -> bool {
        matches!(
            self,
            Self::Wait { .. }
                | Self::WaitUntilExists { .. }
                | Self::WaitUntilGone { .. }
                | Self::WaitUntilTextExists { .. }
                | Self::WaitUntilTextGone { .. }
                | Self::WaitUntilImage { .. }
                | Self::WaitUntilImageGone { .. }
                | Self::WaitUntilTextOcr { .. }
                | Self::WaitUntilTextGoneOcr { .. }
        )
    }

    /// Whether this action launches the app (the media coordinator
    /// starts recording after it settles).
    pub fn is_app_launch(&self) -> bool {
        matches!(self, Self::LaunchApp { .. })
    }

    /// Whether this action is an explicit screenshot checkpoint (the
    /// executor routes it through the media coordinator so the capture
    /// lands in the run's artifact list).
    pub fn is_screenshot(&self) -> bool {
        matches!(self, Self::Screenshot)
    }
}

// ---------------------------------------------------------------------------
// Condition specs
// ---------------------------------------------------------------------------

/// The closed set of condition kinds a node can declare.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "conditionType",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ConditionSpec {
    ElementExists {
        selector: String,
        #[serde(default)]
        selector_type: SelectorKind,
    },
    ElementNotExists {
        selector: String,
        #[serde(default)]
        selector_type: SelectorKind,
    },
    TextContains {
        selector: String,
        #[serde(default)]
        selector_type: SelectorKind,
        text: String,
        #[serde(default)]
        case_sensitive: bool,
    },
    ScreenContainsText {
        text: String,
        #[serde(default)]
        case_sensitive: bool,
    },
    ElementEnabled {
        selector: String,
        #[serde(default)]
        selector_type: SelectorKind,
    },
    ElementDisplayed {
        selector: String,
        #[serde(default)]
        selector_type: SelectorKind,
    },
    ImageExists {
        #[serde(default)]
        template_id: String,
        #[serde(default = "default_threshold")]
        threshold: f64,
    },
    ImageNotExists {
        #[serde(default)]
        template_id: String,
        #[serde(default = "default_threshold")]
        threshold: f64,
    },
    OcrTextExists {
        #[serde(default)]
        text: String,
        #[serde(default = "default_threshold")]
        threshold: f64,
        #[serde(default)]
        match_type: TextMatch,
        #[serde(default)]
        case_sensitive: bool,
    },
    OcrTextNotExists {
        #[serde(default)]
        text: String,
        #[serde(default = "default_threshold")]
        threshold: f64,
        #[serde(default)]
        match_type: TextMatch,
        #[serde(default)]
        case_sensitive: bool,
    },
    /// Any `conditionType` this build does not recognize.
    #[serde(other)]
    Unknown,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_selector(kind: SelectorKind, value: &str) -> Selector {
    Selector {
        kind,
        value: value.to_string(),
    }
}

fn make_ocr_query(text: &str, threshold: f64, match_mode: TextMatch, case_sensitive: bool) -> OcrQuery {
    OcrQuery {
        text: text.to_string(),
        threshold,
        match_mode,
        case_sensitive,
    }
}

fn image_hints(m: &ImageMatch) -> PerfHints {
    PerfHints {
        image: Some(MatchMetrics {
            template_id: m.template_id.clone(),
            confidence: m.confidence,
            match_time_ms: m.match_time_ms,
        }),
        ocr: None,
    }
}

fn ocr_hints(m: &OcrMatch, match_mode: TextMatch) -> PerfHints {
    PerfHints {
        image: None,
        ocr: Some(OcrMetrics {
            matched_text: m.matched_text.clone(),
            confidence: m.confidence,
            ocr_time_ms: m.ocr_time_ms,
            match_mode: match match_mode {
                TextMatch::Contains => "contains".to_string(),
                TextMatch::Exact => "exact".to_string(),
            },
        }),
    }
}

/// Pass driver errors through the crash filter: a session crash is
/// re-thrown, anything else is handed back for normalization.
fn non_crash<T>(res: Result<T, DriverError>) -> Result<Result<T, DriverError>, DriverError> {
    match res {
        Err(e) if e.is_session_crash() => Err(e),
        other => Ok(other),
    }
}

fn raw_action_type(params: &Value) -> String {
    params
        .get("actionType")
        .and_then(Value::as_str)
        .unwrap_or("<missing>")
        .to_string()
}

/// Parse a node's params into an action spec. Whether the result is the
/// `Unknown` variant or a parse error, the caller reports a failed step
/// rather than an engine error.
pub fn parse_action(params: &Value) -> Result<ActionSpec, String> {
    serde_json::from_value(params.clone()).map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Action execution
// ---------------------------------------------------------------------------

/// Execute one action node against the driver.
///
/// Only `DriverError::SessionCrashed` escapes as `Err`; every other
/// failure — policy or device — comes back as an unsuccessful outcome.
pub async fn execute_action(
    driver: &dyn DeviceDriver,
    node: &ScenarioNode,
    app: &AppContext,
) -> Result<ActionOutcome, DriverError> {
    let spec = match parse_action(&node.params) {
        Ok(spec) => spec,
        Err(msg) => {
            return Ok(ActionOutcome::fail(format!(
                "invalid action parameters: {msg}"
            )))
        }
    };
    run_action(driver, &spec, &node.params, app).await
}

async fn run_action(
    driver: &dyn DeviceDriver,
    spec: &ActionSpec,
    params: &Value,
    app: &AppContext,
) -> Result<ActionOutcome, DriverError> {
    let outcome = match spec {
        ActionSpec::Tap { x, y } => simple(non_crash(driver.tap(*x, *y).await)?),
        ActionSpec::DoubleTap { x, y } => simple(non_crash(driver.double_tap(*x, *y).await)?),
        ActionSpec::LongPress { x, y, duration_ms } => {
            simple(non_crash(driver.long_press(*x, *y, *duration_ms).await)?)
        }
        ActionSpec::Swipe {
            from_x,
            from_y,
            to_x,
            to_y,
            duration_ms,
        } => simple(non_crash(
            driver
                .swipe((*from_x, *from_y), (*to_x, *to_y), *duration_ms)
                .await,
        )?),
        ActionSpec::InputText {
            selector,
            selector_type,
            text,
        } => simple(non_crash(
            driver
                .input_text(&make_selector(*selector_type, selector), text)
                .await,
        )?),
        ActionSpec::ClearText {
            selector,
            selector_type,
        } => simple(non_crash(
            driver.clear_text(&make_selector(*selector_type, selector)).await,
        )?),
        ActionSpec::TypeRandomText {
            selector,
            selector_type,
            length,
        } => {
            let mut text = Uuid::new_v4().simple().to_string();
            text.truncate(*length);
            simple(non_crash(
                driver
                    .input_text(&make_selector(*selector_type, selector), &text)
                    .await,
            )?)
        }
        ActionSpec::PressKey { keycode } => simple(non_crash(driver.press_key(keycode).await)?),
        ActionSpec::Wait { duration_ms } => {
            sleep(Duration::from_millis(*duration_ms)).await;
            ActionOutcome::ok()
        }
        ActionSpec::WaitUntilExists {
            selector,
            selector_type,
            timeout_ms,
        } => simple(non_crash(
            driver
                .wait_until_element(&make_selector(*selector_type, selector), true, *timeout_ms)
                .await,
        )?),
        ActionSpec::WaitUntilGone {
            selector,
            selector_type,
            timeout_ms,
        } => simple(non_crash(
            driver
                .wait_until_element(&make_selector(*selector_type, selector), false, *timeout_ms)
                .await,
        )?),
        ActionSpec::WaitUntilTextExists { text, timeout_ms } => simple(non_crash(
            driver.wait_until_text(text, true, *timeout_ms).await,
        )?),
        ActionSpec::WaitUntilTextGone { text, timeout_ms } => simple(non_crash(
            driver.wait_until_text(text, false, *timeout_ms).await,
        )?),
        ActionSpec::TapElement {
            selector,
            selector_type,
        } => simple(non_crash(
            driver.tap_element(&make_selector(*selector_type, selector)).await,
        )?),
        ActionSpec::TapText {
            text,
            match_type,
            case_sensitive,
        } => simple(non_crash(
            driver.tap_text(text, *match_type, *case_sensitive).await,
        )?),
        ActionSpec::TapImage {
            template_id,
            threshold,
        } => match non_crash(driver.tap_image(template_id, *threshold).await)? {
            Ok(m) => ActionOutcome::ok_with_hints(image_hints(&m)),
            Err(e) => ActionOutcome::fail(e.to_string()),
        },
        ActionSpec::WaitUntilImage {
            template_id,
            threshold,
            timeout_ms,
        } => match non_crash(
            driver
                .wait_until_image(template_id, *threshold, true, *timeout_ms)
                .await,
        )? {
            Ok(Some(m)) => ActionOutcome::ok_with_hints(image_hints(&m)),
            Ok(None) => ActionOutcome::ok(),
            Err(e) => ActionOutcome::fail(e.to_string()),
        },
        ActionSpec::WaitUntilImageGone {
            template_id,
            threshold,
            timeout_ms,
        } => match non_crash(
            driver
                .wait_until_image(template_id, *threshold, false, *timeout_ms)
                .await,
        )? {
            Ok(_) => ActionOutcome::ok(),
            Err(e) => ActionOutcome::fail(e.to_string()),
        },
        ActionSpec::TapTextOcr {
            text,
            threshold,
            match_type,
            case_sensitive,
            retry_count,
            retry_delay_ms,
        } => {
            let query = make_ocr_query(text, *threshold, *match_type, *case_sensitive);
            let mut last_err: Option<DriverError> = None;
            let mut matched: Option<OcrMatch> = None;
            // retry_count is the number of attempts, minimum one.
            for attempt in 0..(*retry_count).max(1) {
                if attempt > 0 {
                    sleep(Duration::from_millis(*retry_delay_ms)).await;
                }
                match non_crash(driver.tap_ocr_text(&query).await)? {
                    Ok(m) => {
                        matched = Some(m);
                        break;
                    }
                    Err(e) => last_err = Some(e),
                }
            }
            match matched {
                Some(m) => ActionOutcome::ok_with_hints(ocr_hints(&m, *match_type)),
                None => ActionOutcome::fail(
                    last_err
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "OCR tap failed".to_string()),
                ),
            }
        }
        ActionSpec::WaitUntilTextOcr {
            text,
            threshold,
            match_type,
            case_sensitive,
            timeout_ms,
            tap_after_wait,
        } => {
            let query = make_ocr_query(text, *threshold, *match_type, *case_sensitive);
            match non_crash(
                driver.wait_until_ocr_text(&query, true, *timeout_ms).await,
            )? {
                Ok(Some(m)) => {
                    if *tap_after_wait {
                        if let Err(e) = non_crash(driver.tap(m.x, m.y).await)? {
                            return Ok(ActionOutcome::fail(e.to_string()));
                        }
                    }
                    ActionOutcome::ok_with_hints(ocr_hints(&m, *match_type))
                }
                Ok(None) => ActionOutcome::ok(),
                Err(e) => ActionOutcome::fail(e.to_string()),
            }
        }
        ActionSpec::WaitUntilTextGoneOcr {
            text,
            threshold,
            match_type,
            case_sensitive,
            timeout_ms,
        } => {
            let query = make_ocr_query(text, *threshold, *match_type, *case_sensitive);
            match non_crash(
                driver.wait_until_ocr_text(&query, false, *timeout_ms).await,
            )? {
                Ok(_) => ActionOutcome::ok(),
                Err(e) => ActionOutcome::fail(e.to_string()),
            }
        }
        ActionSpec::AssertTextOcr {
            text,
            threshold,
            match_type,
            case_sensitive,
        } => {
            let query = make_ocr_query(text, *threshold, *match_type, *case_sensitive);
            match non_crash(driver.ocr_find(&query).await)? {
                Ok(Some(m)) => ActionOutcome::ok_with_hints(ocr_hints(&m, *match_type)),
                Ok(None) => ActionOutcome::fail(format!("OCR assertion failed: '{text}' not found")),
                Err(e) => ActionOutcome::fail(e.to_string()),
            }
        }
        ActionSpec::LaunchApp { package } => match resolve_package(package, app) {
            Some(pkg) => simple(non_crash(driver.launch_app(&pkg).await)?),
            None => ActionOutcome::fail("no app package configured for launchApp"),
        },
        ActionSpec::TerminateApp { package } => match resolve_package(package, app) {
            Some(pkg) => simple(non_crash(driver.terminate_app(&pkg).await)?),
            None => ActionOutcome::fail("no app package configured for terminateApp"),
        },
        ActionSpec::ClearData { package } => match resolve_package(package, app) {
            Some(pkg) => simple(non_crash(driver.clear_app_data(&pkg).await)?),
            None => ActionOutcome::fail("no app package configured for clearData"),
        },
        ActionSpec::ClearCache { package } => match resolve_package(package, app) {
            Some(pkg) => simple(non_crash(driver.clear_app_cache(&pkg).await)?),
            None => ActionOutcome::fail("no app package configured for clearCache"),
        },
        ActionSpec::Screenshot => match non_crash(driver.screenshot().await)? {
            Ok(bytes) => ActionOutcome {
                success: true,
                message: None,
                payload: Some(serde_json::json!({ "byteCount": bytes.len() })),
                hints: None,
            },
            Err(e) => ActionOutcome::fail(e.to_string()),
        },
        ActionSpec::Unknown => ActionOutcome::fail(format!(
            "unsupported action type '{}'",
            raw_action_type(params)
        )),
    };

    Ok(outcome)
}

fn simple(res: Result<(), DriverError>) -> ActionOutcome {
    match res {
        Ok(()) => ActionOutcome::ok(),
        Err(e) => ActionOutcome::fail(e.to_string()),
    }
}

fn resolve_package(explicit: &Option<String>, app: &AppContext) -> Option<String> {
    explicit
        .clone()
        .filter(|p| !p.is_empty())
        .or_else(|| app.app_package.clone())
}

// ---------------------------------------------------------------------------
// Condition evaluation
// ---------------------------------------------------------------------------

/// Evaluate one condition node against the driver.
///
/// Only `DriverError::SessionCrashed` escapes as `Err`; every other
/// failure comes back as `passed = false` with an error message.
pub async fn evaluate_condition(
    driver: &dyn DeviceDriver,
    node: &ScenarioNode,
) -> Result<ConditionOutcome, DriverError> {
    let spec: ConditionSpec = match serde_json::from_value(node.params.clone()) {
        Ok(spec) => spec,
        Err(e) => return Ok(ConditionOutcome::failed(format!("invalid condition parameters: {e}"))),
    };

    let outcome = match &spec {
        ConditionSpec::ElementExists {
            selector,
            selector_type,
        } => boolean(
            non_crash(
                driver.element_exists(&make_selector(*selector_type, selector)).await,
            )?,
            false,
        ),
        ConditionSpec::ElementNotExists {
            selector,
            selector_type,
        } => boolean(
            non_crash(
                driver.element_exists(&make_selector(*selector_type, selector)).await,
            )?,
            true,
        ),
        ConditionSpec::TextContains {
            selector,
            selector_type,
            text,
            case_sensitive,
        } => match non_crash(
            driver.element_text(&make_selector(*selector_type, selector)).await,
        )? {
            Ok(actual) => ConditionOutcome::passed(TextMatch::Contains.matches(
                &actual,
                text,
                *case_sensitive,
            )),
            Err(e) => ConditionOutcome::failed(e.to_string()),
        },
        ConditionSpec::ScreenContainsText {
            text,
            case_sensitive,
        } => match non_crash(driver.screen_text().await)? {
            Ok(screen) => ConditionOutcome::passed(TextMatch::Contains.matches(
                &screen,
                text,
                *case_sensitive,
            )),
            Err(e) => ConditionOutcome::failed(e.to_string()),
        },
        ConditionSpec::ElementEnabled {
            selector,
            selector_type,
        } => boolean(
            non_crash(
                driver.element_enabled(&make_selector(*selector_type, selector)).await,
            )?,
            false,
        ),
        ConditionSpec::ElementDisplayed {
            selector,
            selector_type,
        } => boolean(
            non_crash(
                driver.element_displayed(&make_selector(*selector_type, selector)).await,
            )?,
            false,
        ),
        ConditionSpec::ImageExists {
            template_id,
            threshold,
        }
        | ConditionSpec::ImageNotExists {
            template_id,
            threshold,
        } => {
            // Policy check before any device call.
            if template_id.is_empty() {
                return Ok(ConditionOutcome::failed(
                    "image condition requires a template id",
                ));
            }
            let negate = matches!(spec, ConditionSpec::ImageNotExists { .. });
            match non_crash(driver.match_image(template_id, *threshold).await)? {
                Ok(found) => {
                    let mut outcome = ConditionOutcome::passed(found.is_some() != negate);
                    if let Some(m) = found {
                        outcome.hints = Some(image_hints(&m));
                    }
                    outcome
                }
                Err(e) => ConditionOutcome::failed(e.to_string()),
            }
        }
        ConditionSpec::OcrTextExists {
            text,
            threshold,
            match_type,
            case_sensitive,
        }
        | ConditionSpec::OcrTextNotExists {
            text,
            threshold,
            match_type,
            case_sensitive,
        } => {
            if text.is_empty() {
                return Ok(ConditionOutcome::failed(
                    "OCR condition requires a search text",
                ));
            }
            let negate = matches!(spec, ConditionSpec::OcrTextNotExists { .. });
            let query = make_ocr_query(text, *threshold, *match_type, *case_sensitive);
            match non_crash(driver.ocr_find(&query).await)? {
                Ok(found) => {
                    let mut outcome = ConditionOutcome::passed(found.is_some() != negate);
                    if let Some(m) = found {
                        outcome.hints = Some(ocr_hints(&m, *match_type));
                    }
                    outcome
                }
                Err(e) => ConditionOutcome::failed(e.to_string()),
            }
        }
        // Permissive fallback for partially authored graphs (see module
        // docs) — evaluates true without touching the device.
        ConditionSpec::Unknown => ConditionOutcome::passed(true),
    };

    Ok(outcome)
}

fn boolean(res: Result<bool, DriverError>, negate: bool) -> ConditionOutcome {
    match res {
        Ok(value) => ConditionOutcome::passed(value != negate),
        Err(e) => ConditionOutcome::failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use device::mock::MockDriver;
    use serde_json::json;

    fn action_node(params: Value) -> ScenarioNode {
        ScenarioNode {
            id: "n1".into(),
            name: None,
            kind: crate::models::NodeKind::Action,
            params,
        }
    }

    fn condition_node(params: Value) -> ScenarioNode {
        ScenarioNode {
            id: "c1".into(),
            name: None,
            kind: crate::models::NodeKind::Condition,
            params,
        }
    }

    #[tokio::test]
    async fn unknown_action_type_fails_without_throwing() {
        let driver = MockDriver::new("emu-1");
        let node = action_node(json!({ "actionType": "teleport", "x": 1 }));

        let outcome = execute_action(&driver, &node, &AppContext::default())
            .await
            .expect("must not throw");
        assert!(!outcome.success);
        assert!(outcome.message.unwrap().contains("teleport"));
        assert_eq!(driver.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_required_parameter_is_a_policy_failure() {
        let driver = MockDriver::new("emu-1");
        // tap without coordinates
        let node = action_node(json!({ "actionType": "tap" }));

        let outcome = execute_action(&driver, &node, &AppContext::default())
            .await
            .expect("must not throw");
        assert!(!outcome.success);
        assert_eq!(driver.call_count(), 0);
    }

    #[tokio::test]
    async fn session_crash_is_rethrown() {
        let driver = MockDriver::new("emu-1").with_crash("login_btn", "socket hang up");
        let node = action_node(json!({
            "actionType": "tapElement",
            "selector": "login_btn"
        }));

        let err = execute_action(&driver, &node, &AppContext::default())
            .await
            .expect_err("crash must escape");
        assert!(err.is_session_crash());
    }

    #[tokio::test]
    async fn device_failure_becomes_unsuccessful_outcome() {
        let driver = MockDriver::new("emu-1").with_failure("login_btn", "element stale");
        let node = action_node(json!({
            "actionType": "tapElement",
            "selector": "login_btn"
        }));

        let outcome = execute_action(&driver, &node, &AppContext::default())
            .await
            .expect("non-crash errors are normalized");
        assert!(!outcome.success);
        assert!(outcome.message.unwrap().contains("element stale"));
    }

    #[tokio::test]
    async fn launch_app_falls_back_to_app_context() {
        let driver = MockDriver::new("emu-1");
        let node = action_node(json!({ "actionType": "launchApp" }));
        let app = AppContext {
            app_package: Some("com.example.app".into()),
        };

        let outcome = execute_action(&driver, &node, &app).await.unwrap();
        assert!(outcome.success);
        assert_eq!(driver.calls()[0], "launchApp:com.example.app");
    }

    #[tokio::test]
    async fn image_match_attaches_perf_hints() {
        let driver = MockDriver::new("emu-1").with_present("tmpl-7");
        let node = action_node(json!({ "actionType": "tapImage", "templateId": "tmpl-7" }));

        let outcome = execute_action(&driver, &node, &AppContext::default())
            .await
            .unwrap();
        assert!(outcome.success);
        let image = outcome.hints.unwrap().image.unwrap();
        assert_eq!(image.template_id, "tmpl-7");
        assert!(image.confidence > 0.8);
    }

    #[tokio::test]
    async fn unknown_condition_type_defaults_to_passed() {
        let driver = MockDriver::new("emu-1");
        let node = condition_node(json!({ "conditionType": "phaseOfMoon" }));

        let outcome = evaluate_condition(&driver, &node).await.unwrap();
        assert!(outcome.passed);
        assert_eq!(driver.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_template_id_fails_fast_without_device_call() {
        let driver = MockDriver::new("emu-1");
        let node = condition_node(json!({ "conditionType": "imageExists", "templateId": "" }));

        let outcome = evaluate_condition(&driver, &node).await.unwrap();
        assert!(!outcome.passed);
        assert!(outcome.error.unwrap().contains("template id"));
        assert_eq!(driver.call_count(), 0);
    }

    #[tokio::test]
    async fn element_not_exists_negates() {
        let driver = MockDriver::new("emu-1").with_present("banner");

        let exists = condition_node(json!({
            "conditionType": "elementExists", "selector": "banner"
        }));
        let not_exists = condition_node(json!({
            "conditionType": "elementNotExists", "selector": "banner"
        }));

        assert!(evaluate_condition(&driver, &exists).await.unwrap().passed);
        assert!(!evaluate_condition(&driver, &not_exists).await.unwrap().passed);
    }

    #[tokio::test]
    async fn ocr_retry_taps_until_found() {
        // Not present: all attempts fail, NotFound is reported.
        let driver = MockDriver::new("emu-1");
        let node = action_node(json!({
            "actionType": "tapTextOcr",
            "text": "Continue",
            "retryCount": 2,
            "retryDelayMs": 1
        }));

        let outcome = execute_action(&driver, &node, &AppContext::default())
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(driver.call_count(), 2);
    }

    #[test]
    fn default_parameter_policy_applies() {
        let spec = parse_action(&json!({
            "actionType": "tapTextOcr",
            "text": "Continue"
        }))
        .unwrap();
        match spec {
            ActionSpec::TapTextOcr {
                threshold,
                match_type,
                case_sensitive,
                retry_count,
                retry_delay_ms,
                ..
            } => {
                assert_eq!(threshold, 0.8);
                assert_eq!(match_type, TextMatch::Contains);
                assert!(!case_sensitive);
                assert_eq!(retry_count, 3);
                assert_eq!(retry_delay_ms, 1000);
            }
            other => panic!("unexpected spec: {other:?}"),
        }

        let spec = parse_action(&json!({
            "actionType": "longPress", "x": 1.0, "y": 2.0
        }))
        .unwrap();
        assert!(matches!(
            spec,
            ActionSpec::LongPress { duration_ms: 1000, .. }
        ));

        let spec = parse_action(&json!({
            "actionType": "swipe",
            "fromX": 0.0, "fromY": 0.0, "toX": 1.0, "toY": 1.0
        }))
        .unwrap();
        assert!(matches!(spec, ActionSpec::Swipe { duration_ms: 500, .. }));
    }

    #[test]
    fn polling_classification() {
        let wait = parse_action(&json!({ "actionType": "waitUntilExists", "selector": "x" })).unwrap();
        assert!(wait.is_polling());

        let tap = parse_action(&json!({ "actionType": "tap", "x": 1.0, "y": 2.0 })).unwrap();
        assert!(!tap.is_polling());
    }
}
