//! The `DeviceDriver` trait — the contract every device backend must fulfil.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::DriverError;

// ---------------------------------------------------------------------------
// Selector / match types
// ---------------------------------------------------------------------------

/// How an element selector value should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum SelectorKind {
    /// Resource id (the default when a node omits `selectorType`).
    #[default]
    Id,
    Xpath,
    Text,
    Accessibility,
    ClassName,
}

/// A fully-specified element selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    #[serde(default)]
    pub kind: SelectorKind,
    pub value: String,
}

impl Selector {
    pub fn id(value: impl Into<String>) -> Self {
        Self { kind: SelectorKind::Id, value: value.into() }
    }
}

/// Text comparison mode for text-based lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum TextMatch {
    #[default]
    Contains,
    Exact,
}

impl TextMatch {
    /// Apply this mode to a candidate string.
    pub fn matches(&self, haystack: &str, needle: &str, case_sensitive: bool) -> bool {
        let (h, n) = if case_sensitive {
            (haystack.to_string(), needle.to_string())
        } else {
            (haystack.to_lowercase(), needle.to_lowercase())
        };
        match self {
            Self::Contains => h.contains(&n),
            Self::Exact => h == n,
        }
    }
}

/// Parameters for an OCR text lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrQuery {
    pub text: String,
    pub threshold: f64,
    pub match_mode: TextMatch,
    pub case_sensitive: bool,
}

/// Result of a template-image match against the current screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMatch {
    pub template_id: String,
    pub confidence: f64,
    pub match_time_ms: u64,
    pub x: f64,
    pub y: f64,
}

/// Result of an OCR text match against the current screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrMatch {
    pub matched_text: String,
    pub confidence: f64,
    pub ocr_time_ms: u64,
    pub x: f64,
    pub y: f64,
}

// ---------------------------------------------------------------------------
// DeviceDriver
// ---------------------------------------------------------------------------

/// A stateful handle onto one connected device.
///
/// All methods are the engine's only suspension points; timeout policy
/// for the `wait_until_*` primitives lives behind this trait, not in
/// the engine. A dead session surfaces as
/// [`DriverError::SessionCrashed`] from any method.
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    /// Stable identifier of the device this handle drives.
    fn device_id(&self) -> &str;

    // ------ Gestures ------

    async fn tap(&self, x: f64, y: f64) -> Result<(), DriverError>;
    async fn double_tap(&self, x: f64, y: f64) -> Result<(), DriverError>;
    async fn long_press(&self, x: f64, y: f64, duration_ms: u64) -> Result<(), DriverError>;
    async fn swipe(
        &self,
        from: (f64, f64),
        to: (f64, f64),
        duration_ms: u64,
    ) -> Result<(), DriverError>;

    // ------ Text / keys ------

    async fn input_text(&self, selector: &Selector, text: &str) -> Result<(), DriverError>;
    async fn clear_text(&self, selector: &Selector) -> Result<(), DriverError>;
    async fn press_key(&self, keycode: &str) -> Result<(), DriverError>;

    // ------ Element queries ------

    async fn tap_element(&self, selector: &Selector) -> Result<(), DriverError>;
    async fn tap_text(
        &self,
        text: &str,
        match_mode: TextMatch,
        case_sensitive: bool,
    ) -> Result<(), DriverError>;
    async fn element_exists(&self, selector: &Selector) -> Result<bool, DriverError>;
    async fn element_enabled(&self, selector: &Selector) -> Result<bool, DriverError>;
    async fn element_displayed(&self, selector: &Selector) -> Result<bool, DriverError>;
    async fn element_text(&self, selector: &Selector) -> Result<String, DriverError>;
    /// All text currently visible on screen, concatenated.
    async fn screen_text(&self) -> Result<String, DriverError>;

    // ------ Polling primitives (timeout policy lives here) ------

    /// Wait until the element is present (`present = true`) or gone.
    async fn wait_until_element(
        &self,
        selector: &Selector,
        present: bool,
        timeout_ms: u64,
    ) -> Result<(), DriverError>;

    /// Wait until the text is visible (`present = true`) or gone.
    async fn wait_until_text(
        &self,
        text: &str,
        present: bool,
        timeout_ms: u64,
    ) -> Result<(), DriverError>;

    /// Wait until the template image appears (`present = true`) or
    /// disappears. Returns match metadata for the `present` case.
    async fn wait_until_image(
        &self,
        template_id: &str,
        threshold: f64,
        present: bool,
        timeout_ms: u64,
    ) -> Result<Option<ImageMatch>, DriverError>;

    /// Wait until OCR finds (`present = true`) or stops finding the text.
    async fn wait_until_ocr_text(
        &self,
        query: &OcrQuery,
        present: bool,
        timeout_ms: u64,
    ) -> Result<Option<OcrMatch>, DriverError>;

    // ------ Image / OCR ------

    /// One-shot template match; `None` when the image is not on screen.
    async fn match_image(
        &self,
        template_id: &str,
        threshold: f64,
    ) -> Result<Option<ImageMatch>, DriverError>;

    async fn tap_image(&self, template_id: &str, threshold: f64)
        -> Result<ImageMatch, DriverError>;

    /// One-shot OCR lookup; `None` when the text is not on screen.
    async fn ocr_find(&self, query: &OcrQuery) -> Result<Option<OcrMatch>, DriverError>;

    async fn tap_ocr_text(&self, query: &OcrQuery) -> Result<OcrMatch, DriverError>;

    // ------ App lifecycle ------

    async fn launch_app(&self, package: &str) -> Result<(), DriverError>;
    async fn terminate_app(&self, package: &str) -> Result<(), DriverError>;
    async fn clear_app_data(&self, package: &str) -> Result<(), DriverError>;
    async fn clear_app_cache(&self, package: &str) -> Result<(), DriverError>;

    // ------ Media ------

    /// Raw PNG bytes of the current screen.
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;

    /// Whether this backend can record video at all. When `false` the
    /// engine skips recording silently.
    fn supports_recording(&self) -> bool {
        false
    }

    async fn start_recording(&self) -> Result<(), DriverError>;

    /// Stop recording and return the raw video bytes.
    async fn stop_recording(&self) -> Result<Vec<u8>, DriverError>;
}

// ---------------------------------------------------------------------------
// DeviceProvider
// ---------------------------------------------------------------------------

/// Resolves device ids to live driver handles.
///
/// Device discovery/provisioning is out of scope; implementations wrap
/// whatever farm or emulator pool the deployment uses.
#[async_trait]
pub trait DeviceProvider: Send + Sync {
    async fn acquire(&self, device_id: &str) -> Result<Arc<dyn DeviceDriver>, DriverError>;
}
