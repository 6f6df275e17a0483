//! `MockDriver` — a scriptable test double for `DeviceDriver`.
//!
//! Used by the engine's tests and the CLI `run` subcommand so no real
//! device or Appium session is required. Outcomes are keyed by the
//! *target* of a call (selector value, template id, text, package);
//! coordinate gestures key on the method name.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::traits::{
    DeviceDriver, ImageMatch, OcrMatch, OcrQuery, Selector, TextMatch,
};
use crate::DriverError;

/// What a scripted call should do.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Fail with `DriverError::ActionFailed`.
    Fail(String),
    /// Fail with `DriverError::SessionCrashed`.
    Crash(String),
}

/// A mock device that records every call it receives and returns
/// programmer-specified results. Unscripted calls succeed.
pub struct MockDriver {
    device_id: String,
    /// Every call as `"method:target"`, in call order.
    calls: Arc<Mutex<Vec<String>>>,
    outcomes: Arc<Mutex<HashMap<String, MockOutcome>>>,
    /// Targets (selector values, template ids, texts) considered
    /// currently on screen.
    present: Arc<Mutex<HashSet<String>>>,
    screen_text: Arc<Mutex<String>>,
    supports_recording: bool,
}

impl MockDriver {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            calls: Arc::new(Mutex::new(Vec::new())),
            outcomes: Arc::new(Mutex::new(HashMap::new())),
            present: Arc::new(Mutex::new(HashSet::new())),
            screen_text: Arc::new(Mutex::new(String::new())),
            supports_recording: false,
        }
    }

    /// Script an `ActionFailed` for every call targeting `target`.
    pub fn with_failure(self, target: impl Into<String>, msg: impl Into<String>) -> Self {
        self.outcomes
            .lock()
            .unwrap()
            .insert(target.into(), MockOutcome::Fail(msg.into()));
        self
    }

    /// Script a `SessionCrashed` for every call targeting `target`.
    pub fn with_crash(self, target: impl Into<String>, msg: impl Into<String>) -> Self {
        self.outcomes
            .lock()
            .unwrap()
            .insert(target.into(), MockOutcome::Crash(msg.into()));
        self
    }

    /// Mark a selector value / template id / text as on-screen.
    pub fn with_present(self, target: impl Into<String>) -> Self {
        self.present.lock().unwrap().insert(target.into());
        self
    }

    pub fn with_screen_text(self, text: impl Into<String>) -> Self {
        *self.screen_text.lock().unwrap() = text.into();
        self
    }

    pub fn with_recording_support(mut self) -> Self {
        self.supports_recording = true;
        self
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// All `"method:target"` call labels, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, method: &str, target: &str) -> Result<(), DriverError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{method}:{target}"));
        match self.outcomes.lock().unwrap().get(target) {
            Some(MockOutcome::Fail(msg)) => Err(DriverError::ActionFailed(msg.clone())),
            Some(MockOutcome::Crash(msg)) => Err(DriverError::SessionCrashed(msg.clone())),
            None => Ok(()),
        }
    }

    fn is_present(&self, target: &str) -> bool {
        self.present.lock().unwrap().contains(target)
    }

    fn image_match(&self, template_id: &str) -> ImageMatch {
        ImageMatch {
            template_id: template_id.to_string(),
            confidence: 0.95,
            match_time_ms: 12,
            x: 100.0,
            y: 200.0,
        }
    }

    fn ocr_match(&self, text: &str) -> OcrMatch {
        OcrMatch {
            matched_text: text.to_string(),
            confidence: 0.9,
            ocr_time_ms: 34,
            x: 50.0,
            y: 60.0,
        }
    }
}

#[async_trait]
impl DeviceDriver for MockDriver {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn tap(&self, _x: f64, _y: f64) -> Result<(), DriverError> {
        self.record("tap", "tap")
    }

    async fn double_tap(&self, _x: f64, _y: f64) -> Result<(), DriverError> {
        self.record("doubleTap", "doubleTap")
    }

    async fn long_press(&self, _x: f64, _y: f64, _duration_ms: u64) -> Result<(), DriverError> {
        self.record("longPress", "longPress")
    }

    async fn swipe(
        &self,
        _from: (f64, f64),
        _to: (f64, f64),
        _duration_ms: u64,
    ) -> Result<(), DriverError> {
        self.record("swipe", "swipe")
    }

    async fn input_text(&self, selector: &Selector, _text: &str) -> Result<(), DriverError> {
        self.record("inputText", &selector.value)
    }

    async fn clear_text(&self, selector: &Selector) -> Result<(), DriverError> {
        self.record("clearText", &selector.value)
    }

    async fn press_key(&self, keycode: &str) -> Result<(), DriverError> {
        self.record("pressKey", keycode)
    }

    async fn tap_element(&self, selector: &Selector) -> Result<(), DriverError> {
        self.record("tapElement", &selector.value)
    }

    async fn tap_text(
        &self,
        text: &str,
        _match_mode: TextMatch,
        _case_sensitive: bool,
    ) -> Result<(), DriverError> {
        self.record("tapText", text)
    }

    async fn element_exists(&self, selector: &Selector) -> Result<bool, DriverError> {
        self.record("elementExists", &selector.value)?;
        Ok(self.is_present(&selector.value))
    }

    async fn element_enabled(&self, selector: &Selector) -> Result<bool, DriverError> {
        self.record("elementEnabled", &selector.value)?;
        Ok(self.is_present(&selector.value))
    }

    async fn element_displayed(&self, selector: &Selector) -> Result<bool, DriverError> {
        self.record("elementDisplayed", &selector.value)?;
        Ok(self.is_present(&selector.value))
    }

    async fn element_text(&self, selector: &Selector) -> Result<String, DriverError> {
        self.record("elementText", &selector.value)?;
        Ok(self.screen_text.lock().unwrap().clone())
    }

    async fn screen_text(&self) -> Result<String, DriverError> {
        self.record("screenText", "screenText")?;
        Ok(self.screen_text.lock().unwrap().clone())
    }

    async fn wait_until_element(
        &self,
        selector: &Selector,
        present: bool,
        _timeout_ms: u64,
    ) -> Result<(), DriverError> {
        self.record("waitUntilElement", &selector.value)?;
        if self.is_present(&selector.value) == present {
            Ok(())
        } else {
            Err(DriverError::Timeout(selector.value.clone()))
        }
    }

    async fn wait_until_text(
        &self,
        text: &str,
        present: bool,
        _timeout_ms: u64,
    ) -> Result<(), DriverError> {
        self.record("waitUntilText", text)?;
        let visible = self.screen_text.lock().unwrap().contains(text) || self.is_present(text);
        if visible == present {
            Ok(())
        } else {
            Err(DriverError::Timeout(text.to_string()))
        }
    }

    async fn wait_until_image(
        &self,
        template_id: &str,
        _threshold: f64,
        present: bool,
        _timeout_ms: u64,
    ) -> Result<Option<ImageMatch>, DriverError> {
        self.record("waitUntilImage", template_id)?;
        match (self.is_present(template_id), present) {
            (true, true) => Ok(Some(self.image_match(template_id))),
            (false, false) => Ok(None),
            _ => Err(DriverError::Timeout(template_id.to_string())),
        }
    }

    async fn wait_until_ocr_text(
        &self,
        query: &OcrQuery,
        present: bool,
        _timeout_ms: u64,
    ) -> Result<Option<OcrMatch>, DriverError> {
        self.record("waitUntilOcrText", &query.text)?;
        match (self.is_present(&query.text), present) {
            (true, true) => Ok(Some(self.ocr_match(&query.text))),
            (false, false) => Ok(None),
            _ => Err(DriverError::Timeout(query.text.clone())),
        }
    }

    async fn match_image(
        &self,
        template_id: &str,
        _threshold: f64,
    ) -> Result<Option<ImageMatch>, DriverError> {
        self.record("matchImage", template_id)?;
        Ok(self
            .is_present(template_id)
            .then(|| self.image_match(template_id)))
    }

    async fn tap_image(
        &self,
        template_id: &str,
        _threshold: f64,
    ) -> Result<ImageMatch, DriverError> {
        self.record("tapImage", template_id)?;
        if self.is_present(template_id) {
            Ok(self.image_match(template_id))
        } else {
            Err(DriverError::NotFound(template_id.to_string()))
        }
    }

    async fn ocr_find(&self, query: &OcrQuery) -> Result<Option<OcrMatch>, DriverError> {
        self.record("ocrFind", &query.text)?;
        Ok(self
            .is_present(&query.text)
            .then(|| self.ocr_match(&query.text)))
    }

    async fn tap_ocr_text(&self, query: &OcrQuery) -> Result<OcrMatch, DriverError> {
        self.record("tapOcrText", &query.text)?;
        if self.is_present(&query.text) {
            Ok(self.ocr_match(&query.text))
        } else {
            Err(DriverError::NotFound(query.text.clone()))
        }
    }

    async fn launch_app(&self, package: &str) -> Result<(), DriverError> {
        self.record("launchApp", package)
    }

    async fn terminate_app(&self, package: &str) -> Result<(), DriverError> {
        self.record("terminateApp", package)
    }

    async fn clear_app_data(&self, package: &str) -> Result<(), DriverError> {
        self.record("clearAppData", package)
    }

    async fn clear_app_cache(&self, package: &str) -> Result<(), DriverError> {
        self.record("clearAppCache", package)
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        self.record("screenshot", "screenshot")?;
        Ok(b"mock-png".to_vec())
    }

    fn supports_recording(&self) -> bool {
        self.supports_recording
    }

    async fn start_recording(&self) -> Result<(), DriverError> {
        self.record("startRecording", "startRecording")
    }

    async fn stop_recording(&self) -> Result<Vec<u8>, DriverError> {
        self.record("stopRecording", "stopRecording")?;
        Ok(b"mock-video".to_vec())
    }
}

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

/// A `DeviceProvider` over a fixed set of pre-built mock drivers.
pub struct MockProvider {
    drivers: HashMap<String, Arc<MockDriver>>,
}

impl MockProvider {
    pub fn new(drivers: Vec<Arc<MockDriver>>) -> Self {
        Self {
            drivers: drivers
                .into_iter()
                .map(|d| (d.device_id().to_string(), d))
                .collect(),
        }
    }
}

#[async_trait]
impl crate::DeviceProvider for MockProvider {
    async fn acquire(
        &self,
        device_id: &str,
    ) -> Result<Arc<dyn DeviceDriver>, DriverError> {
        self.drivers
            .get(device_id)
            .cloned()
            .map(|d| d as Arc<dyn DeviceDriver>)
            .ok_or_else(|| DriverError::NotFound(format!("no such device: {device_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unscripted_calls_succeed_and_are_recorded() {
        let driver = MockDriver::new("emu-1");
        driver.tap(1.0, 2.0).await.expect("tap should succeed");
        driver.launch_app("com.example.app").await.expect("launch should succeed");

        assert_eq!(driver.call_count(), 2);
        assert_eq!(driver.calls()[1], "launchApp:com.example.app");
    }

    #[tokio::test]
    async fn scripted_crash_surfaces_as_session_crash() {
        let driver = MockDriver::new("emu-1").with_crash("login_btn", "socket hang up");
        let err = driver
            .tap_element(&Selector::id("login_btn"))
            .await
            .expect_err("should crash");
        assert!(err.is_session_crash());
    }

    #[tokio::test]
    async fn presence_drives_queries_and_waits() {
        let driver = MockDriver::new("emu-1").with_present("home_banner");

        assert!(driver
            .element_exists(&Selector::id("home_banner"))
            .await
            .unwrap());
        assert!(driver
            .wait_until_element(&Selector::id("home_banner"), true, 1000)
            .await
            .is_ok());
        assert!(matches!(
            driver
                .wait_until_element(&Selector::id("missing"), true, 1000)
                .await,
            Err(DriverError::Timeout(_))
        ));
    }
}
