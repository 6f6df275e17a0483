//! Screenshot capture and video recording lifecycles.
//!
//! Media straddles action execution but must never influence it: a
//! failed capture or recording start/stop is logged and degrades to "no
//! artifact". The executor drives these around node failures, app
//! launches, and scenario completion.

use chrono::Utc;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::warn;
use uuid::Uuid;

use device::DeviceDriver;
use store::MediaStore;

use crate::models::{Screenshot, ScreenshotKind, VideoArtifact};

/// Delay after an app launch before recording starts, letting the app
/// settle so the video doesn't open on a splash frame.
const LAUNCH_SETTLE_MS: u64 = 1000;

#[derive(Clone)]
pub struct MediaCoordinator {
    media: Arc<dyn MediaStore>,
}

impl MediaCoordinator {
    pub fn new(media: Arc<dyn MediaStore>) -> Self {
        Self { media }
    }

    /// Capture and persist a screenshot. Failures are logged and
    /// reported as `None` — never as a scenario failure.
    pub async fn capture_screenshot(
        &self,
        driver: &dyn DeviceDriver,
        execution_id: Uuid,
        node_id: &str,
        kind: ScreenshotKind,
    ) -> Option<Screenshot> {
        let bytes = match driver.screenshot().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    device = driver.device_id(),
                    node = node_id,
                    "screenshot capture failed: {e}"
                );
                return None;
            }
        };

        match self
            .media
            .save_screenshot(execution_id, driver.device_id(), bytes)
            .await
        {
            Ok(path) => Some(Screenshot {
                node_id: node_id.to_string(),
                timestamp: Utc::now(),
                path,
                kind,
            }),
            Err(e) => {
                warn!(
                    device = driver.device_id(),
                    node = node_id,
                    "screenshot store failed: {e}"
                );
                None
            }
        }
    }

    /// Start recording after an app launch settles. Returns whether a
    /// recording is now in flight; unsupported backends and start
    /// failures both come back as `false`.
    pub async fn start_recording_after_launch(&self, driver: &dyn DeviceDriver) -> bool {
        if !driver.supports_recording() {
            return false;
        }
        sleep(Duration::from_millis(LAUNCH_SETTLE_MS)).await;
        match driver.start_recording().await {
            Ok(()) => true,
            Err(e) => {
                warn!(device = driver.device_id(), "recording start failed: {e}");
                false
            }
        }
    }

    /// Stop the in-flight recording and persist the video. An absent
    /// video is a valid outcome; failures only warn.
    pub async fn finish_recording(
        &self,
        driver: &dyn DeviceDriver,
        execution_id: Uuid,
    ) -> Option<VideoArtifact> {
        let bytes = match driver.stop_recording().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(device = driver.device_id(), "recording stop failed: {e}");
                return None;
            }
        };

        match self
            .media
            .save_video(execution_id, driver.device_id(), bytes)
            .await
        {
            Ok(path) => Some(VideoArtifact {
                path,
                recorded_at: Utc::now(),
            }),
            Err(e) => {
                warn!(device = driver.device_id(), "video store failed: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use device::mock::MockDriver;
    use store::MemoryMediaStore;

    fn coordinator() -> (MediaCoordinator, Arc<MemoryMediaStore>) {
        let media = Arc::new(MemoryMediaStore::new());
        (MediaCoordinator::new(media.clone()), media)
    }

    #[tokio::test]
    async fn capture_persists_and_labels_screenshot() {
        let (coordinator, media) = coordinator();
        let driver = MockDriver::new("emu-1");

        let shot = coordinator
            .capture_screenshot(&driver, Uuid::new_v4(), "n3", ScreenshotKind::Failed)
            .await
            .expect("capture should succeed");

        assert_eq!(shot.node_id, "n3");
        assert_eq!(shot.kind, ScreenshotKind::Failed);
        assert!(media.blob(&shot.path).is_some());
    }

    #[tokio::test]
    async fn capture_failure_degrades_to_none() {
        let (coordinator, media) = coordinator();
        let driver = MockDriver::new("emu-1").with_failure("screenshot", "no display");

        let shot = coordinator
            .capture_screenshot(&driver, Uuid::new_v4(), "n3", ScreenshotKind::Failed)
            .await;
        assert!(shot.is_none());
        assert_eq!(media.blob_count(), 0);
    }

    #[tokio::test]
    async fn recording_skipped_when_unsupported() {
        let (coordinator, _) = coordinator();
        let driver = MockDriver::new("emu-1");

        assert!(!coordinator.start_recording_after_launch(&driver).await);
        assert_eq!(driver.call_count(), 0);
    }

    #[tokio::test]
    async fn recording_round_trip() {
        let (coordinator, media) = coordinator();
        let driver = MockDriver::new("emu-1").with_recording_support();

        assert!(coordinator.start_recording_after_launch(&driver).await);
        let video = coordinator
            .finish_recording(&driver, Uuid::new_v4())
            .await
            .expect("video should persist");
        assert!(media.blob(&video.path).is_some());
    }

    #[tokio::test]
    async fn recording_stop_failure_is_swallowed() {
        let (coordinator, _) = coordinator();
        let driver = MockDriver::new("emu-1")
            .with_recording_support()
            .with_failure("stopRecording", "muxer died");

        coordinator.start_recording_after_launch(&driver).await;
        assert!(coordinator
            .finish_recording(&driver, Uuid::new_v4())
            .await
            .is_none());
    }
}
