//! Driver-level error type.

use thiserror::Error;

/// Errors returned by a [`crate::DeviceDriver`] method.
///
/// The engine uses the variant to decide failure scope:
/// - `SessionCrashed` — the session is unusable; the device's remaining
///   queue is abandoned.
/// - everything else  — this one action failed; only the current
///   scenario is affected.
#[derive(Debug, Error, Clone)]
pub enum DriverError {
    /// The action ran but did not succeed (gesture rejected, assertion
    /// failed, app refused the request, …).
    #[error("device action failed: {0}")]
    ActionFailed(String),

    /// A polling primitive gave up before its condition held.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// The target element/image/text is not on screen.
    #[error("target not found: {0}")]
    NotFound(String),

    /// The underlying device session/transport died. Never swallowed —
    /// the engine re-throws this past the current scenario.
    #[error("device session crashed: {0}")]
    SessionCrashed(String),
}

impl DriverError {
    /// True when the error means the whole session is gone, not just
    /// one action.
    pub fn is_session_crash(&self) -> bool {
        matches!(self, Self::SessionCrashed(_))
    }
}
