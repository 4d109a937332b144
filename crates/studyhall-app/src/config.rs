//! Session view configuration.

use std::time::Duration;

/// How long an incoming call banner stays up.
pub const DEFAULT_BANNER_DURATION: Duration = Duration::from_secs(8);

/// Shared video-call room.
pub const DEFAULT_CALL_URL: &str = "https://studyconnect.daily.co/study-group-call";

/// Consecutive connection errors before the view reports the connection as
/// lost.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Configuration for the session view model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Call banner lifetime.
    pub banner_duration: Duration,
    /// URL opened when the user starts a call.
    pub call_url: String,
    /// Consecutive errors that switch the indicator to lost. Zero disables
    /// the indicator.
    pub failure_threshold: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            banner_duration: DEFAULT_BANNER_DURATION,
            call_url: DEFAULT_CALL_URL.to_string(),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}
