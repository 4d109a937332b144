//! Observable view state types.
//!
//! These are the "View Model" pieces a renderer reads: the connection
//! indicator, the incoming call banner and where the history load stands.

use studyhall_client::ChatLogEntry;

/// Connection state as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionIndicator {
    /// Not connected and not trying.
    Disconnected,
    /// Connection attempt in progress.
    Connecting,
    /// Connected and subscribed.
    Connected,
    /// Repeated failures; still retrying.
    Lost,
}

impl ConnectionIndicator {
    /// Short label for status lines.
    pub fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Lost => "Connection lost, retrying...",
        }
    }
}

/// Incoming call notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallBanner<I> {
    /// Email of whoever started the call.
    pub sender: String,
    /// Text to display.
    pub message: String,
    /// When the banner disappears.
    pub expires_at: I,
}

impl<I: Copy + Ord> CallBanner<I> {
    /// Banner for a call started by `sender`, shown until `expires_at`.
    pub fn new(sender: String, expires_at: I) -> Self {
        let message = format!("{sender} has started a video call");
        Self { sender, message, expires_at }
    }

    /// Whether the banner is gone at `now`.
    pub fn is_expired(&self, now: I) -> bool {
        now >= self.expires_at
    }
}

/// Where the chat history load stands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HistoryState {
    /// No load requested yet. Live messages go straight to the log.
    #[default]
    Idle,
    /// Load in flight. Live messages are held back in arrival order.
    Pending {
        /// Live messages received while waiting.
        buffered: Vec<ChatLogEntry>,
    },
    /// History was loaded.
    Loaded,
    /// History could not be loaded; the log holds live messages only.
    Failed,
}

impl HistoryState {
    /// Whether a load is in flight.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    #[test]
    fn banner_message_names_sender() {
        let banner = CallBanner::new("bob@x.com".to_string(), Instant::now());
        assert_eq!(banner.message, "bob@x.com has started a video call");
    }

    #[test]
    fn banner_expires_at_deadline() {
        let start = Instant::now();
        let banner = CallBanner::new("bob@x.com".to_string(), start + Duration::from_secs(8));

        assert!(!banner.is_expired(start));
        assert!(!banner.is_expired(start + Duration::from_millis(7999)));
        assert!(banner.is_expired(start + Duration::from_secs(8)));
    }
}
