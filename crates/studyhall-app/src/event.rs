//! Application input events.
//!
//! [`AppEvent`] is the full set of inputs that drive the [`crate::App`] state
//! machine. Events come from two sources:
//! - user input lines and periodic ticks
//! - protocol notifications translated from the client by the
//!   [`crate::Bridge`], plus history results from the driver

use studyhall_client::ChatLogEntry;
use studyhall_proto::GroupId;

/// Events processed by the App state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent<I> {
    /// Periodic tick.
    Tick {
        /// Current time.
        now: I,
    },

    /// A line typed by the user.
    Line(String),

    /// Connection attempt in progress.
    Connecting,

    /// Connected and subscribed.
    Connected {
        /// Connected group.
        group: GroupId,
    },

    /// Connection-level error; the client keeps retrying.
    ConnectionError {
        /// Error description.
        message: String,
    },

    /// Left the group.
    Disconnected,

    /// Chat message for the log.
    MessageReceived(ChatLogEntry),

    /// Another member started a video call.
    CallStarted {
        /// Email of whoever started the call.
        sender: String,
        /// When the signal was received.
        at: I,
    },

    /// Chat history arrived.
    HistoryLoaded(Vec<ChatLogEntry>),

    /// Chat history could not be loaded.
    HistoryFailed {
        /// Why the fetch failed.
        reason: String,
    },

    /// Non-connection error, such as an empty message.
    Error {
        /// Error description.
        message: String,
    },
}
