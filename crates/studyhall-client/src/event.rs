//! Client events and actions.

use chrono::{DateTime, Utc};
use studyhall_core::{ConnectionError, TransportRequest};
use studyhall_proto::{ChatPayload, Frame, GroupId, payloads::parse_timestamp};

/// One line of the chat log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLogEntry {
    /// Author's email address.
    pub sender_email: String,
    /// Author's display name. Falls back to the email when the server sent
    /// none.
    pub sender_name: String,
    /// Message text.
    pub content: String,
    /// Send time, or receipt time when the message carried none.
    pub timestamp: DateTime<Utc>,
    /// Whether `timestamp` is the receipt time rather than the sender's.
    pub timestamp_defaulted: bool,
}

impl ChatLogEntry {
    /// Build an entry from a wire payload.
    ///
    /// A missing or unparseable timestamp is replaced by `received_at`.
    pub fn from_payload(payload: ChatPayload, received_at: DateTime<Utc>) -> Self {
        let (timestamp, timestamp_defaulted) = resolve_timestamp(payload.timestamp, received_at);
        let sender_name = payload
            .sender_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| payload.sender_email.clone());

        Self {
            sender_email: payload.sender_email,
            sender_name,
            content: payload.content,
            timestamp,
            timestamp_defaulted,
        }
    }

    /// Whether `email` wrote this entry.
    pub fn is_from(&self, email: &str) -> bool {
        self.sender_email == email
    }
}

/// Parse a wire timestamp, falling back to `received_at`.
///
/// Returns the timestamp and whether the fallback was used.
pub(crate) fn resolve_timestamp(
    raw: Option<String>,
    received_at: DateTime<Utc>,
) -> (DateTime<Utc>, bool) {
    match raw.as_deref().and_then(parse_timestamp) {
        Some(ts) => (ts, false),
        None => (received_at, true),
    }
}

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Chat message for the log.
    Chat(ChatLogEntry),

    /// Another member started a video call.
    CallStarted {
        /// Email of whoever started the call.
        sender: String,
        /// Start time, or receipt time when the message carried none.
        timestamp: DateTime<Utc>,
    },
}

/// Events the caller feeds into the client.
///
/// The caller is responsible for:
/// - Reporting transport lifecycle and received frames
/// - Driving time forward via ticks
///
/// Generic over `I` (Instant type) to support both production
/// (`std::time::Instant`) and simulation (virtual) time.
#[derive(Debug, Clone)]
pub enum ClientEvent<I = std::time::Instant> {
    /// The transport requested by the last `OpenTransport` is open.
    TransportOpened,

    /// The transport failed or was closed by the broker.
    TransportClosed {
        /// Human-readable cause.
        reason: String,
    },

    /// Frame received from the broker.
    FrameReceived(Frame),

    /// Heart-beat received from the broker.
    HeartbeatReceived,

    /// Time tick for timers (reconnect, heart-beats, handshake timeout).
    ///
    /// The caller should send ticks periodically.
    Tick {
        /// Current time from the environment.
        now: I,
    },
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Open a WebSocket. Any previous one has been closed.
    OpenTransport(TransportRequest),

    /// Send a frame to the broker.
    Send(Frame),

    /// Send a heart-beat.
    SendHeartbeat,

    /// Close the current transport.
    CloseTransport,

    /// The connection to `group` is up and subscribed.
    ///
    /// Emitted once per successful (re)connection.
    Connected {
        /// Connected group.
        group: GroupId,
    },

    /// Deliver a classified message to the application.
    Deliver(InboundEvent),

    /// Connection-level error. The client keeps retrying.
    Error(ConnectionError),
}
