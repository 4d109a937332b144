//! Inbound message classification.
//!
//! # Invariants
//!
//! - One call per received message, in arrival order. Nothing is buffered,
//!   so delivery order equals arrival order.
//! - Malformed bodies are logged at `warn` and dropped; unknown kinds at
//!   `debug`. Neither is ever an error for the caller.
//! - A call-start signal from the local user never reaches the caller.

use chrono::{DateTime, Utc};
use studyhall_proto::{Topic, WireMessage};
use tracing::{debug, warn};

use crate::event::{ChatLogEntry, InboundEvent, resolve_timestamp};

/// Classifies raw message bodies from the group's topics.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    self_email: String,
}

impl Dispatcher {
    /// Dispatcher for the user identified by `self_email`.
    pub fn new(self_email: impl Into<String>) -> Self {
        Self { self_email: self_email.into() }
    }

    /// Classify one message body.
    ///
    /// The chat topic carries chat messages and call signals; the call topic
    /// carries call signals only. `received_at` stands in for a missing or
    /// unparseable timestamp.
    pub fn dispatch(
        &self,
        topic: Topic,
        body: &str,
        received_at: DateTime<Utc>,
    ) -> Option<InboundEvent> {
        let message = match WireMessage::from_json(body) {
            Ok(message) => message,
            Err(e) => {
                warn!(%topic, "discarding malformed message: {}", e);
                return None;
            },
        };

        match (topic, message) {
            (Topic::Chat, WireMessage::Chat(payload)) => {
                Some(InboundEvent::Chat(ChatLogEntry::from_payload(payload, received_at)))
            },
            (Topic::Call, WireMessage::Chat(_)) => {
                debug!(%topic, "ignoring chat message on call topic");
                None
            },
            (_, WireMessage::CallStarted(payload)) => {
                if payload.sender == self.self_email {
                    debug!(%topic, "ignoring own call start");
                    return None;
                }
                let (timestamp, _) = resolve_timestamp(payload.timestamp, received_at);
                Some(InboundEvent::CallStarted { sender: payload.sender, timestamp })
            },
            (_, WireMessage::Unknown { tag }) => {
                debug!(%topic, %tag, "ignoring unknown message kind");
                None
            },
        }
    }
}
