//! Outbound chat and call-start frames.

use chrono::{DateTime, Utc};
use studyhall_proto::{
    CallStartedPayload, ChatPayload, Command, Destinations, Frame, GroupId, Topic, WireMessage,
    errors::Result, payloads::format_timestamp,
};

use crate::client::ClientIdentity;

/// Builds `SEND` frames for a group's application destinations.
///
/// Only builds frames; whether they go out depends on the connection state.
#[derive(Debug, Clone)]
pub struct Publisher {
    destinations: Destinations,
}

impl Publisher {
    /// Publisher for the given destination scheme.
    pub fn new(destinations: Destinations) -> Self {
        Self { destinations }
    }

    /// Frame carrying a chat message from `sender`.
    pub fn chat(
        &self,
        group: &GroupId,
        content: &str,
        sender: &ClientIdentity,
        timestamp: DateTime<Utc>,
    ) -> Result<Frame> {
        let message = WireMessage::Chat(ChatPayload {
            sender_email: sender.email.clone(),
            sender_name: Some(sender.name.clone()),
            content: content.to_string(),
            timestamp: Some(format_timestamp(timestamp)),
        });
        self.frame(group, Topic::Chat, &message)
    }

    /// Frame announcing that `sender_email` started a call.
    pub fn call_start(
        &self,
        group: &GroupId,
        sender_email: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Frame> {
        let message = WireMessage::CallStarted(CallStartedPayload {
            sender: sender_email.to_string(),
            timestamp: Some(format_timestamp(timestamp)),
        });
        self.frame(group, Topic::Call, &message)
    }

    fn frame(&self, group: &GroupId, topic: Topic, message: &WireMessage) -> Result<Frame> {
        Ok(Frame::new(Command::Send)
            .with_header("destination", self.destinations.publish(group, topic))
            .with_header("content-type", "application/json")
            .with_body(message.to_json()?))
    }
}
