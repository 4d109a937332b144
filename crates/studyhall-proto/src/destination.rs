//! Group identifiers and the destinations derived from them.

use std::{fmt, str::FromStr};

use crate::errors::ProtocolError;

/// Longest accepted group identifier.
const MAX_GROUP_ID_LEN: usize = 128;

/// Identifier of a study group, as used in topic names.
///
/// Guaranteed non-empty and free of `/`, whitespace and control characters so
/// that it always forms exactly one destination path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(String);

impl GroupId {
    /// Validate and wrap a group identifier.
    pub fn new(raw: impl Into<String>) -> Result<Self, ProtocolError> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && raw.len() <= MAX_GROUP_ID_LEN
            && !raw.chars().any(|c| c == '/' || c.is_whitespace() || c.is_control());
        if valid { Ok(Self(raw)) } else { Err(ProtocolError::InvalidGroupId(raw)) }
    }

    /// Identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for GroupId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for GroupId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The two channels every group session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    /// Chat messages.
    Chat,
    /// Call signaling.
    Call,
}

impl Topic {
    /// Both topics, in subscription order.
    pub const ALL: [Self; 2] = [Self::Chat, Self::Call];
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat => f.write_str("chat"),
            Self::Call => f.write_str("call"),
        }
    }
}

/// Destination naming scheme of the broker.
///
/// Clients subscribe to `{topic_prefix}/group/{id}` and
/// `{topic_prefix}/group/{id}/call`, and publish to `{app_prefix}/chat/{id}`
/// and `{app_prefix}/call/{id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destinations {
    /// Prefix of broker-managed topics.
    pub topic_prefix: String,
    /// Prefix of application (server-handled) destinations.
    pub app_prefix: String,
}

impl Default for Destinations {
    fn default() -> Self {
        Self { topic_prefix: "/topic".to_string(), app_prefix: "/app".to_string() }
    }
}

impl Destinations {
    /// Destination a client subscribes to for `topic`.
    pub fn subscription(&self, group: &GroupId, topic: Topic) -> String {
        match topic {
            Topic::Chat => format!("{}/group/{group}", self.topic_prefix),
            Topic::Call => format!("{}/group/{group}/call", self.topic_prefix),
        }
    }

    /// Destination a client publishes to for `topic`.
    pub fn publish(&self, group: &GroupId, topic: Topic) -> String {
        match topic {
            Topic::Chat => format!("{}/chat/{group}", self.app_prefix),
            Topic::Call => format!("{}/call/{group}", self.app_prefix),
        }
    }

    /// Inverse of [`Destinations::publish`]. `None` for anything else.
    pub fn parse_publish(&self, destination: &str) -> Option<(GroupId, Topic)> {
        let rest = destination.strip_prefix(self.app_prefix.as_str())?.strip_prefix('/')?;
        let (kind, group) = rest.split_once('/')?;
        let topic = match kind {
            "chat" => Topic::Chat,
            "call" => Topic::Call,
            _ => return None,
        };
        GroupId::new(group).ok().map(|group| (group, topic))
    }
}
