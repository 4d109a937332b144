//! JSON bodies carried in `SEND` and `MESSAGE` frames.
//!
//! The backend distinguishes messages by a `type` tag. Tags are matched
//! case-insensitively; anything unrecognised becomes
//! [`WireMessage::Unknown`] rather than an error so newer servers can add
//! kinds without breaking older clients.
//!
//! # Invariants
//!
//! - A body that parses as JSON but lacks a string `type` is an error, never
//!   `Unknown`.
//! - A recognised tag with missing or ill-typed required fields is an error.
//! - An unusable `timestamp` never rejects a message; it decodes as `None`.

mod chat;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub use self::chat::{CallStartedPayload, ChatPayload};
use crate::errors::{ProtocolError, Result};

/// Classification of a message by its `type` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Chat message (`CHAT`).
    Chat,
    /// Someone started a video call (`CALL_STARTED`).
    CallStarted,
    /// Any other tag.
    Unknown,
}

impl MessageKind {
    /// Classify a `type` tag, ignoring ASCII case.
    pub fn from_tag(tag: &str) -> Self {
        if tag.eq_ignore_ascii_case("CHAT") {
            Self::Chat
        } else if tag.eq_ignore_ascii_case("CALL_STARTED") {
            Self::CallStarted
        } else {
            Self::Unknown
        }
    }

    /// Canonical tag. `None` for [`MessageKind::Unknown`].
    pub fn tag(self) -> Option<&'static str> {
        match self {
            Self::Chat => Some("CHAT"),
            Self::CallStarted => Some("CALL_STARTED"),
            Self::Unknown => None,
        }
    }
}

/// A decoded message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// Chat message.
    Chat(ChatPayload),
    /// Call-start signal.
    CallStarted(CallStartedPayload),
    /// Well-formed message of a kind this client does not handle.
    Unknown {
        /// The unrecognised `type` tag.
        tag: String,
    },
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum Tagged<'a> {
    #[serde(rename = "CHAT")]
    Chat(&'a ChatPayload),
    #[serde(rename = "CALL_STARTED")]
    CallStarted(&'a CallStartedPayload),
}

impl WireMessage {
    /// Kind of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Chat(_) => MessageKind::Chat,
            Self::CallStarted(_) => MessageKind::CallStarted,
            Self::Unknown { .. } => MessageKind::Unknown,
        }
    }

    /// Decode a JSON body.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidJson` if the body is not a JSON object
    /// - `ProtocolError::MissingField("type")` if there is no string tag
    /// - `ProtocolError::InvalidPayload` if a known kind has the wrong shape
    pub fn from_json(body: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(body).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        if !value.is_object() {
            return Err(ProtocolError::InvalidJson("expected a JSON object".to_string()));
        }

        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingField("type"))?
            .to_string();

        match MessageKind::from_tag(&tag) {
            MessageKind::Chat => serde_json::from_value(value)
                .map(Self::Chat)
                .map_err(|e| ProtocolError::InvalidPayload { kind: "CHAT", reason: e.to_string() }),
            MessageKind::CallStarted => serde_json::from_value(value)
                .map(Self::CallStarted)
                .map_err(|e| ProtocolError::InvalidPayload {
                    kind: "CALL_STARTED",
                    reason: e.to_string(),
                }),
            MessageKind::Unknown => Ok(Self::Unknown { tag }),
        }
    }

    /// Encode as a JSON body with the canonical `type` tag.
    ///
    /// # Errors
    ///
    /// `ProtocolError::Serialize` for [`WireMessage::Unknown`], which has no
    /// body to send.
    pub fn to_json(&self) -> Result<String> {
        let tagged = match self {
            Self::Chat(chat) => Tagged::Chat(chat),
            Self::CallStarted(call) => Tagged::CallStarted(call),
            Self::Unknown { tag } => {
                return Err(ProtocolError::Serialize(format!("cannot encode unknown kind {tag:?}")));
            },
        };
        serde_json::to_string(&tagged).map_err(|e| ProtocolError::Serialize(e.to_string()))
    }
}

/// Decode the body of a chat history response (a JSON array of chat entries).
///
/// Extra fields (`id`, `groupId`, `type`, ...) are ignored.
pub fn parse_history(body: &str) -> Result<Vec<ChatPayload>> {
    serde_json::from_str(body)
        .map_err(|e| ProtocolError::InvalidPayload { kind: "history", reason: e.to_string() })
}

/// Parse a message timestamp.
///
/// Accepts RFC 3339 (`2024-01-01T00:00:00Z`) and ISO 8601 local date-times
/// without an offset (`2024-01-01T10:00:00.123`, `2024-01-01T10:00`), which
/// the backend emits for server-stamped messages. Local date-times are read
/// as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Format a timestamp the way browsers do (`toISOString`).
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Deserialize a field as `Some(string)` when it is a JSON string and `None`
/// for anything else, including absence.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}
