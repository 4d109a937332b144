use serde::{Deserialize, Serialize};

/// Body of a `CHAT` message.
///
/// `timestamp` is kept as received; see [`crate::payloads::parse_timestamp`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    /// Author's email address. Identifies the author.
    pub sender_email: String,
    /// Author's display name, if the server provided one.
    #[serde(
        default,
        deserialize_with = "super::lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub sender_name: Option<String>,
    /// Message text.
    pub content: String,
    /// Send time as an ISO 8601 string.
    #[serde(
        default,
        deserialize_with = "super::lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<String>,
}

/// Body of a `CALL_STARTED` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStartedPayload {
    /// Email address of whoever started the call.
    pub sender: String,
    /// Start time as an ISO 8601 string.
    #[serde(
        default,
        deserialize_with = "super::lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<String>,
}
