//! Protocol errors.

use thiserror::Error;

/// Convenience alias for protocol results.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding wire data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame starts with a command we do not know.
    #[error("unknown STOMP command: {0:?}")]
    UnknownCommand(String),

    /// Header line without a `:` separator.
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    /// Undefined escape sequence in a header.
    #[error("invalid header escape in {0:?}")]
    InvalidEscape(String),

    /// `content-length` is not a number or points past the frame.
    #[error("invalid content-length: {0}")]
    InvalidContentLength(String),

    /// Frame body is not terminated by a NUL octet.
    #[error("frame is missing its NUL terminator")]
    MissingTerminator,

    /// Frame exceeds [`crate::Frame::MAX_SIZE`].
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Size of the offending frame.
        size: usize,
        /// Maximum accepted size.
        max: usize,
    },

    /// `heart-beat` header is not two comma separated integers.
    #[error("invalid heart-beat header: {0:?}")]
    InvalidHeartBeat(String),

    /// Group identifier cannot be used in a destination.
    #[error("invalid group id: {0:?}")]
    InvalidGroupId(String),

    /// Body is not valid JSON.
    #[error("invalid JSON body: {0}")]
    InvalidJson(String),

    /// JSON body is missing a required field.
    #[error("missing field {0:?}")]
    MissingField(&'static str),

    /// JSON body has the right type tag but the wrong shape.
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload {
        /// Message kind that failed validation.
        kind: &'static str,
        /// Why it failed.
        reason: String,
    },

    /// Outbound payload could not be serialized.
    #[error("serialization failed: {0}")]
    Serialize(String),
}
