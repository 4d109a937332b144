//! Client errors.

use studyhall_core::ConnectionError;
use studyhall_proto::{GroupId, ProtocolError};
use thiserror::Error;

/// Errors returned by [`crate::Client`] operations.
///
/// Connection trouble after a successful `connect` is not reported here; it
/// arrives as [`crate::ClientAction::Error`] while the client keeps retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// `connect` was called for the group that is already connected.
    #[error("already connected to group {group}")]
    AlreadyConnected {
        /// The group in question
        group: GroupId,
    },

    /// Chat message is empty after trimming.
    #[error("message is empty")]
    EmptyMessage,

    /// Connection state machine rejected the operation.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Outbound payload could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
