//! Error types for the connection core.
//!
//! Nothing here is fatal to a session: the connection reports these through
//! [`crate::ConnectionAction::Error`] and keeps retrying. Only API misuse
//! (`InvalidState`) and bad configuration (`InvalidEndpoint`) come back as
//! `Err` from a method call.

use std::time::Duration;

use studyhall_proto::{Command, ProtocolError};
use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors that can occur during connection state machine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Invalid state transition attempted
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when error occurred
        state: ConnectionState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Received a frame that makes no sense in the current state
    #[error("unexpected {command} frame in state {state:?}")]
    UnexpectedFrame {
        /// Current state when frame was received
        state: ConnectionState,
        /// Command of the unexpected frame
        command: Command,
    },

    /// Transport or STOMP handshake did not complete in time
    #[error("handshake timeout after {elapsed:?}")]
    HandshakeTimeout {
        /// How long we waited
        elapsed: Duration,
    },

    /// Broker stopped sending data, heart-beats included
    #[error("no data from broker for {elapsed:?}")]
    HeartbeatTimeout {
        /// Time since the last received byte
        elapsed: Duration,
    },

    /// Broker sent an `ERROR` frame (rejected credentials, bad destination)
    #[error("broker error: {message}")]
    Broker {
        /// The `message` header, or the body when the header is absent
        message: String,
    },

    /// Underlying transport failed or was closed by the peer
    #[error("transport error: {0}")]
    Transport(String),

    /// Frame or payload could not be decoded
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Configured endpoint is not a usable WebSocket URL
    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),
}

impl ConnectionError {
    /// Returns true if this error is transient and may succeed on retry.
    ///
    /// Broker rejections are not transient: retrying with the same token
    /// fails the same way. The connection retries anyway, since the backend
    /// also rejects during restarts.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::HandshakeTimeout { .. } | Self::HeartbeatTimeout { .. } | Self::Transport(_)
        )
    }
}

impl From<ProtocolError> for ConnectionError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
