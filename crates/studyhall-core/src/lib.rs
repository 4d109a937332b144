//! Connection core for Studyhall group sessions.
//!
//! Holds the pieces every front-end shares and none of them should
//! reimplement: the [`Environment`] abstraction over time and randomness, and
//! the sans-IO [`Connection`] state machine that owns the STOMP session for
//! one study group (handshake, subscriptions, heart-beats, reconnects,
//! teardown).
//!
//! The state machine never touches a socket. It returns
//! [`ConnectionAction`]s that a driver executes, which keeps reconnect and
//! timeout behaviour testable under virtual time.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod connection;
pub mod env;
pub mod error;

pub use connection::{
    Connection, ConnectionAction, ConnectionConfig, ConnectionState, ReconnectPolicy,
    TransportRequest,
};
pub use env::Environment;
pub use error::ConnectionError;
