//! Client
//!
//! Action-based client for a Studyhall group session. Binds the
//! [`studyhall_core::Connection`] state machine to message classification and
//! outbound publishing, and hands out [`ConnectionHandle`]s so callers can
//! tell a live connection from one they already replaced.
//!
//! # Architecture
//!
//! The client follows the same sans-IO, action-based pattern as
//! [`studyhall_core`]. It receives events ([`ClientEvent`]), processes them
//! through pure state machine logic, and returns actions ([`ClientAction`])
//! for the caller to execute.
//!
//! # Components
//!
//! - [`Client`]: top-level state machine for one group connection at a time
//! - [`Dispatcher`]: turns raw message bodies into [`InboundEvent`]s
//! - [`Publisher`]: builds outbound chat and call-start frames
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::spawn`]: WebSocket transport task for a
//!   [`studyhall_core::TransportRequest`]
//! - [`history::HistoryClient`]: REST fetch of a group's chat history

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod dispatcher;
mod error;
mod event;
mod publisher;

#[cfg(feature = "transport")]
pub mod history;
#[cfg(feature = "transport")]
pub mod transport;

pub use client::{Client, ClientIdentity, ConnectionHandle};
pub use dispatcher::Dispatcher;
pub use error::ClientError;
pub use event::{ChatLogEntry, ClientAction, ClientEvent, InboundEvent};
pub use publisher::Publisher;
pub use studyhall_core::{ConnectionError, ConnectionState, Environment};
pub use studyhall_proto::GroupId;
