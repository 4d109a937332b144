//! Wire formats for Studyhall group sessions.
//!
//! The messaging backend speaks STOMP over a WebSocket. This crate owns the
//! parts of that contract that do not depend on time or I/O:
//!
//! - [`Frame`]: STOMP frame codec (text frames, header escaping,
//!   `content-length`, heart-beat EOLs)
//! - [`HeartBeat`]: `heart-beat` header parsing and negotiation
//! - [`Destinations`]: topic and application destinations for a [`GroupId`]
//! - [`payloads`]: the JSON bodies carried in `SEND` and `MESSAGE` frames
//!
//! Nothing here allocates sockets or reads clocks. Callers decide when frames
//! are sent and how received frames are interpreted.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod destination;
pub mod errors;
mod frame;
mod heartbeat;
pub mod payloads;

pub use destination::{Destinations, GroupId, Topic};
pub use errors::ProtocolError;
pub use frame::{Command, Frame};
pub use heartbeat::HeartBeat;
pub use payloads::{CallStartedPayload, ChatPayload, MessageKind, WireMessage};
