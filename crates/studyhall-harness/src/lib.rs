//! Deterministic simulation harness for Studyhall session testing.
//!
//! Virtual-time implementations of the [`studyhall_core::Environment`] and
//! [`studyhall_app::Driver`] traits, plus an in-memory broker that plays the
//! backend's part, for deterministic and reproducible testing of whole
//! sessions: connect, chat, call start, history, network loss and reconnect.
//!
//! # Cluster Testing
//!
//! [`SimCluster`] runs several members of one study group against a single
//! [`SimBroker`] on a shared clock. Tests drive it with typed lines, clock
//! advances and broker-side failures, then assert on each member's view.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cluster;
pub mod sim_broker;
pub mod sim_driver;
pub mod sim_env;

pub use cluster::{SimCluster, SimSession};
pub use sim_broker::{
    BrokerError, BrokerOutput, SessionId, SharedBroker, SimBroker, SimUser, create_shared_broker,
    lock_broker,
};
pub use sim_driver::{SimDriver, SimDriverError};
pub use sim_env::{SimEnv, SimInstant};
