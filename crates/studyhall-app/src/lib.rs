//! Application layer for Studyhall
//!
//! Pure state machines and a generic runtime for a group session view,
//! enabling deterministic simulation testing with the same code that runs in
//! production.
//!
//! # Components
//!
//! - [`App`]: session view model (chat log, call banner, history merge,
//!   connection indicator, input commands)
//! - [`Bridge`]: protocol bridge (translates App actions to Client calls)
//! - [`Driver`]: trait for platform-specific I/O abstraction
//! - [`Runtime`]: generic orchestration loop using Driver

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod action;
mod app;
mod bridge;
mod config;
mod driver;
mod event;
mod runtime;
mod state;

pub use action::{AppAction, TransportCommand};
pub use app::App;
pub use bridge::Bridge;
pub use config::{
    DEFAULT_BANNER_DURATION, DEFAULT_CALL_URL, DEFAULT_FAILURE_THRESHOLD, SessionConfig,
};
pub use driver::{Driver, DriverInput, TransportInput};
pub use event::AppEvent;
pub use runtime::Runtime;
pub use state::{CallBanner, ConnectionIndicator, HistoryState};
