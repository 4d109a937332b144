//! Terminal front-end for Studyhall
//!
//! A thin shell over [`studyhall_app::Driver`] that provides terminal I/O:
//! lines from stdin, chat to stdout, logs to stderr. All orchestration logic
//! lives in the generic [`studyhall_app::Runtime`].
//!
//! This crate only handles arguments, rendering and the production
//! environment.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod args;
pub mod render;
pub mod system_env;
pub mod terminal;

pub use args::Args;
pub use render::Renderer;
pub use studyhall_app::{App, Bridge, Driver, Runtime};
pub use system_env::SystemEnv;
pub use terminal::{TerminalDriver, TerminalError};
