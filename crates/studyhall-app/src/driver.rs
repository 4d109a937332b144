//! Driver trait for abstracting I/O operations.
//!
//! The [`Driver`] trait decouples the application runtime from specific I/O
//! implementations. Each front-end implements the trait to provide
//! platform-specific I/O, while the generic [`crate::Runtime`] handles all
//! orchestration.

use std::{
    fmt::Debug,
    future::Future,
    ops::{Add, Sub},
    time::Duration,
};

use studyhall_client::ChatLogEntry;
use studyhall_core::TransportRequest;
use studyhall_proto::{Frame, GroupId};

use crate::App;

/// Something that happened on the driver's socket.
///
/// The driver reports events for its current socket only; events from a
/// socket it already replaced must be dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportInput {
    /// WebSocket handshake completed.
    Opened,
    /// A STOMP frame arrived.
    Frame(Frame),
    /// A heart-beat arrived.
    Heartbeat,
    /// The socket failed or the broker closed it.
    Closed {
        /// Why it closed.
        reason: String,
    },
}

/// Input the driver hands to the runtime, one at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverInput<I> {
    /// A line typed by the user.
    Line(String),
    /// Socket activity.
    Transport(TransportInput),
    /// Result of a [`Driver::fetch_history`] request.
    History(Result<Vec<ChatLogEntry>, String>),
    /// Periodic tick.
    Tick(I),
}

/// Abstracts I/O operations for the application runtime.
///
/// Implementations provide platform-specific I/O while the generic
/// [`Runtime`](crate::Runtime) handles orchestration logic. This ensures
/// the same orchestration code runs in the terminal front-end and in
/// simulation.
///
/// # Implementations
///
/// - **Terminal**: stdin lines, tokio-tungstenite transport, reqwest history
/// - **Simulation**: in-memory broker and virtual time
///
/// Commands are fire-and-forget: slow work (connecting, fetching history)
/// runs in the background and reports back through [`Driver::next_input`].
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Time instant type. Enables virtual time in simulation.
    type Instant: Copy
        + Ord
        + Debug
        + Send
        + Sync
        + Sub<Output = Duration>
        + Add<Duration, Output = Self::Instant>;

    /// Wait for the next input.
    ///
    /// Returns `None` once the input source is exhausted (the user closed
    /// stdin, or the simulation ran out of scripted input).
    fn next_input(
        &mut self,
    ) -> impl Future<Output = Result<Option<DriverInput<Self::Instant>>, Self::Error>> + Send;

    /// Open a WebSocket, replacing any current one.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot even be attempted.
    fn open_transport(&mut self, request: TransportRequest) -> Result<(), Self::Error>;

    /// Send a frame on the current socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be queued.
    fn send_frame(&mut self, frame: Frame) -> Result<(), Self::Error>;

    /// Send a heart-beat on the current socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the heart-beat cannot be queued.
    fn send_heartbeat(&mut self) -> Result<(), Self::Error>;

    /// Close the current socket, if any.
    fn close_transport(&mut self);

    /// Start loading the chat history of `group`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be started.
    fn fetch_history(&mut self, group: &GroupId) -> Result<(), Self::Error>;

    /// Hand the call room URL to the user.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be shown.
    fn open_call(&mut self, url: &str) -> Result<(), Self::Error>;

    /// Current time instant.
    fn now(&self) -> Self::Instant;

    /// Render the view.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    fn render(&mut self, app: &App<Self::Instant>) -> Result<(), Self::Error>;

    /// Stop background work and clean up resources.
    fn stop(&mut self);

    /// Wait for shutdown work started by [`Driver::stop`] or
    /// [`Driver::close_transport`], such as a socket flushing its last frames.
    fn finish(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}
