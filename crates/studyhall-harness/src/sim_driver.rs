//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` provides the same interface as the terminal driver but for
//! deterministic testing. It implements [`Driver`] so the same
//! [`studyhall_app::Runtime`] orchestration code runs in both production and
//! simulation.
//!
//! Sockets are sessions on a [`SimBroker`](crate::SimBroker); history comes
//! from the broker's message store; time is the shared [`SimEnv`] clock.

use std::collections::VecDeque;

use studyhall_app::{App, Driver, DriverInput, TransportInput};
use studyhall_client::ChatLogEntry;
use studyhall_core::{Environment, TransportRequest};
use studyhall_proto::{Frame, GroupId};
use thiserror::Error;

use crate::{
    SimEnv, SimInstant,
    sim_broker::{BrokerError, BrokerOutput, SessionId, SharedBroker, lock_broker},
};

/// Error type for simulation driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("SimDriverError: {0}")]
pub struct SimDriverError(#[from] pub BrokerError);

/// Simulation driver for deterministic testing.
///
/// Inputs are served in this order: results of earlier commands (socket
/// opened, history loaded), then broker output for the current socket, then
/// scripted input (lines and ticks) injected by the test.
pub struct SimDriver {
    env: SimEnv,
    broker: SharedBroker,
    session: Option<SessionId>,
    pending: VecDeque<DriverInput<SimInstant>>,
    scripted: VecDeque<DriverInput<SimInstant>>,
    sent: Vec<Frame>,
    heartbeats_sent: usize,
    transports_opened: usize,
    opened_calls: Vec<String>,
    renders: usize,
    stopped: bool,
}

impl SimDriver {
    /// Create a driver talking to `broker`.
    pub fn new(env: SimEnv, broker: SharedBroker) -> Self {
        Self {
            env,
            broker,
            session: None,
            pending: VecDeque::new(),
            scripted: VecDeque::new(),
            sent: Vec::new(),
            heartbeats_sent: 0,
            transports_opened: 0,
            opened_calls: Vec::new(),
            renders: 0,
            stopped: false,
        }
    }

    /// Queue a line as if the user typed it.
    pub fn type_line(&mut self, line: impl Into<String>) {
        self.scripted.push_back(DriverInput::Line(line.into()));
    }

    /// Queue a tick at the current virtual time.
    pub fn inject_tick(&mut self) {
        self.scripted.push_back(DriverInput::Tick(self.env.now()));
    }

    /// Queue an arbitrary input.
    pub fn inject(&mut self, input: DriverInput<SimInstant>) {
        self.scripted.push_back(input);
    }

    /// Next input, if any is ready.
    pub fn poll_input(&mut self) -> Option<DriverInput<SimInstant>> {
        if let Some(input) = self.pending.pop_front() {
            return Some(input);
        }

        if let Some(session) = self.session {
            let output = lock_broker(&self.broker).next_output(session);
            match output {
                Some(BrokerOutput::Frame(frame)) => {
                    return Some(DriverInput::Transport(TransportInput::Frame(frame)));
                },
                Some(BrokerOutput::Heartbeat) => {
                    return Some(DriverInput::Transport(TransportInput::Heartbeat));
                },
                Some(BrokerOutput::Closed { reason }) => {
                    self.session = None;
                    return Some(DriverInput::Transport(TransportInput::Closed { reason }));
                },
                None => {},
            }
        }

        self.scripted.pop_front()
    }

    /// Check if there is input ready.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
            || !self.scripted.is_empty()
            || self.session.is_some_and(|s| lock_broker(&self.broker).has_output(s))
    }

    /// Broker session of the current socket. `None` if no socket is open.
    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    /// Frames sent so far, oldest first.
    pub fn sent_frames(&self) -> &[Frame] {
        &self.sent
    }

    /// Heart-beats sent so far.
    pub fn heartbeats_sent(&self) -> usize {
        self.heartbeats_sent
    }

    /// Sockets opened so far.
    pub fn transports_opened(&self) -> usize {
        self.transports_opened
    }

    /// Call URLs handed to the user.
    pub fn opened_calls(&self) -> &[String] {
        &self.opened_calls
    }

    /// Number of renders.
    pub fn renders(&self) -> usize {
        self.renders
    }

    /// Whether [`Driver::stop`] was called.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Forget the current socket and any of its undelivered events.
    fn drop_session(&mut self) {
        if let Some(session) = self.session.take() {
            lock_broker(&self.broker).close(session);
        }
        self.pending.retain(|input| !matches!(input, DriverInput::Transport(_)));
    }

    fn send_text(&mut self, text: &str) -> Result<(), SimDriverError> {
        let Some(session) = self.session else {
            tracing::debug!("no socket, dropping outbound text");
            return Ok(());
        };

        match lock_broker(&self.broker).receive(session, text) {
            Ok(()) => Ok(()),
            // Writing to a socket the broker dropped fails like a real one.
            Err(BrokerError::UnknownSession(_)) => {
                self.session = None;
                self.pending.push_back(DriverInput::Transport(TransportInput::Closed {
                    reason: "write on closed socket".to_string(),
                }));
                Ok(())
            },
            Err(e) => Err(e.into()),
        }
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;
    type Instant = SimInstant;

    fn next_input(
        &mut self,
    ) -> impl Future<Output = Result<Option<DriverInput<SimInstant>>, SimDriverError>> + Send
    {
        let input = self.poll_input();
        async move { Ok(input) }
    }

    fn open_transport(&mut self, request: TransportRequest) -> Result<(), SimDriverError> {
        self.drop_session();
        self.transports_opened += 1;

        let opened = lock_broker(&self.broker).open(&request);
        let input = match opened {
            Ok(session) => {
                self.session = Some(session);
                TransportInput::Opened
            },
            Err(e) => TransportInput::Closed { reason: e.to_string() },
        };
        self.pending.push_back(DriverInput::Transport(input));
        Ok(())
    }

    fn send_frame(&mut self, frame: Frame) -> Result<(), SimDriverError> {
        let text = frame.encode();
        self.sent.push(frame);
        self.send_text(&text)
    }

    fn send_heartbeat(&mut self) -> Result<(), SimDriverError> {
        self.heartbeats_sent += 1;
        self.send_text(Frame::HEARTBEAT)
    }

    fn close_transport(&mut self) {
        self.drop_session();
    }

    fn fetch_history(&mut self, group: &GroupId) -> Result<(), SimDriverError> {
        let received_at = self.env.wall_clock();
        let result = lock_broker(&self.broker)
            .history(group)
            .map(|payloads| {
                payloads
                    .into_iter()
                    .map(|payload| ChatLogEntry::from_payload(payload, received_at))
                    .collect()
            })
            .map_err(|e| e.to_string());
        self.pending.push_back(DriverInput::History(result));
        Ok(())
    }

    fn open_call(&mut self, url: &str) -> Result<(), SimDriverError> {
        self.opened_calls.push(url.to_string());
        Ok(())
    }

    fn now(&self) -> SimInstant {
        self.env.now()
    }

    fn render(&mut self, _app: &App<SimInstant>) -> Result<(), SimDriverError> {
        self.renders += 1;
        Ok(())
    }

    fn stop(&mut self) {
        self.drop_session();
        self.stopped = true;
    }
}
