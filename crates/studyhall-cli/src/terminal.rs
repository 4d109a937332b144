//! Terminal driver.
//!
//! Implements the [`Driver`] trait for a plain terminal: lines from stdin,
//! the chat view on stdout via [`Renderer`]. Network uses the WebSocket
//! transport and REST history client from `studyhall-client`.

use std::{
    io::{self, BufRead, Stdout, Write, stdout},
    thread,
    time::{Duration, Instant},
};

use secrecy::SecretString;
use studyhall_app::{App, Driver, DriverInput, TransportInput};
use studyhall_client::{
    ChatLogEntry,
    history::{HistoryClient, HistoryError},
    transport::{self, TransportEvent, TransportEventKind, TransportHandle, TransportId},
};
use studyhall_core::{Environment, TransportRequest};
use studyhall_proto::{Frame, GroupId};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, warn};

use crate::{Renderer, SystemEnv};

/// How often the runtime gets a tick.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Buffered transport events before the transport task waits.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Terminal driver errors.
#[derive(Debug, Error)]
pub enum TerminalError {
    /// I/O error from terminal operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// History client could not be built.
    #[error("history client: {0}")]
    History(#[from] HistoryError),
}

/// Terminal driver implementing the [`Driver`] trait.
///
/// Owns the current transport. Every transport gets a fresh [`TransportId`];
/// events from a transport that was already replaced are dropped here, so the
/// runtime only ever sees the current socket.
pub struct TerminalDriver {
    env: SystemEnv,
    out: Stdout,
    renderer: Renderer,
    lines: mpsc::Receiver<String>,
    events_tx: mpsc::Sender<TransportEvent>,
    events_rx: mpsc::Receiver<TransportEvent>,
    transport: Option<TransportHandle>,
    next_transport: u64,
    history: HistoryClient,
    token: SecretString,
    history_tx: mpsc::Sender<Result<Vec<ChatLogEntry>, String>>,
    history_rx: mpsc::Receiver<Result<Vec<ChatLogEntry>, String>>,
    history_task: Option<JoinHandle<()>>,
    closing: Vec<JoinHandle<()>>,
    ticker: tokio::time::Interval,
}

impl TerminalDriver {
    /// Create a terminal driver. Must be called inside a tokio runtime.
    ///
    /// `self_email` marks the user's own messages; `token` authenticates
    /// history requests.
    pub fn new(
        env: SystemEnv,
        api_base: &str,
        token: SecretString,
        self_email: &str,
    ) -> Result<Self, TerminalError> {
        let history = HistoryClient::new(api_base)?;

        let (lines_tx, lines) = mpsc::channel(64);
        spawn_stdin_reader(lines_tx);

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (history_tx, history_rx) = mpsc::channel(4);

        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Self {
            env,
            out: stdout(),
            renderer: Renderer::new(self_email),
            lines,
            events_tx,
            events_rx,
            transport: None,
            next_transport: 0,
            history,
            token,
            history_tx,
            history_rx,
            history_task: None,
            closing: Vec::new(),
            ticker,
        })
    }

    /// Translate a transport event, dropping those of replaced transports.
    fn transport_input(&mut self, event: TransportEvent) -> Option<TransportInput> {
        let current = self.transport.as_ref().map(TransportHandle::id);
        if current != Some(event.id) {
            debug!(id = event.id.0, "dropping event from replaced transport");
            return None;
        }

        Some(match event.kind {
            TransportEventKind::Opened => TransportInput::Opened,
            TransportEventKind::Frame(frame) => TransportInput::Frame(frame),
            TransportEventKind::Heartbeat => TransportInput::Heartbeat,
            TransportEventKind::Closed { reason } => {
                self.transport = None;
                TransportInput::Closed { reason }
            },
        })
    }
}

/// Forward stdin lines to `tx` from a plain thread.
///
/// A blocking read on a tokio blocking thread would hold up runtime
/// shutdown; a detached thread ends with the process.
fn spawn_stdin_reader(tx: mpsc::Sender<String>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                },
                Err(e) => {
                    warn!("stdin read failed: {}", e);
                    break;
                },
            }
        }
        debug!("stdin closed");
    });
}

impl Driver for TerminalDriver {
    type Error = TerminalError;
    type Instant = Instant;

    fn next_input(
        &mut self,
    ) -> impl Future<Output = Result<Option<DriverInput<Instant>>, TerminalError>> + Send {
        async move {
            loop {
                tokio::select! {
                    biased;

                    Some(event) = self.events_rx.recv() => {
                        if let Some(input) = self.transport_input(event) {
                            return Ok(Some(DriverInput::Transport(input)));
                        }
                    }

                    Some(result) = self.history_rx.recv() => {
                        return Ok(Some(DriverInput::History(result)));
                    }

                    line = self.lines.recv() => {
                        // End of input leaves the group.
                        return Ok(line.map(DriverInput::Line));
                    }

                    _ = self.ticker.tick() => {
                        return Ok(Some(DriverInput::Tick(self.env.now())));
                    }
                }
            }
        }
    }

    fn open_transport(&mut self, request: TransportRequest) -> Result<(), TerminalError> {
        self.close_transport();
        self.next_transport += 1;
        let id = TransportId(self.next_transport);
        debug!(id = id.0, ?request, "opening transport");
        self.transport = Some(transport::spawn(id, request, self.events_tx.clone()));
        Ok(())
    }

    fn send_frame(&mut self, frame: Frame) -> Result<(), TerminalError> {
        match &self.transport {
            Some(transport) => transport.send_frame(&frame),
            None => debug!(command = %frame.command, "no transport, dropping frame"),
        }
        Ok(())
    }

    fn send_heartbeat(&mut self) -> Result<(), TerminalError> {
        if let Some(transport) = &self.transport {
            transport.send_heartbeat();
        }
        Ok(())
    }

    fn close_transport(&mut self) {
        self.closing.retain(|task| !task.is_finished());
        if let Some(transport) = self.transport.take() {
            self.closing.push(transport.close());
        }
    }

    fn fetch_history(&mut self, group: &GroupId) -> Result<(), TerminalError> {
        if let Some(task) = self.history_task.take() {
            task.abort();
        }

        let client = self.history.clone();
        let group = group.clone();
        let token = self.token.clone();
        let tx = self.history_tx.clone();
        let received_at = self.env.wall_clock();

        self.history_task = Some(tokio::spawn(async move {
            let result = client.fetch(&group, &token, received_at).await.map_err(|e| e.to_string());
            // Receiver gone means the driver stopped.
            let _ = tx.send(result).await;
        }));
        Ok(())
    }

    fn open_call(&mut self, url: &str) -> Result<(), TerminalError> {
        let mut out = self.out.lock();
        writeln!(out, "Join the video call: {url}")?;
        out.flush()?;
        Ok(())
    }

    fn now(&self) -> Instant {
        self.env.now()
    }

    fn render(&mut self, app: &App<Instant>) -> Result<(), TerminalError> {
        let mut out = self.out.lock();
        self.renderer.render(&mut out, app)?;
        Ok(())
    }

    fn stop(&mut self) {
        self.close_transport();
        if let Some(task) = self.history_task.take() {
            task.abort();
        }
    }

    fn finish(&mut self) -> impl Future<Output = ()> + Send {
        let closing = std::mem::take(&mut self.closing);
        async move {
            for task in closing {
                // A join error only means the close task was cancelled.
                let _ = task.await;
            }
        }
    }
}
