//! Group connection state machine.
//!
//! Owns the STOMP session for one study group: opening the transport,
//! the `CONNECT` handshake, subscriptions to the group's chat and call
//! topics, heart-beats, reconnects and teardown. Uses the action pattern:
//! methods take time as input and return actions for the driver to execute.
//!
//! # State Machine
//!
//! ```text
//!                open            CONNECTED
//! ┌──────────────┐ ──> ┌────────────┐ ──> ┌───────────┐
//! │ Disconnected │     │ Connecting │     │ Connected │
//! └──────────────┘     └────────────┘     └───────────┘
//!        ^                ^      │              │
//!        │ close     retry│      │ failure      │ failure
//!        │ (any state)    │      v              │
//!        │             ┌────────┐               │
//!        └─────────────│ Failed │<──────────────┘
//!                      └────────┘
//! ```
//!
//! # Invariants
//!
//! - Subscriptions exist only in `Connected`; every transition out of it
//!   clears them.
//! - Exactly one [`ConnectionAction::Connected`] per successful handshake.
//! - A scheduled retry exists only in `Failed`; `close` cancels it.
//! - Outbound frames are dropped unless `Connected`. Nothing is queued.

use std::{
    fmt,
    ops::{Add, Sub},
    time::Duration,
};

use secrecy::{ExposeSecret, SecretString};
use studyhall_proto::{Command, Destinations, Frame, GroupId, HeartBeat, Topic};
use tracing::{debug, info, warn};
use url::Url;

use crate::{env::Environment, error::ConnectionError};

/// Raw WebSocket path of the backend's messaging endpoint.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8080/ws/websocket";

/// Delay between reconnect attempts under the default policy.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Time allowed from opening the transport to receiving `CONNECTED`.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Heart-beat interval offered in both directions.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// STOMP versions offered in `CONNECT`.
const ACCEPT_VERSION: &str = "1.2,1.1,1.0";

/// Header carrying the bearer token.
const AUTHORIZATION: &str = "Authorization";

/// Query parameter the backend's handshake interceptor reads the token from.
const TOKEN_PARAM: &str = "token";

/// Actions returned by the connection state machine.
///
/// The driver executes these:
/// - `OpenTransport`: open a WebSocket with the given request
/// - `SendFrame` / `SendHeartbeat`: write to the open transport
/// - `CloseTransport`: drop the transport, open or still opening
/// - `Connected` / `Deliver` / `Error`: report upwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open a transport. Any previous transport is already closed.
    OpenTransport(TransportRequest),

    /// Send this frame to the broker
    SendFrame(Frame),

    /// Send a heart-beat (a bare end-of-line)
    SendHeartbeat,

    /// Close the transport
    CloseTransport,

    /// Handshake finished and both topics are subscribed
    Connected,

    /// A message arrived on one of the group's topics
    Deliver {
        /// Topic the message arrived on
        topic: Topic,
        /// Raw message body
        body: String,
    },

    /// Something went wrong. The connection keeps retrying on its own.
    Error(ConnectionError),
}

/// Everything a driver needs to open the WebSocket.
///
/// `Debug` hides the token.
#[derive(Clone, PartialEq, Eq)]
pub struct TransportRequest {
    /// Endpoint URL including the `token` query parameter
    pub url: String,
    /// Extra handshake headers
    pub headers: Vec<(String, String)>,
}

impl fmt::Debug for TransportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let endpoint = self.url.split_once('?').map_or(self.url.as_str(), |(base, _)| base);
        let names: Vec<&str> = self.headers.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("TransportRequest")
            .field("endpoint", &endpoint)
            .field("headers", &names)
            .finish_non_exhaustive()
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not opened, or closed
    Disconnected,
    /// Transport opening or STOMP handshake in progress
    Connecting,
    /// Handshake done, topics subscribed
    Connected,
    /// Connection lost, retry scheduled
    Failed,
}

/// When to retry after a connection is lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Same delay every time, retried forever.
    Fixed {
        /// Delay before every retry
        delay: Duration,
    },
    /// Doubling delay with jitter, capped, retried forever.
    Exponential {
        /// Delay before the first retry
        initial: Duration,
        /// Upper bound for any delay
        max: Duration,
    },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Fixed { delay: DEFAULT_RECONNECT_DELAY }
    }
}

impl ReconnectPolicy {
    /// Delay before the next attempt after `failures` consecutive failures.
    ///
    /// `random` feeds the jitter of [`ReconnectPolicy::Exponential`], which
    /// picks uniformly from the upper half of the backed-off delay.
    pub fn delay(&self, failures: u32, random: u64) -> Duration {
        match *self {
            Self::Fixed { delay } => delay,
            Self::Exponential { initial, max } => {
                let base = initial.saturating_mul(1u32 << failures.min(16)).min(max);
                let half = base / 2;
                let spread = half.as_millis() as u64;
                let jitter = if spread == 0 {
                    Duration::ZERO
                } else {
                    Duration::from_millis(random % (spread + 1))
                };
                (half + jitter).min(max)
            },
        }
    }
}

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket endpoint (`ws://` or `wss://`)
    pub endpoint: String,
    /// Destination naming scheme
    pub destinations: Destinations,
    /// Retry behaviour after a lost connection
    pub reconnect: ReconnectPolicy,
    /// Time allowed to reach `Connected` after opening the transport
    pub handshake_timeout: Duration,
    /// Heart-beats offered in `CONNECT`
    pub heartbeat: HeartBeat,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            destinations: Destinations::default(),
            reconnect: ReconnectPolicy::default(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            heartbeat: HeartBeat::new(DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_INTERVAL),
        }
    }
}

impl ConnectionConfig {
    /// Parse and validate [`ConnectionConfig::endpoint`].
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidEndpoint` if it is not a `ws`/`wss` URL
    ///   with a host
    pub fn endpoint_url(&self) -> Result<Url, ConnectionError> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| ConnectionError::InvalidEndpoint(format!("{}: {e}", self.endpoint)))?;
        if !matches!(url.scheme(), "ws" | "wss") || url.host_str().is_none() {
            return Err(ConnectionError::InvalidEndpoint(self.endpoint.clone()));
        }
        Ok(url)
    }
}

/// Per-`open` data, present in every state but `Disconnected`.
struct Session {
    group: GroupId,
    credential: SecretString,
    endpoint: Url,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("group", &self.group)
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl Session {
    fn request(&self) -> TransportRequest {
        let token = self.credential.expose_secret();
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair(TOKEN_PARAM, token);
        TransportRequest {
            url: url.to_string(),
            headers: vec![(AUTHORIZATION.to_string(), format!("Bearer {token}"))],
        }
    }

    fn connect_frame(&self, heartbeat: HeartBeat) -> Frame {
        Frame::new(Command::Connect)
            .with_header("accept-version", ACCEPT_VERSION)
            .with_header("host", self.endpoint.host_str().unwrap_or("localhost"))
            .with_header("heart-beat", heartbeat.to_header())
            .with_header(AUTHORIZATION, format!("Bearer {}", self.credential.expose_secret()))
    }
}

/// Connection state machine
///
/// Manages one group connection from `open` to `close`, including every
/// reconnect in between.
///
/// This is a pure state machine: no I/O, no stored environment. Time is
/// passed to the methods that need it; randomness (reconnect jitter) comes
/// from an [`Environment`] argument.
#[derive(Debug)]
pub struct Connection<I>
where
    I: Copy + Ord + fmt::Debug + Sub<Output = Duration> + Add<Duration, Output = I>,
{
    /// Current state
    state: ConnectionState,
    /// Configuration
    config: ConnectionConfig,
    /// Group and credential, `None` while disconnected
    session: Option<Session>,
    /// Whether the driver reported the current transport as open
    transport_open: bool,
    /// When the current attempt started (for the handshake timeout)
    attempt_started: Option<I>,
    /// Subscription id per topic, only while connected
    subscriptions: Vec<(String, Topic)>,
    /// Failures since the last successful handshake
    failures: u32,
    /// When the next attempt is due, only while failed
    retry_at: Option<I>,
    /// Negotiated outgoing heart-beat interval
    send_interval: Option<Duration>,
    /// Negotiated incoming heart-beat interval
    receive_interval: Option<Duration>,
    /// Last time we wrote anything
    last_sent: Option<I>,
    /// Last time the broker sent anything
    last_received: Option<I>,
    /// The broker already reported this attempt's failure with an ERROR
    broker_error: bool,
}

impl<I> Connection<I>
where
    I: Copy + Ord + fmt::Debug + Sub<Output = Duration> + Add<Duration, Output = I>,
{
    /// Create a connection in [`ConnectionState::Disconnected`] state
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            config,
            session: None,
            transport_open: false,
            attempt_started: None,
            subscriptions: Vec::new(),
            failures: 0,
            retry_at: None,
            send_interval: None,
            receive_interval: None,
            last_sent: None,
            last_received: None,
            broker_error: false,
        }
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Group this connection serves. `None` while disconnected.
    pub fn group(&self) -> Option<&GroupId> {
        self.session.as_ref().map(|s| &s.group)
    }

    /// Configuration in use
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Consecutive failures since the last successful handshake
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// When the next reconnect attempt is due, if one is scheduled
    pub fn retry_at(&self) -> Option<I> {
        self.retry_at
    }

    /// Active subscriptions as `(id, topic)` pairs
    pub fn subscriptions(&self) -> impl Iterator<Item = (&str, Topic)> {
        self.subscriptions.iter().map(|(id, topic)| (id.as_str(), *topic))
    }

    /// Start connecting to `group`.
    ///
    /// Returns `OpenTransport`. Authentication problems surface later as
    /// [`ConnectionAction::Error`], never from this call.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` unless disconnected
    /// - `ConnectionError::InvalidEndpoint` if the configured endpoint is
    ///   unusable
    pub fn open(
        &mut self,
        group: GroupId,
        credential: SecretString,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if self.state != ConnectionState::Disconnected {
            return Err(ConnectionError::InvalidState { state: self.state, operation: "open" });
        }

        let endpoint = self.config.endpoint_url()?;
        info!(group = %group, endpoint = %self.config.endpoint, "opening group connection");

        let session = Session { group, credential, endpoint };
        let request = session.request();
        self.session = Some(session);
        self.failures = 0;

        Ok(self.begin_attempt(request, now))
    }

    /// The transport requested by the last `OpenTransport` is open.
    ///
    /// Returns `SendFrame(CONNECT)`.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` unless an attempt is in progress and
    ///   its transport was not already reported open
    pub fn transport_opened(&mut self, now: I) -> Result<Vec<ConnectionAction>, ConnectionError> {
        let session = match (&self.session, self.state, self.transport_open) {
            (Some(session), ConnectionState::Connecting, false) => session,
            _ => {
                return Err(ConnectionError::InvalidState {
                    state: self.state,
                    operation: "transport_opened",
                });
            },
        };

        let frame = session.connect_frame(self.config.heartbeat);
        self.transport_open = true;
        self.last_sent = Some(now);
        self.last_received = Some(now);

        Ok(vec![ConnectionAction::SendFrame(frame)])
    }

    /// Process a frame received from the broker.
    ///
    /// Frames that arrive after the connection was lost or closed belong to
    /// a dead transport and are ignored.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::UnexpectedFrame` if the command is invalid for the
    ///   current state
    pub fn handle_frame(
        &mut self,
        frame: &Frame,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        match (self.state, frame.command) {
            (ConnectionState::Disconnected | ConnectionState::Failed, command) => {
                debug!(%command, state = ?self.state, "ignoring frame from a dead transport");
                Ok(vec![])
            },

            (ConnectionState::Connecting, Command::Connected) if self.transport_open => {
                self.last_received = Some(now);
                Ok(self.on_connected(frame, now))
            },

            (ConnectionState::Connected, Command::Message) => {
                self.last_received = Some(now);
                Ok(self.on_message(frame))
            },

            (ConnectionState::Connected, Command::Receipt) => {
                self.last_received = Some(now);
                debug!(receipt = ?frame.header("receipt-id"), "receipt");
                Ok(vec![])
            },

            // The broker closes the socket after an ERROR; that close drives
            // the reconnect. One failed attempt reports one error.
            (_, Command::Error) => {
                self.last_received = Some(now);
                let message = frame
                    .header("message")
                    .map_or_else(|| frame.body.trim().to_string(), str::to_string);
                warn!(%message, "broker reported an error");
                if std::mem::replace(&mut self.broker_error, true) {
                    return Ok(vec![]);
                }
                Ok(vec![ConnectionAction::Error(ConnectionError::Broker { message })])
            },

            (state, command) => Err(ConnectionError::UnexpectedFrame { state, command }),
        }
    }

    /// The broker sent a heart-beat.
    pub fn heartbeat_received(&mut self, now: I) {
        if self.state == ConnectionState::Connected {
            self.last_received = Some(now);
        }
    }

    /// The transport failed or the broker closed it.
    ///
    /// Clears subscriptions and schedules a retry. Ignored while
    /// disconnected or already failed.
    pub fn transport_failed<E: Environment>(
        &mut self,
        reason: impl Into<String>,
        env: &E,
        now: I,
    ) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Failed => {
                debug!(state = ?self.state, "transport loss reported while not connected");
                vec![]
            },
            ConnectionState::Connecting | ConnectionState::Connected => {
                self.fail(ConnectionError::Transport(reason.into()), false, env, now)
            },
        }
    }

    /// Process periodic maintenance.
    ///
    /// Fires a due reconnect, enforces the handshake timeout, sends
    /// heart-beats and detects a silent broker. Call this regularly.
    pub fn tick<E: Environment>(&mut self, env: &E, now: I) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Disconnected => vec![],

            ConnectionState::Failed => match (self.retry_at, &self.session) {
                (Some(at), Some(session)) if now >= at => {
                    info!(group = %session.group, attempt = self.failures + 1, "reconnecting");
                    let request = session.request();
                    self.begin_attempt(request, now)
                },
                _ => vec![],
            },

            ConnectionState::Connecting => {
                let elapsed = self.attempt_started.map_or(Duration::ZERO, |started| now - started);
                if elapsed >= self.config.handshake_timeout {
                    return self.fail(ConnectionError::HandshakeTimeout { elapsed }, true, env, now);
                }
                vec![]
            },

            ConnectionState::Connected => {
                if let (Some(interval), Some(last)) = (self.receive_interval, self.last_received) {
                    let elapsed = now - last;
                    if elapsed > interval.saturating_mul(2) {
                        return self.fail(
                            ConnectionError::HeartbeatTimeout { elapsed },
                            true,
                            env,
                            now,
                        );
                    }
                }

                match (self.send_interval, self.last_sent) {
                    (Some(interval), Some(last)) if now - last >= interval => {
                        self.last_sent = Some(now);
                        vec![ConnectionAction::SendHeartbeat]
                    },
                    _ => vec![],
                }
            },
        }
    }

    /// Send a frame if connected. Dropped silently otherwise.
    pub fn send(&mut self, frame: Frame, now: I) -> Vec<ConnectionAction> {
        if self.state != ConnectionState::Connected {
            debug!(command = %frame.command, state = ?self.state, "not connected, dropping frame");
            return vec![];
        }

        self.last_sent = Some(now);
        vec![ConnectionAction::SendFrame(frame)]
    }

    /// Close the connection and cancel any scheduled retry.
    ///
    /// Idempotent: closing a never-opened or already closed connection
    /// returns no actions.
    pub fn close(&mut self) -> Vec<ConnectionAction> {
        let actions = match self.state {
            ConnectionState::Disconnected => return vec![],
            ConnectionState::Connected => vec![
                ConnectionAction::SendFrame(Frame::new(Command::Disconnect)),
                ConnectionAction::CloseTransport,
            ],
            ConnectionState::Connecting => vec![ConnectionAction::CloseTransport],
            ConnectionState::Failed => vec![],
        };

        if let Some(session) = &self.session {
            info!(group = %session.group, "closing group connection");
        }

        self.drop_transport();
        self.state = ConnectionState::Disconnected;
        self.session = None;
        self.retry_at = None;
        self.failures = 0;

        actions
    }

    fn begin_attempt(&mut self, request: TransportRequest, now: I) -> Vec<ConnectionAction> {
        self.drop_transport();
        self.state = ConnectionState::Connecting;
        self.attempt_started = Some(now);
        self.retry_at = None;

        vec![ConnectionAction::OpenTransport(request)]
    }

    fn on_connected(&mut self, frame: &Frame, now: I) -> Vec<ConnectionAction> {
        let Some(session) = &self.session else {
            return vec![];
        };

        let server_heartbeat = match frame.header("heart-beat").map(HeartBeat::parse) {
            Some(Ok(hb)) => hb,
            Some(Err(e)) => {
                warn!("ignoring broker heart-beat header: {:?}", e);
                HeartBeat::DISABLED
            },
            None => HeartBeat::DISABLED,
        };
        let (send, receive) = HeartBeat::negotiate(self.config.heartbeat, server_heartbeat);

        let mut actions = Vec::with_capacity(Topic::ALL.len() + 1);
        self.subscriptions.clear();
        for (index, topic) in Topic::ALL.into_iter().enumerate() {
            let id = format!("sub-{index}");
            let destination = self.config.destinations.subscription(&session.group, topic);
            actions.push(ConnectionAction::SendFrame(
                Frame::new(Command::Subscribe)
                    .with_header("id", id.as_str())
                    .with_header("destination", destination),
            ));
            self.subscriptions.push((id, topic));
        }
        actions.push(ConnectionAction::Connected);

        info!(
            group = %session.group,
            version = frame.header("version").unwrap_or("1.0"),
            ?send,
            ?receive,
            "group connection established"
        );

        self.state = ConnectionState::Connected;
        self.attempt_started = None;
        self.failures = 0;
        self.send_interval = send;
        self.receive_interval = receive;
        self.last_sent = Some(now);

        actions
    }

    fn on_message(&self, frame: &Frame) -> Vec<ConnectionAction> {
        let subscription = frame.header("subscription");
        let topic = self
            .subscriptions
            .iter()
            .find(|(id, _)| Some(id.as_str()) == subscription)
            .map(|(_, topic)| *topic);

        match topic {
            Some(topic) => vec![ConnectionAction::Deliver { topic, body: frame.body.clone() }],
            None => {
                warn!(?subscription, "dropping message for unknown subscription");
                vec![]
            },
        }
    }

    fn fail<E: Environment>(
        &mut self,
        error: ConnectionError,
        close_transport: bool,
        env: &E,
        now: I,
    ) -> Vec<ConnectionAction> {
        let reported = self.broker_error;
        let mut actions = Vec::with_capacity(2);
        if close_transport {
            actions.push(ConnectionAction::CloseTransport);
        }

        let delay = self.config.reconnect.delay(self.failures, env.random_u64());
        self.failures = self.failures.saturating_add(1);
        self.drop_transport();
        self.state = ConnectionState::Failed;
        self.retry_at = Some(now + delay);

        warn!(error = %error, failures = self.failures, retry_in = ?delay, "group connection lost");
        if !reported {
            actions.push(ConnectionAction::Error(error));
        }
        actions
    }

    fn drop_transport(&mut self) {
        self.transport_open = false;
        self.attempt_started = None;
        self.subscriptions.clear();
        self.send_interval = None;
        self.receive_interval = None;
        self.last_sent = None;
        self.last_received = None;
        self.broker_error = false;
    }
}
