//! In-memory STOMP broker for simulation.
//!
//! `SimBroker` plays the backend's part of a group session: it checks the
//! bearer token at `CONNECT`, keeps per-session subscriptions, and handles
//! `SEND`s to the application destinations the way the backend does. The
//! sender identity and timestamp of every message are stamped server-side,
//! whatever the client put in the body, and the result is rebroadcast to
//! every subscriber of the group topic (the sender included).
//!
//! The broker is driven explicitly: drivers hand it frames with
//! [`SimBroker::receive`] and collect what it sends back with
//! [`SimBroker::take_output`]. Nothing runs on its own.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use studyhall_core::{Environment, TransportRequest};
use studyhall_proto::{
    CallStartedPayload, ChatPayload, Command, Destinations, Frame, GroupId, HeartBeat,
    ProtocolError, Topic, WireMessage,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::SimEnv;

/// Timestamp format of server-stamped messages (ISO local date-time, no
/// offset).
const SERVER_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Identifies one transport connected to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

/// A user the broker accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimUser {
    /// Email, stamped as the sender of the user's messages.
    pub email: String,
    /// Display name, stamped on the user's chat messages.
    pub name: String,
}

/// Something the broker sends to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerOutput {
    /// A STOMP frame.
    Frame(Frame),
    /// A heart-beat.
    Heartbeat,
    /// The broker closed the transport. Always the last output.
    Closed {
        /// Why it closed.
        reason: String,
    },
}

/// Broker errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// The broker refuses connections.
    #[error("connection refused: broker offline")]
    Offline,

    /// The session does not exist or was closed.
    #[error("unknown session {0:?}")]
    UnknownSession(SessionId),

    /// The history endpoint is failing.
    #[error("history unavailable")]
    HistoryUnavailable,

    /// Undecodable frame text.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, Default)]
struct BrokerSession {
    /// Authenticated user. `None` until a valid `CONNECT`.
    user: Option<SimUser>,
    /// Subscription id and destination, in subscribe order.
    subscriptions: Vec<(String, String)>,
    /// Pending output for the session's driver.
    outbox: VecDeque<BrokerOutput>,
    /// Closed by the broker; removed once the outbox drains.
    closing: bool,
}

/// Simulated messaging backend.
#[derive(Debug)]
pub struct SimBroker {
    env: SimEnv,
    destinations: Destinations,
    heartbeat: HeartBeat,
    users: HashMap<String, SimUser>,
    sessions: BTreeMap<SessionId, BrokerSession>,
    history: HashMap<GroupId, Vec<ChatPayload>>,
    next_session: u64,
    next_message: u64,
    online: bool,
    history_available: bool,
}

/// Broker shared by all drivers of one simulation.
pub type SharedBroker = Arc<Mutex<SimBroker>>;

/// Wrap a broker for sharing between drivers.
pub fn create_shared_broker(broker: SimBroker) -> SharedBroker {
    Arc::new(Mutex::new(broker))
}

/// Lock a shared broker.
pub fn lock_broker(broker: &SharedBroker) -> MutexGuard<'_, SimBroker> {
    broker.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimBroker {
    /// Online broker with default destinations and heart-beats disabled.
    pub fn new(env: SimEnv) -> Self {
        Self {
            env,
            destinations: Destinations::default(),
            heartbeat: HeartBeat::DISABLED,
            users: HashMap::new(),
            sessions: BTreeMap::new(),
            history: HashMap::new(),
            next_session: 1,
            next_message: 1,
            online: true,
            history_available: true,
        }
    }

    /// Advertise `heartbeat` in `CONNECTED`.
    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: HeartBeat) -> Self {
        self.set_heartbeat(heartbeat);
        self
    }

    /// Advertise `heartbeat` in `CONNECTED` from now on.
    pub fn set_heartbeat(&mut self, heartbeat: HeartBeat) {
        self.heartbeat = heartbeat;
    }

    /// Accept `token` as `email`/`name`.
    pub fn register_user(
        &mut self,
        token: impl Into<String>,
        email: impl Into<String>,
        name: impl Into<String>,
    ) {
        self.users.insert(token.into(), SimUser { email: email.into(), name: name.into() });
    }

    /// Refuse (`false`) or accept (`true`) new connections.
    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    /// Make the history endpoint fail (`false`) or answer (`true`).
    pub fn set_history_available(&mut self, available: bool) {
        self.history_available = available;
    }

    /// Store messages as if they had been sent earlier.
    pub fn seed_history(
        &mut self,
        group: &GroupId,
        messages: impl IntoIterator<Item = ChatPayload>,
    ) {
        self.history.entry(group.clone()).or_default().extend(messages);
    }

    /// Accept a new transport.
    ///
    /// # Errors
    ///
    /// - `BrokerError::Offline` while the broker refuses connections
    pub fn open(&mut self, request: &TransportRequest) -> Result<SessionId, BrokerError> {
        if !self.online {
            return Err(BrokerError::Offline);
        }

        let id = SessionId(self.next_session);
        self.next_session += 1;
        self.sessions.insert(id, BrokerSession::default());
        debug!(session = id.0, ?request, "transport accepted");
        Ok(id)
    }

    /// Handle text the client sent on `session`.
    ///
    /// # Errors
    ///
    /// - `BrokerError::UnknownSession` if the session is gone
    /// - `BrokerError::Protocol` if the text is not a frame
    pub fn receive(&mut self, session: SessionId, text: &str) -> Result<(), BrokerError> {
        if !self.sessions.get(&session).is_some_and(|s| !s.closing) {
            return Err(BrokerError::UnknownSession(session));
        }

        let Some(frame) = Frame::decode(text)? else {
            // Heart-beat; nothing tracks client liveness.
            return Ok(());
        };

        match frame.command {
            Command::Connect | Command::Stomp => self.on_connect(session, &frame),
            Command::Subscribe => self.on_subscribe(session, &frame),
            Command::Unsubscribe => {
                if let (Some(s), Some(id)) = (self.sessions.get_mut(&session), frame.header("id")) {
                    s.subscriptions.retain(|(sub, _)| sub != id);
                }
            },
            Command::Send => self.on_send(session, &frame),
            Command::Disconnect => {
                debug!(session = session.0, "client disconnected");
                self.sessions.remove(&session);
            },
            command => self.reject(session, &format!("unexpected {command} frame")),
        }
        Ok(())
    }

    /// The client dropped the transport.
    pub fn close(&mut self, session: SessionId) {
        self.sessions.remove(&session);
    }

    /// Drop the transport from the broker side, as a network failure would.
    pub fn kill(&mut self, session: SessionId, reason: &str) {
        if let Some(s) = self.sessions.get_mut(&session) {
            s.subscriptions.clear();
            s.closing = true;
            s.outbox.push_back(BrokerOutput::Closed { reason: reason.to_string() });
        }
    }

    /// Drop every transport.
    pub fn kill_all(&mut self, reason: &str) {
        let ids: Vec<_> = self.sessions.keys().copied().collect();
        for id in ids {
            self.kill(id, reason);
        }
    }

    /// Send a heart-beat to every authenticated session.
    pub fn send_heartbeats(&mut self) {
        for session in self.sessions.values_mut().filter(|s| s.user.is_some() && !s.closing) {
            session.outbox.push_back(BrokerOutput::Heartbeat);
        }
    }

    /// Next pending output for `session`.
    pub fn next_output(&mut self, session: SessionId) -> Option<BrokerOutput> {
        let s = self.sessions.get_mut(&session)?;
        let output = s.outbox.pop_front();
        if s.closing && s.outbox.is_empty() {
            self.sessions.remove(&session);
        }
        output
    }

    /// Whether `session` has output waiting.
    pub fn has_output(&self, session: SessionId) -> bool {
        self.sessions.get(&session).is_some_and(|s| !s.outbox.is_empty())
    }

    /// All pending output for `session`.
    pub fn take_output(&mut self, session: SessionId) -> Vec<BrokerOutput> {
        std::iter::from_fn(|| self.next_output(session)).collect()
    }

    /// Deliver `body` verbatim to every subscriber of `destination`.
    ///
    /// Bypasses server-side stamping, for bodies the backend produced itself
    /// or older servers sent in another shape. Nothing is stored in history.
    pub fn inject_message(&mut self, destination: &str, body: &str) {
        self.broadcast(destination, body);
    }

    /// Stored chat messages of `group`, oldest first.
    ///
    /// # Errors
    ///
    /// - `BrokerError::HistoryUnavailable` while history is switched off
    pub fn history(&self, group: &GroupId) -> Result<Vec<ChatPayload>, BrokerError> {
        if !self.history_available {
            return Err(BrokerError::HistoryUnavailable);
        }
        Ok(self.history.get(group).cloned().unwrap_or_default())
    }

    /// Number of open sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of subscriptions to `destination` across all sessions.
    pub fn subscriber_count(&self, destination: &str) -> usize {
        self.sessions
            .values()
            .flat_map(|s| s.subscriptions.iter())
            .filter(|(_, d)| d == destination)
            .count()
    }

    /// Authenticated user of `session`, if any.
    pub fn user(&self, session: SessionId) -> Option<&SimUser> {
        self.sessions.get(&session).and_then(|s| s.user.as_ref())
    }

    fn on_connect(&mut self, session: SessionId, frame: &Frame) {
        let user = frame
            .header("Authorization")
            .and_then(|value| value.strip_prefix("Bearer "))
            .and_then(|token| self.users.get(token))
            .cloned();

        let Some(user) = user else {
            warn!(session = session.0, "rejecting CONNECT with unknown token");
            self.reject(session, "Unauthorized");
            return;
        };

        let connected = Frame::new(Command::Connected)
            .with_header("version", "1.2")
            .with_header("heart-beat", self.heartbeat.to_header());
        if let Some(s) = self.sessions.get_mut(&session) {
            debug!(session = session.0, email = %user.email, "session authenticated");
            s.user = Some(user);
            s.outbox.push_back(BrokerOutput::Frame(connected));
        }
    }

    fn on_subscribe(&mut self, session: SessionId, frame: &Frame) {
        let (Some(id), Some(destination)) = (frame.header("id"), frame.header("destination"))
        else {
            self.reject(session, "SUBSCRIBE needs id and destination");
            return;
        };

        match self.sessions.get_mut(&session) {
            Some(s) if s.user.is_some() => {
                s.subscriptions.push((id.to_string(), destination.to_string()));
            },
            _ => self.reject(session, "not connected"),
        }
    }

    fn on_send(&mut self, session: SessionId, frame: &Frame) {
        let Some(user) = self.user(session).cloned() else {
            self.reject(session, "not connected");
            return;
        };
        let Some((group, topic)) =
            frame.header("destination").and_then(|d| self.destinations.parse_publish(d))
        else {
            self.reject(session, "unknown destination");
            return;
        };

        let message = match WireMessage::from_json(&frame.body) {
            Ok(message) => message,
            Err(e) => {
                warn!(session = session.0, "dropping malformed publish: {}", e);
                return;
            },
        };

        let timestamp =
            Some(self.env.wall_clock().naive_utc().format(SERVER_TIMESTAMP_FORMAT).to_string());
        let stamped = match (topic, message) {
            (Topic::Chat, WireMessage::Chat(chat)) => {
                let payload = ChatPayload {
                    sender_email: user.email,
                    sender_name: Some(user.name),
                    content: chat.content,
                    timestamp,
                };
                self.history.entry(group.clone()).or_default().push(payload.clone());
                WireMessage::Chat(payload)
            },
            (Topic::Call, _) => {
                WireMessage::CallStarted(CallStartedPayload { sender: user.email, timestamp })
            },
            (topic, message) => {
                debug!(%topic, kind = ?message.kind(), "ignoring publish");
                return;
            },
        };

        let destination = self.destinations.subscription(&group, topic);
        match stamped.to_json() {
            Ok(body) => self.broadcast(&destination, &body),
            Err(e) => warn!("cannot encode rebroadcast: {}", e),
        }
    }

    fn broadcast(&mut self, destination: &str, body: &str) {
        for session in self.sessions.values_mut().filter(|s| !s.closing) {
            for (id, subscribed) in &session.subscriptions {
                if subscribed != destination {
                    continue;
                }
                let frame = Frame::new(Command::Message)
                    .with_header("destination", destination)
                    .with_header("subscription", id.as_str())
                    .with_header("message-id", self.next_message.to_string())
                    .with_header("content-type", "application/json")
                    .with_body(body);
                self.next_message += 1;
                session.outbox.push_back(BrokerOutput::Frame(frame));
            }
        }
    }

    /// Send an `ERROR` and close the session.
    fn reject(&mut self, session: SessionId, message: &str) {
        if let Some(s) = self.sessions.get_mut(&session) {
            let frame = Frame::new(Command::Error).with_header("message", message);
            s.outbox.push_back(BrokerOutput::Frame(frame));
            s.subscriptions.clear();
            s.closing = true;
            s.outbox.push_back(BrokerOutput::Closed { reason: message.to_string() });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TransportRequest {
        TransportRequest { url: "ws://sim/ws?token=t".to_string(), headers: vec![] }
    }

    fn connect_frame(token: &str) -> String {
        Frame::new(Command::Connect)
            .with_header("accept-version", "1.2")
            .with_header("Authorization", format!("Bearer {token}"))
            .encode()
    }

    fn broker() -> SimBroker {
        let mut broker = SimBroker::new(SimEnv::new());
        broker.register_user("alice-token", "alice@x.com", "Alice");
        broker
    }

    #[test]
    fn connect_with_known_token() {
        let mut broker = broker();
        let session = broker.open(&request()).unwrap();

        broker.receive(session, &connect_frame("alice-token")).unwrap();

        let output = broker.take_output(session);
        assert!(matches!(
            output.as_slice(),
            [BrokerOutput::Frame(f)] if f.command == Command::Connected
        ));
        assert_eq!(broker.user(session).map(|u| u.email.as_str()), Some("alice@x.com"));
    }

    #[test]
    fn connect_with_unknown_token_is_rejected() {
        let mut broker = broker();
        let session = broker.open(&request()).unwrap();

        broker.receive(session, &connect_frame("nope")).unwrap();

        let output = broker.take_output(session);
        assert!(matches!(&output[0], BrokerOutput::Frame(f) if f.command == Command::Error));
        assert!(matches!(&output[1], BrokerOutput::Closed { .. }));
        assert_eq!(broker.session_count(), 0);
    }

    #[test]
    fn offline_broker_refuses() {
        let mut broker = broker();
        broker.set_online(false);
        assert_eq!(broker.open(&request()), Err(BrokerError::Offline));
    }

    #[test]
    fn send_is_stamped_and_rebroadcast() {
        let mut broker = broker();
        let session = broker.open(&request()).unwrap();
        broker.receive(session, &connect_frame("alice-token")).unwrap();
        let subscribe = Frame::new(Command::Subscribe)
            .with_header("id", "sub-0")
            .with_header("destination", "/topic/group/42");
        broker.receive(session, &subscribe.encode()).unwrap();
        broker.take_output(session);

        // Claimed identity is overwritten by the authenticated one.
        let send = Frame::new(Command::Send)
            .with_header("destination", "/app/chat/42")
            .with_body(r#"{"type":"CHAT","senderEmail":"mallory@x.com","content":"hi"}"#);
        broker.receive(session, &send.encode()).unwrap();

        let output = broker.take_output(session);
        let [BrokerOutput::Frame(message)] = output.as_slice() else {
            panic!("expected one MESSAGE, got {output:?}");
        };
        assert_eq!(message.header("subscription"), Some("sub-0"));
        insta::assert_snapshot!(message.body, @r#"{"type":"CHAT","senderEmail":"alice@x.com","senderName":"Alice","content":"hi","timestamp":"2024-01-01T09:00:00"}"#);

        let history = broker.history(&GroupId::new("42").unwrap()).unwrap();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn killed_session_reports_closed_then_disappears() {
        let mut broker = broker();
        let session = broker.open(&request()).unwrap();

        broker.kill(session, "network down");

        assert_eq!(broker.take_output(session), vec![BrokerOutput::Closed {
            reason: "network down".to_string()
        }]);
        assert_eq!(broker.session_count(), 0);
        assert!(broker.receive(session, &connect_frame("alice-token")).is_err());
    }
}
