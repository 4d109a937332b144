//! Client state machine.
//!
//! The `Client` owns at most one group connection. Connecting to another
//! group tears the current one down first, and every `connect` hands out a
//! fresh [`ConnectionHandle`] so that late calls made with an old handle
//! cannot touch its replacement.

use secrecy::SecretString;
use studyhall_core::{Connection, ConnectionAction, ConnectionConfig, Environment};
use studyhall_proto::GroupId;
use tracing::debug;

use crate::{
    dispatcher::Dispatcher,
    error::ClientError,
    event::{ClientAction, ClientEvent},
    publisher::Publisher,
};

/// Who the local user is.
///
/// The email is the identity the backend stamps on messages; the name is
/// shown to other members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Email address, used to recognise the user's own messages.
    pub email: String,
    /// Display name.
    pub name: String,
}

impl ClientIdentity {
    /// Create an identity.
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self { email: email.into(), name: name.into() }
    }
}

/// Proof of a particular `connect` call.
///
/// Operations with a handle from an earlier `connect` (or after
/// `disconnect`) are no-ops.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionHandle {
    group: GroupId,
    generation: u64,
}

impl ConnectionHandle {
    /// Group this handle was issued for.
    pub fn group(&self) -> &GroupId {
        &self.group
    }
}

/// Group session client.
pub struct Client<E: Environment> {
    /// Environment for time, wall clock and jitter.
    env: E,

    /// Local user.
    identity: ClientIdentity,

    /// The one connection this client manages.
    connection: Connection<E::Instant>,

    /// Inbound classification.
    dispatcher: Dispatcher,

    /// Outbound frame construction.
    publisher: Publisher,

    /// Bumped on every `connect`.
    generation: u64,
}

impl<E: Environment> Client<E> {
    /// Create a disconnected client.
    pub fn new(env: E, identity: ClientIdentity, config: ConnectionConfig) -> Self {
        let dispatcher = Dispatcher::new(identity.email.clone());
        let publisher = Publisher::new(config.destinations.clone());
        Self {
            env,
            identity,
            connection: Connection::new(config),
            dispatcher,
            publisher,
            generation: 0,
        }
    }

    /// Local user.
    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Connection state machine, for inspection.
    pub fn connection(&self) -> &Connection<E::Instant> {
        &self.connection
    }

    /// Whether `handle` refers to the current connection.
    pub fn is_current(&self, handle: &ConnectionHandle) -> bool {
        handle.generation == self.generation && self.connection.group() == Some(&handle.group)
    }

    /// Connect to `group`, replacing any connection to another group.
    ///
    /// # Errors
    ///
    /// - `ClientError::AlreadyConnected` if `group` is the current group
    /// - `ClientError::Connection` if the configured endpoint is invalid
    pub fn connect(
        &mut self,
        group: GroupId,
        token: SecretString,
    ) -> Result<(ConnectionHandle, Vec<ClientAction>), ClientError> {
        if self.connection.group() == Some(&group) {
            return Err(ClientError::AlreadyConnected { group });
        }

        let now = self.env.now();
        let closed = self.connection.close();
        let mut actions = self.convert(closed);
        let opened = self.connection.open(group.clone(), token, now)?;
        actions.extend(self.convert(opened));

        self.generation += 1;
        Ok((ConnectionHandle { group, generation: self.generation }, actions))
    }

    /// Close the connection `handle` refers to.
    ///
    /// Idempotent. Stale handles are ignored.
    pub fn disconnect(&mut self, handle: &ConnectionHandle) -> Vec<ClientAction> {
        if !self.is_current(handle) {
            debug!(group = %handle.group, "disconnect with stale handle ignored");
            return vec![];
        }
        let closed = self.connection.close();
        self.convert(closed)
    }

    /// Publish a chat message.
    ///
    /// Dropped silently unless connected; there is no outbound queue.
    ///
    /// # Errors
    ///
    /// - `ClientError::EmptyMessage` if `content` is blank
    pub fn send_chat(
        &mut self,
        handle: &ConnectionHandle,
        content: &str,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        if !self.is_current(handle) {
            debug!(group = %handle.group, "send with stale handle dropped");
            return Ok(vec![]);
        }

        let frame =
            self.publisher.chat(&handle.group, content, &self.identity, self.env.wall_clock())?;
        let sent = self.connection.send(frame, self.env.now());
        Ok(self.convert(sent))
    }

    /// Announce that the local user started a video call.
    ///
    /// Dropped silently unless connected.
    pub fn send_call_start(
        &mut self,
        handle: &ConnectionHandle,
    ) -> Result<Vec<ClientAction>, ClientError> {
        if !self.is_current(handle) {
            debug!(group = %handle.group, "call start with stale handle dropped");
            return Ok(vec![]);
        }

        let frame = self.publisher.call_start(
            &handle.group,
            &self.identity.email,
            self.env.wall_clock(),
        )?;
        let sent = self.connection.send(frame, self.env.now());
        Ok(self.convert(sent))
    }

    /// Process a transport or timer event and return resulting actions.
    ///
    /// # Errors
    ///
    /// - `ClientError::Connection` for a frame or transport event that does
    ///   not fit the connection state. The connection itself is unaffected.
    pub fn handle(
        &mut self,
        event: ClientEvent<E::Instant>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let actions = match event {
            ClientEvent::TransportOpened => self.connection.transport_opened(self.env.now())?,
            ClientEvent::TransportClosed { reason } => {
                let now = self.env.now();
                self.connection.transport_failed(reason, &self.env, now)
            },
            ClientEvent::FrameReceived(frame) => {
                self.connection.handle_frame(&frame, self.env.now())?
            },
            ClientEvent::HeartbeatReceived => {
                self.connection.heartbeat_received(self.env.now());
                vec![]
            },
            ClientEvent::Tick { now } => self.connection.tick(&self.env, now),
        };
        Ok(self.convert(actions))
    }

    fn convert(&self, actions: Vec<ConnectionAction>) -> Vec<ClientAction> {
        actions
            .into_iter()
            .filter_map(|action| match action {
                ConnectionAction::OpenTransport(request) => {
                    Some(ClientAction::OpenTransport(request))
                },
                ConnectionAction::SendFrame(frame) => Some(ClientAction::Send(frame)),
                ConnectionAction::SendHeartbeat => Some(ClientAction::SendHeartbeat),
                ConnectionAction::CloseTransport => Some(ClientAction::CloseTransport),
                ConnectionAction::Connected => self
                    .connection
                    .group()
                    .map(|group| ClientAction::Connected { group: group.clone() }),
                ConnectionAction::Deliver { topic, body } => self
                    .dispatcher
                    .dispatch(topic, &body, self.env.wall_clock())
                    .map(ClientAction::Deliver),
                ConnectionAction::Error(error) => Some(ClientAction::Error(error)),
            })
            .collect()
    }
}
