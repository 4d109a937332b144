//! Protocol-to-Application translation layer.
//!
//! The [`Bridge`] wraps the low-level [`studyhall_client::Client`] and adapts
//! it to the view lifecycle.
//!
//! # Responsibilities
//!
//! - Converts [`crate::AppAction`]s into client calls on the current
//!   connection handle.
//! - Accumulates [`crate::TransportCommand`]s for the driver to execute in
//!   the next I/O cycle.
//! - Interprets client results and converts them back into
//!   [`crate::AppEvent`]s to update the view.
//! - Passes time ticks through generically so the same code runs in real
//!   time and in deterministic simulation.

use secrecy::SecretString;
use studyhall_client::{
    Client, ClientAction, ClientError, ClientEvent, ClientIdentity, ConnectionHandle,
    InboundEvent,
};
use studyhall_core::{ConnectionConfig, Environment};
use studyhall_proto::{Frame, GroupId};

use crate::{AppAction, AppEvent, TransportCommand};

/// Bridge between App and Client protocol logic.
///
/// Generic over Environment to support both production and simulation.
/// The Instant type is determined by the Environment's associated type.
pub struct Bridge<E: Environment> {
    env: E,
    client: Client<E>,
    group: GroupId,
    token: SecretString,
    handle: Option<ConnectionHandle>,
    outgoing: Vec<TransportCommand>,
}

impl<E: Environment> Bridge<E> {
    /// Create a bridge for `identity` joining `group` with `token`.
    pub fn new(
        env: E,
        identity: ClientIdentity,
        config: ConnectionConfig,
        group: GroupId,
        token: SecretString,
    ) -> Self {
        let client = Client::new(env.clone(), identity, config);
        Self { env, client, group, token, handle: None, outgoing: Vec::new() }
    }

    /// Group this bridge joins.
    pub fn group(&self) -> &GroupId {
        &self.group
    }

    /// Underlying client, for inspection.
    pub fn client(&self) -> &Client<E> {
        &self.client
    }

    /// Handle of the current connection. `None` before connect and after
    /// disconnect.
    pub fn handle(&self) -> Option<&ConnectionHandle> {
        self.handle.as_ref()
    }

    /// Process an App action and return resulting App events.
    pub fn process_app_action(&mut self, action: AppAction) -> Vec<AppEvent<E::Instant>> {
        match action {
            AppAction::Connect => {
                match self.client.connect(self.group.clone(), self.token.clone()) {
                    Ok((handle, actions)) => {
                        self.handle = Some(handle);
                        self.process_client_actions(actions)
                    },
                    Err(ClientError::AlreadyConnected { group }) => {
                        tracing::debug!(%group, "already connected");
                        vec![]
                    },
                    Err(e) => vec![AppEvent::Error { message: e.to_string() }],
                }
            },
            AppAction::Disconnect => {
                let Some(handle) = self.handle.take() else {
                    return vec![];
                };
                let actions = self.client.disconnect(&handle);
                let mut events = self.process_client_actions(actions);
                events.push(AppEvent::Disconnected);
                events
            },
            AppAction::SendChat { content } => {
                let Some(handle) = self.handle.clone() else {
                    tracing::debug!("chat before connect dropped");
                    return vec![];
                };
                let result = self.client.send_chat(&handle, &content);
                self.handle_client_result(result)
            },
            AppAction::StartCall => {
                let Some(handle) = self.handle.clone() else {
                    tracing::debug!("call start before connect dropped");
                    return vec![];
                };
                let result = self.client.send_call_start(&handle);
                self.handle_client_result(result)
            },
            AppAction::Render
            | AppAction::Quit
            | AppAction::FetchHistory
            | AppAction::OpenCall { .. } => vec![],
        }
    }

    /// Handle a frame from the broker.
    pub fn handle_frame(&mut self, frame: Frame) -> Vec<AppEvent<E::Instant>> {
        self.handle_client_event(ClientEvent::FrameReceived(frame))
    }

    /// Process a time tick.
    pub fn handle_tick(&mut self, now: E::Instant) -> Vec<AppEvent<E::Instant>> {
        self.handle_client_event(ClientEvent::Tick { now })
    }

    /// Feed any client event through and translate the result.
    pub fn handle_client_event(
        &mut self,
        event: ClientEvent<E::Instant>,
    ) -> Vec<AppEvent<E::Instant>> {
        let result = self.client.handle(event);
        self.handle_client_result(result)
    }

    /// Take pending transport commands.
    pub fn take_outgoing(&mut self) -> Vec<TransportCommand> {
        std::mem::take(&mut self.outgoing)
    }

    fn handle_client_result(
        &mut self,
        result: Result<Vec<ClientAction>, ClientError>,
    ) -> Vec<AppEvent<E::Instant>> {
        match result {
            Ok(actions) => self.process_client_actions(actions),
            Err(ClientError::Connection(e)) => {
                tracing::debug!(error = %e, "client rejected event");
                vec![]
            },
            Err(e) => vec![AppEvent::Error { message: e.to_string() }],
        }
    }

    fn process_client_actions(&mut self, actions: Vec<ClientAction>) -> Vec<AppEvent<E::Instant>> {
        let mut events = Vec::new();

        for action in actions {
            match action {
                ClientAction::OpenTransport(request) => {
                    self.outgoing.push(TransportCommand::Open(request));
                    events.push(AppEvent::Connecting);
                },
                ClientAction::Send(frame) => self.outgoing.push(TransportCommand::Send(frame)),
                ClientAction::SendHeartbeat => self.outgoing.push(TransportCommand::Heartbeat),
                ClientAction::CloseTransport => self.outgoing.push(TransportCommand::Close),
                ClientAction::Connected { group } => events.push(AppEvent::Connected { group }),
                ClientAction::Deliver(InboundEvent::Chat(entry)) => {
                    events.push(AppEvent::MessageReceived(entry));
                },
                ClientAction::Deliver(InboundEvent::CallStarted { sender, .. }) => {
                    events.push(AppEvent::CallStarted { sender, at: self.env.now() });
                },
                ClientAction::Error(error) => {
                    events.push(AppEvent::ConnectionError { message: error.to_string() });
                },
            }
        }

        events
    }
}
