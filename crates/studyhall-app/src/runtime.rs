//! Generic runtime for application orchestration.
//!
//! The Runtime drives the application event loop, coordinating between:
//! - [`App`]: session view model
//! - [`Bridge`]: protocol bridge to Client
//! - [`Driver`]: platform-specific I/O
//!
//! Everything except waiting for input is synchronous, so tests can feed
//! [`DriverInput`]s one by one through [`Runtime::process_input`].

use studyhall_client::ClientEvent;
use studyhall_core::Environment;

use crate::{
    App, AppAction, AppEvent, Bridge, Driver, DriverInput, SessionConfig, TransportCommand,
    TransportInput,
};

/// Generic runtime that orchestrates App, Bridge, and Driver.
///
/// # Type Parameters
///
/// - `D`: Platform-specific I/O driver
/// - `E`: Environment for time and randomness
pub struct Runtime<D, E>
where
    D: Driver,
    E: Environment,
{
    driver: D,
    app: App<E::Instant>,
    bridge: Bridge<E>,
}

impl<D, E> Runtime<D, E>
where
    D: Driver<Instant = E::Instant>,
    E: Environment,
{
    /// Create a runtime for the group `bridge` joins.
    pub fn new(driver: D, bridge: Bridge<E>, config: SessionConfig) -> Self {
        let app = App::new(bridge.group().clone(), config);
        Self { driver, app, bridge }
    }

    /// Run the main event loop until the user quits or input ends.
    ///
    /// This is the core orchestration loop that:
    /// 1. Mounts the view (connect, history fetch)
    /// 2. Feeds each driver input through App and Bridge
    /// 3. Executes the resulting transport commands through the driver
    /// 4. Leaves the group on the way out and waits for the driver to finish
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn run(mut self) -> Result<(), D::Error> {
        let mut quit = self.start()?;

        while !quit {
            match self.driver.next_input().await? {
                Some(input) => quit = self.process_input(input)?,
                None => break,
            }
        }

        self.shutdown();
        self.driver.finish().await;
        Ok(())
    }

    /// Render once and mount the view.
    ///
    /// Returns `true` if the application should quit.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails.
    pub fn start(&mut self) -> Result<bool, D::Error> {
        self.driver.render(&self.app)?;
        let actions = self.app.join();
        self.process_actions(actions)
    }

    /// Process one driver input.
    ///
    /// Returns `true` if the application should quit.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails.
    pub fn process_input(&mut self, input: DriverInput<E::Instant>) -> Result<bool, D::Error> {
        match input {
            DriverInput::Line(line) => {
                let actions = self.app.handle(AppEvent::Line(line));
                self.process_actions(actions)
            },
            DriverInput::Transport(input) => {
                let event = match input {
                    TransportInput::Opened => ClientEvent::TransportOpened,
                    TransportInput::Frame(frame) => ClientEvent::FrameReceived(frame),
                    TransportInput::Heartbeat => ClientEvent::HeartbeatReceived,
                    TransportInput::Closed { reason } => ClientEvent::TransportClosed { reason },
                };
                let events = self.bridge.handle_client_event(event);
                self.send_outgoing()?;
                self.process_bridge_events(events)
            },
            DriverInput::History(Ok(entries)) => {
                let actions = self.app.handle(AppEvent::HistoryLoaded(entries));
                self.process_actions(actions)
            },
            DriverInput::History(Err(reason)) => {
                tracing::warn!(%reason, "chat history unavailable");
                let actions = self.app.handle(AppEvent::HistoryFailed { reason });
                self.process_actions(actions)
            },
            DriverInput::Tick(now) => {
                let events = self.bridge.handle_tick(now);
                self.send_outgoing()?;
                if self.process_bridge_events(events)? {
                    return Ok(true);
                }

                let actions = self.app.handle(AppEvent::Tick { now });
                self.process_actions(actions)
            },
        }
    }

    /// Leave the group, drop the banner and stop the driver.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&mut self) {
        let actions = self.app.leave();
        if let Err(e) = self.process_actions(actions) {
            tracing::warn!("Failed to leave group cleanly: {:?}", e);
        }
        self.driver.stop();
    }

    /// Process actions returned by the App.
    ///
    /// Returns `true` if should quit.
    fn process_actions(&mut self, initial_actions: Vec<AppAction>) -> Result<bool, D::Error> {
        let mut pending_actions = initial_actions;

        while !pending_actions.is_empty() {
            let actions = std::mem::take(&mut pending_actions);

            for action in actions {
                match action {
                    AppAction::Render => self.driver.render(&self.app)?,
                    AppAction::Quit => return Ok(true),
                    AppAction::FetchHistory => self.driver.fetch_history(self.app.group())?,
                    AppAction::OpenCall { url } => self.driver.open_call(&url)?,

                    // Protocol operations go through the bridge
                    AppAction::Connect
                    | AppAction::Disconnect
                    | AppAction::SendChat { .. }
                    | AppAction::StartCall => {
                        let events = self.bridge.process_app_action(action);
                        self.send_outgoing()?;
                        for event in events {
                            let new_actions = self.app.handle(event);
                            pending_actions.extend(new_actions);
                        }
                    },
                }
            }
        }
        Ok(false)
    }

    /// Process events from Bridge back to App.
    fn process_bridge_events(
        &mut self,
        events: Vec<AppEvent<E::Instant>>,
    ) -> Result<bool, D::Error> {
        for event in events {
            let actions = self.app.handle(event);
            if self.process_actions(actions)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Execute all pending transport commands.
    fn send_outgoing(&mut self) -> Result<(), D::Error> {
        for command in self.bridge.take_outgoing() {
            match command {
                TransportCommand::Open(request) => self.driver.open_transport(request)?,
                TransportCommand::Send(frame) => self.driver.send_frame(frame)?,
                TransportCommand::Heartbeat => self.driver.send_heartbeat()?,
                TransportCommand::Close => self.driver.close_transport(),
            }
        }
        Ok(())
    }

    /// Get a reference to the App
    pub fn app(&self) -> &App<E::Instant> {
        &self.app
    }

    /// Get a reference to the Bridge
    pub fn bridge(&self) -> &Bridge<E> {
        &self.bridge
    }

    /// Get a reference to the Driver
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Get a mutable reference to the Driver
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}
