//! Session view model.
//!
//! This module defines the [`App`] state machine, which holds everything a
//! group view shows, completely decoupled from I/O and protocol mechanics.
//!
//! This is a pure state machine: it consumes [`crate::AppEvent`] inputs and
//! produces [`crate::AppAction`] instructions for the runtime to execute.
//!
//! # Responsibilities
//!
//! - Keeps the chat log in arrival order, merging the history load with live
//!   messages that arrive while it is in flight.
//! - Shows a call banner for a while after another member starts a call.
//! - Tracks connection state for the indicator, including the persistent
//!   "lost" state after repeated failures.
//! - Parses input lines into chat messages and commands.

use std::{mem, ops::Add, time::Duration};

use studyhall_client::ChatLogEntry;
use studyhall_proto::GroupId;
use tracing::debug;

use crate::{
    AppAction, AppEvent, CallBanner, ConnectionIndicator, HistoryState, SessionConfig,
};

/// Session view model for one group.
///
/// Pure state machine that processes events and produces actions.
/// No I/O dependencies - fully testable in simulation.
///
/// Generic over `I` (Instant type) so banner expiry runs on virtual time in
/// simulation.
#[derive(Debug, Clone)]
pub struct App<I> {
    /// Group this view shows.
    group: GroupId,
    /// Banner duration, call URL, failure threshold.
    config: SessionConfig,
    /// Connection state for the indicator.
    indicator: ConnectionIndicator,
    /// Chat log, arrival order. Never re-sorted.
    log: Vec<ChatLogEntry>,
    /// Times the log was replaced rather than extended.
    log_replacements: u64,
    /// Incoming call banner. `None` if no call is being announced.
    banner: Option<CallBanner<I>>,
    /// History load progress.
    history: HistoryState,
    /// Connection errors since the last successful connect.
    consecutive_errors: u32,
    /// Transient status message. `None` if no message.
    status_message: Option<String>,
}

impl<I> App<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    /// Create an empty view for `group`.
    pub fn new(group: GroupId, config: SessionConfig) -> Self {
        Self {
            group,
            config,
            indicator: ConnectionIndicator::Disconnected,
            log: Vec::new(),
            log_replacements: 0,
            banner: None,
            history: HistoryState::Idle,
            consecutive_errors: 0,
            status_message: None,
        }
    }

    /// Process an event and return actions.
    pub fn handle(&mut self, event: AppEvent<I>) -> Vec<AppAction> {
        match event {
            AppEvent::Tick { now } => self.tick(now),
            AppEvent::Line(line) => self.handle_line(&line),
            AppEvent::Connecting => {
                // The lost indicator stays up through retries until a connect
                // succeeds.
                if self.indicator != ConnectionIndicator::Lost {
                    self.indicator = ConnectionIndicator::Connecting;
                }
                vec![AppAction::Render]
            },
            AppEvent::Connected { group } => {
                debug!(%group, "view connected");
                self.indicator = ConnectionIndicator::Connected;
                if self.consecutive_errors > 0 {
                    self.status_message = None;
                }
                self.consecutive_errors = 0;
                vec![AppAction::Render]
            },
            AppEvent::ConnectionError { message } => {
                self.consecutive_errors = self.consecutive_errors.saturating_add(1);
                if self.config.failure_threshold > 0
                    && self.consecutive_errors >= self.config.failure_threshold
                {
                    self.indicator = ConnectionIndicator::Lost;
                }
                self.status_message = Some(message);
                vec![AppAction::Render]
            },
            AppEvent::Disconnected => {
                self.indicator = ConnectionIndicator::Disconnected;
                self.banner = None;
                self.consecutive_errors = 0;
                vec![AppAction::Render]
            },
            AppEvent::MessageReceived(entry) => {
                match &mut self.history {
                    HistoryState::Pending { buffered } => buffered.push(entry),
                    _ => self.log.push(entry),
                }
                vec![AppAction::Render]
            },
            AppEvent::CallStarted { sender, at } => {
                // A newer call replaces whatever banner is showing.
                self.banner = Some(CallBanner::new(sender, at + self.config.banner_duration));
                vec![AppAction::Render]
            },
            AppEvent::HistoryLoaded(entries) => self.history_loaded(entries),
            AppEvent::HistoryFailed { reason } => self.history_failed(&reason),
            AppEvent::Error { message } => {
                self.status_message = Some(message);
                vec![AppAction::Render]
            },
        }
    }

    /// Mount the view: connect and load history.
    ///
    /// Live messages are held back until the history load settles.
    pub fn join(&mut self) -> Vec<AppAction> {
        self.history = HistoryState::Pending { buffered: Vec::new() };
        vec![AppAction::Connect, AppAction::FetchHistory, AppAction::Render]
    }

    /// Unmount the view: leave the group and drop the banner.
    pub fn leave(&mut self) -> Vec<AppAction> {
        self.banner = None;
        vec![AppAction::Disconnect, AppAction::Render]
    }

    /// Publish a chat message. Blank input is ignored.
    pub fn send_message(&self, content: &str) -> Vec<AppAction> {
        let content = content.trim();
        if content.is_empty() {
            return vec![];
        }
        vec![AppAction::SendChat { content: content.to_string() }, AppAction::Render]
    }

    /// Announce a call to the group and open the call room.
    pub fn start_call(&mut self) -> Vec<AppAction> {
        self.status_message = Some("Starting video call...".to_string());
        vec![
            AppAction::StartCall,
            AppAction::OpenCall { url: self.config.call_url.clone() },
            AppAction::Render,
        ]
    }

    /// Load history again; the result replaces the log.
    pub fn reload_history(&mut self) -> Vec<AppAction> {
        if !self.history.is_pending() {
            self.history = HistoryState::Pending { buffered: Vec::new() };
        }
        vec![AppAction::FetchHistory, AppAction::Render]
    }

    /// Replace the log with `entries`.
    ///
    /// Messages that arrived while the load was in flight follow the history
    /// in arrival order.
    pub fn history_loaded(&mut self, entries: Vec<ChatLogEntry>) -> Vec<AppAction> {
        let buffered = match mem::replace(&mut self.history, HistoryState::Loaded) {
            HistoryState::Pending { buffered } => buffered,
            _ => Vec::new(),
        };
        debug!(history = entries.len(), live = buffered.len(), "history loaded");
        self.log = entries;
        self.log.extend(buffered);
        self.log_replacements += 1;
        vec![AppAction::Render]
    }

    /// Settle a failed history load. Buffered live messages are kept.
    pub fn history_failed(&mut self, reason: &str) -> Vec<AppAction> {
        if let HistoryState::Pending { buffered } =
            mem::replace(&mut self.history, HistoryState::Failed)
        {
            self.log.extend(buffered);
        }
        self.status_message = Some(format!("Could not load chat history: {reason}"));
        vec![AppAction::Render]
    }

    /// Quit the application.
    pub fn quit(&self) -> Vec<AppAction> {
        vec![AppAction::Quit]
    }

    fn tick(&mut self, now: I) -> Vec<AppAction> {
        if self.banner.as_ref().is_some_and(|banner| banner.is_expired(now)) {
            self.banner = None;
            return vec![AppAction::Render];
        }
        vec![]
    }

    fn handle_line(&mut self, line: &str) -> Vec<AppAction> {
        let line = line.trim();
        match line {
            "" => vec![],
            "/quit" => self.quit(),
            "/call" => self.start_call(),
            "/history" => self.reload_history(),
            command if command.starts_with('/') => {
                self.status_message = Some(format!("Unknown command: {command}"));
                vec![AppAction::Render]
            },
            text => self.send_message(text),
        }
    }

    /// Group this view shows.
    pub fn group(&self) -> &GroupId {
        &self.group
    }

    /// View configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Connection state for the indicator.
    pub fn indicator(&self) -> ConnectionIndicator {
        self.indicator
    }

    /// Chat log in arrival order.
    pub fn log(&self) -> &[ChatLogEntry] {
        &self.log
    }

    /// Times the log was replaced by a history load.
    ///
    /// Between two changes of this count the log only grows at the end.
    pub fn log_replacements(&self) -> u64 {
        self.log_replacements
    }

    /// Current call banner. `None` if no call is being announced.
    pub fn call_banner(&self) -> Option<&CallBanner<I>> {
        self.banner.as_ref()
    }

    /// History load progress.
    pub fn history(&self) -> &HistoryState {
        &self.history
    }

    /// Connection errors since the last successful connect.
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Transient status message. `None` if no message.
    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }
}
