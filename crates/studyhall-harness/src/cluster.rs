//! Simulated study group with several members.
//!
//! [`SimCluster`] wires one [`SimBroker`] to any number of [`SimSession`]s,
//! each a full [`Runtime`] over a [`SimDriver`], all sharing one virtual
//! clock. Tests type lines, move time forward and break the network, then
//! call [`SimCluster::settle`] to run every session until nothing is left to
//! deliver.

use std::{sync::MutexGuard, time::Duration};

use secrecy::Secret;
use studyhall_app::{App, Bridge, Runtime, SessionConfig};
use studyhall_client::ClientIdentity;
use studyhall_core::ConnectionConfig;
use studyhall_proto::GroupId;

use crate::{
    SimBroker, SimDriver, SimEnv, SimInstant,
    sim_broker::{SharedBroker, create_shared_broker, lock_broker},
    sim_driver::SimDriverError,
};

/// Settle rounds before giving up on a livelocked simulation.
const MAX_SETTLE_ROUNDS: usize = 10_000;

/// One member's view running on the simulation.
pub struct SimSession {
    runtime: Runtime<SimDriver, SimEnv>,
    quit: bool,
}

impl SimSession {
    /// The member's view model.
    pub fn app(&self) -> &App<SimInstant> {
        self.runtime.app()
    }

    /// The member's driver.
    pub fn driver(&self) -> &SimDriver {
        self.runtime.driver()
    }

    /// The member's protocol bridge.
    pub fn bridge(&self) -> &Bridge<SimEnv> {
        self.runtime.bridge()
    }

    /// Whether the session quit or left.
    pub fn has_quit(&self) -> bool {
        self.quit
    }

    /// Log contents in order, for compact assertions.
    pub fn log_contents(&self) -> Vec<String> {
        self.app().log().iter().map(|entry| entry.content.clone()).collect()
    }

    /// Run queued input. Returns whether anything was processed.
    fn pump(&mut self) -> Result<bool, SimDriverError> {
        let mut progressed = false;
        while !self.quit {
            let Some(input) = self.runtime.driver_mut().poll_input() else {
                break;
            };
            progressed = true;
            if self.runtime.process_input(input)? {
                self.leave();
            }
        }
        Ok(progressed)
    }

    fn leave(&mut self) {
        if !self.quit {
            self.runtime.shutdown();
            self.quit = true;
        }
    }
}

/// Simulated study group.
pub struct SimCluster {
    env: SimEnv,
    broker: SharedBroker,
    group: GroupId,
    sessions: Vec<SimSession>,
}

impl SimCluster {
    /// Empty group `group` on a broker seeded with `seed`.
    pub fn new(seed: u64, group: GroupId) -> Self {
        let env = SimEnv::with_seed(seed);
        let broker = create_shared_broker(SimBroker::new(env.clone()));
        Self { env, broker, group, sessions: Vec::new() }
    }

    /// Shared clock.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Group every session joins.
    pub fn group(&self) -> &GroupId {
        &self.group
    }

    /// Lock the broker to configure or inspect it.
    pub fn broker(&self) -> MutexGuard<'_, SimBroker> {
        lock_broker(&self.broker)
    }

    /// Register a user and join the group as them with default settings.
    ///
    /// Returns the session index.
    pub fn join(&mut self, email: &str, name: &str) -> Result<usize, SimDriverError> {
        let token = format!("token-{email}");
        self.broker().register_user(token.as_str(), email, name);
        self.join_with(
            ClientIdentity::new(email, name),
            &token,
            ConnectionConfig::default(),
            SessionConfig::default(),
        )
    }

    /// Join the group with explicit identity, token and configuration.
    ///
    /// The token is not registered; use [`SimBroker::register_user`] for
    /// tokens that should be accepted.
    pub fn join_with(
        &mut self,
        identity: ClientIdentity,
        token: &str,
        config: ConnectionConfig,
        session: SessionConfig,
    ) -> Result<usize, SimDriverError> {
        let driver = SimDriver::new(self.env.clone(), self.broker.clone());
        let bridge = Bridge::new(
            self.env.clone(),
            identity,
            config,
            self.group.clone(),
            Secret::new(token.to_string()),
        );
        let mut runtime = Runtime::new(driver, bridge, session);
        let quit = runtime.start()?;

        self.sessions.push(SimSession { runtime, quit });
        self.settle()?;
        Ok(self.sessions.len() - 1)
    }

    /// Session at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` was not returned by a join.
    #[allow(clippy::indexing_slicing)]
    pub fn session(&self, index: usize) -> &SimSession {
        &self.sessions[index]
    }

    /// All sessions, in join order.
    pub fn sessions(&self) -> &[SimSession] {
        &self.sessions
    }

    /// Type a line into session `index` and settle.
    pub fn type_line(&mut self, index: usize, line: &str) -> Result<(), SimDriverError> {
        if let Some(session) = self.sessions.get_mut(index) {
            session.runtime.driver_mut().type_line(line);
        }
        self.settle()
    }

    /// Leave the group from session `index` and settle.
    pub fn leave(&mut self, index: usize) -> Result<(), SimDriverError> {
        if let Some(session) = self.sessions.get_mut(index) {
            session.leave();
        }
        self.settle()
    }

    /// Move the clock forward, tick every session and settle.
    pub fn advance(&mut self, duration: Duration) -> Result<(), SimDriverError> {
        self.env.advance(duration);
        for session in self.sessions.iter_mut().filter(|s| !s.quit) {
            session.runtime.driver_mut().inject_tick();
        }
        self.settle()
    }

    /// Advance `total` in steps of `step`, settling after each.
    pub fn advance_in_steps(
        &mut self,
        total: Duration,
        step: Duration,
    ) -> Result<(), SimDriverError> {
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            let next = step.min(total - elapsed);
            self.advance(next)?;
            elapsed += next;
        }
        Ok(())
    }

    /// Run every session until no input is left anywhere.
    pub fn settle(&mut self) -> Result<(), SimDriverError> {
        for _ in 0..MAX_SETTLE_ROUNDS {
            let mut progressed = false;
            for session in &mut self.sessions {
                progressed |= session.pump()?;
            }
            if !progressed {
                return Ok(());
            }
        }
        tracing::warn!("simulation did not settle after {MAX_SETTLE_ROUNDS} rounds");
        Ok(())
    }
}
