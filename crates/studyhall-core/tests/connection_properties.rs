//! Property-based tests for the group connection state machine
//!
//! Drives a connection with arbitrary sequences of driver events and checks
//! the invariants that must hold after every step.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use secrecy::Secret;
use studyhall_core::{
    Connection, ConnectionAction, ConnectionConfig, ConnectionState, Environment,
};
use studyhall_proto::{Command, Frame, GroupId};

#[derive(Clone)]
struct FixedEnv;

impl Environment for FixedEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        async {}
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(0x5a);
    }
}

#[derive(Debug, Clone)]
enum Step {
    Open,
    TransportOpened,
    BrokerConnected,
    BrokerMessage(u8),
    BrokerError,
    TransportFailed,
    Send,
    Close,
    Advance(u64),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Open),
        Just(Step::TransportOpened),
        Just(Step::BrokerConnected),
        (0u8..3).prop_map(Step::BrokerMessage),
        Just(Step::BrokerError),
        Just(Step::TransportFailed),
        Just(Step::Send),
        Just(Step::Close),
        (0u64..40).prop_map(Step::Advance),
    ]
}

proptest! {
    #[test]
    fn invariants_hold_for_any_event_sequence(steps in prop::collection::vec(step(), 1..60)) {
        let env = FixedEnv;
        let mut now = Instant::now();
        let mut conn = Connection::new(ConnectionConfig::default());
        let group = GroupId::new("7").expect("valid group");
        let mut attempt_errors = 0;

        for step in steps {
            let actions = match step {
                Step::Open => conn
                    .open(group.clone(), Secret::new("t".to_string()), now)
                    .unwrap_or_default(),
                Step::TransportOpened => conn.transport_opened(now).unwrap_or_default(),
                Step::BrokerConnected => conn
                    .handle_frame(&Frame::new(Command::Connected), now)
                    .unwrap_or_default(),
                Step::BrokerMessage(sub) => conn
                    .handle_frame(
                        &Frame::new(Command::Message)
                            .with_header("subscription", format!("sub-{sub}"))
                            .with_body("{}"),
                        now,
                    )
                    .unwrap_or_default(),
                Step::BrokerError => conn
                    .handle_frame(&Frame::new(Command::Error), now)
                    .unwrap_or_default(),
                Step::TransportFailed => conn.transport_failed("lost", &env, now),
                Step::Send => conn.send(Frame::new(Command::Send), now),
                Step::Close => conn.close(),
                Step::Advance(secs) => {
                    now += Duration::from_secs(secs);
                    conn.tick(&env, now)
                },
            };

            let state = conn.state();

            // Subscriptions only while connected
            if state != ConnectionState::Connected {
                prop_assert_eq!(conn.subscriptions().count(), 0);
            } else {
                prop_assert_eq!(conn.subscriptions().count(), 2);
            }

            // Retries only while failed
            prop_assert_eq!(conn.retry_at().is_some(), state == ConnectionState::Failed);

            // Nothing goes out unless connected, except the handshake itself
            for action in &actions {
                if let ConnectionAction::SendFrame(frame) = action {
                    let handshake = matches!(frame.command, Command::Connect | Command::Subscribe);
                    let teardown = frame.command == Command::Disconnect;
                    prop_assert!(handshake || teardown || state == ConnectionState::Connected);
                }
            }

            // One failed attempt reports at most one error
            if actions.iter().any(|a| matches!(a, ConnectionAction::OpenTransport(_))) {
                attempt_errors = 0;
            }
            let errors = actions.iter().filter(|a| matches!(a, ConnectionAction::Error(_)));
            attempt_errors += errors.count();
            prop_assert!(attempt_errors <= 1);

            let connected = actions.iter().filter(|a| **a == ConnectionAction::Connected).count();
            prop_assert!(connected <= 1);
            if connected == 1 {
                prop_assert_eq!(state, ConnectionState::Connected);
            }

            if state == ConnectionState::Disconnected {
                prop_assert!(conn.group().is_none());
            }
        }
    }

    #[test]
    fn close_twice_is_a_no_op(steps in prop::collection::vec(step(), 0..30)) {
        let env = FixedEnv;
        let now = Instant::now();
        let mut conn = Connection::new(ConnectionConfig::default());
        let group = GroupId::new("7").expect("valid group");

        for step in steps {
            match step {
                Step::Open => {
                    let _ = conn.open(group.clone(), Secret::new("t".to_string()), now);
                },
                Step::TransportOpened => {
                    let _ = conn.transport_opened(now);
                },
                Step::BrokerConnected => {
                    let _ = conn.handle_frame(&Frame::new(Command::Connected), now);
                },
                Step::TransportFailed => {
                    conn.transport_failed("lost", &env, now);
                },
                _ => {},
            }
        }

        conn.close();
        prop_assert!(conn.close().is_empty());
        prop_assert_eq!(conn.state(), ConnectionState::Disconnected);
    }
}
