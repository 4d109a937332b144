//! Fuzz target for the Connection state machine
//!
//! # Strategy
//!
//! - Arbitrary sequences of driver events: transport opened/closed, broker
//!   frames (valid and out of place), heart-beats, sends, ticks, close
//! - Virtual time from the simulation environment
//!
//! # Invariants
//!
//! - Subscriptions exist only while connected
//! - A retry is scheduled exactly while failed
//! - `Connected` is reported only on the transition into `Connected`
//! - `close` always ends in `Disconnected`

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use secrecy::Secret;
use studyhall_core::{
    Connection, ConnectionAction, ConnectionConfig, ConnectionState, Environment,
};
use studyhall_harness::{SimEnv, SimInstant};
use studyhall_proto::{Command, Frame, GroupId};

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Open,
    TransportOpened,
    TransportClosed,
    Connected { heartbeat_ms: u16 },
    Message { subscription: u8 },
    BrokerError,
    Receipt,
    Heartbeat,
    Send,
    Tick { advance_ms: u16 },
    Close,
}

fuzz_target!(|ops: Vec<Op>| {
    let env = SimEnv::new();
    let mut connection: Connection<SimInstant> = Connection::new(ConnectionConfig::default());
    let Ok(group) = GroupId::new("7") else {
        return;
    };

    for op in ops {
        let before = connection.state();
        let now = env.now();

        let actions = match op {
            Op::Open => {
                let token = Secret::new("t".to_string());
                connection.open(group.clone(), token, now).unwrap_or_default()
            },
            Op::TransportOpened => connection.transport_opened(now).unwrap_or_default(),
            Op::TransportClosed => connection.transport_failed("reset", &env, now),
            Op::Connected { heartbeat_ms } => {
                let frame = Frame::new(Command::Connected)
                    .with_header("version", "1.2")
                    .with_header("heart-beat", format!("{heartbeat_ms},{heartbeat_ms}"));
                connection.handle_frame(&frame, now).unwrap_or_default()
            },
            Op::Message { subscription } => {
                let frame = Frame::new(Command::Message)
                    .with_header("subscription", format!("sub-{}", subscription % 4))
                    .with_body(r#"{"type":"CHAT","senderEmail":"a@x.com","content":"hi"}"#);
                connection.handle_frame(&frame, now).unwrap_or_default()
            },
            Op::BrokerError => {
                let frame = Frame::new(Command::Error).with_header("message", "nope");
                connection.handle_frame(&frame, now).unwrap_or_default()
            },
            Op::Receipt => {
                let frame = Frame::new(Command::Receipt).with_header("receipt-id", "1");
                connection.handle_frame(&frame, now).unwrap_or_default()
            },
            Op::Heartbeat => {
                connection.heartbeat_received(now);
                vec![]
            },
            Op::Send => connection.send(Frame::new(Command::Send), now),
            Op::Tick { advance_ms } => {
                env.advance(Duration::from_millis(u64::from(advance_ms)));
                connection.tick(&env, env.now())
            },
            Op::Close => {
                let actions = connection.close();
                assert_eq!(connection.state(), ConnectionState::Disconnected);
                actions
            },
        };

        let after = connection.state();
        let connected_reported = actions.iter().any(|a| matches!(a, ConnectionAction::Connected));
        assert_eq!(
            connected_reported,
            before != ConnectionState::Connected && after == ConnectionState::Connected,
            "Connected action mismatch: {before:?} -> {after:?}"
        );
        let subscribed = connection.subscriptions().next().is_some();
        assert_eq!(subscribed, after == ConnectionState::Connected);
        assert_eq!(connection.retry_at().is_some(), after == ConnectionState::Failed);
    }
});
