//! End-to-end session tests on the simulation harness.
//!
//! # Test Strategy
//!
//! Each test runs whole members (Runtime → App → Bridge → Client →
//! Connection) against the in-memory broker:
//! 1. Join the group (connect, subscribe, load history)
//! 2. Type lines, move the clock, break the network
//! 3. Settle until nothing is left to deliver
//! 4. Verify each member's view: log, banner, indicator, status

use std::time::Duration;

use chrono::{DateTime, Utc};
use studyhall_app::{ConnectionIndicator, DEFAULT_CALL_URL, HistoryState, SessionConfig};
use studyhall_client::ClientIdentity;
use studyhall_core::ConnectionConfig;
use studyhall_harness::SimCluster;
use studyhall_proto::{ChatPayload, Command, GroupId, HeartBeat};

fn group() -> GroupId {
    GroupId::new("42").unwrap()
}

fn cluster() -> SimCluster {
    SimCluster::new(0, group())
}

fn sent_commands(cluster: &SimCluster, index: usize, command: Command) -> usize {
    cluster
        .session(index)
        .driver()
        .sent_frames()
        .iter()
        .filter(|frame| frame.command == command)
        .count()
}

#[test]
fn join_connects_and_subscribes_both_topics() {
    let mut cluster = cluster();
    let alice = cluster.join("alice@x.com", "Alice").unwrap();

    let session = cluster.session(alice);
    assert_eq!(session.app().indicator(), ConnectionIndicator::Connected);
    assert_eq!(session.app().history(), &HistoryState::Loaded);
    assert_eq!(sent_commands(&cluster, alice, Command::Connect), 1);
    assert_eq!(sent_commands(&cluster, alice, Command::Subscribe), 2);

    let broker = cluster.broker();
    assert_eq!(broker.subscriber_count("/topic/group/42"), 1);
    assert_eq!(broker.subscriber_count("/topic/group/42/call"), 1);
}

#[test]
fn chat_reaches_every_member_once() {
    let mut cluster = cluster();
    let alice = cluster.join("alice@x.com", "Alice").unwrap();
    let bob = cluster.join("bob@x.com", "Bob").unwrap();

    cluster.type_line(alice, "  anyone up for flashcards?  ").unwrap();

    // The sender sees the rebroadcast, not a local echo.
    for index in [alice, bob] {
        assert_eq!(cluster.session(index).log_contents(), vec!["anyone up for flashcards?"]);
    }

    let entry = &cluster.session(bob).app().log()[0];
    assert_eq!(entry.sender_email, "alice@x.com");
    assert_eq!(entry.sender_name, "Alice");
    assert!(!entry.timestamp_defaulted);
    assert_eq!(entry.timestamp, "2024-01-01T09:00:00Z".parse::<DateTime<Utc>>().unwrap());
}

#[test]
fn lowercase_chat_without_timestamp_is_logged() {
    let mut cluster = cluster();
    let alice = cluster.join("alice@x.com", "Alice").unwrap();

    cluster.broker().inject_message(
        "/topic/group/42",
        concat!(
            r#"{"type":"CHAT","senderEmail":"a@x.com","senderName":"Alice","#,
            r#""content":"hi","timestamp":"2024-01-01T00:00:00Z"}"#
        ),
    );
    cluster.settle().unwrap();
    assert_eq!(cluster.session(alice).log_contents(), vec!["hi"]);

    cluster.broker().inject_message(
        "/topic/group/42",
        r#"{"type":"chat","senderEmail":"b@x.com","senderName":"Bob","content":"yo"}"#,
    );
    cluster.settle().unwrap();

    let log = cluster.session(alice).app().log();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].content, "yo");
    assert!(!log[0].timestamp_defaulted);
    assert!(log[1].timestamp_defaulted);
    // Defaulted to the virtual wall clock at receipt.
    assert_eq!(log[1].timestamp, "2024-01-01T09:00:00Z".parse::<DateTime<Utc>>().unwrap());
}

#[test]
fn messages_keep_arrival_order() {
    let mut cluster = cluster();
    let alice = cluster.join("alice@x.com", "Alice").unwrap();
    let bob = cluster.join("bob@x.com", "Bob").unwrap();

    cluster.type_line(alice, "one").unwrap();
    cluster.type_line(bob, "two").unwrap();
    cluster.advance(Duration::from_secs(1)).unwrap();
    cluster.type_line(alice, "three").unwrap();

    for index in [alice, bob] {
        assert_eq!(cluster.session(index).log_contents(), vec!["one", "two", "three"]);
    }
}

#[test]
fn blank_line_sends_nothing() {
    let mut cluster = cluster();
    let alice = cluster.join("alice@x.com", "Alice").unwrap();

    cluster.type_line(alice, "   ").unwrap();

    assert_eq!(sent_commands(&cluster, alice, Command::Send), 0);
    assert!(cluster.session(alice).app().log().is_empty());
}

#[test]
fn call_start_shows_banner_to_others_only() {
    let mut cluster = cluster();
    let alice = cluster.join("alice@x.com", "Alice").unwrap();
    let bob = cluster.join("bob@x.com", "Bob").unwrap();

    cluster.type_line(alice, "/call").unwrap();

    let caller = cluster.session(alice);
    assert!(caller.app().call_banner().is_none());
    assert_eq!(caller.driver().opened_calls(), [DEFAULT_CALL_URL.to_string()]);
    assert_eq!(caller.app().status_message(), Some("Starting video call..."));

    let banner = cluster.session(bob).app().call_banner().unwrap();
    assert_eq!(banner.sender, "alice@x.com");
    assert_eq!(banner.message, "alice@x.com has started a video call");

    // Call signals never land in the chat log.
    assert!(cluster.session(bob).app().log().is_empty());
}

#[test]
fn call_banner_expires_after_eight_seconds() {
    let mut cluster = cluster();
    let alice = cluster.join("alice@x.com", "Alice").unwrap();
    let bob = cluster.join("bob@x.com", "Bob").unwrap();

    cluster.type_line(alice, "/call").unwrap();

    cluster.advance_in_steps(Duration::from_secs(7), Duration::from_secs(1)).unwrap();
    assert!(cluster.session(bob).app().call_banner().is_some());

    cluster.advance(Duration::from_secs(1)).unwrap();
    assert!(cluster.session(bob).app().call_banner().is_none());
}

#[test]
fn newer_call_replaces_banner() {
    let mut cluster = cluster();
    let alice = cluster.join("alice@x.com", "Alice").unwrap();
    let bob = cluster.join("bob@x.com", "Bob").unwrap();
    let carol = cluster.join("carol@x.com", "Carol").unwrap();

    cluster.type_line(alice, "/call").unwrap();
    cluster.advance(Duration::from_secs(5)).unwrap();
    cluster.type_line(bob, "/call").unwrap();

    let banner = cluster.session(carol).app().call_banner().unwrap();
    assert_eq!(banner.sender, "bob@x.com");

    // Alice's banner would have expired at 8s; Bob's runs until 13s.
    cluster.advance_in_steps(Duration::from_secs(7), Duration::from_secs(1)).unwrap();
    assert!(cluster.session(carol).app().call_banner().is_some());
    cluster.advance(Duration::from_secs(1)).unwrap();
    assert!(cluster.session(carol).app().call_banner().is_none());
}

#[test]
fn history_loads_on_join() {
    let mut cluster = cluster();
    cluster.broker().seed_history(&group(), [
        ChatPayload {
            sender_email: "dana@x.com".to_string(),
            sender_name: Some("Dana".to_string()),
            content: "see you at 6".to_string(),
            timestamp: Some("2023-12-31T18:00:00".to_string()),
        },
        ChatPayload {
            sender_email: "erin@x.com".to_string(),
            sender_name: None,
            content: "bring snacks".to_string(),
            timestamp: None,
        },
    ]);

    let alice = cluster.join("alice@x.com", "Alice").unwrap();

    let log = cluster.session(alice).app().log();
    assert_eq!(cluster.session(alice).log_contents(), vec!["see you at 6", "bring snacks"]);
    assert_eq!(log[1].sender_name, "erin@x.com");
    assert!(log[1].timestamp_defaulted);
}

#[test]
fn late_joiner_sees_earlier_messages() {
    let mut cluster = cluster();
    let alice = cluster.join("alice@x.com", "Alice").unwrap();
    cluster.type_line(alice, "first").unwrap();

    let bob = cluster.join("bob@x.com", "Bob").unwrap();
    cluster.type_line(alice, "second").unwrap();

    assert_eq!(cluster.session(bob).log_contents(), vec!["first", "second"]);
    assert_eq!(cluster.session(alice).log_contents(), vec!["first", "second"]);
}

#[test]
fn history_failure_keeps_live_messages() {
    let mut cluster = cluster();
    cluster.broker().set_history_available(false);
    let alice = cluster.join("alice@x.com", "Alice").unwrap();
    let bob = cluster.join("bob@x.com", "Bob").unwrap();

    let app = cluster.session(alice).app();
    assert_eq!(app.history(), &HistoryState::Failed);
    assert_eq!(app.status_message(), Some("Could not load chat history: history unavailable"));
    assert_eq!(app.indicator(), ConnectionIndicator::Connected);

    cluster.type_line(bob, "still here").unwrap();
    assert_eq!(cluster.session(alice).log_contents(), vec!["still here"]);
}

#[test]
fn history_command_reloads() {
    let mut cluster = cluster();
    cluster.broker().set_history_available(false);
    let alice = cluster.join("alice@x.com", "Alice").unwrap();
    let bob = cluster.join("bob@x.com", "Bob").unwrap();
    cluster.type_line(bob, "hello").unwrap();

    cluster.broker().set_history_available(true);
    cluster.type_line(alice, "/history").unwrap();

    let app = cluster.session(alice).app();
    assert_eq!(app.history(), &HistoryState::Loaded);
    assert_eq!(cluster.session(alice).log_contents(), vec!["hello"]);
}

#[test]
fn reconnects_after_network_drop() {
    let mut cluster = cluster();
    let alice = cluster.join("alice@x.com", "Alice").unwrap();
    let bob = cluster.join("bob@x.com", "Bob").unwrap();

    cluster.broker().kill_all("connection reset");
    cluster.settle().unwrap();

    let app = cluster.session(alice).app();
    assert_eq!(app.consecutive_errors(), 1);
    assert!(app.status_message().is_some_and(|m| m.contains("connection reset")));
    assert_eq!(cluster.broker().session_count(), 0);

    // Fixed 5s retry.
    cluster.advance(Duration::from_secs(4)).unwrap();
    assert_eq!(cluster.session(alice).driver().transports_opened(), 1);
    cluster.advance(Duration::from_secs(1)).unwrap();

    for index in [alice, bob] {
        let session = cluster.session(index);
        assert_eq!(session.driver().transports_opened(), 2);
        assert_eq!(session.app().indicator(), ConnectionIndicator::Connected);
        assert_eq!(session.app().consecutive_errors(), 0);
        assert_eq!(session.app().status_message(), None);
    }

    cluster.type_line(bob, "back").unwrap();
    assert_eq!(cluster.session(alice).log_contents(), vec!["back"]);
}

#[test]
fn repeated_failures_show_lost_until_reconnected() {
    let mut cluster = cluster();
    cluster.broker().set_online(false);
    let alice = cluster.join("alice@x.com", "Alice").unwrap();

    assert_ne!(cluster.session(alice).app().indicator(), ConnectionIndicator::Lost);

    cluster.advance(Duration::from_secs(5)).unwrap();
    cluster.advance(Duration::from_secs(5)).unwrap();

    let app = cluster.session(alice).app();
    assert_eq!(app.consecutive_errors(), 3);
    assert_eq!(app.indicator(), ConnectionIndicator::Lost);
    assert_eq!(app.indicator().label(), "Connection lost, retrying...");

    cluster.broker().set_online(true);
    cluster.advance(Duration::from_secs(5)).unwrap();

    let app = cluster.session(alice).app();
    assert_eq!(app.indicator(), ConnectionIndicator::Connected);
    assert_eq!(app.status_message(), None);
}

#[test]
fn unknown_token_is_rejected() {
    let mut cluster = cluster();
    let mallory = cluster
        .join_with(
            ClientIdentity::new("mallory@x.com", "Mallory"),
            "forged",
            ConnectionConfig::default(),
            SessionConfig::default(),
        )
        .unwrap();

    // ERROR then close is one failed attempt.
    let app = cluster.session(mallory).app();
    assert_ne!(app.indicator(), ConnectionIndicator::Connected);
    assert_eq!(app.consecutive_errors(), 1);
    assert!(app.status_message().is_some_and(|m| m.contains("Unauthorized")));
    assert_eq!(cluster.broker().session_count(), 0);
}

#[test]
fn third_rejected_login_shows_lost() {
    let mut cluster = cluster();
    let mallory = cluster
        .join_with(
            ClientIdentity::new("mallory@x.com", "Mallory"),
            "forged",
            ConnectionConfig::default(),
            SessionConfig::default(),
        )
        .unwrap();

    cluster.advance(Duration::from_secs(5)).unwrap();
    let app = cluster.session(mallory).app();
    assert_eq!(app.consecutive_errors(), 2);
    assert_ne!(app.indicator(), ConnectionIndicator::Lost);

    cluster.advance(Duration::from_secs(5)).unwrap();
    let app = cluster.session(mallory).app();
    assert_eq!(cluster.session(mallory).driver().transports_opened(), 3);
    assert_eq!(app.consecutive_errors(), 3);
    assert_eq!(app.indicator(), ConnectionIndicator::Lost);
}

#[test]
fn silent_broker_triggers_reconnect() {
    let mut cluster = cluster();
    let interval = Duration::from_secs(10);
    cluster.broker().set_heartbeat(HeartBeat::new(interval, interval));
    let alice = cluster.join("alice@x.com", "Alice").unwrap();

    // Nothing from the broker for more than twice the interval.
    cluster.advance_in_steps(Duration::from_secs(25), Duration::from_secs(1)).unwrap();

    let session = cluster.session(alice);
    assert!(session.driver().heartbeats_sent() >= 2);
    assert!(session.app().status_message().is_some_and(|m| m.contains("no data from broker")));
    assert_eq!(cluster.broker().session_count(), 0);

    cluster.advance_in_steps(Duration::from_secs(5), Duration::from_secs(1)).unwrap();
    let session = cluster.session(alice);
    assert_eq!(session.driver().transports_opened(), 2);
    assert_eq!(session.app().indicator(), ConnectionIndicator::Connected);
}

#[test]
fn broker_heartbeats_keep_connection_alive() {
    let mut cluster = cluster();
    let interval = Duration::from_secs(10);
    cluster.broker().set_heartbeat(HeartBeat::new(interval, interval));
    let alice = cluster.join("alice@x.com", "Alice").unwrap();

    for _ in 0..60 {
        cluster.broker().send_heartbeats();
        cluster.advance(Duration::from_secs(1)).unwrap();
    }

    let session = cluster.session(alice);
    assert_eq!(session.driver().transports_opened(), 1);
    assert_eq!(session.app().indicator(), ConnectionIndicator::Connected);
    assert_eq!(session.app().consecutive_errors(), 0);
}

#[test]
fn leaving_sends_disconnect_and_stops() {
    let mut cluster = cluster();
    let alice = cluster.join("alice@x.com", "Alice").unwrap();
    let bob = cluster.join("bob@x.com", "Bob").unwrap();
    cluster.type_line(bob, "/call").unwrap();
    assert!(cluster.session(alice).app().call_banner().is_some());

    cluster.leave(alice).unwrap();

    let session = cluster.session(alice);
    assert!(session.has_quit());
    assert!(session.driver().is_stopped());
    assert_eq!(sent_commands(&cluster, alice, Command::Disconnect), 1);
    assert_eq!(session.app().indicator(), ConnectionIndicator::Disconnected);
    assert!(session.app().call_banner().is_none());
    assert_eq!(cluster.broker().session_count(), 1);

    // No retry after a deliberate leave.
    cluster.advance_in_steps(Duration::from_secs(30), Duration::from_secs(5)).unwrap();
    assert_eq!(cluster.session(alice).driver().transports_opened(), 1);

    cluster.type_line(bob, "bye").unwrap();
    assert!(cluster.session(alice).log_contents().is_empty());
}

#[test]
fn quit_command_leaves_group() {
    let mut cluster = cluster();
    let alice = cluster.join("alice@x.com", "Alice").unwrap();

    cluster.type_line(alice, "/quit").unwrap();

    assert!(cluster.session(alice).has_quit());
    assert_eq!(sent_commands(&cluster, alice, Command::Disconnect), 1);
    assert_eq!(cluster.broker().session_count(), 0);
}

#[test]
fn unknown_command_is_reported_not_sent() {
    let mut cluster = cluster();
    let alice = cluster.join("alice@x.com", "Alice").unwrap();

    cluster.type_line(alice, "/dance").unwrap();

    assert_eq!(cluster.session(alice).app().status_message(), Some("Unknown command: /dance"));
    assert_eq!(sent_commands(&cluster, alice, Command::Send), 0);
}

#[test]
fn messages_sent_while_disconnected_are_dropped() {
    let mut cluster = cluster();
    let alice = cluster.join("alice@x.com", "Alice").unwrap();
    let bob = cluster.join("bob@x.com", "Bob").unwrap();

    cluster.broker().kill_all("network down");
    cluster.settle().unwrap();
    cluster.type_line(alice, "lost in transit").unwrap();

    cluster.advance(Duration::from_secs(5)).unwrap();

    assert!(cluster.session(bob).log_contents().is_empty());
    assert!(cluster.broker().history(&group()).unwrap().is_empty());
}
