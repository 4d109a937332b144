//! Property-based tests for STOMP frame encoding/decoding
//!
//! Header escaping and `content-length` framing must survive arbitrary
//! header values and bodies, including the characters STOMP reserves.

use proptest::prelude::*;
use studyhall_proto::{Command, Frame, WireMessage, payloads::parse_timestamp};

/// Commands whose headers are escaped on the wire
fn escaping_command() -> impl Strategy<Value = Command> {
    prop_oneof![
        Just(Command::Send),
        Just(Command::Subscribe),
        Just(Command::Unsubscribe),
        Just(Command::Disconnect),
        Just(Command::Message),
        Just(Command::Receipt),
        Just(Command::Error),
    ]
}

/// Header values drawn from printable text plus the reserved characters
fn header_value() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 /:\\\\\r\n._-]{0,24}"
}

fn arbitrary_frame() -> impl Strategy<Value = Frame> {
    (
        escaping_command(),
        prop::collection::vec(("[a-z][a-z-]{0,11}", header_value()), 0..6),
        any::<String>(),
    )
        .prop_map(|(command, headers, body)| {
            let headers =
                headers.into_iter().filter(|(name, _)| name != "content-length").collect();
            Frame { command, headers, body }
        })
}

proptest! {
    #[test]
    fn decode_reverses_encode(frame in arbitrary_frame()) {
        let decoded = Frame::decode(&frame.encode())
            .expect("encoded frame must decode")
            .expect("encoded frame is not a heart-beat");

        prop_assert_eq!(decoded.command, frame.command);
        prop_assert_eq!(&decoded.body, &frame.body);
        prop_assert_eq!(&decoded.headers[..frame.headers.len()], &frame.headers[..]);
    }

    #[test]
    fn decode_never_panics(text in any::<String>()) {
        let _ = Frame::decode(&text);
    }

    #[test]
    fn payload_decode_never_panics(body in any::<String>()) {
        let _ = WireMessage::from_json(&body);
    }

    #[test]
    fn chat_content_survives_json(
        content in any::<String>(),
        email in "[a-z]{1,8}@[a-z]{1,8}\\.com",
    ) {
        let body = serde_json::json!({
            "type": "CHAT",
            "senderEmail": email,
            "content": content,
        })
        .to_string();

        match WireMessage::from_json(&body) {
            Ok(WireMessage::Chat(chat)) => {
                prop_assert_eq!(chat.content, content);
                prop_assert_eq!(chat.sender_email, email);
            },
            other => prop_assert!(false, "unexpected decode result: {:?}", other),
        }
    }

    #[test]
    fn timestamp_parse_never_panics(raw in any::<String>()) {
        let _ = parse_timestamp(&raw);
    }
}
