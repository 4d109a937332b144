//! Fuzz target for message bodies
//!
//! Feeds arbitrary text to every JSON entry point the client exposes to the
//! network: `WireMessage::from_json`, `parse_history` and `parse_timestamp`.
//!
//! The fuzzer should NEVER panic. Malformed bodies return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use studyhall_proto::{
    WireMessage,
    payloads::{parse_history, parse_timestamp},
};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(message) = WireMessage::from_json(text) {
        let _ = message.kind();
        // Unknown kinds may refuse to encode; known ones must not panic.
        let _ = message.to_json();
    }

    let _ = parse_history(text);
    let _ = parse_timestamp(text);
});
