//! `heart-beat` header handling.

use std::time::Duration;

use crate::errors::{ProtocolError, Result};

/// Heart-beat capabilities announced in a `CONNECT` or `CONNECTED` frame.
///
/// `outgoing` is the smallest interval at which the announcing side can send
/// heart-beats, `incoming` the interval at which it wants to receive them.
/// Zero means "cannot" / "does not want".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    /// Interval the announcing side can send at.
    pub outgoing: Duration,
    /// Interval the announcing side wants to receive at.
    pub incoming: Duration,
}

impl HeartBeat {
    /// No heart-beats in either direction (`0,0`).
    pub const DISABLED: Self = Self { outgoing: Duration::ZERO, incoming: Duration::ZERO };

    /// Create a heart-beat announcement.
    pub fn new(outgoing: Duration, incoming: Duration) -> Self {
        Self { outgoing, incoming }
    }

    /// Parse a `cx,cy` header value in milliseconds.
    pub fn parse(value: &str) -> Result<Self> {
        let (out, inc) =
            value.split_once(',').ok_or_else(|| ProtocolError::InvalidHeartBeat(value.into()))?;
        let parse_ms = |raw: &str| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ProtocolError::InvalidHeartBeat(value.into()))
        };
        Ok(Self { outgoing: parse_ms(out)?, incoming: parse_ms(inc)? })
    }

    /// Header value in `cx,cy` form.
    pub fn to_header(&self) -> String {
        format!("{},{}", self.outgoing.as_millis(), self.incoming.as_millis())
    }

    /// Negotiate effective intervals from the client's side.
    ///
    /// Returns `(send, receive)`: how often the client must send a heart-beat
    /// and how often it can expect one from the broker. `None` disables that
    /// direction.
    pub fn negotiate(client: Self, server: Self) -> (Option<Duration>, Option<Duration>) {
        let pick = |ours: Duration, theirs: Duration| {
            if ours.is_zero() || theirs.is_zero() { None } else { Some(ours.max(theirs)) }
        };
        (pick(client.outgoing, server.incoming), pick(client.incoming, server.outgoing))
    }
}
