//! STOMP frame codec.
//!
//! A frame is a command line, header lines, a blank line, a body and a NUL
//! octet. Frames travel as WebSocket text messages, one frame per message. A
//! message holding only end-of-line characters is a heart-beat.
//!
//! # Invariants
//!
//! - Header values of escaping frames never contain a raw `\n`, `\r` or `:`
//!   after encoding; [`Frame::decode`] reverses the escaping exactly.
//! - `CONNECT`, `STOMP` and `CONNECTED` headers are written verbatim (STOMP
//!   1.2 leaves them unescaped for 1.0 compatibility).
//! - When a body is present and the caller did not set `content-length`, the
//!   encoder adds it, so bodies may contain NUL octets.

use std::fmt;

use crate::errors::{ProtocolError, Result};

/// Header naming the body size in octets.
const CONTENT_LENGTH: &str = "content-length";

/// STOMP commands exchanged between a group session client and the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Client opens a STOMP session.
    Connect,
    /// STOMP 1.2 alias of `CONNECT`.
    Stomp,
    /// Broker accepted the session.
    Connected,
    /// Client publishes to a destination.
    Send,
    /// Client subscribes to a destination.
    Subscribe,
    /// Client cancels a subscription.
    Unsubscribe,
    /// Client ends the session.
    Disconnect,
    /// Broker delivers a message for a subscription.
    Message,
    /// Broker acknowledges a frame that asked for a receipt.
    Receipt,
    /// Broker reports an error. The broker closes the connection afterwards.
    Error,
}

impl Command {
    /// Wire spelling of the command.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// Parse a command line.
    pub fn parse(line: &str) -> Result<Self> {
        match line {
            "CONNECT" => Ok(Self::Connect),
            "STOMP" => Ok(Self::Stomp),
            "CONNECTED" => Ok(Self::Connected),
            "SEND" => Ok(Self::Send),
            "SUBSCRIBE" => Ok(Self::Subscribe),
            "UNSUBSCRIBE" => Ok(Self::Unsubscribe),
            "DISCONNECT" => Ok(Self::Disconnect),
            "MESSAGE" => Ok(Self::Message),
            "RECEIPT" => Ok(Self::Receipt),
            "ERROR" => Ok(Self::Error),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }

    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Stomp | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame.
///
/// Headers keep their wire order. When a header repeats, the first
/// occurrence wins, matching STOMP 1.2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command.
    pub command: Command,
    /// Headers in wire order (already unescaped).
    pub headers: Vec<(String, String)>,
    /// Frame body. Empty for most control frames.
    pub body: String,
}

impl Frame {
    /// Largest frame accepted by [`Frame::decode`] (1 MiB).
    pub const MAX_SIZE: usize = 1 << 20;

    /// Heart-beat payload: a single end-of-line.
    pub const HEARTBEAT: &'static str = "\n";

    /// Create a frame with no headers and an empty body.
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self { command, headers: Vec::new(), body: String::new() }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header. `None` if absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    /// Encode to wire text, including the trailing NUL.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(self.body.len() + 64);

        out.push_str(self.command.as_str());
        out.push('\n');

        for (name, value) in &self.headers {
            push_header_part(&mut out, name, escape);
            out.push(':');
            push_header_part(&mut out, value, escape);
            out.push('\n');
        }

        if !self.body.is_empty() && self.header(CONTENT_LENGTH).is_none() {
            out.push_str(CONTENT_LENGTH);
            out.push(':');
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }

        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decode one frame from a WebSocket text message.
    ///
    /// Returns `None` for a heart-beat (only end-of-line characters). Bytes
    /// after the NUL terminator are ignored.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooLarge` if `text` exceeds [`Frame::MAX_SIZE`]
    /// - `ProtocolError::UnknownCommand` for an unrecognised command line
    /// - `ProtocolError::MalformedHeader` / `InvalidEscape` for bad headers
    /// - `ProtocolError::InvalidContentLength` / `MissingTerminator` for a
    ///   body that does not match its framing
    pub fn decode(text: &str) -> Result<Option<Self>> {
        if text.len() > Self::MAX_SIZE {
            return Err(ProtocolError::FrameTooLarge { size: text.len(), max: Self::MAX_SIZE });
        }

        let mut remaining = text.trim_start_matches(['\r', '\n']);
        if remaining.is_empty() {
            return Ok(None);
        }

        let command = Command::parse(next_line(&mut remaining)?)?;
        let escape = command.escapes_headers();

        let mut headers = Vec::new();
        loop {
            let line = next_line(&mut remaining)?;
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ProtocolError::MalformedHeader(line.to_string()))?;
            if escape {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length =
            headers.iter().find(|(name, _)| name == CONTENT_LENGTH).map(|(_, v)| v.clone());

        let body = match content_length {
            Some(raw) => {
                let len: usize = raw
                    .trim()
                    .parse()
                    .map_err(|_| ProtocolError::InvalidContentLength(raw.clone()))?;
                let body = remaining.get(..len).ok_or_else(|| {
                    ProtocolError::InvalidContentLength(format!(
                        "{len} exceeds the {} bytes left in the frame",
                        remaining.len()
                    ))
                })?;
                match remaining.get(len..) {
                    Some(tail) if tail.starts_with('\0') => body.to_string(),
                    _ => return Err(ProtocolError::MissingTerminator),
                }
            },
            None => {
                let (body, _) =
                    remaining.split_once('\0').ok_or(ProtocolError::MissingTerminator)?;
                body.to_string()
            },
        };

        Ok(Some(Self { command, headers, body }))
    }
}

/// Take the next line, accepting both `\n` and `\r\n` endings.
fn next_line<'a>(remaining: &mut &'a str) -> Result<&'a str> {
    let (line, rest) = remaining.split_once('\n').ok_or(ProtocolError::MissingTerminator)?;
    *remaining = rest;
    Ok(line.strip_suffix('\r').unwrap_or(line))
}

fn push_header_part(out: &mut String, raw: &str, escape: bool) {
    if !escape {
        out.push_str(raw);
        return;
    }
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
}

fn unescape(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            _ => return Err(ProtocolError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}
