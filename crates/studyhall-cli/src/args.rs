//! Command-line arguments.
//!
//! Every option falls back to a `STUDYHALL_*` environment variable, so the
//! token never has to appear on the command line.

use std::time::Duration;

use clap::Parser;
use secrecy::{Secret, SecretString};
use studyhall_app::{DEFAULT_CALL_URL, SessionConfig};
use studyhall_client::ClientIdentity;
use studyhall_core::{ConnectionConfig, ReconnectPolicy, connection::DEFAULT_ENDPOINT};
use studyhall_proto::{GroupId, ProtocolError};

/// REST API root of a local backend.
pub const DEFAULT_API_BASE: &str = "http://localhost:8080/api";

/// Studyhall terminal client
#[derive(Parser, Debug)]
#[command(name = "studyhall")]
#[command(about = "Join a study group's live chat from the terminal")]
#[command(version)]
pub struct Args {
    /// Study group to join
    #[arg(short, long, env = "STUDYHALL_GROUP")]
    pub group: String,

    /// Your email address, as the backend knows it
    #[arg(short, long, env = "STUDYHALL_EMAIL")]
    pub email: String,

    /// Display name (defaults to the email)
    #[arg(short, long, env = "STUDYHALL_NAME")]
    pub name: Option<String>,

    /// Bearer token issued at login
    #[arg(long, env = "STUDYHALL_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Messaging WebSocket endpoint
    #[arg(long, env = "STUDYHALL_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// REST API root, for chat history
    #[arg(long, env = "STUDYHALL_API", default_value = DEFAULT_API_BASE)]
    pub api: String,

    /// Video call room opened by /call
    #[arg(long, env = "STUDYHALL_CALL_URL", default_value = DEFAULT_CALL_URL)]
    pub call_url: String,

    /// Seconds between reconnect attempts
    #[arg(long, default_value_t = 5)]
    pub reconnect_secs: u64,

    /// Back off exponentially up to this many seconds instead of retrying
    /// at a fixed interval
    #[arg(long)]
    pub backoff_max_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error) when `RUST_LOG` is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Group to join.
    pub fn group_id(&self) -> Result<GroupId, ProtocolError> {
        GroupId::new(self.group.as_str())
    }

    /// Local user.
    pub fn identity(&self) -> ClientIdentity {
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.email);
        ClientIdentity::new(self.email.as_str(), name)
    }

    /// Bearer token.
    pub fn token(&self) -> SecretString {
        Secret::new(self.token.clone())
    }

    /// Connection settings.
    pub fn connection_config(&self) -> ConnectionConfig {
        let delay = Duration::from_secs(self.reconnect_secs);
        let reconnect = match self.backoff_max_secs {
            Some(max) => ReconnectPolicy::Exponential {
                initial: delay,
                max: Duration::from_secs(max).max(delay),
            },
            None => ReconnectPolicy::Fixed { delay },
        };
        ConnectionConfig {
            endpoint: self.endpoint.clone(),
            reconnect,
            ..ConnectionConfig::default()
        }
    }

    /// View settings.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig { call_url: self.call_url.clone(), ..SessionConfig::default() }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let base = ["studyhall", "--group", "42", "--email", "alice@x.com", "--token", "t0k"];
        Args::try_parse_from(base.iter().chain(extra)).unwrap()
    }

    #[test]
    fn defaults() {
        let args = parse(&["--endpoint", DEFAULT_ENDPOINT]);

        assert_eq!(args.group_id().unwrap().as_str(), "42");
        assert_eq!(args.token().expose_secret(), "t0k");

        let config = args.connection_config();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.reconnect, ReconnectPolicy::Fixed { delay: Duration::from_secs(5) });
        assert!(config.endpoint_url().is_ok());
    }

    #[test]
    fn name_falls_back_to_email() {
        let args = parse(&["--name", "  "]);
        assert_eq!(args.identity(), ClientIdentity::new("alice@x.com", "alice@x.com"));

        let args = parse(&["--name", "Alice"]);
        assert_eq!(args.identity().name, "Alice");
    }

    #[test]
    fn backoff_option_selects_exponential() {
        let args = parse(&["--reconnect-secs", "2", "--backoff-max-secs", "60"]);

        assert_eq!(args.connection_config().reconnect, ReconnectPolicy::Exponential {
            initial: Duration::from_secs(2),
            max: Duration::from_secs(60),
        });
    }

    #[test]
    fn call_url_reaches_session_config() {
        let args = parse(&["--call-url", "https://example.com/room"]);
        assert_eq!(args.session_config().call_url, "https://example.com/room");
    }

    #[test]
    fn missing_token_is_an_error() {
        let result =
            Args::try_parse_from(["studyhall", "--group", "42", "--email", "alice@x.com"]);
        // Unless the environment supplies it.
        if std::env::var_os("STUDYHALL_TOKEN").is_none() {
            assert!(result.is_err());
        }
    }
}
