//! Chat history over REST.
//!
//! The messaging endpoint only carries live traffic. Earlier messages of a
//! group come from `GET {api}/chat/{group}/history`, authenticated with the
//! same bearer token.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use studyhall_proto::{GroupId, ProtocolError, payloads::parse_history};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::event::ChatLogEntry;

/// History fetch errors.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// API base URL is not usable.
    #[error("invalid API base {0:?}")]
    InvalidBase(String),

    /// Request failed or the server answered with an error status.
    #[error("history request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Response body is not a list of chat messages.
    #[error("history response: {0}")]
    Decode(#[from] ProtocolError),
}

/// REST client for a backend's chat history.
#[derive(Debug, Clone)]
pub struct HistoryClient {
    http: reqwest::Client,
    base: Url,
}

impl HistoryClient {
    /// Client for the API rooted at `api_base` (e.g. `http://localhost:8080/api`).
    pub fn new(api_base: &str) -> Result<Self, HistoryError> {
        let base = Url::parse(api_base.trim_end_matches('/'))
            .map_err(|e| HistoryError::InvalidBase(format!("{api_base}: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(HistoryError::InvalidBase(api_base.to_string()));
        }
        Ok(Self { http: reqwest::Client::new(), base })
    }

    /// URL of a group's history.
    pub fn history_url(&self, group: &GroupId) -> Result<Url, HistoryError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| HistoryError::InvalidBase(self.base.to_string()))?
            .pop_if_empty()
            .extend(["chat", group.as_str(), "history"]);
        Ok(url)
    }

    /// Fetch a group's history, oldest first.
    ///
    /// Entries without a usable timestamp get `received_at`.
    pub async fn fetch(
        &self,
        group: &GroupId,
        token: &SecretString,
        received_at: DateTime<Utc>,
    ) -> Result<Vec<ChatLogEntry>, HistoryError> {
        let url = self.history_url(group)?;
        debug!(%group, "fetching chat history");

        let body = self
            .http
            .get(url)
            .bearer_auth(token.expose_secret())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let entries = parse_history(&body)?
            .into_iter()
            .map(|payload| ChatLogEntry::from_payload(payload, received_at))
            .collect::<Vec<_>>();
        debug!(%group, count = entries.len(), "chat history loaded");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_url_appends_segments() {
        let client = HistoryClient::new("http://localhost:8080/api/").unwrap();
        let url = client.history_url(&GroupId::new("42").unwrap()).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/chat/42/history");
    }

    #[test]
    fn rejects_non_http_base() {
        assert!(matches!(HistoryClient::new("ws://localhost"), Err(HistoryError::InvalidBase(_))));
        assert!(matches!(HistoryClient::new("not a url"), Err(HistoryError::InvalidBase(_))));
    }
}
