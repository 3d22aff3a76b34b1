//! HTTP client for a peer node's sync API

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::protocol::{ChangeSet, HandshakeResponse, PullRequest, PullResponse, PushResponse};
use super::transport::{PeerTransport, TransportError};
use crate::models::Timestamp;
use crate::util::{error_snippet, peer_base_url};

/// Default bound on the liveness probe
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);
/// Default bound on pull and push requests
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct HttpPeerClient {
    client: reqwest::Client,
    handshake_timeout: Duration,
    request_timeout: Duration,
}

impl HttpPeerClient {
    pub fn new(
        handshake_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            handshake_timeout,
            request_timeout,
        })
    }

    async fn post<B, T>(
        &self,
        peer: &str,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<T, TransportError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let base = peer_base_url(peer).ok_or_else(|| TransportError::InvalidPeer(peer.into()))?;
        let response = self
            .client
            .post(format!("{base}{path}"))
            .header("Accept", "application/json")
            .timeout(timeout)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: parse_api_error(status, &body),
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|error| TransportError::Decode(error.to_string()))
    }
}

impl PeerTransport for HttpPeerClient {
    async fn handshake(&self, peer: &str) -> Result<HandshakeResponse, TransportError> {
        self.post(peer, "/sync/handshake", &serde_json::json!({}), self.handshake_timeout)
            .await
    }

    async fn pull(&self, peer: &str, since: Timestamp) -> Result<PullResponse, TransportError> {
        let request = PullRequest {
            last_sync_timestamp: since,
        };
        self.post(peer, "/sync/pull", &request, self.request_timeout)
            .await
    }

    async fn push(&self, peer: &str, changes: &ChangeSet) -> Result<PushResponse, TransportError> {
        // Same shape as `PushRequest`, borrowing the changes.
        #[derive(Serialize)]
        struct Body<'a> {
            changes: &'a ChangeSet,
        }
        self.post(peer, "/sync/push", &Body { changes }, self.request_timeout)
            .await
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    error: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{status}: {message}");
        }
    }
    let compact = error_snippet(body);
    if compact.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {compact}")
    }
}
