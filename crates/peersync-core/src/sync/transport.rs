//! Seam between the orchestrator and the wire

use std::future::Future;

use thiserror::Error;

use super::protocol::{ChangeSet, HandshakeResponse, PullResponse, PushResponse};
use crate::models::Timestamp;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid peer address '{0}'")]
    InvalidPeer(String),
    #[error("could not connect to peer: {0}")]
    Connect(String),
    #[error("peer did not answer in time")]
    Timeout,
    #[error("peer returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("could not decode peer response: {0}")]
    Decode(String),
    #[error("request to peer failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_connect() {
            Self::Connect(error.to_string())
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else if let Some(status) = error.status() {
            Self::Status {
                status: status.as_u16(),
                message: error.to_string(),
            }
        } else {
            Self::Request(error.to_string())
        }
    }
}

/// Client side of the sync protocol, addressed by peer address.
pub trait PeerTransport: Send + Sync {
    fn handshake(
        &self,
        peer: &str,
    ) -> impl Future<Output = Result<HandshakeResponse, TransportError>> + Send;

    fn pull(
        &self,
        peer: &str,
        since: Timestamp,
    ) -> impl Future<Output = Result<PullResponse, TransportError>> + Send;

    fn push(
        &self,
        peer: &str,
        changes: &ChangeSet,
    ) -> impl Future<Output = Result<PushResponse, TransportError>> + Send;
}
