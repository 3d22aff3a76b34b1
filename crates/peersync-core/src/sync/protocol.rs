//! Handshake, pull, and push contracts shared by the server and client sides

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::Result;
use crate::models::{deserialize_lenient, NodeConfig, NodeRole, Record, Timestamp};
use crate::services::NodeStore;

/// Changed records keyed by table name as it appears on the wire.
///
/// Keys stay strings so a table unknown to this node can be reported instead
/// of failing the whole payload.
pub type ChangeSet = BTreeMap<String, Vec<Record>>;

/// A record as received from a peer.
///
/// Decoding never fails: an entry that does not parse as a [`Record`] is kept
/// raw with the reason, so one bad entry cannot sink the rest of its batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WireRecord {
    Valid(Record),
    Malformed { raw: Value, reason: String },
}

impl WireRecord {
    /// The entry's `global_id`, if present and not blank
    pub fn global_id(&self) -> Option<&str> {
        match self {
            Self::Valid(record) => record.global_id(),
            Self::Malformed { raw, .. } => raw
                .get("global_id")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|id| !id.is_empty()),
        }
    }
}

impl From<Record> for WireRecord {
    fn from(record: Record) -> Self {
        Self::Valid(record)
    }
}

impl Serialize for WireRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Valid(record) => record.serialize(serializer),
            Self::Malformed { raw, .. } => raw.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for WireRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(match Record::deserialize(&raw) {
            Ok(record) => Self::Valid(record),
            Err(error) => Self::Malformed {
                reason: error.to_string(),
                raw,
            },
        })
    }
}

/// Changes as they travel between nodes, each entry decoded on its own.
pub type WireChangeSet = BTreeMap<String, Vec<WireRecord>>;

/// Wrap local changes for the wire.
pub fn to_wire(changes: ChangeSet) -> WireChangeSet {
    changes
        .into_iter()
        .map(|(table, records)| (table, records.into_iter().map(WireRecord::from).collect()))
        .collect()
}

/// Total number of records in a change set
pub fn change_count<R>(changes: &BTreeMap<String, Vec<R>>) -> usize {
    changes.values().map(Vec::len).sum()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeResponse {
    pub status: String,
    pub node_id: String,
    #[serde(default)]
    pub role: NodeRole,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Exclusive lower bound; missing means "everything"
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub last_sync_timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    pub status: String,
    pub changes: WireChangeSet,
    pub count: usize,
    pub node_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    #[serde(default)]
    pub changes: WireChangeSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    pub status: String,
    pub processed: usize,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Identity probe answered by every node.
pub fn handshake(config: &NodeConfig) -> HandshakeResponse {
    HandshakeResponse {
        status: "ok".to_string(),
        node_id: config.node_id.clone(),
        role: config.node_role.clone(),
        timestamp: Timestamp::now(),
    }
}

/// Every local change, across all tables, newer than the request's watermark.
pub async fn pull(store: &NodeStore, node_id: &str, request: &PullRequest) -> Result<PullResponse> {
    let changes = store.changes_since(request.last_sync_timestamp).await?;
    let count = change_count(&changes);
    tracing::debug!(
        since = %request.last_sync_timestamp,
        count,
        "Serving pull request"
    );

    Ok(PullResponse {
        status: "success".to_string(),
        changes: to_wire(changes),
        count,
        node_id: node_id.to_string(),
    })
}

/// Merge a peer's pushed changes into the local store.
pub async fn push(store: &NodeStore, request: &PushRequest) -> Result<PushResponse> {
    let report = store.apply_changes(&request.changes).await?;
    tracing::debug!(
        received = change_count(&request.changes),
        processed = report.processed,
        errors = report.errors.len(),
        "Applied pushed changes"
    );

    Ok(PushResponse {
        status: "success".to_string(),
        processed: report.processed,
        errors: report.errors,
    })
}
