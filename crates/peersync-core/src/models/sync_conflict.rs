//! Sync conflict model

use serde::{Deserialize, Serialize};

use super::timestamp::Timestamp;

/// Incoming record discarded because the local copy was newer (LWW)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    /// Table of the discarded record
    pub table_name: String,
    /// Record involved in the conflict
    pub global_id: String,
    /// Existing row's timestamp when conflict occurred
    pub local_updated_at: Timestamp,
    /// Incoming row's timestamp that was rejected
    pub incoming_updated_at: Timestamp,
    /// When the conflict was resolved
    pub resolved_at: Timestamp,
    /// Resolution strategy name
    pub strategy: String,
}
