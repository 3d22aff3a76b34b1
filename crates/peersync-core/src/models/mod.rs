//! Data models for peersync

mod node;
mod record;
mod sync_conflict;
mod table;
mod timestamp;

pub use node::{
    generate_node_id, NodeConfig, NodeRole, WatermarkPolicy, DEFAULT_SYNC_INTERVAL_SECS,
};
pub use record::{new_global_id, Record, SyncStatus};
pub use sync_conflict::SyncConflict;
pub use table::{Column, ColumnType, SchemaError, TableKind};
pub use timestamp::{deserialize_lenient, deserialize_lenient_option, Timestamp};
