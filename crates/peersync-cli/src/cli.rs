use std::path::PathBuf;

use clap::{Parser, Subcommand};
use peersync_core::models::{NodeRole, WatermarkPolicy};

#[derive(Parser)]
#[command(name = "peersync")]
#[command(about = "Manage a peersync node: identity, sync cycles and local records")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding the node database and identity file
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Path to the node database (overrides --data-dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Path to the node identity file (overrides --data-dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect or change this node's identity and peer settings
    Node {
        #[command(subcommand)]
        command: NodeCommands,
    },
    /// Run one sync cycle with the configured peer
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
        /// Ask a running node at this address to run the cycle instead
        #[arg(long, value_name = "ADDR")]
        via: Option<String>,
        /// Handshake timeout in milliseconds
        #[arg(long, default_value = "2000")]
        handshake_timeout_ms: u64,
        /// Pull/push timeout in seconds
        #[arg(long, default_value = "10")]
        timeout_secs: u64,
        /// Output the cycle report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create, change and list records in the local store
    Record {
        #[command(subcommand)]
        command: RecordCommands,
    },
}

#[derive(Subcommand)]
pub enum NodeCommands {
    /// Show node identity, peer and watermarks
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the peer address (host:port or URL)
    SetPeer { address: String },
    /// Forget the peer; sync cycles are skipped until a new one is set
    ClearPeer,
    /// Set the node role
    SetRole { role: NodeRole },
    /// Enable sync cycles
    Enable,
    /// Disable sync cycles
    Disable,
    /// Set seconds between scheduled cycles
    Interval { seconds: u64 },
    /// Choose how the push boundary is tracked (combined or split)
    Policy { policy: WatermarkPolicy },
    /// Reset the watermarks of the current peer so the next cycle resends everything
    ResetWatermarks,
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// List incoming records discarded as stale
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum RecordCommands {
    /// List synchronizable tables and their columns
    Tables,
    /// Create a record: peersync record create Student name=Ama age=20
    Create {
        table: String,
        /// Column assignments as name=value
        #[arg(value_name = "NAME=VALUE")]
        fields: Vec<String>,
    },
    /// Change columns of a live record
    Update {
        table: String,
        global_id: String,
        /// Column assignments as name=value
        #[arg(value_name = "NAME=VALUE", required = true)]
        fields: Vec<String>,
    },
    /// Tombstone a record so the deletion reaches the peer
    Delete { table: String, global_id: String },
    /// Print one record as JSON
    Show { table: String, global_id: String },
    /// List recent records of a table
    List {
        table: String,
        /// Number of records to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Include tombstoned records
        #[arg(long)]
        deleted: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove tombstones older than the retention window
    Purge {
        /// Retention window in days
        #[arg(long, default_value = "30")]
        older_than_days: u32,
    },
}
