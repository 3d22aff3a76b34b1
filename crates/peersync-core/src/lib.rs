//! peersync-core - Core library for peersync
//!
//! Records, the local `SQLite` store, Last-Write-Wins merging, and the
//! handshake/pull/push protocol shared by the node process and the CLI.

pub mod db;
pub mod error;
pub mod identity;
pub mod models;
pub mod services;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use identity::NodeIdentity;
pub use models::{NodeConfig, Record, TableKind, Timestamp};
pub use services::NodeStore;
