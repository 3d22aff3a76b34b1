//! Error types for peersync-core

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using peersync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in peersync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Node identity file could not be read or written
    #[error("Node identity error at '{}': {message}", path.display())]
    Identity { path: PathBuf, message: String },

    /// Sync scheduler could not run a cycle
    #[error("Sync error: {0}")]
    Sync(String),

    /// Record failed schema validation
    #[error(transparent)]
    Schema(#[from] crate::models::SchemaError),
}
