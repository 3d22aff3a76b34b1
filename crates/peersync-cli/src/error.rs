use std::io;

use peersync_core::sync::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] peersync_core::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid field assignment: {0}")]
    InvalidField(String),
    #[error("Record ID cannot be empty")]
    EmptyRecordId,
    #[error("Record not found: {0}")]
    RecordNotFound(String),
    #[error("Configuration error: {0}")]
    Config(String),
}
