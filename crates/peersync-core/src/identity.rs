//! Persistent node identity and peer configuration

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::models::NodeConfig;

/// File name used when only a data directory is configured
pub const NODE_CONFIG_FILE: &str = "node_config.json";

/// Handle to the node identity file.
///
/// Every [`load`](Self::load) re-reads the file, so edits made by other
/// processes (e.g. the CLI changing the peer) are picked up on the next cycle.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    path: PathBuf,
}

impl NodeIdentity {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Identity stored as [`NODE_CONFIG_FILE`] inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(NODE_CONFIG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted config, creating a default one on first run.
    ///
    /// A file that exists but cannot be parsed is an error; the identity is
    /// never regenerated behind the operator's back. A legacy `peer_ip` entry
    /// is rewritten as `peer_address`.
    pub fn load(&self) -> Result<NodeConfig> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => {
                let mut config: NodeConfig =
                    serde_json::from_str(&raw).map_err(|error| Error::Identity {
                        path: self.path.clone(),
                        message: error.to_string(),
                    })?;
                if config.adopt_legacy_peer() {
                    tracing::info!(
                        peer = %config.peer_address,
                        path = %self.path.display(),
                        "Migrated legacy peer_ip entry"
                    );
                    self.save(&config)?;
                }
                Ok(config)
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                let config = NodeConfig::default();
                self.save(&config)?;
                tracing::info!(
                    node_id = %config.node_id,
                    path = %self.path.display(),
                    "Created new node identity"
                );
                Ok(config)
            }
            Err(error) => Err(self.identity_error(&error)),
        }
    }

    /// Persist `config`, replacing the file atomically.
    pub fn save(&self, config: &NodeConfig) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|error| self.identity_error(&error))?;

        let payload = serde_json::to_vec_pretty(config)?;
        let mut file = NamedTempFile::new_in(dir).map_err(|error| self.identity_error(&error))?;
        file.write_all(&payload)
            .and_then(|()| file.as_file().sync_all())
            .map_err(|error| self.identity_error(&error))?;
        file.persist(&self.path)
            .map_err(|error| self.identity_error(&error.error))?;
        Ok(())
    }

    /// Load, apply `change`, and save.
    pub fn update<F>(&self, change: F) -> Result<NodeConfig>
    where
        F: FnOnce(&mut NodeConfig),
    {
        let mut config = self.load()?;
        change(&mut config);
        self.save(&config)?;
        Ok(config)
    }

    fn identity_error(&self, error: &std::io::Error) -> Error {
        Error::Identity {
            path: self.path.clone(),
            message: error.to_string(),
        }
    }
}
