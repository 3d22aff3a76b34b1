use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use peersync_core::identity::NODE_CONFIG_FILE;
use thiserror::Error;

const DEFAULT_DB_FILE: &str = "peersync.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub node_config_path: PathBuf,
    pub handshake_timeout: Duration,
    pub request_timeout: Duration,
    /// Run the periodic scheduler; manual triggers work either way
    pub auto_sync: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "PEERSYNC_BIND_ADDR", "0.0.0.0:5000");
        if bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(
                "PEERSYNC_BIND_ADDR must be an IP:port socket address".to_string(),
            ));
        }

        let data_dir = PathBuf::from(value_or_default(&lookup, "PEERSYNC_DATA_DIR", "data"));
        let db_path = optional_trimmed(&lookup, "PEERSYNC_DB_PATH")
            .map_or_else(|| data_dir.join(DEFAULT_DB_FILE), PathBuf::from);
        let node_config_path = optional_trimmed(&lookup, "PEERSYNC_NODE_CONFIG")
            .map_or_else(|| data_dir.join(NODE_CONFIG_FILE), PathBuf::from);

        let handshake_timeout_ms =
            value_or_default(&lookup, "PEERSYNC_HANDSHAKE_TIMEOUT_MS", "2000")
                .parse::<u64>()
                .map_err(|_| {
                    ConfigError::Invalid(
                        "PEERSYNC_HANDSHAKE_TIMEOUT_MS must be an integer in [100, 60000]"
                            .to_string(),
                    )
                })?;
        if !(100..=60_000).contains(&handshake_timeout_ms) {
            return Err(ConfigError::Invalid(
                "PEERSYNC_HANDSHAKE_TIMEOUT_MS must be in [100, 60000]".to_string(),
            ));
        }

        let request_timeout_secs = value_or_default(&lookup, "PEERSYNC_REQUEST_TIMEOUT_SECS", "10")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "PEERSYNC_REQUEST_TIMEOUT_SECS must be an integer in [1, 300]".to_string(),
                )
            })?;
        if !(1..=300).contains(&request_timeout_secs) {
            return Err(ConfigError::Invalid(
                "PEERSYNC_REQUEST_TIMEOUT_SECS must be in [1, 300]".to_string(),
            ));
        }

        let auto_sync = parse_bool(&value_or_default(&lookup, "PEERSYNC_AUTO_SYNC", "true"))
            .ok_or_else(|| {
                ConfigError::Invalid("PEERSYNC_AUTO_SYNC must be true or false".to_string())
            })?;

        Ok(Self {
            bind_addr,
            data_dir,
            db_path,
            node_config_path,
            handshake_timeout: Duration::from_millis(handshake_timeout_ms),
            request_timeout: Duration::from_secs(request_timeout_secs),
            auto_sync,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
