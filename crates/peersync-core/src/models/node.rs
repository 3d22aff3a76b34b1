//! Per-installation node configuration

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

use super::timestamp::Timestamp;
use crate::util::non_blank;

const PULL_WATERMARK_PREFIX: &str = "last_sync_with_";
const PUSH_WATERMARK_PREFIX: &str = "last_push_with_";

/// Older identity files stored a bare peer host under this key
const LEGACY_PEER_KEY: &str = "peer_ip";
/// Port every legacy node served its sync API on
pub const LEGACY_PEER_PORT: u16 = 5000;

/// Default seconds between scheduled sync cycles
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;

/// Advisory role of a node; never consulted by the merge logic.
///
/// Roles this build does not know are carried verbatim, and a missing or null
/// role reads as [`NodeRole::Unassigned`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NodeRole {
    #[default]
    Unassigned,
    Secretary,
    Counsellor,
    Other(String),
}

impl NodeRole {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unassigned => "Unassigned",
            Self::Secretary => "SECRETARY",
            Self::Counsellor => "COUNSELLOR",
            Self::Other(role) => role,
        }
    }

    fn from_wire(value: &str) -> Self {
        value
            .parse()
            .unwrap_or_else(|_| Self::Other(value.trim().to_string()))
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "unassigned" => Ok(Self::Unassigned),
            "secretary" => Ok(Self::Secretary),
            "counsellor" | "counselor" => Ok(Self::Counsellor),
            other => Err(format!("unknown node role '{other}'")),
        }
    }
}

impl Serialize for NodeRole {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeRole {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Self::Unassigned,
            Some(Value::String(role)) => Self::from_wire(&role),
            Some(other) => Self::Other(other.to_string()),
        })
    }
}

/// How the push boundary of a cycle is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkPolicy {
    /// One watermark per peer, advanced after pull+apply; push reuses the
    /// pre-cycle value.
    #[default]
    Combined,
    /// A separate push watermark, advanced only when a push fully succeeds.
    Split,
}

impl fmt::Display for WatermarkPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Combined => f.write_str("combined"),
            Self::Split => f.write_str("split"),
        }
    }
}

impl std::str::FromStr for WatermarkPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "combined" => Ok(Self::Combined),
            "split" => Ok(Self::Split),
            other => Err(format!("unknown watermark policy '{other}'")),
        }
    }
}

/// Persisted identity and sync settings of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node_id: String,
    #[serde(default)]
    pub node_role: NodeRole,
    /// Address of the single sync partner; empty when unset
    #[serde(default)]
    pub peer_address: String,
    #[serde(default = "default_true")]
    pub sync_enabled: bool,
    #[serde(default = "default_interval")]
    pub sync_interval_seconds: u64,
    #[serde(default)]
    pub watermark_policy: WatermarkPolicy,
    /// Per-peer watermarks and any keys written by other versions
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

const fn default_true() -> bool {
    true
}

const fn default_interval() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECS
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: generate_node_id(),
            node_role: NodeRole::Unassigned,
            peer_address: String::new(),
            sync_enabled: true,
            sync_interval_seconds: DEFAULT_SYNC_INTERVAL_SECS,
            watermark_policy: WatermarkPolicy::Combined,
            extra: BTreeMap::new(),
        }
    }
}

/// A fresh `NODE_<UUID>` identifier.
pub fn generate_node_id() -> String {
    format!(
        "NODE_{}",
        Uuid::now_v7().simple().to_string().to_ascii_uppercase()
    )
}

impl NodeConfig {
    /// Configured peer, trimmed; `None` when blank
    pub fn peer(&self) -> Option<String> {
        non_blank(&self.peer_address).map(str::to_string)
    }

    /// Pull watermark for `peer`; the epoch when never synced.
    pub fn watermark(&self, peer: &str) -> Timestamp {
        self.read_timestamp(&watermark_key(PULL_WATERMARK_PREFIX, peer))
    }

    pub fn set_watermark(&mut self, peer: &str, at: Timestamp) {
        self.extra.insert(
            watermark_key(PULL_WATERMARK_PREFIX, peer),
            Value::from(at.as_millis()),
        );
    }

    /// Push watermark for `peer` under the split policy.
    pub fn push_watermark(&self, peer: &str) -> Timestamp {
        self.read_timestamp(&watermark_key(PUSH_WATERMARK_PREFIX, peer))
    }

    pub fn set_push_watermark(&mut self, peer: &str, at: Timestamp) {
        self.extra.insert(
            watermark_key(PUSH_WATERMARK_PREFIX, peer),
            Value::from(at.as_millis()),
        );
    }

    /// Boundary for selecting local changes to push in the next cycle.
    pub fn push_boundary(&self, peer: &str) -> Timestamp {
        match self.watermark_policy {
            WatermarkPolicy::Combined => self.watermark(peer),
            WatermarkPolicy::Split => self.push_watermark(peer),
        }
    }

    /// Move a legacy `peer_ip` host into `peer_address`.
    ///
    /// Legacy hosts carry no port; [`LEGACY_PEER_PORT`] is appended. Returns
    /// whether anything changed.
    pub fn adopt_legacy_peer(&mut self) -> bool {
        let Some(legacy) = self.extra.remove(LEGACY_PEER_KEY) else {
            return false;
        };
        if self.peer().is_none() {
            if let Some(host) = legacy.as_str().and_then(non_blank) {
                self.peer_address = if host.contains(':') {
                    host.to_string()
                } else {
                    format!("{host}:{LEGACY_PEER_PORT}")
                };
            }
        }
        true
    }

    fn read_timestamp(&self, key: &str) -> Timestamp {
        self.extra
            .get(key)
            .and_then(Timestamp::from_json)
            .unwrap_or(Timestamp::EPOCH)
    }
}

fn watermark_key(prefix: &str, peer: &str) -> String {
    format!("{prefix}{}", peer.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn default_config_matches_first_run_values() {
        let config = NodeConfig::default();
        assert!(config.node_id.starts_with("NODE_"));
        assert_eq!(config.node_role, NodeRole::Unassigned);
        assert_eq!(config.peer(), None);
        assert!(config.sync_enabled);
        assert_eq!(config.sync_interval_seconds, 60);
        assert_eq!(config.watermark_policy, WatermarkPolicy::Combined);
    }

    #[test]
    fn node_ids_are_unique() {
        assert_ne!(generate_node_id(), generate_node_id());
    }

    #[test]
    fn watermark_defaults_to_epoch_and_reads_legacy_strings() {
        let mut config = NodeConfig::default();
        assert_eq!(config.watermark("10.0.0.2:5000"), Timestamp::EPOCH);

        config.extra.insert(
            "last_sync_with_10.0.0.2:5000".to_string(),
            json!("2024-01-01 10:00:00"),
        );
        assert_eq!(
            config.watermark("10.0.0.2:5000"),
            Timestamp::parse_legacy("2024-01-01 10:00:00").unwrap()
        );

        config.set_watermark("10.0.0.2:5000", Timestamp::from_millis(5));
        assert_eq!(
            config.watermark("10.0.0.2:5000"),
            Timestamp::from_millis(5)
        );
    }

    #[test]
    fn push_boundary_follows_policy() {
        let mut config = NodeConfig::default();
        config.set_watermark("peer", Timestamp::from_millis(100));
        config.set_push_watermark("peer", Timestamp::from_millis(40));

        assert_eq!(config.push_boundary("peer"), Timestamp::from_millis(100));
        config.watermark_policy = WatermarkPolicy::Split;
        assert_eq!(config.push_boundary("peer"), Timestamp::from_millis(40));
    }

    #[test]
    fn file_format_is_flat_and_keeps_unknown_keys() {
        let config: NodeConfig = serde_json::from_value(json!({
            "node_id": "NODE_1234ABCD",
            "node_role": "COUNSELLOR",
            "app_version": "1.4",
            "peer_address": "192.168.1.20:5000",
            "last_sync_with_192.168.1.20:5000": 1000
        }))
        .unwrap();

        assert_eq!(config.node_role, NodeRole::Counsellor);
        assert!(config.sync_enabled);
        assert_eq!(config.watermark("192.168.1.20:5000"), Timestamp::from_millis(1000));

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["app_version"], json!("1.4"));
        assert_eq!(value["watermark_policy"], json!("combined"));
        assert_eq!(value["last_sync_with_192.168.1.20:5000"], json!(1000));
    }

    #[test]
    fn legacy_peer_ip_gets_the_legacy_port() {
        let mut config: NodeConfig = serde_json::from_value(json!({
            "node_id": "NODE_1",
            "peer_ip": "10.0.0.9"
        }))
        .unwrap();
        assert_eq!(config.peer(), None);

        assert!(config.adopt_legacy_peer());
        assert_eq!(config.peer().as_deref(), Some("10.0.0.9:5000"));
        assert!(!config.extra.contains_key("peer_ip"));
        assert!(!config.adopt_legacy_peer());
    }

    #[test]
    fn legacy_peer_ip_never_overrides_peer_address() {
        let mut config: NodeConfig = serde_json::from_value(json!({
            "node_id": "NODE_1",
            "peer_address": "10.0.0.2:6000",
            "peer_ip": "10.0.0.9"
        }))
        .unwrap();
        assert!(config.adopt_legacy_peer());
        assert_eq!(config.peer().as_deref(), Some("10.0.0.2:6000"));

        let mut config: NodeConfig = serde_json::from_value(json!({
            "node_id": "NODE_1",
            "peer_ip": "10.0.0.9:7000"
        }))
        .unwrap();
        config.adopt_legacy_peer();
        assert_eq!(config.peer().as_deref(), Some("10.0.0.9:7000"));
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("secretary".parse::<NodeRole>().unwrap(), NodeRole::Secretary);
        assert_eq!("Counselor".parse::<NodeRole>().unwrap(), NodeRole::Counsellor);
        assert!("admin".parse::<NodeRole>().is_err());
    }

    #[test]
    fn unknown_and_null_roles_still_load() {
        let config: NodeConfig = serde_json::from_value(json!({
            "node_id": "NODE_1",
            "node_role": null
        }))
        .unwrap();
        assert_eq!(config.node_role, NodeRole::Unassigned);

        let config: NodeConfig = serde_json::from_value(json!({
            "node_id": "NODE_1",
            "node_role": "Admin"
        }))
        .unwrap();
        assert_eq!(config.node_role, NodeRole::Other("Admin".to_string()));
        assert_eq!(serde_json::to_value(&config).unwrap()["node_role"], json!("Admin"));
    }
}
