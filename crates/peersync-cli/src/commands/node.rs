use peersync_core::models::WatermarkPolicy;
use peersync_core::util::peer_base_url;
use peersync_core::{NodeConfig, Timestamp};
use serde::Serialize;

use crate::cli::NodeCommands;
use crate::commands::common::{display_path, format_sync_timestamp, NodePaths};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct NodeSummary<'a> {
    config_path: String,
    db_path: String,
    #[serde(flatten)]
    config: &'a NodeConfig,
}

pub fn run_node(command: NodeCommands, paths: &NodePaths) -> Result<(), CliError> {
    let identity = paths.identity();
    match command {
        NodeCommands::Show { json } => {
            let config = identity.load()?;
            if json {
                let summary = NodeSummary {
                    config_path: display_path(&paths.config_path),
                    db_path: display_path(&paths.db_path),
                    config: &config,
                };
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                for line in format_node_lines(&config) {
                    println!("{line}");
                }
            }
            return Ok(());
        }
        NodeCommands::SetPeer { address } => {
            let address = address.trim().to_string();
            if peer_base_url(&address).is_none() {
                return Err(CliError::Config("Peer address cannot be empty".to_string()));
            }
            identity.update(|config| config.peer_address = address)?;
        }
        NodeCommands::ClearPeer => {
            identity.update(|config| config.peer_address.clear())?;
        }
        NodeCommands::SetRole { role } => {
            identity.update(|config| config.node_role = role)?;
        }
        NodeCommands::Enable => {
            identity.update(|config| config.sync_enabled = true)?;
        }
        NodeCommands::Disable => {
            identity.update(|config| config.sync_enabled = false)?;
        }
        NodeCommands::Interval { seconds } => {
            if seconds == 0 {
                return Err(CliError::Config(
                    "Sync interval must be at least 1 second".to_string(),
                ));
            }
            identity.update(|config| config.sync_interval_seconds = seconds)?;
        }
        NodeCommands::Policy { policy } => {
            identity.update(|config| config.watermark_policy = policy)?;
        }
        NodeCommands::ResetWatermarks => {
            let config = identity.load()?;
            let Some(peer) = config.peer() else {
                return Err(CliError::Config("No peer configured".to_string()));
            };
            identity.update(|config| {
                config.set_watermark(&peer, Timestamp::EPOCH);
                config.set_push_watermark(&peer, Timestamp::EPOCH);
            })?;
            tracing::info!(peer = %peer, "Watermarks reset");
        }
    }

    for line in format_node_lines(&identity.load()?) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_node_lines(config: &NodeConfig) -> Vec<String> {
    let mut lines = vec![
        format!("node_id      {}", config.node_id),
        format!("role         {}", config.node_role),
        format!(
            "peer         {}",
            config.peer().unwrap_or_else(|| "(none)".to_string())
        ),
        format!(
            "sync         {}, every {}s",
            if config.sync_enabled { "enabled" } else { "disabled" },
            config.sync_interval_seconds
        ),
        format!("policy       {}", config.watermark_policy),
    ];

    if let Some(peer) = config.peer() {
        lines.push(format!(
            "last pull    {}",
            format_watermark(config.watermark(&peer))
        ));
        if config.watermark_policy == WatermarkPolicy::Split {
            lines.push(format!(
                "last push    {}",
                format_watermark(config.push_watermark(&peer))
            ));
        }
    }
    lines
}

fn format_watermark(at: Timestamp) -> String {
    if at == Timestamp::EPOCH {
        "never".to_string()
    } else {
        format_sync_timestamp(at)
    }
}
