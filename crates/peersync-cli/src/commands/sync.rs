use std::time::Duration;

use peersync_core::sync::{CycleStatus, HttpPeerClient, SyncOrchestrator, SyncReport};
use peersync_core::util::peer_base_url;

use crate::commands::common::{
    format_sync_conflict_lines, sync_conflict_to_item, NodePaths, SyncConflictItem,
};
use crate::error::CliError;

/// Run one cycle in this process against the configured peer.
///
/// Do not run this against a node whose server is also running its
/// scheduler; use `--via` so the node serializes the cycle itself.
pub async fn run_local_cycle(
    paths: &NodePaths,
    handshake_timeout: Duration,
    request_timeout: Duration,
) -> Result<SyncReport, CliError> {
    let store = paths.open_store().await?;
    let client = HttpPeerClient::new(handshake_timeout, request_timeout)?;
    let orchestrator = SyncOrchestrator::new(store, paths.identity(), client);
    Ok(orchestrator.trigger_sync().await?)
}

/// Ask a running node to run a cycle through its scheduler.
pub async fn run_remote_cycle(address: &str, timeout: Duration) -> Result<SyncReport, CliError> {
    let base = peer_base_url(address)
        .ok_or_else(|| CliError::Config("Node address cannot be empty".to_string()))?;
    let response = reqwest::Client::new()
        .post(format!("{base}/sync/trigger"))
        .timeout(timeout)
        .send()
        .await
        .map_err(|error| CliError::Config(format!("Could not reach node at {base}: {error}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CliError::Config(format!(
            "Node at {base} returned {status}: {body}"
        )));
    }
    response
        .json::<SyncReport>()
        .await
        .map_err(|error| CliError::Config(format!("Unexpected response from {base}: {error}")))
}

pub fn print_report(report: &SyncReport, as_json: bool) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    for line in format_report_lines(report) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_report_lines(report: &SyncReport) -> Vec<String> {
    let mut lines = vec![report.message.clone()];
    if report.status == CycleStatus::Completed {
        lines.push(format!(
            "received {}, applied {}, pushed {}",
            report.count, report.applied, report.pushed
        ));
    }
    lines.extend(report.errors.iter().map(|error| format!("  error: {error}")));
    lines
}

pub async fn run_sync_conflicts(
    limit: usize,
    as_json: bool,
    paths: &NodePaths,
) -> Result<(), CliError> {
    let store = paths.open_store().await?;
    let conflicts = store.list_conflicts(limit).await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(sync_conflict_to_item)
            .collect::<Vec<SyncConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_sync_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}
