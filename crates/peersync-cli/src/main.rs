//! peersync CLI - operate a peer replication node from the terminal
//!
//! Manages the node identity file, runs sync cycles and exercises the local
//! store with a small record tool.

mod cli;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use std::time::Duration;

use clap::Parser;

use crate::cli::{Cli, Commands, SyncCommands};
use crate::commands::common::resolve_paths;
use crate::commands::node::run_node;
use crate::commands::record::run_record;
use crate::commands::sync::{print_report, run_local_cycle, run_remote_cycle, run_sync_conflicts};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("peersync=info".parse().expect("valid directive")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let paths = resolve_paths(cli.data_dir, cli.db_path, cli.config);

    match cli.command {
        Commands::Node { command } => run_node(command, &paths)?,
        Commands::Sync {
            command: Some(SyncCommands::Conflicts { limit, json }),
            ..
        } => run_sync_conflicts(limit, json, &paths).await?,
        Commands::Sync {
            command: None,
            via,
            handshake_timeout_ms,
            timeout_secs,
            json,
        } => {
            let request_timeout = Duration::from_secs(timeout_secs.max(1));
            let report = if let Some(address) = via {
                run_remote_cycle(&address, request_timeout * 3).await?
            } else {
                run_local_cycle(
                    &paths,
                    Duration::from_millis(handshake_timeout_ms.max(1)),
                    request_timeout,
                )
                .await?
            };
            print_report(&report, json)?;
        }
        Commands::Record { command } => run_record(command, &paths).await?,
    }

    Ok(())
}
