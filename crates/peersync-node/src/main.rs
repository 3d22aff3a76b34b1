mod config;
mod error;
mod routes;

use std::sync::Arc;

use config::AppConfig;
use peersync_core::sync::{HttpPeerClient, SyncOrchestrator, SyncScheduler};
use peersync_core::{NodeIdentity, NodeStore};
use routes::{app_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; installed nodes use the service environment.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("peersync_node=info".parse().expect("valid directive")),
        )
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!("Starting peersync-node with config: {:?}", config);
    std::fs::create_dir_all(&config.data_dir)?;

    let identity = NodeIdentity::new(&config.node_config_path);
    let node = identity.load()?;
    let store = NodeStore::open_path(&config.db_path).await?;
    tracing::info!(
        node_id = %node.node_id,
        role = %node.node_role,
        peer = node.peer().as_deref().unwrap_or("none"),
        "Node identity loaded"
    );

    let client = HttpPeerClient::new(config.handshake_timeout, config.request_timeout)?;
    let orchestrator = Arc::new(SyncOrchestrator::new(
        store.clone(),
        identity.clone(),
        client,
    ));
    let scheduler = if config.auto_sync {
        SyncScheduler::start(orchestrator)
    } else {
        SyncScheduler::start_manual(orchestrator)
    };

    let state = AppState::new(store, identity, scheduler.handle());
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("peersync-node listening on {}", config.bind_addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop().await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
