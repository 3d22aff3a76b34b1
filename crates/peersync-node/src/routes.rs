use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use peersync_core::sync::{
    self, HandshakeResponse, PullRequest, PullResponse, PushRequest, PushResponse,
    SchedulerHandle, SyncReport,
};
use peersync_core::{NodeIdentity, NodeStore, Timestamp};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    store: NodeStore,
    identity: NodeIdentity,
    scheduler: SchedulerHandle,
}

impl AppState {
    pub const fn new(store: NodeStore, identity: NodeIdentity, scheduler: SchedulerHandle) -> Self {
        Self {
            store,
            identity,
            scheduler,
        }
    }

    fn node_id(&self) -> Result<String, AppError> {
        Ok(self.identity.load()?.node_id)
    }
}

pub fn app_router(state: AppState) -> Router {
    let sync_routes = Router::new()
        .route("/handshake", post(handshake))
        .route("/pull", post(pull))
        .route("/push", post(push))
        .route("/trigger", post(trigger));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/sync", sync_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    node_id: String,
    timestamp: Timestamp,
}

async fn healthz(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    Ok(Json(HealthResponse {
        status: "ok",
        node_id: state.node_id()?,
        timestamp: Timestamp::now(),
    }))
}

async fn handshake(State(state): State<AppState>) -> Result<Json<HandshakeResponse>, AppError> {
    let config = state.identity.load()?;
    Ok(Json(sync::handshake(&config)))
}

async fn pull(
    State(state): State<AppState>,
    payload: Result<Json<PullRequest>, JsonRejection>,
) -> Result<Json<PullResponse>, AppError> {
    let Json(request) = payload?;
    let node_id = state.node_id()?;
    let response = sync::pull(&state.store, &node_id, &request).await?;
    tracing::info!(
        since = %request.last_sync_timestamp,
        count = response.count,
        "Served pull"
    );
    Ok(Json(response))
}

async fn push(
    State(state): State<AppState>,
    payload: Result<Json<PushRequest>, JsonRejection>,
) -> Result<Json<PushResponse>, AppError> {
    let Json(request) = payload?;
    let response = sync::push(&state.store, &request).await?;
    tracing::info!(
        processed = response.processed,
        errors = response.errors.len(),
        "Applied push"
    );
    Ok(Json(response))
}

async fn trigger(State(state): State<AppState>) -> Result<Json<SyncReport>, AppError> {
    let report = state.scheduler.trigger_now().await?;
    Ok(Json(report))
}
