//! One sync cycle against the configured peer

use serde::{Deserialize, Serialize};

use super::protocol::change_count;
use super::transport::PeerTransport;
use crate::identity::NodeIdentity;
use crate::models::{Timestamp, WatermarkPolicy};
use crate::services::NodeStore;
use crate::Result;

/// Phases of a cycle, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePhase {
    Idle,
    Handshake,
    Pulling,
    Applying,
    Pushing,
    Done,
}

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    /// No peer configured, or sync disabled
    Skipped,
    /// Handshake failed; nothing was exchanged
    Offline,
    /// Pull failed after a successful handshake; nothing was applied
    Failed,
    /// Pull and apply ran; push may still have failed (see `errors`)
    Completed,
}

/// Outcome of one call to [`SyncOrchestrator::trigger_sync`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub status: CycleStatus,
    /// Last phase reached
    pub phase: CyclePhase,
    pub peer: Option<String>,
    pub message: String,
    /// Records received from the peer
    pub count: usize,
    /// Received records that changed local state
    pub applied: usize,
    /// Records the peer accepted from us
    pub pushed: usize,
    pub errors: Vec<String>,
}

impl SyncReport {
    fn new(peer: Option<String>) -> Self {
        Self {
            status: CycleStatus::Skipped,
            phase: CyclePhase::Idle,
            peer,
            message: String::new(),
            count: 0,
            applied: 0,
            pushed: 0,
            errors: Vec::new(),
        }
    }

    fn enter(&mut self, phase: CyclePhase) {
        tracing::debug!(
            peer = self.peer.as_deref().unwrap_or_default(),
            from = ?self.phase,
            to = ?phase,
            "Sync phase transition"
        );
        self.phase = phase;
    }

    fn finish(mut self, status: CycleStatus, message: impl Into<String>) -> Self {
        self.status = status;
        self.message = message.into();
        self
    }

    /// Whether any record moved in either direction
    pub const fn moved_records(&self) -> bool {
        self.applied > 0 || self.pushed > 0
    }
}

/// Runs sync cycles for one node.
///
/// Cycles are not serialized here; run them through a
/// [`SyncScheduler`](super::SyncScheduler) so watermark bookkeeping for a peer
/// never sees two cycles at once.
pub struct SyncOrchestrator<T> {
    store: NodeStore,
    identity: NodeIdentity,
    transport: T,
}

impl<T: PeerTransport> SyncOrchestrator<T> {
    pub const fn new(store: NodeStore, identity: NodeIdentity, transport: T) -> Self {
        Self {
            store,
            identity,
            transport,
        }
    }

    pub const fn store(&self) -> &NodeStore {
        &self.store
    }

    pub const fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// Run one handshake → pull → apply → push cycle.
    ///
    /// Peer-side failures are reported in the returned [`SyncReport`]; only
    /// local failures (identity file, database) are errors.
    pub async fn trigger_sync(&self) -> Result<SyncReport> {
        let started = Timestamp::now();
        let config = self.identity.load()?;

        let Some(peer) = config.peer() else {
            return Ok(SyncReport::new(None).finish(CycleStatus::Skipped, "No peer configured"));
        };
        let mut report = SyncReport::new(Some(peer.clone()));
        if !config.sync_enabled {
            return Ok(report.finish(CycleStatus::Skipped, "Sync is disabled"));
        }

        report.enter(CyclePhase::Handshake);
        let remote = match self.transport.handshake(&peer).await {
            Ok(remote) => remote,
            Err(error) => {
                tracing::debug!(peer = %peer, %error, "Peer is offline");
                return Ok(report.finish(
                    CycleStatus::Offline,
                    format!("Peer {peer} is offline: {error}"),
                ));
            }
        };
        tracing::debug!(
            peer = %peer,
            remote_node = %remote.node_id,
            remote_role = %remote.role,
            "Handshake complete"
        );

        report.enter(CyclePhase::Pulling);
        let since = config.watermark(&peer);
        let pulled = match self.transport.pull(&peer, since).await {
            Ok(pulled) => pulled,
            Err(error) => {
                let message = format!("Pull from {peer} failed: {error}");
                report.errors.push(message.clone());
                return Ok(report.finish(CycleStatus::Failed, message));
            }
        };
        report.count = change_count(&pulled.changes);

        report.enter(CyclePhase::Applying);
        let applied = self.store.apply_changes(&pulled.changes).await?;
        report.applied = applied.applied();
        report.errors.extend(applied.errors);

        // The pull side is done, whatever happens to the push.
        self.identity
            .update(|config| config.set_watermark(&peer, started))?;

        report.enter(CyclePhase::Pushing);
        let boundary = config.push_boundary(&peer);
        let outgoing = self.store.changes_since(boundary).await?;
        let mut push_failure = None;
        let mut push_clean = true;
        if !outgoing.is_empty() {
            match self.transport.push(&peer, &outgoing).await {
                Ok(response) => {
                    report.pushed = response.processed;
                    push_clean = response.errors.is_empty();
                    report.errors.extend(response.errors);
                }
                Err(error) => {
                    push_clean = false;
                    report.errors.push(format!("Push to {peer} failed: {error}"));
                    push_failure = Some(error);
                }
            }
        }

        if config.watermark_policy == WatermarkPolicy::Split && push_clean {
            self.identity
                .update(|config| config.set_push_watermark(&peer, started))?;
        }

        report.enter(CyclePhase::Done);
        let message = match push_failure {
            Some(error) => format!(
                "Pulled {} record(s) from {peer}, push failed: {error}",
                report.count
            ),
            None => format!(
                "Synced with {peer}: {} received, {} applied, {} pushed",
                report.count, report.applied, report.pushed
            ),
        };
        Ok(report.finish(CycleStatus::Completed, message))
    }
}
