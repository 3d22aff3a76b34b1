//! Periodic sync task with an explicit start/stop lifecycle

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::orchestrator::{CycleStatus, SyncOrchestrator, SyncReport};
use super::transport::PeerTransport;
use crate::error::{Error, Result};
use crate::models::DEFAULT_SYNC_INTERVAL_SECS;

/// Commands for the scheduler task
#[derive(Debug)]
enum SchedulerCommand {
    /// Run a cycle now and reply with its report
    SyncNow(oneshot::Sender<Result<SyncReport>>),
    /// Finish the current cycle and exit
    Stop,
}

/// Cloneable handle for requesting cycles from a running scheduler
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Run a cycle through the scheduler task and wait for its report.
    ///
    /// Queued behind any cycle already in progress, so manual and periodic
    /// cycles never overlap.
    pub async fn trigger_now(&self) -> Result<SyncReport> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::SyncNow(reply))
            .await
            .map_err(|_| Error::Sync("Scheduler is not running".to_string()))?;
        response
            .await
            .map_err(|_| Error::Sync("Scheduler stopped before the cycle finished".to_string()))?
    }
}

/// Owns the single task that runs every sync cycle of a node.
pub struct SyncScheduler {
    handle: SchedulerHandle,
    task: JoinHandle<()>,
}

impl SyncScheduler {
    /// Spawn the scheduler task.
    ///
    /// Must be called from within a tokio runtime. The interval is re-read
    /// from the node identity after every scheduled cycle; manual cycles do
    /// not move the next tick.
    pub fn start<T>(orchestrator: Arc<SyncOrchestrator<T>>) -> Self
    where
        T: PeerTransport + 'static,
    {
        Self::spawn(orchestrator, true)
    }

    /// Spawn the task without the timer; cycles run only on `trigger_now`.
    pub fn start_manual<T>(orchestrator: Arc<SyncOrchestrator<T>>) -> Self
    where
        T: PeerTransport + 'static,
    {
        Self::spawn(orchestrator, false)
    }

    fn spawn<T>(orchestrator: Arc<SyncOrchestrator<T>>, periodic: bool) -> Self
    where
        T: PeerTransport + 'static,
    {
        let (sender, mut receiver) = mpsc::channel::<SchedulerCommand>(16);

        let task = tokio::spawn(async move {
            tracing::info!(periodic, "Sync scheduler started");
            let tick = tokio::time::sleep(next_interval(&orchestrator));
            tokio::pin!(tick);
            loop {
                tokio::select! {
                    command = receiver.recv() => {
                        match command {
                            Some(SchedulerCommand::SyncNow(reply)) => {
                                let result = orchestrator.trigger_sync().await;
                                if let Ok(report) = &result {
                                    log_report(report);
                                }
                                // The caller may have given up waiting.
                                let _ = reply.send(result);
                            }
                            Some(SchedulerCommand::Stop) | None => break,
                        }
                    }
                    () = &mut tick, if periodic => {
                        match orchestrator.trigger_sync().await {
                            Ok(report) => log_report(&report),
                            Err(error) => tracing::warn!(%error, "Scheduled sync cycle failed"),
                        }
                        tick.as_mut().reset(Instant::now() + next_interval(&orchestrator));
                    }
                }
            }
            tracing::info!("Sync scheduler stopped");
        });

        Self {
            handle: SchedulerHandle { sender },
            task,
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// See [`SchedulerHandle::trigger_now`].
    pub async fn trigger_now(&self) -> Result<SyncReport> {
        self.handle.trigger_now().await
    }

    /// Ask the task to exit after its current cycle and wait for it.
    pub async fn stop(self) -> Result<()> {
        // A closed channel means the task is already gone.
        let _ = self.handle.sender.send(SchedulerCommand::Stop).await;
        self.task
            .await
            .map_err(|error| Error::Sync(format!("Scheduler task failed: {error}")))
    }
}

fn next_interval<T: PeerTransport>(orchestrator: &SyncOrchestrator<T>) -> Duration {
    let seconds = orchestrator
        .identity()
        .load()
        .map_or(DEFAULT_SYNC_INTERVAL_SECS, |config| {
            config.sync_interval_seconds
        });
    Duration::from_secs(seconds.max(1))
}

fn log_report(report: &SyncReport) {
    match report.status {
        CycleStatus::Completed if report.moved_records() || !report.errors.is_empty() => {
            tracing::info!(
                received = report.count,
                applied = report.applied,
                pushed = report.pushed,
                errors = report.errors.len(),
                "{}",
                report.message
            );
        }
        CycleStatus::Failed => tracing::warn!("{}", report.message),
        _ => tracing::debug!(status = ?report.status, "{}", report.message),
    }
}
