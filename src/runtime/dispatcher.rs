//! Level-triggered scheduling loop.
//!
//! Every tick reaps finished workers, reloads the full pending set from the
//! intake and runs one admission pass over it. Nothing is carried over between
//! passes except the manager's worker bookkeeping, so a missed notification or
//! a dropped pass is repaired by the next one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::core::{DispatchError, PassReport, TaskSource, WorkerLauncher, WorkerManager};

/// Periodic driver of a [`WorkerManager`].
pub struct BuildDispatcher<L> {
    manager: Arc<WorkerManager<L>>,
    source: Box<dyn TaskSource>,
    poll_interval: Duration,
}

impl<L: WorkerLauncher> BuildDispatcher<L> {
    /// Dispatcher feeding `manager` from `source` every `poll_interval`.
    pub fn new(
        manager: Arc<WorkerManager<L>>,
        source: Box<dyn TaskSource>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            manager,
            source,
            poll_interval,
        }
    }

    /// Manager driven by this dispatcher.
    pub const fn manager(&self) -> &Arc<WorkerManager<L>> {
        &self.manager
    }

    /// Run one pass: reap, load the pending set, admit.
    ///
    /// # Errors
    ///
    /// The source's error when the pending set cannot be loaded; no task is
    /// admitted in that case.
    pub async fn run_once(&self) -> Result<PassReport, DispatchError> {
        let reaped = self.manager.reap().await;
        let pending = self.source.load_pending().await?;
        let mut report = self.manager.run_pass(pending).await;
        report.reaped = reaped.len();
        Ok(report)
    }

    /// Run passes until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// Failed passes are logged and retried on the next tick. Workers keep
    /// running after shutdown; a restarted dispatcher rediscovers them.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if *shutdown.borrow() {
            return;
        }
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(poll_interval_ms = self.poll_interval.as_millis(), "dispatcher started");

        loop {
            tokio::select! {
                _ = ticker.tick() => match self.run_once().await {
                    Ok(report) if report.started.is_empty() && report.reaped == 0 => {
                        debug!(loaded = report.loaded, "pass made no changes");
                    }
                    Ok(report) => info!(
                        loaded = report.loaded,
                        started = report.started.len(),
                        reaped = report.reaped,
                        blocked = report.blocked,
                        launch_failed = report.launch_failed.len(),
                        "pass done"
                    ),
                    Err(err) => warn!(error = %err, "pass skipped"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("dispatcher stopped");
    }
}
