//! Worker launcher strategy: how an admitted task becomes a running worker.
//!
//! The [`WorkerManager`](crate::core::WorkerManager) only does bookkeeping.
//! Everything that touches real processes goes through this trait so the
//! admission engine can be driven by an in-memory launcher in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::registry::Worker;
use crate::core::task::BuildQueueTask;

/// Identifier of one worker slot, `<prefix>:<task id>`.
pub type WorkerId = String;

/// Failure to get a worker process started.
///
/// This covers the launch step only; the build result is reported later and
/// is never a launch error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LaunchError {
    /// The worker entrypoint could not be executed.
    #[error("spawn failed: {0}")]
    Spawn(String),
    /// The launch command exited with a non-zero status.
    #[error("non-zero exit code: {code}")]
    NonZeroExit {
        /// Exit code of the launch command.
        code: i32,
    },
    /// The launch command was terminated by a signal.
    #[error("killed by signal")]
    KilledBySignal,
    /// I/O failure around the launch (status files, pipes).
    #[error("io error: {0}")]
    Io(String),
    /// The launch returned but its slot was no longer registered.
    #[error("worker slot released during launch")]
    Untracked,
}

impl From<std::io::Error> for LaunchError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Build result as reported by the worker. Informational only: a finished
/// worker frees its slot regardless of the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildOutcome {
    /// Build finished and succeeded.
    Succeeded,
    /// Build finished and failed.
    Failed,
    /// The worker went away without reporting anything.
    Unknown,
}

/// Liveness of a worker as observed by its launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerProbe {
    /// Still building.
    Alive,
    /// Reported completion.
    Ended(BuildOutcome),
    /// Gone without a completion report (killed, crashed, never came up).
    Dead,
}

/// Strategy turning admitted tasks into worker processes.
#[async_trait]
pub trait WorkerLauncher: Send + Sync + 'static {
    /// Prefix shared by all worker ids this launcher hands out.
    fn worker_prefix(&self) -> &str;

    /// Worker id for `task`.
    fn worker_id(&self, task: &BuildQueueTask) -> WorkerId {
        format!("{}:{}", self.worker_prefix(), task.id())
    }

    /// Resolve a worker id back to its task id.
    fn task_id_from_worker_id<'a>(&self, worker_id: &'a str) -> Option<&'a str> {
        worker_id
            .strip_prefix(self.worker_prefix())
            .and_then(|rest| rest.strip_prefix(':'))
            .filter(|task_id| !task_id.is_empty())
    }

    /// Start the worker for `task`. Returns once the worker is launched, not
    /// once the build is done.
    async fn start_task(&self, worker_id: &str, task: &BuildQueueTask) -> Result<(), LaunchError>;

    /// Check on a running worker.
    async fn probe(&self, worker: &Worker) -> WorkerProbe;

    /// Release launcher-side resources of a finished worker.
    ///
    /// Returns `true` once the bookkeeping is done; the build outcome does not
    /// influence the return value.
    async fn finish_task(&self, worker_id: &str, outcome: BuildOutcome) -> bool;
}
