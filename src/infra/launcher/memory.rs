//! In-memory launcher for development and testing.
//!
//! Workers are plain map entries; tests drive their lifecycle with
//! [`InMemoryLauncher::finish`] and [`InMemoryLauncher::kill`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{
    BuildOutcome, BuildQueueTask, LaunchError, TaskId, Worker, WorkerId, WorkerLauncher,
    WorkerProbe,
};

/// Worker prefix used by [`InMemoryLauncher`].
pub const MEMORY_WORKER_PREFIX: &str = "memory_worker";

#[derive(Debug, Default)]
struct MemoryState {
    live: HashMap<WorkerId, WorkerProbe>,
    started: Vec<TaskId>,
    finished: Vec<WorkerId>,
    fail_once: HashSet<TaskId>,
    fail_always: HashSet<TaskId>,
    in_flight: usize,
    peak_in_flight: usize,
}

/// Launcher keeping its workers in memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLauncher {
    state: Arc<Mutex<MemoryState>>,
    start_delay: Option<Duration>,
}

impl InMemoryLauncher {
    /// Launcher whose launches succeed immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every launch take `delay`, to widen race windows in tests.
    #[must_use]
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    /// Fail the next launch of `task_id`.
    pub fn fail_next_launch(&self, task_id: &str) {
        self.state.lock().fail_once.insert(task_id.to_owned());
    }

    /// Fail every launch of `task_id` until [`allow_launch`](Self::allow_launch).
    pub fn fail_launches(&self, task_id: &str) {
        self.state.lock().fail_always.insert(task_id.to_owned());
    }

    /// Undo [`fail_launches`](Self::fail_launches).
    pub fn allow_launch(&self, task_id: &str) {
        self.state.lock().fail_always.remove(task_id);
    }

    /// Report the worker as ended; the next reap picks it up.
    pub fn finish(&self, worker_id: &str, outcome: BuildOutcome) -> bool {
        self.set_probe(worker_id, WorkerProbe::Ended(outcome))
    }

    /// Make the worker vanish without a report.
    pub fn kill(&self, worker_id: &str) -> bool {
        self.set_probe(worker_id, WorkerProbe::Dead)
    }

    /// Task ids in launch order, failed launches excluded.
    #[must_use]
    pub fn started(&self) -> Vec<TaskId> {
        self.state.lock().started.clone()
    }

    /// Worker ids passed to `finish_task`, in call order.
    #[must_use]
    pub fn finished(&self) -> Vec<WorkerId> {
        self.state.lock().finished.clone()
    }

    /// Workers launched and not yet finished.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Highest number of launches that were in progress at the same time.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.state.lock().peak_in_flight
    }

    fn set_probe(&self, worker_id: &str, probe: WorkerProbe) -> bool {
        match self.state.lock().live.get_mut(worker_id) {
            Some(slot) => {
                *slot = probe;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl WorkerLauncher for InMemoryLauncher {
    fn worker_prefix(&self) -> &str {
        MEMORY_WORKER_PREFIX
    }

    async fn start_task(&self, worker_id: &str, task: &BuildQueueTask) -> Result<(), LaunchError> {
        {
            let mut state = self.state.lock();
            state.in_flight += 1;
            state.peak_in_flight = state.peak_in_flight.max(state.in_flight);
        }
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.in_flight -= 1;
        if state.fail_once.remove(task.id()) || state.fail_always.contains(task.id()) {
            return Err(LaunchError::NonZeroExit { code: 1 });
        }
        state.live.insert(worker_id.to_owned(), WorkerProbe::Alive);
        state.started.push(task.id().to_owned());
        Ok(())
    }

    async fn probe(&self, worker: &Worker) -> WorkerProbe {
        self.state
            .lock()
            .live
            .get(&worker.worker_id)
            .copied()
            .unwrap_or(WorkerProbe::Dead)
    }

    async fn finish_task(&self, worker_id: &str, _outcome: BuildOutcome) -> bool {
        let mut state = self.state.lock();
        state.live.remove(worker_id);
        state.finished.push(worker_id.to_owned());
        true
    }
}
