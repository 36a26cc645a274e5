//! Registry of in-flight workers, keyed by worker id and by task id.

use std::collections::HashMap;

use serde::Serialize;

use crate::core::launcher::WorkerId;
use crate::core::task::{BuildQueueTask, TaskId};

/// Lifecycle of a worker slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Admitted; launch in progress.
    Starting,
    /// Launched and building.
    Running,
    /// Being reaped; the slot stays held until the launcher has cleaned up.
    Finished,
}

/// Handle to one in-flight worker.
#[derive(Debug, Clone)]
pub struct Worker {
    /// Worker id.
    pub worker_id: WorkerId,
    /// Task the worker is building.
    pub task: BuildQueueTask,
    /// Admission time, milliseconds since the epoch.
    pub started_at_ms: u128,
    /// Current state.
    pub state: WorkerState,
}

/// Worker bookkeeping. Holds at most one worker per task id.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: HashMap<WorkerId, Worker>,
    by_task: HashMap<TaskId, WorkerId>,
}

impl WorkerRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker. Fails when the task or the worker id is already live.
    pub fn insert(
        &mut self,
        worker_id: &str,
        task: BuildQueueTask,
        started_at_ms: u128,
        state: WorkerState,
    ) -> bool {
        if self.by_task.contains_key(task.id()) || self.workers.contains_key(worker_id) {
            return false;
        }
        self.by_task
            .insert(task.id().to_owned(), worker_id.to_owned());
        self.workers.insert(
            worker_id.to_owned(),
            Worker {
                worker_id: worker_id.to_owned(),
                task,
                started_at_ms,
                state,
            },
        );
        true
    }

    /// Move a starting worker to running.
    pub fn mark_running(&mut self, worker_id: &str) -> bool {
        match self.workers.get_mut(worker_id) {
            Some(worker) if worker.state == WorkerState::Starting => {
                worker.state = WorkerState::Running;
                true
            }
            _ => false,
        }
    }

    /// Claim a running worker for reaping. Fails when it is unknown, still
    /// launching or already being reaped.
    pub fn mark_finished(&mut self, worker_id: &str) -> bool {
        match self.workers.get_mut(worker_id) {
            Some(worker) if worker.state == WorkerState::Running => {
                worker.state = WorkerState::Finished;
                true
            }
            _ => false,
        }
    }

    /// Remove a worker, returning its handle in the `Finished` state.
    pub fn remove(&mut self, worker_id: &str) -> Option<Worker> {
        let mut worker = self.workers.remove(worker_id)?;
        self.by_task.remove(worker.task.id());
        worker.state = WorkerState::Finished;
        Some(worker)
    }

    /// Worker by id.
    #[must_use]
    pub fn get(&self, worker_id: &str) -> Option<&Worker> {
        self.workers.get(worker_id)
    }

    /// Worker building `task_id`, if any.
    #[must_use]
    pub fn by_task(&self, task_id: &str) -> Option<&Worker> {
        self.by_task
            .get(task_id)
            .and_then(|worker_id| self.workers.get(worker_id))
    }

    /// Whether a worker for `task_id` is live.
    #[must_use]
    pub fn contains_task(&self, task_id: &str) -> bool {
        self.by_task.contains_key(task_id)
    }

    /// Live workers in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &Worker> {
        self.workers.values()
    }

    /// Number of workers in `state`.
    #[must_use]
    pub fn count_in(&self, state: WorkerState) -> usize {
        self.workers.values().filter(|w| w.state == state).count()
    }

    /// Number of live workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// True when no worker is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
