//! In-memory task source for development and testing.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::core::{BuildQueueTask, DispatchError, TaskRecord, TaskSource};

#[derive(Debug, Default)]
struct SourceState {
    pending: Vec<Value>,
    unavailable: Option<String>,
    loads: usize,
}

/// Task source serving a settable pending set. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskSource {
    state: Arc<Mutex<SourceState>>,
}

impl InMemoryTaskSource {
    /// Empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Source serving `tasks`.
    #[must_use]
    pub fn with_tasks<'a>(tasks: impl IntoIterator<Item = &'a BuildQueueTask>) -> Self {
        let source = Self::new();
        source.set_tasks(tasks);
        source
    }

    /// Replace the pending set with raw records.
    pub fn set_pending(&self, pending: Vec<Value>) {
        self.state.lock().pending = pending;
    }

    /// Replace the pending set with `tasks`.
    pub fn set_tasks<'a>(&self, tasks: impl IntoIterator<Item = &'a BuildQueueTask>) {
        let pending = tasks
            .into_iter()
            .filter_map(|task| serde_json::to_value(TaskRecord::from(task)).ok())
            .collect();
        self.set_pending(pending);
    }

    /// Drop `task_id` from the pending set, as the intake does once a build ends.
    pub fn remove(&self, task_id: &str) {
        self.state.lock().pending.retain(|value| {
            BuildQueueTask::from_value(value.clone()).map_or(true, |task| task.id() != task_id)
        });
    }

    /// Make every load fail with `reason` until [`recover`](Self::recover).
    pub fn fail_with(&self, reason: impl Into<String>) {
        self.state.lock().unavailable = Some(reason.into());
    }

    /// Undo [`fail_with`](Self::fail_with).
    pub fn recover(&self) {
        self.state.lock().unavailable = None;
    }

    /// Number of load attempts so far.
    #[must_use]
    pub fn loads(&self) -> usize {
        self.state.lock().loads
    }
}

#[async_trait]
impl TaskSource for InMemoryTaskSource {
    async fn load_pending(&self) -> Result<Vec<Value>, DispatchError> {
        let mut state = self.state.lock();
        state.loads += 1;
        if let Some(reason) = &state.unavailable {
            return Err(DispatchError::Intake(reason.clone()));
        }
        Ok(state.pending.clone())
    }
}
