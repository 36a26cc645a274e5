//! Worker manager: ordering, admission and reaping of build workers.
//!
//! All bookkeeping (worker registry, limit counters, backend priorities) lives
//! behind one `parking_lot::Mutex`. A limit check and the matching counter
//! increment happen under the same guard, so concurrent passes can never
//! admit more workers than a limit allows. The guard is never held across an
//! `.await`: launches and probes run unlocked against an already reserved
//! slot.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::launcher::{BuildOutcome, LaunchError, WorkerId, WorkerLauncher, WorkerProbe};
use crate::core::limits::{LimitSet, LimitUsage, WorkerLimit};
use crate::core::registry::{Worker, WorkerRegistry, WorkerState};
use crate::core::task::{BuildQueueTask, TaskId};
use crate::core::DispatchError;
use crate::util::clock::now_ms;

/// Result of trying to admit one candidate task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// A slot was reserved under this worker id.
    Admitted(WorkerId),
    /// A limit is at capacity; the task stays pending.
    Blocked {
        /// Name of the first limit that refused the task.
        limit: String,
    },
    /// A worker for this task is already live.
    AlreadyRunning,
}

/// Summary of one scheduling pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Records handed over by the intake source.
    pub loaded: usize,
    /// Records excluded because they could not be parsed.
    pub rejected: usize,
    /// Tasks whose worker was launched, in admission order.
    pub started: Vec<TaskId>,
    /// Candidates skipped because a limit was full.
    pub blocked: usize,
    /// Candidates skipped because their worker is still live.
    pub already_running: usize,
    /// Tasks whose launch failed; they stay pending.
    pub launch_failed: Vec<TaskId>,
    /// Workers reaped before admission.
    pub reaped: usize,
}

/// Point-in-time view of the manager.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ManagerStats {
    /// Workers admitted whose launch has not returned yet.
    pub starting: usize,
    /// Workers launched and building.
    pub running: usize,
    /// Workers launched since creation.
    pub started_total: u64,
    /// Workers reaped since creation.
    pub finished_total: u64,
    /// Launch attempts that failed since creation.
    pub launch_failures: u64,
    /// Reaped workers that vanished without reporting.
    pub dead_workers: u64,
    /// Usage of every registered limit.
    pub limits: Vec<LimitUsage>,
}

#[derive(Debug, Default)]
struct Counters {
    started: u64,
    finished: u64,
    launch_failures: u64,
    dead: u64,
}

#[derive(Debug, Default)]
struct ManagerState {
    registry: WorkerRegistry,
    limits: LimitSet,
    backend_priorities: HashMap<TaskId, i64>,
    counters: Counters,
}

/// Scheduler core deciding which pending tasks may start.
pub struct WorkerManager<L> {
    launcher: L,
    state: Mutex<ManagerState>,
    audit: Option<Mutex<Box<dyn AuditSink>>>,
}

impl<L: WorkerLauncher> WorkerManager<L> {
    /// Create a manager enforcing `limits`.
    pub fn new(launcher: L, limits: LimitSet) -> Self {
        Self {
            launcher,
            state: Mutex::new(ManagerState {
                limits,
                ..ManagerState::default()
            }),
            audit: None,
        }
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Box<dyn AuditSink>) -> Self {
        self.audit = Some(Mutex::new(audit));
        self
    }

    /// Launcher used to start workers.
    pub const fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Register a limit, replacing any limit with the same name.
    ///
    /// Live workers are counted into the new limit right away.
    pub fn add_limit(&self, mut limit: WorkerLimit) {
        let mut state = self.state.lock();
        for worker in state.registry.iter() {
            limit.worker_added(&worker.worker_id, &worker.task);
        }
        let name = limit.name().to_owned();
        if state.limits.add(limit).is_some() {
            debug!(limit = %name, "worker limit replaced");
        } else {
            debug!(limit = %name, "worker limit registered");
        }
    }

    /// Drop the limit called `name`.
    pub fn remove_limit(&self, name: &str) -> bool {
        self.state.lock().limits.remove(name).is_some()
    }

    /// Scheduler-side priority adjustment of `task_id`, `0` when unset.
    pub fn backend_priority(&self, task_id: &str) -> i64 {
        self.state
            .lock()
            .backend_priorities
            .get(task_id)
            .copied()
            .unwrap_or(0)
    }

    /// Adjust the scheduler-side priority of a pending task.
    ///
    /// # Errors
    ///
    /// [`DispatchError::TaskRunning`] when a worker for the task is live.
    pub fn set_backend_priority(&self, task_id: &str, priority: i64) -> Result<(), DispatchError> {
        let mut state = self.state.lock();
        if state.registry.contains_task(task_id) {
            return Err(DispatchError::TaskRunning(task_id.to_owned()));
        }
        if priority == 0 {
            state.backend_priorities.remove(task_id);
        } else {
            state
                .backend_priorities
                .insert(task_id.to_owned(), priority);
        }
        Ok(())
    }

    /// Sort candidates: lowest combined priority first, then build id, then task id.
    pub fn order(&self, mut tasks: Vec<BuildQueueTask>) -> Vec<BuildQueueTask> {
        let state = self.state.lock();
        let effective = |task: &BuildQueueTask| {
            let backend = state.backend_priorities.get(task.id()).copied().unwrap_or(0);
            task.frontend_priority().saturating_add(backend)
        };
        tasks.sort_by(|a, b| {
            effective(a)
                .cmp(&effective(b))
                .then_with(|| a.build_id().cmp(&b.build_id()))
                .then_with(|| a.id().cmp(b.id()))
        });
        tasks
    }

    /// Check `task` against every limit and reserve a slot when all pass.
    ///
    /// On [`Admission::Admitted`] the worker is registered as starting and
    /// counted in every matching limit; follow up with [`start`](Self::start).
    pub fn try_admit(&self, task: &BuildQueueTask) -> Admission {
        let worker_id = self.launcher.worker_id(task);
        {
            let mut state = self.state.lock();
            if state.registry.contains_task(task.id()) {
                return Admission::AlreadyRunning;
            }
            if let Err(limit) = state.limits.check(task) {
                debug!(task_id = task.id(), limit = limit.name(), "task blocked by worker limit");
                return Admission::Blocked {
                    limit: limit.name().to_owned(),
                };
            }
            if !state
                .registry
                .insert(&worker_id, task.clone(), now_ms(), WorkerState::Starting)
            {
                return Admission::AlreadyRunning;
            }
            state.limits.worker_added(&worker_id, task);
        }
        self.record(task.id(), &worker_id, AuditAction::Admit, None);
        Admission::Admitted(worker_id)
    }

    /// Launch the worker for an admitted task.
    ///
    /// On failure the reserved slot is released and the task is eligible
    /// again on the next pass.
    ///
    /// # Errors
    ///
    /// The launcher's [`LaunchError`].
    pub async fn start(&self, worker_id: &str, task: &BuildQueueTask) -> Result<(), LaunchError> {
        match self.launcher.start_task(worker_id, task).await {
            Ok(()) => {
                let tracked = {
                    let mut state = self.state.lock();
                    let tracked = state.registry.mark_running(worker_id);
                    if tracked {
                        state.counters.started += 1;
                    } else {
                        state.counters.launch_failures += 1;
                    }
                    tracked
                };
                if !tracked {
                    let err = LaunchError::Untracked;
                    warn!(task_id = task.id(), worker_id, error = %err, "worker launched untracked");
                    self.record(
                        task.id(),
                        worker_id,
                        AuditAction::LaunchFailed,
                        Some(err.to_string()),
                    );
                    return Err(err);
                }
                info!(
                    task_id = task.id(),
                    worker_id,
                    build_id = task.build_id(),
                    chroot = task.chroot().unwrap_or("srpm"),
                    "worker started"
                );
                self.record(task.id(), worker_id, AuditAction::Start, None);
                Ok(())
            }
            Err(err) => {
                self.release_failed_launch(worker_id);
                warn!(
                    task_id = task.id(),
                    worker_id,
                    error = %err,
                    "worker launch failed, task stays pending"
                );
                self.record(
                    task.id(),
                    worker_id,
                    AuditAction::LaunchFailed,
                    Some(err.to_string()),
                );
                Err(err)
            }
        }
    }

    /// Parse, order and admit one batch of pending records.
    ///
    /// Records that fail to parse are excluded on their own; duplicates of a
    /// task id within the batch are ignored after the first.
    pub async fn run_pass(&self, pending: Vec<serde_json::Value>) -> PassReport {
        let mut report = PassReport {
            loaded: pending.len(),
            ..PassReport::default()
        };

        let mut seen = HashSet::new();
        let mut candidates = Vec::with_capacity(pending.len());
        for value in pending {
            match BuildQueueTask::from_value(value) {
                Ok(task) if seen.insert(task.id().to_owned()) => candidates.push(task),
                Ok(task) => debug!(task_id = task.id(), "duplicate pending task ignored"),
                Err(err) => {
                    report.rejected += 1;
                    warn!(error = %err, "pending task excluded from scheduling");
                }
            }
        }

        for task in self.order(candidates) {
            match self.try_admit(&task) {
                Admission::AlreadyRunning => report.already_running += 1,
                Admission::Blocked { .. } => report.blocked += 1,
                Admission::Admitted(worker_id) => match self.start(&worker_id, &task).await {
                    Ok(()) => report.started.push(task.id().to_owned()),
                    Err(_) => report.launch_failed.push(task.id().to_owned()),
                },
            }
        }

        debug!(
            loaded = report.loaded,
            started = report.started.len(),
            blocked = report.blocked,
            "scheduling pass done"
        );
        report
    }

    /// Probe every running worker and reap the ones that ended or died.
    pub async fn reap(&self) -> Vec<WorkerId> {
        let running: Vec<Worker> = {
            let state = self.state.lock();
            state
                .registry
                .iter()
                .filter(|w| w.state == WorkerState::Running)
                .cloned()
                .collect()
        };

        let mut reaped = Vec::new();
        for worker in running {
            let (outcome, dead) = match self.launcher.probe(&worker).await {
                WorkerProbe::Alive => continue,
                WorkerProbe::Ended(outcome) => (outcome, false),
                WorkerProbe::Dead => {
                    warn!(
                        task_id = worker.task.id(),
                        worker_id = %worker.worker_id,
                        "worker vanished without reporting, reclaiming its slot"
                    );
                    (BuildOutcome::Unknown, true)
                }
            };
            if self.finish(&worker.worker_id, outcome, dead).await.is_some() {
                reaped.push(worker.worker_id);
            }
        }
        reaped
    }

    /// Completion handler for externally delivered notifications.
    ///
    /// Idempotent: a duplicate or unknown worker id is logged and ignored,
    /// and the call still reports success. A notice for a worker whose launch
    /// has not returned yet is stale and ignored too; the fresh worker is
    /// reaped through [`reap`](Self::reap) once it really ends.
    pub async fn complete(&self, worker_id: &str, outcome: BuildOutcome) -> bool {
        if self.finish(worker_id, outcome, false).await.is_none() {
            let launching = self
                .state
                .lock()
                .registry
                .get(worker_id)
                .is_some_and(|w| w.state == WorkerState::Starting);
            if launching {
                warn!(worker_id, "completion for a worker still launching ignored");
            } else {
                warn!(worker_id, "completion for unknown worker ignored");
            }
        }
        true
    }

    /// Re-register workers discovered outside the manager, e.g. after a restart.
    ///
    /// Rediscovered workers count against the limits even when that puts a
    /// limit over capacity; no new task matching such a limit is admitted
    /// until enough of them drain. Returns the number of workers registered.
    pub fn rebuild<I>(&self, workers: I) -> usize
    where
        I: IntoIterator<Item = (WorkerId, BuildQueueTask)>,
    {
        let mut restored = Vec::new();
        {
            let mut state = self.state.lock();
            let now = now_ms();
            for (worker_id, task) in workers {
                if !state
                    .registry
                    .insert(&worker_id, task.clone(), now, WorkerState::Running)
                {
                    debug!(worker_id = %worker_id, "rediscovered worker already registered");
                    continue;
                }
                state.limits.worker_added(&worker_id, &task);
                restored.push((task.id().to_owned(), worker_id));
            }
            for limit in state.limits.iter() {
                let used = limit.peak_slot_usage();
                if used > limit.capacity() {
                    warn!(
                        limit = limit.name(),
                        used,
                        capacity = limit.capacity(),
                        "rediscovered workers exceed limit"
                    );
                }
            }
        }

        for (task_id, worker_id) in &restored {
            self.record(task_id, worker_id, AuditAction::Rebuild, None);
        }
        info!(count = restored.len(), "worker registry rebuilt");
        restored.len()
    }

    /// Whether a worker for `task_id` is live.
    pub fn is_running(&self, task_id: &str) -> bool {
        self.state.lock().registry.contains_task(task_id)
    }

    /// Snapshot of all live workers.
    pub fn workers(&self) -> Vec<Worker> {
        self.state.lock().registry.iter().cloned().collect()
    }

    /// Current usage of the limit called `name`.
    pub fn limit_usage(&self, name: &str) -> Option<usize> {
        self.state.lock().limits.get(name).map(WorkerLimit::usage)
    }

    /// Point-in-time statistics.
    pub fn stats(&self) -> ManagerStats {
        let state = self.state.lock();
        ManagerStats {
            starting: state.registry.count_in(WorkerState::Starting),
            running: state.registry.count_in(WorkerState::Running),
            started_total: state.counters.started,
            finished_total: state.counters.finished,
            launch_failures: state.counters.launch_failures,
            dead_workers: state.counters.dead,
            limits: state.limits.usage(),
        }
    }

    /// Claim, finalize and release one running worker. `None` when it is not
    /// running or another caller is already finishing it.
    async fn finish(&self, worker_id: &str, outcome: BuildOutcome, dead: bool) -> Option<Worker> {
        // The slot stays held until the launcher is done, so the task cannot
        // be re-admitted while its leftovers are being cleaned up.
        if !self.state.lock().registry.mark_finished(worker_id) {
            return None;
        }

        self.launcher.finish_task(worker_id, outcome).await;

        let worker = {
            let mut state = self.state.lock();
            let worker = state.registry.remove(worker_id)?;
            state.limits.worker_removed(worker_id);
            state.backend_priorities.remove(worker.task.id());
            state.counters.finished += 1;
            if dead {
                state.counters.dead += 1;
            }
            worker
        };

        info!(
            task_id = worker.task.id(),
            worker_id,
            outcome = ?outcome,
            "worker finished"
        );
        let action = if dead {
            AuditAction::Dead
        } else {
            AuditAction::Finish
        };
        self.record(
            worker.task.id(),
            worker_id,
            action,
            Some(format!("{outcome:?}").to_lowercase()),
        );
        Some(worker)
    }

    fn release_failed_launch(&self, worker_id: &str) {
        let mut state = self.state.lock();
        let starting = state
            .registry
            .get(worker_id)
            .is_some_and(|w| w.state == WorkerState::Starting);
        if starting {
            state.registry.remove(worker_id);
            state.limits.worker_removed(worker_id);
        }
        state.counters.launch_failures += 1;
    }

    fn record(&self, task_id: &str, worker_id: &str, action: AuditAction, payload: Option<String>) {
        if let Some(sink) = &self.audit {
            sink.lock()
                .record(build_audit_event(task_id, worker_id, action, payload));
        }
    }
}
