//! Worker limits: named admission rules capping concurrent workers.
//!
//! A limit maps a task to an optional *slot key*. Tasks without a key are not
//! affected by the limit; tasks with a key may only start while fewer than
//! `capacity` running workers share that key. Plain limits (global,
//! architecture, one sandbox) use a single shared key, grouped limits (per
//! sandbox, per owner) use the grouping value itself.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::core::task::{normalize_arch, BuildQueueTask};

/// Slot key used by limits that count all matching workers together.
const SHARED_SLOT: &str = "";

/// Explicit classifier for limits not covered by the built-in kinds.
pub trait TaskClassifier: Send + Sync + fmt::Debug {
    /// Whether `task` counts against the limit.
    fn matches(&self, task: &BuildQueueTask) -> bool;
}

/// Classification rule of a [`WorkerLimit`].
#[derive(Debug, Clone)]
pub enum LimitKind {
    /// Every task.
    Global,
    /// Tasks whose normalized requested architecture equals the value.
    Architecture(String),
    /// Tasks in exactly this sandbox.
    Sandbox(String),
    /// Every sandbox separately; tasks without a sandbox are unaffected.
    PerSandbox,
    /// Every project owner separately.
    PerOwner,
    /// Tasks accepted by a custom classifier.
    Custom(Arc<dyn TaskClassifier>),
}

impl LimitKind {
    /// Slot key of `task` under this rule, `None` when the rule does not apply.
    #[must_use]
    pub fn slot_key(&self, task: &BuildQueueTask) -> Option<String> {
        let matched = match self {
            Self::Global => true,
            Self::Architecture(arch) => task.requested_arch() == Some(arch.as_str()),
            Self::Sandbox(sandbox) => task.sandbox() == Some(sandbox.as_str()),
            Self::PerSandbox => return task.sandbox().map(str::to_owned),
            Self::PerOwner => return Some(task.owner().to_owned()),
            Self::Custom(classifier) => classifier.matches(task),
        };
        matched.then(|| SHARED_SLOT.to_owned())
    }
}

/// Named rule capping the number of running workers matching it.
#[derive(Debug, Clone)]
pub struct WorkerLimit {
    name: String,
    kind: LimitKind,
    capacity: usize,
    refs: HashMap<String, String>,
}

impl WorkerLimit {
    /// Create a limit with an explicit name.
    pub fn new(name: impl Into<String>, kind: LimitKind, capacity: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            capacity,
            refs: HashMap::new(),
        }
    }

    /// Cap on all running workers.
    #[must_use]
    pub fn global(capacity: usize) -> Self {
        Self::new("global", LimitKind::Global, capacity)
    }

    /// Cap on workers building for `arch`; the name is `arch_<arch>`.
    ///
    /// The architecture is normalized first, so `i686` and `x86_64` name the
    /// same limit.
    #[must_use]
    pub fn architecture(arch: &str, capacity: usize) -> Self {
        let arch = normalize_arch(arch).to_owned();
        Self::new(
            format!("arch_{arch}"),
            LimitKind::Architecture(arch),
            capacity,
        )
    }

    /// Cap on workers inside one sandbox; the name is `sandbox_<id>`.
    #[must_use]
    pub fn sandbox(sandbox: &str, capacity: usize) -> Self {
        Self::new(
            format!("sandbox_{sandbox}"),
            LimitKind::Sandbox(sandbox.to_owned()),
            capacity,
        )
    }

    /// Cap applied to every sandbox separately.
    #[must_use]
    pub fn per_sandbox(capacity: usize) -> Self {
        Self::new("sandbox", LimitKind::PerSandbox, capacity)
    }

    /// Cap applied to every project owner separately.
    #[must_use]
    pub fn per_owner(capacity: usize) -> Self {
        Self::new("owner", LimitKind::PerOwner, capacity)
    }

    /// Cap on workers accepted by `classifier`.
    pub fn custom(
        name: impl Into<String>,
        classifier: Arc<dyn TaskClassifier>,
        capacity: usize,
    ) -> Self {
        Self::new(name, LimitKind::Custom(classifier), capacity)
    }

    /// Limit name; registering another limit under it replaces this one.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Classification rule.
    #[must_use]
    pub const fn kind(&self) -> &LimitKind {
        &self.kind
    }

    /// Maximum concurrent workers per slot.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether `task` is subject to this limit.
    #[must_use]
    pub fn matches(&self, task: &BuildQueueTask) -> bool {
        self.kind.slot_key(task).is_some()
    }

    /// Whether one more worker for `task` fits under this limit.
    #[must_use]
    pub fn check(&self, task: &BuildQueueTask) -> bool {
        self.kind
            .slot_key(task)
            .is_none_or(|key| self.usage_of(&key) < self.capacity)
    }

    /// Count `worker_id` if its task matches. Idempotent per worker id.
    pub fn worker_added(&mut self, worker_id: &str, task: &BuildQueueTask) {
        if let Some(key) = self.kind.slot_key(task) {
            self.refs.insert(worker_id.to_owned(), key);
        }
    }

    /// Stop counting `worker_id`. Unknown ids are ignored.
    pub fn worker_removed(&mut self, worker_id: &str) {
        self.refs.remove(worker_id);
    }

    /// Number of workers currently counted.
    #[must_use]
    pub fn usage(&self) -> usize {
        self.refs.len()
    }

    /// Highest per-slot usage; equals [`usage`](Self::usage) for plain limits.
    #[must_use]
    pub fn peak_slot_usage(&self) -> usize {
        let mut per_slot: HashMap<&str, usize> = HashMap::new();
        for key in self.refs.values() {
            *per_slot.entry(key.as_str()).or_default() += 1;
        }
        per_slot.into_values().max().unwrap_or(0)
    }

    fn usage_of(&self, key: &str) -> usize {
        self.refs.values().filter(|k| k.as_str() == key).count()
    }
}

/// Usage snapshot of one limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimitUsage {
    /// Limit name.
    pub name: String,
    /// Configured capacity.
    pub capacity: usize,
    /// Workers currently counted.
    pub used: usize,
}

/// All limits a task must pass before it may start.
#[derive(Debug, Clone, Default)]
pub struct LimitSet {
    limits: Vec<WorkerLimit>,
}

impl LimitSet {
    /// Empty set; admits everything.
    #[must_use]
    pub const fn new() -> Self {
        Self { limits: Vec::new() }
    }

    /// Register `limit`, replacing any limit with the same name.
    ///
    /// Returns the replaced limit.
    pub fn add(&mut self, limit: WorkerLimit) -> Option<WorkerLimit> {
        match self.limits.iter_mut().find(|l| l.name == limit.name) {
            Some(existing) => Some(std::mem::replace(existing, limit)),
            None => {
                self.limits.push(limit);
                None
            }
        }
    }

    /// Drop the limit called `name`.
    pub fn remove(&mut self, name: &str) -> Option<WorkerLimit> {
        let idx = self.limits.iter().position(|l| l.name == name)?;
        Some(self.limits.remove(idx))
    }

    /// Look a limit up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&WorkerLimit> {
        self.limits.iter().find(|l| l.name == name)
    }

    /// First limit that would be exceeded by starting `task`.
    ///
    /// # Errors
    ///
    /// Returns the blocking limit when `task` may not start now.
    pub fn check(&self, task: &BuildQueueTask) -> Result<(), &WorkerLimit> {
        self.limits
            .iter()
            .find(|limit| !limit.check(task))
            .map_or(Ok(()), Err)
    }

    /// Count a started worker in every limit it matches.
    pub fn worker_added(&mut self, worker_id: &str, task: &BuildQueueTask) {
        for limit in &mut self.limits {
            limit.worker_added(worker_id, task);
        }
    }

    /// Release a worker from every limit.
    pub fn worker_removed(&mut self, worker_id: &str) {
        for limit in &mut self.limits {
            limit.worker_removed(worker_id);
        }
    }

    /// Iterate over the registered limits in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &WorkerLimit> {
        self.limits.iter()
    }

    /// Number of registered limits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.limits.len()
    }

    /// True when no limit is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }

    /// Usage snapshot of every limit.
    #[must_use]
    pub fn usage(&self) -> Vec<LimitUsage> {
        self.limits
            .iter()
            .map(|l| LimitUsage {
                name: l.name.clone(),
                capacity: l.capacity,
                used: l.usage(),
            })
            .collect()
    }
}
