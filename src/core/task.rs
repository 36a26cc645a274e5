//! Build-task descriptors as seen by the scheduler.
//!
//! The intake system hands over one JSON object per pending task. Only the
//! handful of attributes needed for ordering and admission are kept here; the
//! worker process fetches everything else about the build on its own.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Stable task identifier as issued by the intake system.
///
/// Source builds use a bare build number (`"1234"`), chroot builds a composite
/// id embedding the chroot (`"1234-fedora-rawhide-x86_64"`).
pub type TaskId = String;

/// Priority penalty applied to tasks flagged as background work.
pub const BACKGROUND_PENALTY: i64 = 10;

/// Architecture bucket shared by every 32-bit x86 chroot.
pub const X86_64: &str = "x86_64";

/// Errors raised while turning an intake record into a [`BuildQueueTask`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// A field the scheduler cannot work without is absent.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    /// The record is not a JSON object of the expected shape.
    #[error("malformed task record: {0}")]
    Malformed(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Text(String),
    Number(u64),
}

fn de_task_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<IdRepr>::deserialize(deserializer)?.map(|repr| match repr {
        IdRepr::Text(text) => text,
        IdRepr::Number(n) => n.to_string(),
    }))
}

/// Raw task record in the intake system's wire shape.
///
/// Every field is optional at this layer so that a single incomplete record
/// can be rejected on its own instead of failing the whole batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Task identifier; numbers are accepted and stringified.
    #[serde(default, deserialize_with = "de_task_id")]
    pub task_id: Option<String>,
    /// Owning build in the intake system.
    #[serde(default)]
    pub build_id: Option<u64>,
    /// Target chroot, absent for source builds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chroot: Option<String>,
    /// Owner of the project the build belongs to.
    #[serde(default)]
    pub project_owner: Option<String>,
    /// Intake priority, lower is more urgent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    /// Background builds yield to foreground ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<bool>,
    /// Sandbox the worker environment may be shared within.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<String>,
}

/// Scheduler view of one pending build task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildQueueTask {
    id: TaskId,
    build_id: u64,
    chroot: Option<String>,
    owner: String,
    priority: i64,
    background: bool,
    sandbox: Option<String>,
    source_build: bool,
}

impl BuildQueueTask {
    /// Create a foreground task with priority 0 and no chroot or sandbox.
    pub fn new(id: impl Into<TaskId>, build_id: u64, owner: impl Into<String>) -> Self {
        let id = id.into();
        let source_build = is_integer_literal(&id);
        Self {
            id,
            build_id,
            chroot: None,
            owner: owner.into(),
            priority: 0,
            background: false,
            sandbox: None,
            source_build,
        }
    }

    /// Set the target chroot. An empty string means no chroot.
    #[must_use]
    pub fn with_chroot(mut self, chroot: impl Into<String>) -> Self {
        let chroot = chroot.into();
        self.chroot = (!chroot.is_empty()).then_some(chroot);
        self
    }

    /// Set the intake priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Flag the task as background work.
    #[must_use]
    pub fn with_background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    /// Set the sandbox identifier.
    #[must_use]
    pub fn with_sandbox(mut self, sandbox: impl Into<String>) -> Self {
        self.sandbox = Some(sandbox.into());
        self
    }

    /// Parse a single intake JSON object.
    ///
    /// # Errors
    ///
    /// [`TaskError::Malformed`] when the value does not deserialize and
    /// [`TaskError::MissingField`] when a required field is absent.
    pub fn from_value(value: serde_json::Value) -> Result<Self, TaskError> {
        let record: TaskRecord =
            serde_json::from_value(value).map_err(|e| TaskError::Malformed(e.to_string()))?;
        Self::try_from(record)
    }

    /// Stable task identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Intake build this task belongs to.
    #[must_use]
    pub const fn build_id(&self) -> u64 {
        self.build_id
    }

    /// Target chroot, `None` for arch-agnostic source builds.
    #[must_use]
    pub fn chroot(&self) -> Option<&str> {
        self.chroot.as_deref()
    }

    /// Owner of the project the build belongs to.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Sandbox identifier. `None` means the worker environment must not be
    /// reused before or after this task.
    #[must_use]
    pub fn sandbox(&self) -> Option<&str> {
        self.sandbox.as_deref()
    }

    /// Whether the task is background work.
    #[must_use]
    pub const fn is_background(&self) -> bool {
        self.background
    }

    /// True iff the task id is a plain unsigned integer literal.
    #[must_use]
    pub const fn is_source_build(&self) -> bool {
        self.source_build
    }

    /// Intake priority including the background penalty.
    #[must_use]
    pub const fn frontend_priority(&self) -> i64 {
        if self.background {
            self.priority.saturating_add(BACKGROUND_PENALTY)
        } else {
            self.priority
        }
    }

    /// Native builder architecture this task needs capacity from.
    ///
    /// All 32-bit x86 variants share the `x86_64` pool; emulated
    /// architectures such as `armhfp` keep their own bucket.
    #[must_use]
    pub fn requested_arch(&self) -> Option<&str> {
        self.chroot().map(|chroot| normalize_arch(chroot_arch(chroot)))
    }
}

impl TryFrom<TaskRecord> for BuildQueueTask {
    type Error = TaskError;

    fn try_from(record: TaskRecord) -> Result<Self, Self::Error> {
        let id = record.task_id.ok_or(TaskError::MissingField("task_id"))?;
        let build_id = record.build_id.ok_or(TaskError::MissingField("build_id"))?;
        let owner = record
            .project_owner
            .ok_or(TaskError::MissingField("project_owner"))?;

        let mut task = Self::new(id, build_id, owner)
            .with_priority(record.priority.unwrap_or(0))
            .with_background(record.background.unwrap_or(false));
        if let Some(chroot) = record.chroot {
            task = task.with_chroot(chroot);
        }
        task.sandbox = record.sandbox;
        Ok(task)
    }
}

impl From<&BuildQueueTask> for TaskRecord {
    fn from(task: &BuildQueueTask) -> Self {
        Self {
            task_id: Some(task.id.clone()),
            build_id: Some(task.build_id),
            chroot: task.chroot.clone(),
            project_owner: Some(task.owner.clone()),
            priority: Some(task.priority),
            background: task.background.then_some(true),
            sandbox: task.sandbox.clone(),
        }
    }
}

fn is_integer_literal(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// Architecture component of a `<distro>-<release>-<arch>` chroot name.
///
/// A name without any `-` is taken as the architecture itself.
#[must_use]
pub fn chroot_arch(chroot: &str) -> &str {
    chroot.rsplit('-').next().unwrap_or(chroot)
}

/// Fold every `*86` architecture into the `x86_64` capacity bucket.
#[must_use]
pub fn normalize_arch(arch: &str) -> &str {
    if arch.ends_with("86") {
        X86_64
    } else {
        arch
    }
}
