//! Core scheduling abstractions: tasks, limits, workers and the manager.

pub mod audit;
pub mod error;
pub mod launcher;
pub mod limits;
pub mod manager;
pub mod registry;
pub mod source;
pub mod task;

pub use audit::{
    build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink,
};
pub use error::{AppResult, DispatchError};
pub use launcher::{BuildOutcome, LaunchError, WorkerId, WorkerLauncher, WorkerProbe};
pub use limits::{LimitKind, LimitSet, LimitUsage, TaskClassifier, WorkerLimit};
pub use manager::{Admission, ManagerStats, PassReport, WorkerManager};
pub use registry::{Worker, WorkerRegistry, WorkerState};
pub use source::TaskSource;
pub use task::{BuildQueueTask, TaskError, TaskId, TaskRecord};
