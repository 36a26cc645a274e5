//! Audit trail of scheduling decisions.

use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;

use crate::util::clock::now_ms;

/// Scheduling decision recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Task passed every limit and got a worker slot.
    Admit,
    /// Worker process launched.
    Start,
    /// Launch failed; slot released, task back to pending.
    LaunchFailed,
    /// Worker reported completion.
    Finish,
    /// Worker disappeared without reporting; slot reclaimed.
    Dead,
    /// Worker re-registered after a scheduler restart.
    Rebuild,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Admit => "admit",
            Self::Start => "start",
            Self::LaunchFailed => "launch_failed",
            Self::Finish => "finish",
            Self::Dead => "dead",
            Self::Rebuild => "rebuild",
        };
        f.write_str(name)
    }
}

/// Audit event structure.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Related task identifier.
    pub task_id: String,
    /// Worker slot the decision concerns.
    pub worker_id: String,
    /// Decision taken.
    pub action: AuditAction,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context.
    pub payload: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// Bounded in-memory audit sink; the oldest events are dropped first.
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.max_events == 0 {
            return;
        }
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Sink forwarding every event to `tracing` under the `rpm_dispatch::audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&mut self, event: AuditEvent) {
        tracing::info!(
            target: "rpm_dispatch::audit",
            event_id = %event.event_id,
            task_id = %event.task_id,
            worker_id = %event.worker_id,
            action = %event.action,
            payload = event.payload.as_deref().unwrap_or(""),
            "audit"
        );
    }
}

/// Build an audit event stamped with a fresh id and the current time.
pub fn build_audit_event(
    task_id: impl Into<String>,
    worker_id: impl Into<String>,
    action: AuditAction,
    payload: Option<String>,
) -> AuditEvent {
    AuditEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        task_id: task_id.into(),
        worker_id: worker_id.into(),
        action,
        created_at_ms: now_ms(),
        payload,
    }
}
