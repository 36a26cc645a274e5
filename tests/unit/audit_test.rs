//! Tests for audit sink

use rpm_dispatch::core::{build_audit_event, AuditAction, AuditSink, InMemoryAuditSink};

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);

    let event = build_audit_event(
        "12-fedora-39-x86_64",
        "rpm_build_worker:12-fedora-39-x86_64",
        AuditAction::Admit,
        Some("payload".to_string()),
    );

    sink.record(event);
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].task_id, "12-fedora-39-x86_64");
    assert_eq!(events[0].action, AuditAction::Admit);
    assert_eq!(events[0].payload.as_deref(), Some("payload"));
    assert!(!events[0].event_id.is_empty());
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);

    for id in ["1", "2", "3"] {
        sink.record(build_audit_event(id, format!("w:{id}"), AuditAction::Start, None));
    }

    let ids: Vec<String> = sink.events().into_iter().map(|e| e.task_id).collect();
    assert_eq!(ids, ["2", "3"]);
}

#[test]
fn test_zero_capacity_sink_records_nothing() {
    let mut sink = InMemoryAuditSink::new(0);
    sink.record(build_audit_event("1", "w:1", AuditAction::Finish, None));
    assert!(sink.events().is_empty());
}

#[test]
fn test_event_ids_are_unique() {
    let a = build_audit_event("1", "w:1", AuditAction::Dead, None);
    let b = build_audit_event("1", "w:1", AuditAction::Dead, None);
    assert_ne!(a.event_id, b.event_id);
}

#[test]
fn test_action_names() {
    assert_eq!(AuditAction::LaunchFailed.to_string(), "launch_failed");
    assert_eq!(AuditAction::Rebuild.to_string(), "rebuild");
    assert_eq!(
        serde_json::to_value(AuditAction::LaunchFailed).unwrap(),
        serde_json::json!("launch_failed")
    );
}
