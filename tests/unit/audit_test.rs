//! Tests for audit sink

use outreach_pacer::core::{build_audit_event, AuditSink, InMemoryAuditSink};

#[test]
fn test_in_memory_audit_sink() {
    let sink = InMemoryAuditSink::new(10);

    let event = build_audit_event("pacer", "email_send", "perform", Some("ok".to_string()));
    sink.record(event.clone());

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0], event);
    assert_eq!(events[0].subject, "email_send");
}

#[test]
fn test_audit_sink_overflow() {
    let sink = InMemoryAuditSink::new(2);

    sink.record(build_audit_event("pacer", "search", "perform", None));
    sink.record(build_audit_event("pacer", "search", "deny", None));
    sink.record(build_audit_event("pacer", "search", "fail", None));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].action, "deny"); // First one popped
    assert_eq!(events[1].action, "fail");
}

#[test]
fn test_build_audit_event() {
    let event = build_audit_event("task_runner", "42", "retry", Some("timed out".to_string()));

    assert_eq!(event.scope, "task_runner");
    assert_eq!(event.subject, "42");
    assert_eq!(event.action, "retry");
    assert_eq!(event.payload, Some("timed out".to_string()));
    assert!(event.created_at_ms > 0);
    assert!(uuid::Uuid::parse_str(&event.event_id).is_ok());
}

#[test]
fn test_filter_by_action() {
    let sink = InMemoryAuditSink::new(10);
    sink.record(build_audit_event("pacer", "message", "deny", None));
    sink.record(build_audit_event("pacer", "message", "perform", None));
    sink.record(build_audit_event("pacer", "visit", "deny", None));

    assert_eq!(sink.with_action("deny").len(), 2);
    assert!(sink.with_action("retry").is_empty());
}
