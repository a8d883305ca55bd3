//! Tests for error types

use std::time::Duration;

use outreach_pacer::core::{ConfigError, QueueError, RunError, RunStatus};

#[test]
fn test_queue_full_error() {
    let err = QueueError::QueueFull(8);
    assert_eq!(format!("{}", err), "queue full: 8 runs waiting");
}

#[test]
fn test_invalid_transition_error() {
    let err = RunError::InvalidTransition {
        from: RunStatus::Completed,
        to: RunStatus::Running,
    };
    assert_eq!(
        format!("{}", err),
        "cannot move execution from COMPLETED to RUNNING"
    );
}

#[test]
fn test_retryable_errors() {
    assert!(RunError::Persistence("connection reset".into()).is_retryable());
    assert!(RunError::TimedOut(Duration::from_secs(3600)).is_retryable());
    assert!(!RunError::NotFound(1).is_retryable());
    assert!(!RunError::AgentInactive(2).is_retryable());
    assert!(!RunError::Dispatch(QueueError::Closed).is_retryable());
}

#[test]
fn test_env_error() {
    let err = ConfigError::Env {
        key: "OUTREACH_MAX_RETRIES".into(),
        value: "many".into(),
    };
    assert_eq!(
        format!("{}", err),
        "invalid value for OUTREACH_MAX_RETRIES: \"many\""
    );
}
