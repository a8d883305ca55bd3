//! Tests for configuration validation

use std::collections::HashMap;

use outreach_pacer::config::{
    ActionPolicy, AppConfig, DispatcherConfig, JitterPlacement, PacingConfig, PolicyTable,
    RetryPolicy,
};
use outreach_pacer::util::ActionType;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_default_config_is_valid() {
    assert!(AppConfig::default().validate().is_ok());
}

#[test]
fn test_retry_policy_invalid_time_limit() {
    let invalid = RetryPolicy {
        max_retries: 3,
        backoff_secs: 60,
        attempt_time_limit_secs: 0,
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_dispatcher_config_invalid_limits() {
    let no_slots = DispatcherConfig {
        max_concurrent_runs: 0,
        max_queue_depth: 10,
    };
    assert!(no_slots.validate().is_err());

    let no_queue = DispatcherConfig {
        max_concurrent_runs: 2,
        max_queue_depth: 0,
    };
    assert!(no_queue.validate().is_err());
}

#[test]
fn test_pacing_config_from_json() {
    let cfg = PacingConfig::from_json_str(
        r#"{
            "policies": {
                "connection_request": {"per_hour": 10, "min_delay_secs": 120, "max_delay_secs": 300}
            },
            "warmup": {"program_start": "2024-03-01"},
            "jitter": "after_effector"
        }"#,
    )
    .unwrap();

    let policy = cfg.policies.get(ActionType::ConnectionRequest).unwrap();
    assert_eq!(policy.per_hour, Some(10));
    assert_eq!(policy.per_day, None);
    assert!(cfg.policies.get(ActionType::Message).is_none());
    assert_eq!(cfg.jitter, JitterPlacement::AfterEffector);
    assert_eq!(cfg.warmup.unwrap().schedule.weeks.len(), 4);
}

#[test]
fn test_pacing_config_rejects_zero_effector_timeout() {
    let cfg = PacingConfig {
        effector_timeout_secs: Some(0),
        ..PacingConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_policy_table_rejects_inverted_delays() {
    let table = PolicyTable::new([(
        ActionType::Message,
        ActionPolicy {
            min_delay_secs: 90,
            max_delay_secs: 30,
            ..ActionPolicy::default()
        },
    )]);
    let err = table.validate().unwrap_err();
    assert!(err.to_string().contains("message"));
}

#[test]
fn test_from_vars_overrides_defaults() {
    let cfg = AppConfig::from_vars(lookup(&[
        ("OUTREACH_MAX_RETRIES", "5"),
        ("OUTREACH_RETRY_BACKOFF_SECS", "10"),
        ("OUTREACH_MAX_CONCURRENT_RUNS", "2"),
        ("OUTREACH_WARMUP_START", "2024-03-01"),
    ]))
    .unwrap();

    assert_eq!(cfg.retry.max_retries, 5);
    assert_eq!(cfg.retry.backoff_secs, 10);
    assert_eq!(cfg.retry.attempt_time_limit_secs, 3600);
    assert_eq!(cfg.dispatcher.max_concurrent_runs, 2);
    assert_eq!(
        cfg.pacing.warmup.unwrap().program_start.to_string(),
        "2024-03-01"
    );
}

#[test]
fn test_from_vars_rejects_bad_values() {
    assert!(AppConfig::from_vars(lookup(&[("OUTREACH_MAX_RETRIES", "lots")])).is_err());
    assert!(AppConfig::from_vars(lookup(&[("OUTREACH_MAX_CONCURRENT_RUNS", "0")])).is_err());
}

#[test]
fn test_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outreach.json");
    std::fs::write(
        &path,
        r#"{"retry": {"max_retries": 1, "backoff_secs": 5, "attempt_time_limit_secs": 30}}"#,
    )
    .unwrap();

    let cfg = AppConfig::from_vars(lookup(&[(
        "OUTREACH_CONFIG_FILE",
        path.to_str().unwrap(),
    )]))
    .unwrap();
    assert_eq!(cfg.retry.max_retries, 1);
    assert_eq!(cfg.dispatcher, DispatcherConfig::default());
}
