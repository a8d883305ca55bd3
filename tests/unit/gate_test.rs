//! Tests for the rate gate

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use outreach_pacer::config::{ActionPolicy, PolicyTable, Window};
use outreach_pacer::core::{ActionLedger, DenialReason, GateDecision, RateGate, WarmupLimit};
use outreach_pacer::util::ActionType;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap()
}

fn gate_with(action: ActionType, policy: ActionPolicy) -> RateGate {
    let ledger = Arc::new(ActionLedger::new(TimeDelta::days(7)));
    RateGate::new(PolicyTable::new([(action, policy)]), ledger)
}

#[test]
fn test_min_delay_then_allowed() {
    let gate = gate_with(
        ActionType::ConnectionRequest,
        ActionPolicy {
            per_hour: Some(10),
            min_delay_secs: 120,
            max_delay_secs: 300,
            ..ActionPolicy::default()
        },
    );

    assert!(gate.can_proceed(ActionType::ConnectionRequest, t0()).is_allowed());
    gate.ledger().record(ActionType::ConnectionRequest, t0());

    let later = t0() + TimeDelta::seconds(30);
    let decision = gate.can_proceed(ActionType::ConnectionRequest, later);
    let denial = decision.denial().unwrap();
    assert_eq!(
        denial.reason,
        DenialReason::TooSoon {
            min_delay: Duration::from_secs(120)
        }
    );
    assert_eq!(denial.retry_after, Some(Duration::from_secs(90)));
    assert_eq!(denial.to_string(), "Too soon. Wait 90 more seconds");

    let ready = t0() + TimeDelta::seconds(120);
    assert!(gate.can_proceed(ActionType::ConnectionRequest, ready).is_allowed());
}

#[test]
fn test_hourly_ceiling_waits_for_oldest_to_age_out() {
    let gate = gate_with(
        ActionType::Message,
        ActionPolicy {
            per_hour: Some(3),
            ..ActionPolicy::default()
        },
    );
    for minutes in [0, 10, 20] {
        gate.ledger()
            .record(ActionType::Message, t0() + TimeDelta::minutes(minutes));
    }

    let now = t0() + TimeDelta::minutes(30);
    let denial = *gate.can_proceed(ActionType::Message, now).denial().unwrap();
    assert_eq!(
        denial.reason,
        DenialReason::WindowCeiling {
            window: Window::Hour,
            ceiling: 3
        }
    );
    assert_eq!(denial.retry_after, Some(Duration::from_secs(30 * 60)));
    assert_eq!(denial.to_string(), "Hourly limit reached (3/hour)");

    // Exactly one hour after the oldest entry it no longer counts.
    assert!(gate
        .can_proceed(ActionType::Message, t0() + TimeDelta::hours(1))
        .is_allowed());
}

#[test]
fn test_longest_wait_is_reported() {
    let gate = gate_with(
        ActionType::Search,
        ActionPolicy {
            per_minute: Some(1),
            per_hour: Some(2),
            ..ActionPolicy::default()
        },
    );
    gate.ledger().record(ActionType::Search, t0());
    gate.ledger()
        .record(ActionType::Search, t0() + TimeDelta::seconds(50));

    let denial = *gate
        .can_proceed(ActionType::Search, t0() + TimeDelta::seconds(55))
        .denial()
        .unwrap();
    assert!(matches!(
        denial.reason,
        DenialReason::WindowCeiling {
            window: Window::Hour,
            ..
        }
    ));
    assert_eq!(denial.retry_after, Some(Duration::from_secs(3600 - 55)));
}

#[test]
fn test_zero_ceiling_disables_action() {
    let gate = gate_with(
        ActionType::Engagement,
        ActionPolicy {
            per_hour: Some(5),
            per_week: Some(0),
            ..ActionPolicy::default()
        },
    );

    let denial = *gate
        .can_proceed(ActionType::Engagement, t0())
        .denial()
        .unwrap();
    assert_eq!(
        denial.reason,
        DenialReason::Disabled {
            window: Window::Week
        }
    );
    assert_eq!(denial.retry_after, None);
}

#[test]
fn test_unconfigured_action_denied() {
    let gate = gate_with(ActionType::Search, ActionPolicy::default());
    let decision = gate.can_proceed(ActionType::EmailSend, t0());
    assert!(matches!(
        decision,
        GateDecision::Denied(d) if d.reason == DenialReason::Unconfigured && d.retry_after.is_none()
    ));
}

#[test]
fn test_warmup_cap_binds_below_static_ceiling() {
    let gate = gate_with(
        ActionType::ConnectionRequest,
        ActionPolicy {
            per_day: Some(20),
            ..ActionPolicy::default()
        },
    );
    for i in 0..5 {
        gate.ledger()
            .record(ActionType::ConnectionRequest, t0() + TimeDelta::minutes(i));
    }

    let now = t0() + TimeDelta::hours(2);
    assert!(gate.can_proceed(ActionType::ConnectionRequest, now).is_allowed());

    let warmup = Some(WarmupLimit { week: 1, ceiling: 5 });
    let denial = *gate
        .can_proceed_with(ActionType::ConnectionRequest, warmup, now)
        .denial()
        .unwrap();
    assert_eq!(denial.reason, DenialReason::Warmup { week: 1, ceiling: 5 });
    assert_eq!(denial.to_string(), "Warm-up limit reached (5/day in week 1)");
    assert_eq!(denial.retry_after, Some(Duration::from_secs(22 * 3600)));
}

#[test]
fn test_stats_report_window_counts() {
    let gate = gate_with(
        ActionType::ProfileVisit,
        ActionPolicy {
            per_hour: Some(2),
            ..ActionPolicy::default()
        },
    );
    gate.ledger()
        .record(ActionType::ProfileVisit, t0() - TimeDelta::days(2));
    gate.ledger()
        .record(ActionType::ProfileVisit, t0() - TimeDelta::minutes(30));
    gate.ledger()
        .record(ActionType::ProfileVisit, t0() - TimeDelta::seconds(10));

    let stats = gate.stats(ActionType::ProfileVisit, t0());
    assert_eq!(stats.last_minute, 1);
    assert_eq!(stats.last_hour, 2);
    assert_eq!(stats.last_day, 2);
    assert_eq!(stats.last_week, 3);
    assert!(!stats.can_proceed);
    assert_eq!(gate.all_stats(t0()).len(), 1);
}
