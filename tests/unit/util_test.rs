//! Tests for utility functions

use std::time::Duration;

use chrono::{TimeZone, Utc};
use outreach_pacer::util::{ActionType, Clock, ManualClock, WarmupCategory};

#[test]
fn test_warmup_categories() {
    assert_eq!(
        ActionType::ConnectionRequest.warmup_category(),
        Some(WarmupCategory::Connections)
    );
    assert_eq!(
        ActionType::Message.warmup_category(),
        Some(WarmupCategory::Messages)
    );
    assert_eq!(
        ActionType::ProfileVisit.warmup_category(),
        Some(WarmupCategory::Visits)
    );
    assert_eq!(ActionType::EmailSend.warmup_category(), None);
    assert_eq!(ActionType::CompanyResearch.warmup_category(), None);
}

#[test]
fn test_action_type_display() {
    assert_eq!(ActionType::EmailCheck.to_string(), "email_check");
}

#[test]
fn test_manual_clock_can_move_backwards() {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    let clock = ManualClock::new(start);
    clock.advance(Duration::from_secs(600));
    clock.set(start);

    assert_eq!(clock.now(), start);
    assert_eq!(clock.today().to_string(), "2024-03-01");
}

#[test]
fn test_init_tracing_is_idempotent() {
    outreach_pacer::util::init_tracing("outreach_pacer=debug");
    outreach_pacer::util::init_tracing("outreach_pacer=info");
    tracing::info!("subscriber installed");
}

#[test]
fn test_unknown_action_type_message() {
    let err = "poke".parse::<ActionType>().unwrap_err();
    assert_eq!(err.to_string(), "unknown action type: poke");
}
