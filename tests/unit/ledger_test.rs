//! Tests for the action ledger and its persisted store

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use outreach_pacer::core::{ActionEvent, ActionLedger, LedgerStore};
use outreach_pacer::infra::JsonlLedgerStore;
use outreach_pacer::util::ActionType;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap()
}

#[test]
fn test_pending_reservation_counts_until_committed() {
    let ledger = ActionLedger::new(TimeDelta::days(7));
    let slot = ledger
        .try_reserve(ActionType::Message, t0(), |_| Ok::<(), ()>(()))
        .unwrap();

    assert_eq!(slot.action(), ActionType::Message);
    assert_eq!(ledger.latest(ActionType::Message), Some(t0()));

    let at = slot.commit(t0() + TimeDelta::seconds(45));
    assert_eq!(at, t0() + TimeDelta::seconds(45));
    assert_eq!(ledger.count_since(ActionType::Message, t0() - TimeDelta::hours(1)), 1);
}

#[test]
fn test_failed_check_reserves_nothing() {
    let ledger = ActionLedger::new(TimeDelta::days(7));
    let result = ledger.try_reserve(ActionType::Search, t0(), |_| Err("full"));

    assert_eq!(result.err(), Some("full"));
    assert_eq!(ledger.latest(ActionType::Search), None);
}

#[test]
fn test_released_reservation_consumes_no_budget() {
    let ledger = ActionLedger::new(TimeDelta::days(7));
    ledger
        .try_reserve(ActionType::EmailSend, t0(), |_| Ok::<(), ()>(()))
        .unwrap()
        .release();

    assert_eq!(ledger.latest(ActionType::EmailSend), None);
}

#[test]
fn test_books_are_independent() {
    let ledger = ActionLedger::new(TimeDelta::days(7));
    ledger.record(ActionType::Message, t0());
    ledger.reset(ActionType::Search);

    assert_eq!(ledger.latest(ActionType::Message), Some(t0()));
    assert_eq!(ledger.latest(ActionType::ConnectionRequest), None);

    ledger.reset(ActionType::Message);
    assert_eq!(ledger.latest(ActionType::Message), None);
}

#[test]
fn test_jsonl_store_restores_history() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonlLedgerStore::new(dir.path(), "account-1").unwrap();
    {
        let ledger =
            ActionLedger::with_store(TimeDelta::days(7), Box::new(store.clone()), t0()).unwrap();
        ledger.record(ActionType::ConnectionRequest, t0() - TimeDelta::days(8));
        ledger.record(ActionType::ConnectionRequest, t0());
        ledger.record(ActionType::Message, t0() + TimeDelta::minutes(1));
    }

    let now = t0() + TimeDelta::hours(1);
    let restored = ActionLedger::with_store(TimeDelta::days(7), Box::new(store), now).unwrap();
    assert_eq!(
        restored.count_since(ActionType::ConnectionRequest, now - TimeDelta::days(7)),
        1
    );
    assert_eq!(
        restored.latest(ActionType::Message),
        Some(t0() + TimeDelta::minutes(1))
    );
}

#[test]
fn test_jsonl_store_prune_rewrites_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = JsonlLedgerStore::new(dir.path(), "account-2").unwrap();
    for days in [10, 2, 1] {
        store
            .append(&ActionEvent {
                action: ActionType::ProfileVisit,
                at: t0() - TimeDelta::days(days),
            })
            .unwrap();
    }

    assert_eq!(store.prune_before(t0() - TimeDelta::days(7)).unwrap(), 1);
    assert_eq!(store.load_since(t0() - TimeDelta::days(30)).unwrap().len(), 2);

    let contents = std::fs::read_to_string(store.file_path()).unwrap();
    assert_eq!(contents.lines().count(), 2);
}

#[test]
fn test_jsonl_store_skips_torn_lines() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = JsonlLedgerStore::new(dir.path(), "account-3").unwrap();
    store
        .append(&ActionEvent {
            action: ActionType::Search,
            at: t0(),
        })
        .unwrap();
    let mut raw = std::fs::read_to_string(store.file_path()).unwrap();
    raw.push_str("{\"action\":\"sea");
    std::fs::write(store.file_path(), raw).unwrap();

    let events = store.load_since(t0() - TimeDelta::days(1)).unwrap();
    assert_eq!(events.len(), 1);
}
