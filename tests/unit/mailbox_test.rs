//! Tests for mailbox implementations

use outreach_pacer::core::TaskOutcome;
use outreach_pacer::infra::mailbox::memory::InMemoryMailbox;

fn failure(run_id: u64, attempts: u32) -> TaskOutcome {
    TaskOutcome::PermanentFailure {
        run_id,
        attempts,
        error: "persistence error: down".to_string(),
    }
}

#[test]
fn test_in_memory_mailbox_deliver_and_fetch() {
    let mut mailbox = InMemoryMailbox::new();

    mailbox.deliver(1, failure(1, 4));

    let messages = mailbox.fetch(1, None);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].outcome, failure(1, 4));
    assert!(mailbox.fetch(2, None).is_empty());
}

#[test]
fn test_latest_outcome_wins() {
    let mut mailbox = InMemoryMailbox::new();

    mailbox.deliver(7, failure(7, 1));
    mailbox.deliver(7, failure(7, 2));

    assert_eq!(mailbox.latest(7).map(|o| o.attempts()), Some(2));
    assert_eq!(mailbox.fetch(7, Some(0)).len(), 2);
    assert!(mailbox.latest(8).is_none());
}

#[test]
fn test_mailbox_keeps_bounded_history_per_run() {
    let mut mailbox = InMemoryMailbox::with_bound(2);

    for attempts in 1..=5 {
        mailbox.deliver(3, failure(3, attempts));
    }

    let kept: Vec<u32> = mailbox
        .fetch(3, None)
        .iter()
        .map(|m| m.outcome.attempts())
        .collect();
    assert_eq!(kept, vec![4, 5]);

    mailbox.clear(3);
    assert!(mailbox.latest(3).is_none());
}
