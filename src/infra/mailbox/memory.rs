//! In-memory mailbox holding task outcomes until a caller collects them.

use std::collections::{HashMap, VecDeque};

use crate::core::TaskOutcome;
use crate::util::clock::now_ms;
use crate::util::types::RunId;

/// Outcomes kept per run when no bound is given.
pub const DEFAULT_OUTCOMES_PER_RUN: usize = 8;

/// Mailbox message container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxMessage {
    /// Final task outcome.
    pub outcome: TaskOutcome,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
}

/// Outcomes keyed by run. Later deliveries for the same run are appended;
/// the oldest are dropped once a run holds `per_run` messages.
#[derive(Debug)]
pub struct InMemoryMailbox {
    messages: HashMap<RunId, VecDeque<MailboxMessage>>,
    per_run: usize,
}

impl Default for InMemoryMailbox {
    fn default() -> Self {
        Self::with_bound(DEFAULT_OUTCOMES_PER_RUN)
    }
}

impl InMemoryMailbox {
    /// Create a new mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mailbox keeping at most `per_run` outcomes for each run.
    pub fn with_bound(per_run: usize) -> Self {
        Self {
            messages: HashMap::new(),
            per_run: per_run.max(1),
        }
    }

    /// Store an outcome.
    pub fn deliver(&mut self, run_id: RunId, outcome: TaskOutcome) {
        let messages = self.messages.entry(run_id).or_default();
        if messages.len() >= self.per_run {
            messages.pop_front();
        }
        messages.push_back(MailboxMessage {
            outcome,
            created_at_ms: now_ms(),
        });
    }

    /// Forget every outcome held for a run.
    pub fn clear(&mut self, run_id: RunId) {
        self.messages.remove(&run_id);
    }

    /// Messages for a run, optionally since a timestamp.
    pub fn fetch(&self, run_id: RunId, since_ms: Option<u128>) -> Vec<MailboxMessage> {
        self.messages
            .get(&run_id)
            .map(|msgs| {
                msgs.iter()
                    .filter(|m| since_ms.map_or(true, |s| m.created_at_ms >= s))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Most recent outcome for a run.
    pub fn latest(&self, run_id: RunId) -> Option<TaskOutcome> {
        self.messages
            .get(&run_id)
            .and_then(|msgs| msgs.back())
            .map(|m| m.outcome.clone())
    }
}
