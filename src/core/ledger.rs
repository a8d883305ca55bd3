//! Action ledger: per-type timestamp history with reservations.
//!
//! Each action type has its own book guarded by a `parking_lot::Mutex`. A book
//! holds committed events (sorted, oldest first) and pending reservations made
//! by callers that passed the gate but have not yet run their effector. Pending
//! reservations count like committed events, so two callers cannot both take
//! the last slot of a window.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::core::error::StoreError;
use crate::util::types::ActionType;

/// One performed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEvent {
    /// What was done.
    pub action: ActionType,
    /// When it was done.
    pub at: DateTime<Utc>,
}

/// Durable backing for ledger events.
pub trait LedgerStore: Send {
    /// Persist one committed event.
    fn append(&mut self, event: &ActionEvent) -> Result<(), StoreError>;
    /// Events newer than `cutoff`, in any order.
    fn load_since(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<ActionEvent>, StoreError>;
    /// Drop events at or before `cutoff`; returns how many were removed.
    fn prune_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// Read-only view of one action type's history, as seen by the gate.
pub trait History {
    /// Entries with `timestamp > cutoff`.
    fn count_since(&self, cutoff: DateTime<Utc>) -> usize;
    /// The `n`-th oldest entry (0-based) with `timestamp > cutoff`.
    fn nth_since(&self, cutoff: DateTime<Utc>, n: usize) -> Option<DateTime<Utc>>;
    /// Most recent entry.
    fn latest(&self) -> Option<DateTime<Utc>>;
}

#[derive(Debug, Default)]
struct Book {
    events: VecDeque<DateTime<Utc>>,
    pending: Vec<(u64, DateTime<Utc>)>,
}

impl Book {
    fn committed_since(&self, cutoff: DateTime<Utc>) -> usize {
        self.events.len() - self.events.partition_point(|t| *t <= cutoff)
    }

    fn push(&mut self, action: ActionType, at: DateTime<Utc>) -> DateTime<Utc> {
        let at = match self.events.back() {
            Some(last) if at < *last => {
                warn!(
                    action = %action,
                    recorded = %at,
                    latest = %last,
                    "timestamp precedes ledger tail; clamping"
                );
                *last
            }
            _ => at,
        };
        self.events.push_back(at);
        at
    }

    fn prune(&mut self, cutoff: DateTime<Utc>) -> usize {
        let stale = self.events.partition_point(|t| *t <= cutoff);
        self.events.drain(..stale);
        stale
    }
}

impl History for Book {
    fn count_since(&self, cutoff: DateTime<Utc>) -> usize {
        self.committed_since(cutoff) + self.pending.iter().filter(|(_, t)| *t > cutoff).count()
    }

    fn nth_since(&self, cutoff: DateTime<Utc>, n: usize) -> Option<DateTime<Utc>> {
        let start = self.events.partition_point(|t| *t <= cutoff);
        let mut merged: Vec<DateTime<Utc>> = self.events.range(start..).copied().collect();
        merged.extend(self.pending.iter().map(|(_, t)| *t).filter(|t| *t > cutoff));
        merged.sort_unstable();
        merged.get(n).copied()
    }

    fn latest(&self) -> Option<DateTime<Utc>> {
        let committed = self.events.back().copied();
        let pending = self.pending.iter().map(|(_, t)| *t).max();
        committed.max(pending)
    }
}

/// Process-wide record of performed actions.
pub struct ActionLedger {
    books: HashMap<ActionType, Mutex<Book>>,
    retention: TimeDelta,
    store: Option<Mutex<Box<dyn LedgerStore>>>,
    next_reservation: AtomicU64,
}

impl std::fmt::Debug for ActionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionLedger")
            .field("retention", &self.retention)
            .field("persisted", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl ActionLedger {
    /// In-memory ledger keeping `retention` worth of history.
    pub fn new(retention: TimeDelta) -> Self {
        Self {
            books: ActionType::ALL
                .into_iter()
                .map(|a| (a, Mutex::new(Book::default())))
                .collect(),
            retention,
            store: None,
            next_reservation: AtomicU64::new(1),
        }
    }

    /// Ledger backed by a durable store, reloaded with everything newer than
    /// `now - retention`.
    pub fn with_store(
        retention: TimeDelta,
        mut store: Box<dyn LedgerStore>,
        now: DateTime<Utc>,
    ) -> Result<Self, StoreError> {
        let mut ledger = Self::new(retention);
        let mut events = store.load_since(now - retention)?;
        events.sort_by_key(|e| e.at);
        for event in &events {
            ledger.book(event.action).lock().push(event.action, event.at);
        }
        debug!(loaded = events.len(), "ledger restored from store");
        ledger.store = Some(Mutex::new(store));
        Ok(ledger)
    }

    fn book(&self, action: ActionType) -> &Mutex<Book> {
        // Every ActionType gets a book in `new`.
        &self.books[&action]
    }

    /// How long history is kept.
    pub const fn retention(&self) -> TimeDelta {
        self.retention
    }

    /// Append a committed event. Timestamps earlier than the newest entry
    /// are clamped to it; the stored timestamp is returned.
    pub fn record(&self, action: ActionType, at: DateTime<Utc>) -> DateTime<Utc> {
        let stored = {
            let mut book = self.book(action).lock();
            let stored = book.push(action, at);
            book.prune(stored - self.retention);
            stored
        };
        self.persist(ActionEvent { action, at: stored });
        debug!(action = %action, at = %stored, "action recorded");
        stored
    }

    fn persist(&self, event: ActionEvent) {
        if let Some(store) = &self.store {
            if let Err(e) = store.lock().append(&event) {
                error!(action = %event.action, error = %e, "failed to persist ledger event");
            }
        }
    }

    /// Entries (committed and pending) with `timestamp > cutoff`.
    pub fn count_since(&self, action: ActionType, cutoff: DateTime<Utc>) -> usize {
        self.book(action).lock().count_since(cutoff)
    }

    /// Most recent entry for an action type.
    pub fn latest(&self, action: ActionType) -> Option<DateTime<Utc>> {
        self.book(action).lock().latest()
    }

    /// Drop every committed entry older than `now - retention`.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.retention;
        let removed: usize = self.books.values().map(|b| b.lock().prune(cutoff)).sum();
        if let Some(store) = &self.store {
            if let Err(e) = store.lock().prune_before(cutoff) {
                error!(error = %e, "failed to prune ledger store");
            }
        }
        debug!(removed, "ledger pruned");
        removed
    }

    /// Forget all committed history for one action type.
    pub fn reset(&self, action: ActionType) {
        self.book(action).lock().events.clear();
        warn!(action = %action, "ledger history reset");
    }

    /// Run `f` against the history of `action` under its lock.
    pub fn inspect<R>(&self, action: ActionType, f: impl FnOnce(&dyn History) -> R) -> R {
        let book = self.book(action).lock();
        f(&*book)
    }

    /// Evaluate `check` and, if it passes, hold a pending slot at `at`.
    /// Both happen under the action type's lock.
    ///
    /// `at` is when the action is expected to happen, which may lie in the
    /// future when the caller sleeps first. Later checks see the slot there.
    pub fn try_reserve<E>(
        &self,
        action: ActionType,
        at: DateTime<Utc>,
        check: impl FnOnce(&dyn History) -> Result<(), E>,
    ) -> Result<Reservation<'_>, E> {
        let mut book = self.book(action).lock();
        check(&*book)?;
        let id = self.next_reservation.fetch_add(1, Ordering::Relaxed);
        book.pending.push((id, at));
        Ok(Reservation {
            ledger: self,
            action,
            id,
            settled: false,
        })
    }

    fn settle(&self, action: ActionType, id: u64, commit_at: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        let stored = {
            let mut book = self.book(action).lock();
            book.pending.retain(|(pid, _)| *pid != id);
            commit_at.map(|at| {
                let stored = book.push(action, at);
                book.prune(stored - self.retention);
                stored
            })
        };
        if let Some(at) = stored {
            self.persist(ActionEvent { action, at });
            debug!(action = %action, at = %at, "reservation committed");
        } else {
            debug!(action = %action, "reservation released");
        }
        stored
    }
}

/// A pending slot in the ledger. Dropping it without committing releases it.
#[derive(Debug)]
pub struct Reservation<'a> {
    ledger: &'a ActionLedger,
    action: ActionType,
    id: u64,
    settled: bool,
}

impl Reservation<'_> {
    /// Action type the slot belongs to.
    pub const fn action(&self) -> ActionType {
        self.action
    }

    /// Turn the slot into a committed event at `at`.
    pub fn commit(mut self, at: DateTime<Utc>) -> DateTime<Utc> {
        self.settled = true;
        self.ledger
            .settle(self.action, self.id, Some(at))
            .unwrap_or(at)
    }

    /// Give the slot back without consuming budget.
    pub fn release(mut self) {
        self.settled = true;
        self.ledger.settle(self.action, self.id, None);
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.ledger.settle(self.action, self.id, None);
        }
    }
}
