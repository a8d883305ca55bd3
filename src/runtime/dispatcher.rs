//! Bounded-concurrency dispatcher: runs tasks when a slot is free, parks them
//! in a FIFO otherwise, and wakes the next waiting run when a slot is released.
//!
//! A run is never executed twice at once. Delivering a run that is already
//! executing parks it until the running copy releases its slot.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::config::runtime::DispatcherConfig;
use crate::core::{QueueError, TaskOutcome, TaskQueue, TaskRunner};
use crate::infra::{InMemoryMailbox, RunQueue};
use crate::util::types::RunId;

/// Abstraction for spawning task execution on a runtime.
pub trait Spawn {
    /// Spawn an async task that returns a future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

struct Slots {
    active: HashSet<RunId>,
    waiting: RunQueue,
    closed: bool,
}

struct Shared {
    runner: Arc<TaskRunner>,
    max_concurrent: usize,
    slots: Mutex<Slots>,
    mailbox: Mutex<InMemoryMailbox>,
    delivered: Notify,
}

impl Shared {
    /// Take a slot if one is free and the run is not already executing,
    /// otherwise park the run.
    fn admit(&self, run_id: RunId) -> Result<bool, QueueError> {
        let mut slots = self.slots.lock();
        if slots.closed {
            return Err(QueueError::Closed);
        }
        let executing = slots.active.contains(&run_id);
        if !executing && slots.active.len() < self.max_concurrent {
            slots.active.insert(run_id);
            return Ok(true);
        }
        if slots.waiting.enqueue(run_id)? {
            info!(run_id, executing, waiting = slots.waiting.len(), "run queued");
        }
        Ok(false)
    }

    /// Free the finished run's slot and take slots for waiting runs that can
    /// start now.
    fn release(&self, finished: RunId) -> Vec<RunId> {
        let mut slots = self.slots.lock();
        slots.active.remove(&finished);
        let mut next = Vec::new();
        if slots.closed {
            return next;
        }
        while slots.active.len() < self.max_concurrent {
            let Slots {
                active, waiting, ..
            } = &mut *slots;
            let Some(run_id) = waiting.dequeue_first(|id| active.contains(&id)) else {
                break;
            };
            active.insert(run_id);
            next.push(run_id);
        }
        next
    }
}

/// Holds a run's slot; dropping it (also when the run panics) releases the
/// slot and launches whatever can start next.
struct SlotGuard<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    shared: Arc<Shared>,
    spawner: S,
    run_id: RunId,
}

impl<S> Drop for SlotGuard<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        for next in self.shared.release(self.run_id) {
            debug!(run_id = next, "waking queued run");
            Dispatcher::<S>::launch(Arc::clone(&self.shared), self.spawner.clone(), next);
        }
    }
}

/// Runs tasks through a [`TaskRunner`] with at most `max_concurrent_runs`
/// in flight.
pub struct Dispatcher<S> {
    shared: Arc<Shared>,
    spawner: S,
}

impl<S> std::fmt::Debug for Dispatcher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("max_concurrent", &self.shared.max_concurrent)
            .finish_non_exhaustive()
    }
}

impl<S> Dispatcher<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Create a dispatcher.
    pub fn new(runner: Arc<TaskRunner>, limits: DispatcherConfig, spawner: S) -> Self {
        Self {
            shared: Arc::new(Shared {
                runner,
                max_concurrent: limits.max_concurrent_runs,
                slots: Mutex::new(Slots {
                    active: HashSet::new(),
                    waiting: RunQueue::new(limits.max_queue_depth),
                    closed: false,
                }),
                mailbox: Mutex::new(InMemoryMailbox::new()),
                delivered: Notify::new(),
            }),
            spawner,
        }
    }

    /// Runs currently executing.
    pub fn active(&self) -> usize {
        self.shared.slots.lock().active.len()
    }

    /// Runs waiting for a slot.
    pub fn waiting(&self) -> usize {
        self.shared.slots.lock().waiting.len()
    }

    /// Stop accepting runs. Running tasks finish; waiting runs are dropped.
    pub fn close(&self) {
        let mut slots = self.shared.slots.lock();
        slots.closed = true;
        let mut dropped = 0;
        while slots.waiting.dequeue().is_some() {
            dropped += 1;
        }
        warn!(dropped, "dispatcher closed");
    }

    /// Latest outcome delivered for a run.
    pub fn outcome(&self, run_id: RunId) -> Option<TaskOutcome> {
        self.shared.mailbox.lock().latest(run_id)
    }

    /// Wait up to `timeout` for an outcome for `run_id`.
    pub async fn wait_for(&self, run_id: RunId, timeout: Duration) -> Option<TaskOutcome> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.shared.delivered.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(outcome) = self.outcome(run_id) {
                return Some(outcome);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.outcome(run_id);
            }
        }
    }

    fn launch(shared: Arc<Shared>, spawner: S, run_id: RunId) {
        let guard = SlotGuard {
            shared: Arc::clone(&shared),
            spawner: spawner.clone(),
            run_id,
        };
        spawner.spawn(async move {
            debug!(run_id, "dispatching run");
            let outcome = shared.runner.run(run_id).await;
            shared.mailbox.lock().deliver(run_id, outcome);
            shared.delivered.notify_waiters();
            drop(guard);
        });
    }
}

impl<S> TaskQueue for Dispatcher<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    fn enqueue(&self, run_id: RunId) -> Result<(), QueueError> {
        let start = self.shared.admit(run_id)?;
        self.shared.mailbox.lock().clear(run_id);
        if start {
            info!(run_id, "run started immediately");
            Self::launch(Arc::clone(&self.shared), self.spawner.clone(), run_id);
        }
        Ok(())
    }
}
