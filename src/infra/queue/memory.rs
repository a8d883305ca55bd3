//! In-memory FIFO of runs waiting for a dispatch slot.

use std::collections::{HashSet, VecDeque};

use crate::core::QueueError;
use crate::util::types::RunId;

/// Bounded FIFO of run ids. A run already waiting is not queued twice.
#[derive(Debug)]
pub struct RunQueue {
    max_depth: usize,
    runs: VecDeque<RunId>,
    waiting: HashSet<RunId>,
}

impl RunQueue {
    /// Create a new queue with a maximum depth.
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            runs: VecDeque::with_capacity(max_depth.min(1024)),
            waiting: HashSet::new(),
        }
    }

    /// Append a run. Returns `false` if it was already waiting.
    pub fn enqueue(&mut self, run_id: RunId) -> Result<bool, QueueError> {
        if self.waiting.contains(&run_id) {
            return Ok(false);
        }
        if self.runs.len() >= self.max_depth {
            return Err(QueueError::QueueFull(self.runs.len()));
        }
        self.runs.push_back(run_id);
        self.waiting.insert(run_id);
        Ok(true)
    }

    /// Oldest waiting run.
    pub fn dequeue(&mut self) -> Option<RunId> {
        let run_id = self.runs.pop_front()?;
        self.waiting.remove(&run_id);
        Some(run_id)
    }

    /// Oldest waiting run for which `blocked` is false.
    pub fn dequeue_first(&mut self, blocked: impl Fn(RunId) -> bool) -> Option<RunId> {
        let index = self.runs.iter().position(|run_id| !blocked(*run_id))?;
        let run_id = self.runs.remove(index)?;
        self.waiting.remove(&run_id);
        Some(run_id)
    }

    /// Maximum waiting runs.
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Waiting runs.
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
