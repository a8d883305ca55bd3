//! Error types for pacing, orchestration and task execution.

use std::time::Duration;

use thiserror::Error;

use crate::core::model::RunStatus;
use crate::util::types::{AgentId, RunId};

/// Configuration could not be loaded or is inconsistent.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Input was not valid JSON for the target model.
    #[error("parse error: {0}")]
    Parse(String),
    /// Values parsed but violate a constraint.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// An environment variable held an unparsable value.
    #[error("invalid value for {key}: {value:?}")]
    Env {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },
    /// Configuration file could not be read.
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),
    /// The persisted ledger could not be restored.
    #[error("ledger restore failed: {0}")]
    Store(#[from] StoreError),
}

/// Persisted ledger backend failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),
    /// Stored record could not be encoded or decoded.
    #[error("store encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Failure that escapes a whole run.
///
/// Per-item failures never surface here; they are logged and the run moves on.
#[derive(Debug, Error)]
pub enum RunError {
    /// The execution unit does not exist.
    #[error("execution {0} not found")]
    NotFound(RunId),
    /// The run's agent configuration does not exist.
    #[error("agent {0} not found")]
    AgentNotFound(AgentId),
    /// The run's agent is switched off.
    #[error("agent {0} is not active")]
    AgentInactive(AgentId),
    /// A status change the state machine forbids.
    #[error("cannot move execution from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: RunStatus,
        /// Requested status.
        to: RunStatus,
    },
    /// The persistence layer failed.
    #[error("persistence error: {0}")]
    Persistence(String),
    /// A collaborator outside the item loop failed.
    #[error("{step} failed: {message}")]
    Step {
        /// Pipeline step name.
        step: &'static str,
        /// Collaborator error.
        message: String,
    },
    /// The attempt exceeded its wall-clock ceiling.
    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),
    /// The run could not be handed to the task runner.
    #[error("dispatch failed: {0}")]
    Dispatch(#[from] QueueError),
    /// Another execution claimed the run; this one must stop writing.
    #[error("execution {0} was claimed by another attempt")]
    Superseded(RunId),
}

impl RunError {
    /// Whether the task runner should try the run again.
    ///
    /// Missing runs and forbidden transitions will not fix themselves.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::TimedOut(_))
    }
}

/// A store refused a write from an execution that no longer owns the run,
/// or a write to a run that already reached a terminal state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WriteRejected {
    /// The stored attempt moved past the writer's.
    #[error("run {run_id} is owned by attempt {current}, not {stale}")]
    StaleAttempt {
        /// Run written to.
        run_id: RunId,
        /// Attempt held by the writer.
        stale: u64,
        /// Attempt recorded in the store.
        current: u64,
    },
    /// The run is COMPLETED or FAILED.
    #[error("run {run_id} is already {status}")]
    Terminal {
        /// Run written to.
        run_id: RunId,
        /// Its final status.
        status: RunStatus,
    },
}

/// Failure of a single work item's pipeline.
#[derive(Debug, Error)]
pub enum ItemError {
    /// Company research failed.
    #[error("research failed: {0}")]
    Research(String),
    /// Draft generation failed.
    #[error("compose failed: {0}")]
    Compose(String),
    /// The item cannot be contacted.
    #[error("contact failed: {0}")]
    Contact(String),
    /// Work item could not be updated.
    #[error("item update failed: {0}")]
    Update(String),
}

/// Run hand-off rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The waiting queue is at capacity.
    #[error("queue full: {0} runs waiting")]
    QueueFull(usize),
    /// The dispatcher has been shut down.
    #[error("dispatcher shut down")]
    Closed,
}

/// Application-facing result using anyhow for collaborator contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
