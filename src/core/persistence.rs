//! Persistence seams used by the orchestrator and task runner.
//!
//! A [`SessionFactory`] opens one [`Persistence`] session per task attempt.
//! Implementations release the session when it is dropped, so every exit path
//! of an attempt (success, error, timeout, panic unwind) gives it back.

use async_trait::async_trait;

use crate::core::error::AppResult;
use crate::core::model::{
    AgentProfile, ExecutionUnit, ProspectRecord, RunStatus, StepLogEntry, WorkItem,
};
use crate::util::types::{AgentId, RunId};

/// Storage operations needed at orchestration step boundaries.
#[async_trait]
pub trait Persistence: Send {
    /// Load an execution unit.
    async fn load_run(&mut self, run_id: RunId) -> AppResult<Option<ExecutionUnit>>;

    /// Current status only; polled at every sub-step boundary.
    async fn load_status(&mut self, run_id: RunId) -> AppResult<Option<RunStatus>>;

    /// Atomically move `run_id` from `from` to `to`. Returns `false` if the
    /// stored status was not `from`.
    async fn transition_status(
        &mut self,
        run_id: RunId,
        from: RunStatus,
        to: RunStatus,
    ) -> AppResult<bool>;

    /// Take ownership of a run for a new execution attempt: atomically bump
    /// the stored attempt from `seen` to `seen + 1`. Returns `false` if the
    /// stored attempt was not `seen`.
    async fn claim_run(&mut self, run_id: RunId, seen: u64) -> AppResult<bool>;

    /// Persist counters, cursor, step index, error and timestamps. The
    /// stored status is left alone; use [`Persistence::transition_status`].
    ///
    /// Fails with [`WriteRejected`](crate::core::WriteRejected) when the run
    /// is terminal or `run.attempt` is not the stored attempt.
    async fn save_run_progress(&mut self, run: &ExecutionUnit) -> AppResult<()>;

    /// Atomically move the run from `from` to the terminal `run.status` and
    /// store its final progress. Returns `false` if the stored status was not
    /// `from`. Stale attempts fail like [`Persistence::save_run_progress`].
    async fn finalize_run(&mut self, run: &ExecutionUnit, from: RunStatus) -> AppResult<bool>;

    /// Append one step log entry. Fails with
    /// [`WriteRejected`](crate::core::WriteRejected) when the run is terminal.
    async fn append_log(&mut self, entry: &StepLogEntry) -> AppResult<()>;

    /// Highest step index logged for a run.
    async fn last_log_step(&mut self, run_id: RunId) -> AppResult<Option<u64>>;

    /// Load the agent configuration owning a run.
    async fn load_agent(&mut self, agent_id: AgentId) -> AppResult<Option<AgentProfile>>;

    /// Work items of a run, in insertion order.
    async fn load_work_items(&mut self, run_id: RunId) -> AppResult<Vec<WorkItem>>;

    /// Store sourced prospects as NEW work items.
    async fn insert_work_items(
        &mut self,
        run_id: RunId,
        prospects: Vec<ProspectRecord>,
    ) -> AppResult<Vec<WorkItem>>;

    /// Persist a work item's status, research and contact time.
    async fn update_work_item(&mut self, item: &WorkItem) -> AppResult<()>;
}

/// Opens persistence sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open a fresh session.
    async fn open(&self) -> AppResult<Box<dyn Persistence>>;
}
