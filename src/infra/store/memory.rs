//! In-memory persistence for development and testing.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::core::{
    AgentProfile, AppResult, ExecutionUnit, Persistence, ProspectRecord, RunStatus,
    SessionFactory, StepLogEntry, WorkItem, WriteRejected,
};
use crate::util::types::{AgentId, ItemId, RunId};

#[derive(Debug, Default)]
struct State {
    agents: HashMap<AgentId, AgentProfile>,
    runs: HashMap<RunId, ExecutionUnit>,
    items: BTreeMap<ItemId, WorkItem>,
    logs: HashMap<RunId, Vec<StepLogEntry>>,
    next_item_id: ItemId,
}

/// Shared in-memory database. Cloning shares the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    open_sessions: Arc<AtomicUsize>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an agent.
    pub fn insert_agent(&self, agent: AgentProfile) {
        self.state.lock().agents.insert(agent.id, agent);
    }

    /// Insert or replace a run.
    pub fn insert_run(&self, run: ExecutionUnit) {
        self.state.lock().runs.insert(run.id, run);
    }

    /// Store prospects for a run and return the created items.
    pub fn insert_items(&self, run_id: RunId, prospects: Vec<ProspectRecord>) -> Vec<WorkItem> {
        self.state.lock().add_items(run_id, prospects)
    }

    /// Snapshot of a run.
    pub fn run(&self, run_id: RunId) -> Option<ExecutionUnit> {
        self.state.lock().runs.get(&run_id).cloned()
    }

    /// Overwrite a run's status, bypassing the state machine.
    pub fn force_status(&self, run_id: RunId, status: RunStatus) {
        if let Some(run) = self.state.lock().runs.get_mut(&run_id) {
            run.status = status;
        }
    }

    /// Snapshot of a run's items in insertion order.
    pub fn items(&self, run_id: RunId) -> Vec<WorkItem> {
        self.state.lock().items_of(run_id)
    }

    /// Snapshot of a run's step log.
    pub fn logs(&self, run_id: RunId) -> Vec<StepLogEntry> {
        self.state
            .lock()
            .logs
            .get(&run_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Sessions opened and not yet dropped.
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    /// Open a session directly.
    pub fn session(&self) -> MemorySession {
        let open = self.open_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(open, "memory session opened");
        MemorySession {
            state: Arc::clone(&self.state),
            open_sessions: Arc::clone(&self.open_sessions),
        }
    }
}

impl State {
    fn add_items(&mut self, run_id: RunId, prospects: Vec<ProspectRecord>) -> Vec<WorkItem> {
        prospects
            .into_iter()
            .map(|prospect| {
                self.next_item_id += 1;
                let item = WorkItem::new(self.next_item_id, run_id, prospect);
                self.items.insert(item.id, item.clone());
                item
            })
            .collect()
    }

    fn run_mut(&mut self, run_id: RunId) -> AppResult<&mut ExecutionUnit> {
        self.runs
            .get_mut(&run_id)
            .ok_or_else(|| anyhow!("run {run_id} not found"))
    }

    fn items_of(&self, run_id: RunId) -> Vec<WorkItem> {
        self.items
            .values()
            .filter(|i| i.run_id == run_id)
            .cloned()
            .collect()
    }
}

fn ensure_owner(run: &ExecutionUnit, attempt: u64) -> AppResult<()> {
    if run.attempt == attempt {
        return Ok(());
    }
    Err(WriteRejected::StaleAttempt {
        run_id: run.id,
        stale: attempt,
        current: run.attempt,
    }
    .into())
}

#[async_trait]
impl SessionFactory for MemoryStore {
    async fn open(&self) -> AppResult<Box<dyn Persistence>> {
        Ok(Box::new(self.session()))
    }
}

/// One session on a [`MemoryStore`]; released on drop.
#[derive(Debug)]
pub struct MemorySession {
    state: Arc<Mutex<State>>,
    open_sessions: Arc<AtomicUsize>,
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        let open = self.open_sessions.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!(open, "memory session released");
    }
}

#[async_trait]
impl Persistence for MemorySession {
    async fn load_run(&mut self, run_id: RunId) -> AppResult<Option<ExecutionUnit>> {
        Ok(self.state.lock().runs.get(&run_id).cloned())
    }

    async fn load_status(&mut self, run_id: RunId) -> AppResult<Option<RunStatus>> {
        Ok(self.state.lock().runs.get(&run_id).map(|r| r.status))
    }

    async fn transition_status(
        &mut self,
        run_id: RunId,
        from: RunStatus,
        to: RunStatus,
    ) -> AppResult<bool> {
        let mut state = self.state.lock();
        let run = state
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| anyhow!("run {run_id} not found"))?;
        if run.status != from {
            return Ok(false);
        }
        run.status = to;
        Ok(true)
    }

    async fn claim_run(&mut self, run_id: RunId, seen: u64) -> AppResult<bool> {
        let mut state = self.state.lock();
        let run = state.run_mut(run_id)?;
        if run.attempt != seen {
            return Ok(false);
        }
        run.attempt += 1;
        Ok(true)
    }

    async fn save_run_progress(&mut self, progress: &ExecutionUnit) -> AppResult<()> {
        let mut state = self.state.lock();
        let run = state.run_mut(progress.id)?;
        if run.status.is_terminal() {
            return Err(WriteRejected::Terminal {
                run_id: run.id,
                status: run.status,
            }
            .into());
        }
        ensure_owner(run, progress.attempt)?;
        let status = run.status;
        *run = progress.clone();
        run.status = status;
        Ok(())
    }

    async fn finalize_run(&mut self, progress: &ExecutionUnit, from: RunStatus) -> AppResult<bool> {
        if !progress.status.is_terminal() {
            return Err(anyhow!(
                "run {} cannot be finalized as {}",
                progress.id,
                progress.status
            ));
        }
        let mut state = self.state.lock();
        let run = state.run_mut(progress.id)?;
        if run.status != from {
            return Ok(false);
        }
        ensure_owner(run, progress.attempt)?;
        *run = progress.clone();
        Ok(true)
    }

    async fn append_log(&mut self, entry: &StepLogEntry) -> AppResult<()> {
        let mut state = self.state.lock();
        if let Some(run) = state.runs.get(&entry.run_id) {
            if run.status.is_terminal() {
                return Err(WriteRejected::Terminal {
                    run_id: run.id,
                    status: run.status,
                }
                .into());
            }
        }
        let log = state.logs.entry(entry.run_id).or_default();
        if let Some(last) = log.last() {
            if entry.step <= last.step {
                return Err(anyhow!(
                    "step {} does not follow {} for run {}",
                    entry.step,
                    last.step,
                    entry.run_id
                ));
            }
        }
        log.push(entry.clone());
        Ok(())
    }

    async fn last_log_step(&mut self, run_id: RunId) -> AppResult<Option<u64>> {
        Ok(self
            .state
            .lock()
            .logs
            .get(&run_id)
            .and_then(|log| log.last())
            .map(|e| e.step))
    }

    async fn load_agent(&mut self, agent_id: AgentId) -> AppResult<Option<AgentProfile>> {
        Ok(self.state.lock().agents.get(&agent_id).cloned())
    }

    async fn load_work_items(&mut self, run_id: RunId) -> AppResult<Vec<WorkItem>> {
        Ok(self.state.lock().items_of(run_id))
    }

    async fn insert_work_items(
        &mut self,
        run_id: RunId,
        prospects: Vec<ProspectRecord>,
    ) -> AppResult<Vec<WorkItem>> {
        Ok(self.state.lock().add_items(run_id, prospects))
    }

    async fn update_work_item(&mut self, item: &WorkItem) -> AppResult<()> {
        let mut state = self.state.lock();
        let stored = state
            .items
            .get_mut(&item.id)
            .ok_or_else(|| anyhow!("work item {} not found", item.id))?;
        *stored = item.clone();
        Ok(())
    }
}
