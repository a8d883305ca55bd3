//! Shared fakes for integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use outreach_pacer::config::{ActionPolicy, JitterPlacement, PacingConfig, PolicyTable};
use outreach_pacer::core::{
    AgentProfile, AppResult, EffectorReport, ExecutionUnit, InboundReply, MailSender,
    MinimumDelay, OutboundEmail, Pacer, Persistence, ProspectRecord, QueueError, Researcher,
    ResponseChecker, RunStatus, SamplingParams, SearchHit, SessionFactory, Sourcer,
    StepLogEntry, TaskQueue, TextGenerator, WorkItem,
};
use outreach_pacer::builders::PacerBuilder;
use outreach_pacer::config::LeadCriteria;
use outreach_pacer::infra::{MemorySession, MemoryStore};
use outreach_pacer::util::{ActionType, AgentId, ManualClock, RunId};

pub const AGENT: u64 = 1;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap()
}

pub fn clock() -> ManualClock {
    ManualClock::new(t0())
}

/// Generous policies so pipeline tests are not throttled unless they ask to be.
pub fn open_policies() -> PolicyTable {
    let open = ActionPolicy {
        per_hour: Some(1_000),
        ..ActionPolicy::default()
    };
    PolicyTable::new([
        (ActionType::EmailSend, open),
        (ActionType::EmailCheck, open),
        (ActionType::CompanyResearch, open),
    ])
}

pub fn pacer_with(policies: PolicyTable, clock: &ManualClock) -> Arc<Pacer> {
    let config = PacingConfig {
        policies,
        jitter: JitterPlacement::Disabled,
        ..PacingConfig::default()
    };
    Arc::new(
        PacerBuilder::new(config)
            .clock(Arc::new(clock.clone()))
            .sleeper(Arc::new(clock.clone()))
            .delays(Arc::new(MinimumDelay))
            .build()
            .unwrap(),
    )
}

pub fn prospect(first: &str, company: &str) -> ProspectRecord {
    ProspectRecord {
        first_name: first.to_string(),
        last_name: "Doe".to_string(),
        email: Some(format!("{}@{}.test", first.to_lowercase(), company.to_lowercase())),
        title: Some("VP of Sales".to_string()),
        company: Some(company.to_string()),
        ..ProspectRecord::default()
    }
}

/// Store with one active agent and one CREATED run owning `prospects`.
pub fn seeded_store(run_id: RunId, prospects: Vec<ProspectRecord>) -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_agent(AgentProfile {
        id: AGENT,
        name: "Outbound".to_string(),
        is_active: true,
    });
    store.insert_run(ExecutionUnit::new(run_id, AGENT));
    store.insert_items(run_id, prospects);
    store
}

/// Writer that answers research prompts with a summary and compose prompts
/// with a `SUBJECT:` draft.
#[derive(Default)]
pub struct ScriptedWriter {
    pub calls: AtomicUsize,
}

#[async_trait]
impl TextGenerator for ScriptedWriter {
    async fn generate(&self, prompt: &str, params: SamplingParams) -> AppResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if params == SamplingParams::RESEARCH {
            return Ok("  Acme sells anvils and just raised a round.  ".to_string());
        }
        let name = prompt
            .lines()
            .find_map(|l| l.strip_prefix("Name: "))
            .unwrap_or("there");
        Ok(format!(
            "SUBJECT: Quick idea for you\n\nHi {name},\nworth a 15-min call?"
        ))
    }
}

/// Researcher that fails for the listed companies.
#[derive(Default)]
pub struct FakeResearcher {
    pub failing: HashSet<String>,
    pub queries: Mutex<Vec<String>>,
}

impl FakeResearcher {
    pub fn failing_for(company: &str) -> Self {
        Self {
            failing: HashSet::from([company.to_string()]),
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Researcher for FakeResearcher {
    async fn search(&self, query: &str, num_results: usize) -> AppResult<Vec<SearchHit>> {
        self.queries.lock().push(query.to_string());
        if self.failing.iter().any(|c| query.starts_with(c.as_str())) {
            return Err(anyhow!("search backend unavailable"));
        }
        Ok((0..num_results.min(2))
            .map(|i| SearchHit {
                title: format!("Result {i}"),
                snippet: "news".to_string(),
                link: None,
            })
            .collect())
    }
}

/// Mail sender that records sends and reports failure for listed recipients.
#[derive(Default)]
pub struct FakeMail {
    pub rejecting: HashSet<String>,
    pub sent: Mutex<Vec<OutboundEmail>>,
}

impl FakeMail {
    pub fn rejecting(address: &str) -> Self {
        Self {
            rejecting: HashSet::from([address.to_string()]),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn recipients(&self) -> Vec<String> {
        self.sent.lock().iter().map(|e| e.to.clone()).collect()
    }
}

#[async_trait]
impl MailSender for FakeMail {
    async fn send(&self, email: &OutboundEmail) -> EffectorReport {
        if self.rejecting.contains(&email.to) {
            return EffectorReport::failed("mailbox unavailable");
        }
        self.sent.lock().push(email.clone());
        EffectorReport::ok(serde_json::json!({ "message_id": format!("<{}>", email.to) }))
    }
}

/// Inbox returning a fixed set of replies.
pub struct FakeInbox {
    pub replies: Vec<InboundReply>,
}

#[async_trait]
impl ResponseChecker for FakeInbox {
    async fn check(&self, max_items: usize, _unread_only: bool) -> AppResult<Vec<InboundReply>> {
        Ok(self.replies.iter().take(max_items).cloned().collect())
    }
}

/// Sourcer returning a fixed list.
pub struct FakeSourcer {
    pub prospects: Vec<ProspectRecord>,
}

#[async_trait]
impl Sourcer for FakeSourcer {
    async fn find(&self, criteria: &LeadCriteria) -> AppResult<Vec<ProspectRecord>> {
        let limit = criteria.per_page as usize;
        Ok(self.prospects.iter().take(limit).cloned().collect())
    }
}

/// Queue that only remembers what was enqueued.
#[derive(Default)]
pub struct RecordingQueue {
    pub runs: Mutex<Vec<RunId>>,
}

impl TaskQueue for RecordingQueue {
    fn enqueue(&self, run_id: RunId) -> Result<(), QueueError> {
        self.runs.lock().push(run_id);
        Ok(())
    }
}

/// Tracks how many callers are inside a section at once.
#[derive(Default)]
pub struct Concurrency {
    current: AtomicUsize,
    pub peak: AtomicUsize,
}

impl Concurrency {
    pub async fn hold(&self, duration: Duration) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(duration).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Writes a [`FaultyStore`] refuses.
#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    pub log: bool,
    pub item_updates: bool,
}

/// Memory store whose sessions fail selected writes.
#[derive(Clone)]
pub struct FaultyStore {
    pub store: MemoryStore,
    pub faults: Faults,
}

impl FaultyStore {
    pub fn session(&self) -> FaultySession {
        FaultySession {
            inner: self.store.session(),
            faults: self.faults,
        }
    }
}

#[async_trait]
impl SessionFactory for FaultyStore {
    async fn open(&self) -> AppResult<Box<dyn Persistence>> {
        Ok(Box::new(self.session()))
    }
}

pub struct FaultySession {
    inner: MemorySession,
    faults: Faults,
}

#[async_trait]
impl Persistence for FaultySession {
    async fn load_run(&mut self, run_id: RunId) -> AppResult<Option<ExecutionUnit>> {
        self.inner.load_run(run_id).await
    }

    async fn load_status(&mut self, run_id: RunId) -> AppResult<Option<RunStatus>> {
        self.inner.load_status(run_id).await
    }

    async fn transition_status(
        &mut self,
        run_id: RunId,
        from: RunStatus,
        to: RunStatus,
    ) -> AppResult<bool> {
        self.inner.transition_status(run_id, from, to).await
    }

    async fn claim_run(&mut self, run_id: RunId, seen: u64) -> AppResult<bool> {
        self.inner.claim_run(run_id, seen).await
    }

    async fn save_run_progress(&mut self, run: &ExecutionUnit) -> AppResult<()> {
        self.inner.save_run_progress(run).await
    }

    async fn finalize_run(&mut self, run: &ExecutionUnit, from: RunStatus) -> AppResult<bool> {
        self.inner.finalize_run(run, from).await
    }

    async fn append_log(&mut self, entry: &StepLogEntry) -> AppResult<()> {
        if self.faults.log {
            return Err(anyhow!("disk full"));
        }
        self.inner.append_log(entry).await
    }

    async fn last_log_step(&mut self, run_id: RunId) -> AppResult<Option<u64>> {
        self.inner.last_log_step(run_id).await
    }

    async fn load_agent(&mut self, agent_id: AgentId) -> AppResult<Option<AgentProfile>> {
        self.inner.load_agent(agent_id).await
    }

    async fn load_work_items(&mut self, run_id: RunId) -> AppResult<Vec<WorkItem>> {
        self.inner.load_work_items(run_id).await
    }

    async fn insert_work_items(
        &mut self,
        run_id: RunId,
        prospects: Vec<ProspectRecord>,
    ) -> AppResult<Vec<WorkItem>> {
        self.inner.insert_work_items(run_id, prospects).await
    }

    async fn update_work_item(&mut self, item: &WorkItem) -> AppResult<()> {
        if self.faults.item_updates {
            return Err(anyhow!("item table locked"));
        }
        self.inner.update_work_item(item).await
    }
}
