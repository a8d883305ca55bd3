//! Core pacing abstractions, run orchestration and task execution.

pub mod audit;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod model;
pub mod orchestrator;
pub mod pacer;
pub mod persistence;
pub mod prompts;
pub mod rate_gate;
pub mod social;
pub mod task_runner;
pub mod warmup;

pub use audit::{build_audit_event, AuditEvent, AuditSink, InMemoryAuditSink};
pub use error::{
    AppResult, ConfigError, ItemError, QueueError, RunError, StoreError, WriteRejected,
};
pub use executor::{
    Collaborators, EffectorReport, InboundReply, MailSender, OutboundEmail, Outcome,
    Researcher, ResponseChecker, SamplingParams, SearchHit, Sourcer, TextGenerator,
};
pub use ledger::{ActionEvent, ActionLedger, History, LedgerStore, Reservation};
pub use model::{
    AgentProfile, ExecutionUnit, ProspectRecord, RunReport, RunStatus, StepLogEntry, StepRole,
    WorkItem, WorkItemStatus,
};
pub use orchestrator::{pause_run, resume_run, Orchestrator};
pub use pacer::{DelaySampler, MinimumDelay, PaceOutcome, Pacer, UniformDelay};
pub use persistence::{Persistence, SessionFactory};
pub use rate_gate::{
    evaluate, Denial, DenialReason, GateDecision, RateGate, UsageStats, WarmupLimit,
};
pub use social::{truncate_note, Engagement, PacedSocial, PeopleQuery, SocialProvider};
pub use task_runner::{TaskOutcome, TaskQueue, TaskRunner};
pub use warmup::{week_index, WarmupPolicy};
