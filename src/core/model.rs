//! Persisted records: execution units, work items and step logs.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::{ItemError, RunError};
use crate::util::types::{AgentId, ItemId, RunId};

/// Lifecycle of an execution unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Created, not yet picked up.
    Created,
    /// Being executed (or interrupted mid-execution).
    Running,
    /// Stopped by an operator; resumable.
    Paused,
    /// Finished normally.
    Completed,
    /// Finished with a run-level failure.
    Failed,
}

impl RunStatus {
    /// Completed and failed runs never change again.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the state machine allows `self -> to`.
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Created, Self::Running | Self::Failed)
                | (Self::Running, Self::Paused | Self::Completed | Self::Failed)
                | (Self::Paused, Self::Running | Self::Failed)
        )
    }

    /// Checked transition.
    pub fn transition(self, to: Self) -> Result<Self, RunError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(RunError::InvalidTransition { from: self, to })
        }
    }

    /// Upper-case tag as stored.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outreach run and its progress counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionUnit {
    /// Run identifier.
    pub id: RunId,
    /// Owning agent configuration.
    pub agent_id: AgentId,
    /// Current lifecycle state.
    pub status: RunStatus,
    /// Step index the next log entry will use.
    pub current_step: u64,
    /// Position of the next work item to process.
    #[serde(default)]
    pub next_item: usize,
    /// Work items that went through the pipeline.
    pub items_processed: u32,
    /// Confirmed outbound sends.
    pub actions_sent: u32,
    /// Replies seen by the last response check.
    pub responses_received: u32,
    /// Failure detail for FAILED runs.
    pub error: Option<String>,
    /// First transition to RUNNING.
    pub started_at: Option<DateTime<Utc>>,
    /// Transition to a terminal state.
    pub ended_at: Option<DateTime<Utc>>,
    /// Execution attempt that owns the run; bumped by every claim.
    #[serde(default)]
    pub attempt: u64,
}

impl ExecutionUnit {
    /// Fresh run in CREATED.
    pub const fn new(id: RunId, agent_id: AgentId) -> Self {
        Self {
            id,
            agent_id,
            status: RunStatus::Created,
            current_step: 0,
            next_item: 0,
            items_processed: 0,
            actions_sent: 0,
            responses_received: 0,
            error: None,
            started_at: None,
            ended_at: None,
            attempt: 0,
        }
    }

    /// Move to RUNNING, stamping the start time on first entry.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), RunError> {
        self.status = self.status.transition(RunStatus::Running)?;
        self.started_at.get_or_insert(now);
        Ok(())
    }

    /// RUNNING -> PAUSED.
    pub fn pause(&mut self) -> Result<(), RunError> {
        self.status = self.status.transition(RunStatus::Paused)?;
        Ok(())
    }

    /// PAUSED -> RUNNING.
    pub fn resume(&mut self) -> Result<(), RunError> {
        if self.status != RunStatus::Paused {
            return Err(RunError::InvalidTransition {
                from: self.status,
                to: RunStatus::Running,
            });
        }
        self.status = RunStatus::Running;
        Ok(())
    }

    /// Terminal success.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), RunError> {
        self.status = self.status.transition(RunStatus::Completed)?;
        self.ended_at = Some(now);
        Ok(())
    }

    /// Terminal failure with detail.
    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<(), RunError> {
        self.status = self.status.transition(RunStatus::Failed)?;
        self.error = Some(error.into());
        self.ended_at = Some(now);
        Ok(())
    }
}

/// Counters reported back to callers when a run stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Run identifier.
    pub run_id: RunId,
    /// Status when the orchestrator returned.
    pub status: RunStatus,
    /// Work items that went through the pipeline.
    pub items_processed: u32,
    /// Confirmed outbound sends.
    pub actions_sent: u32,
    /// Replies seen by the response check.
    pub responses_received: u32,
    /// Failure detail.
    pub error: Option<String>,
}

impl From<&ExecutionUnit> for RunReport {
    fn from(run: &ExecutionUnit) -> Self {
        Self {
            run_id: run.id,
            status: run.status,
            items_processed: run.items_processed,
            actions_sent: run.actions_sent,
            responses_received: run.responses_received,
            error: run.error.clone(),
        }
    }
}

/// Agent configuration that owns runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Agent identifier.
    pub id: AgentId,
    /// Display name.
    pub name: String,
    /// Inactive agents cannot run.
    pub is_active: bool,
}

/// Pipeline state of a prospect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkItemStatus {
    /// Not contacted yet.
    New,
    /// Outreach sent.
    Contacted,
    /// Prospect replied.
    Responded,
    /// Worth pursuing.
    Qualified,
    /// Dropped.
    Disqualified,
}

impl WorkItemStatus {
    const fn rank(self) -> u8 {
        match self {
            Self::New => 0,
            Self::Contacted => 1,
            Self::Responded => 2,
            Self::Qualified | Self::Disqualified => 3,
        }
    }

    /// QUALIFIED and DISQUALIFIED are final.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Qualified | Self::Disqualified)
    }

    /// Transitions only move forward; DISQUALIFIED is reachable from any
    /// non-terminal state.
    pub const fn can_transition_to(self, to: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        if matches!(to, Self::Disqualified) {
            return true;
        }
        to.rank() > self.rank()
    }
}

/// Prospect as returned by the sourcer, before it is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProspectRecord {
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Work email.
    pub email: Option<String>,
    /// Job title.
    pub title: Option<String>,
    /// Employer.
    pub company: Option<String>,
    /// Employer web domain.
    pub company_domain: Option<String>,
    /// Employer headcount bucket.
    pub company_size: Option<String>,
    /// Employer industry.
    pub industry: Option<String>,
    /// Social profile URL.
    pub profile_url: Option<String>,
}

/// One prospect inside a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Item identifier.
    pub id: ItemId,
    /// Owning run.
    pub run_id: RunId,
    /// Identity and channels.
    #[serde(flatten)]
    pub prospect: ProspectRecord,
    /// Pipeline state.
    pub status: WorkItemStatus,
    /// Research summary used for the outreach draft.
    pub research: Option<String>,
    /// Last confirmed contact.
    pub last_contacted_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    /// Wrap a sourced prospect.
    pub const fn new(id: ItemId, run_id: RunId, prospect: ProspectRecord) -> Self {
        Self {
            id,
            run_id,
            prospect,
            status: WorkItemStatus::New,
            research: None,
            last_contacted_at: None,
        }
    }

    /// "First Last".
    pub fn display_name(&self) -> String {
        format!("{} {}", self.prospect.first_name, self.prospect.last_name)
            .trim()
            .to_string()
    }

    /// Checked status change.
    pub fn advance(&mut self, to: WorkItemStatus) -> Result<(), ItemError> {
        if !self.status.can_transition_to(to) {
            return Err(ItemError::Update(format!(
                "item {} cannot move from {:?} to {:?}",
                self.id, self.status, to
            )));
        }
        self.status = to;
        Ok(())
    }

    /// Record a confirmed send.
    pub fn mark_contacted(
        &mut self,
        research: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), ItemError> {
        self.advance(WorkItemStatus::Contacted)?;
        self.research = Some(research.into());
        self.last_contacted_at = Some(now);
        Ok(())
    }
}

/// Author of a step log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepRole {
    /// Orchestrator bookkeeping.
    System,
    /// Generated text.
    Assistant,
    /// Collaborator call.
    Tool,
}

/// Append-only record of one orchestration sub-step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLogEntry {
    /// Owning run.
    pub run_id: RunId,
    /// Strictly increasing per run.
    pub step: u64,
    /// Author.
    pub role: StepRole,
    /// Collaborator name for tool entries.
    pub tool_name: Option<String>,
    /// Human-readable content.
    pub content: String,
    /// Structured detail; `"error": true` marks failures.
    pub metadata: serde_json::Value,
}

impl StepLogEntry {
    /// Whether the entry records a failure.
    pub fn is_error(&self) -> bool {
        self.metadata
            .get("error")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}
