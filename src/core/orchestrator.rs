//! Execution orchestrator: drives one outreach run through its pipeline.
//!
//! A run walks its work items in insertion order. Each item goes through
//! research, compose and contact; every sub-step appends exactly one step log
//! entry and persists progress, so a crashed or paused run resumes from the
//! stored cursor with a strictly increasing step index. Per-item failures are
//! logged with `"error": true` and never stop later items.
//!
//! Run-level failures the orchestrator can record (missing agent, sourcing
//! errors) mark the run FAILED and return a report. Persistence failures are
//! returned as errors and left to the task runner, which retries; the run
//! stays RUNNING so the next attempt picks up where this one stopped.
//!
//! Every execution claims the run by bumping its attempt token. When a later
//! execution claims it, the store rejects the earlier one's writes and the
//! earlier one stops with [`RunError::Superseded`] without touching status.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::config::runtime::OrchestratorConfig;
use crate::core::error::{ItemError, RunError, WriteRejected};
use crate::core::executor::{Collaborators, EffectorReport, OutboundEmail, SamplingParams};
use crate::core::model::{
    ExecutionUnit, RunReport, RunStatus, StepLogEntry, StepRole, WorkItem, WorkItemStatus,
};
use crate::core::pacer::{PaceOutcome, Pacer};
use crate::core::persistence::Persistence;
use crate::core::prompts::{self, EmailDraft, NO_RESEARCH};
use crate::core::rate_gate::Denial;
use crate::core::task_runner::TaskQueue;
use crate::util::clock::{Clock, Sleeper};
use crate::util::types::{ActionType, ItemId, RunId};

fn persistence(e: anyhow::Error) -> RunError {
    match e.downcast_ref::<WriteRejected>() {
        Some(
            WriteRejected::StaleAttempt { run_id, .. } | WriteRejected::Terminal { run_id, .. },
        ) => RunError::Superseded(*run_id),
        None => RunError::Persistence(format!("{e:#}")),
    }
}

/// Runs the outreach pipeline for one execution unit at a time.
pub struct Orchestrator {
    collaborators: Collaborators,
    pacer: Arc<Pacer>,
    config: OrchestratorConfig,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("collaborators", &self.collaborators)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

enum Flow {
    Finished,
    Stopped,
}

enum ItemFlow {
    Done,
    Failed,
    Interrupted,
}

impl Orchestrator {
    /// Orchestrator sharing the pacer's clock; `sleeper` is used to wait
    /// out short send denials.
    pub fn new(
        collaborators: Collaborators,
        pacer: Arc<Pacer>,
        config: OrchestratorConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let clock = pacer.clock();
        Self {
            collaborators,
            pacer,
            config,
            clock,
            sleeper,
        }
    }

    /// Shared pacer.
    pub const fn pacer(&self) -> &Arc<Pacer> {
        &self.pacer
    }

    /// Execute (or resume) `run_id` using `session` for all storage.
    ///
    /// Terminal runs are returned unchanged and paused runs are left alone.
    /// Fails with [`RunError::Superseded`] if another execution claims the run.
    pub async fn execute(
        &self,
        session: &mut dyn Persistence,
        run_id: RunId,
    ) -> Result<RunReport, RunError> {
        let mut run = session
            .load_run(run_id)
            .await
            .map_err(persistence)?
            .ok_or(RunError::NotFound(run_id))?;

        match run.status {
            RunStatus::Completed | RunStatus::Failed => {
                info!(run_id, status = %run.status, "run already finished");
                return Ok(RunReport::from(&run));
            }
            RunStatus::Paused => {
                info!(run_id, "run is paused");
                return Ok(RunReport::from(&run));
            }
            RunStatus::Created => {
                let claimed = session
                    .transition_status(run_id, RunStatus::Created, RunStatus::Running)
                    .await
                    .map_err(persistence)?;
                if !claimed {
                    let status = session
                        .load_status(run_id)
                        .await
                        .map_err(persistence)?
                        .ok_or(RunError::NotFound(run_id))?;
                    if status != RunStatus::Running {
                        run.status = status;
                        return Ok(RunReport::from(&run));
                    }
                }
            }
            RunStatus::Running => {}
        }

        if !session
            .claim_run(run_id, run.attempt)
            .await
            .map_err(persistence)?
        {
            warn!(run_id, attempt = run.attempt, "run claimed by another execution");
            return Err(RunError::Superseded(run_id));
        }
        run.attempt += 1;

        if run.status == RunStatus::Created {
            run.start(self.clock.now())?;
            session.save_run_progress(&run).await.map_err(persistence)?;
            info!(run_id, agent_id = run.agent_id, attempt = run.attempt, "run started");
        } else {
            info!(
                run_id,
                next_item = run.next_item,
                step = run.current_step,
                attempt = run.attempt,
                "resuming run"
            );
        }

        if let Some(last) = session.last_log_step(run_id).await.map_err(persistence)? {
            run.current_step = run.current_step.max(last + 1);
        }

        let mut ctx = RunContext {
            orch: self,
            session,
            run,
        };
        let flow = ctx.drive().await;
        match flow {
            Ok(Flow::Finished) => ctx.finish().await,
            Ok(Flow::Stopped) => ctx.stopped().await,
            Err(e) if e.is_retryable() => {
                warn!(run_id, error = %e, "run interrupted");
                Err(e)
            }
            Err(e @ RunError::Superseded(_)) => {
                warn!(run_id, "run taken over; stopping");
                Err(e)
            }
            Err(e) => ctx.fail(e).await,
        }
    }
}

/// Move a RUNNING run to PAUSED. The orchestrator notices at its next
/// sub-step boundary.
pub async fn pause_run(session: &mut dyn Persistence, run_id: RunId) -> Result<(), RunError> {
    change_status(session, run_id, RunStatus::Running, RunStatus::Paused).await?;
    info!(run_id, "run paused");
    Ok(())
}

/// Move a PAUSED run back to RUNNING and hand it to the task queue.
pub async fn resume_run(
    session: &mut dyn Persistence,
    queue: &dyn TaskQueue,
    run_id: RunId,
) -> Result<(), RunError> {
    change_status(session, run_id, RunStatus::Paused, RunStatus::Running).await?;
    queue.enqueue(run_id)?;
    info!(run_id, "run resumed");
    Ok(())
}

async fn change_status(
    session: &mut dyn Persistence,
    run_id: RunId,
    from: RunStatus,
    to: RunStatus,
) -> Result<(), RunError> {
    if session
        .transition_status(run_id, from, to)
        .await
        .map_err(persistence)?
    {
        return Ok(());
    }
    let current = session
        .load_status(run_id)
        .await
        .map_err(persistence)?
        .ok_or(RunError::NotFound(run_id))?;
    Err(RunError::InvalidTransition { from: current, to })
}

struct RunContext<'a> {
    orch: &'a Orchestrator,
    session: &'a mut dyn Persistence,
    run: ExecutionUnit,
}

impl RunContext<'_> {
    async fn log(
        &mut self,
        role: StepRole,
        tool_name: Option<&str>,
        content: impl Into<String> + Send,
        metadata: Value,
    ) -> Result<(), RunError> {
        let entry = StepLogEntry {
            run_id: self.run.id,
            step: self.run.current_step,
            role,
            tool_name: tool_name.map(str::to_string),
            content: content.into(),
            metadata,
        };
        self.session.append_log(&entry).await.map_err(persistence)?;
        self.run.current_step += 1;
        self.save().await
    }

    async fn save(&mut self) -> Result<(), RunError> {
        self.session
            .save_run_progress(&self.run)
            .await
            .map_err(persistence)
    }

    async fn stop_requested(&mut self) -> Result<bool, RunError> {
        let status = self
            .session
            .load_status(self.run.id)
            .await
            .map_err(persistence)?
            .ok_or(RunError::NotFound(self.run.id))?;
        Ok(status != RunStatus::Running)
    }

    async fn sync_status(&mut self) -> Result<(), RunError> {
        if let Some(status) = self
            .session
            .load_status(self.run.id)
            .await
            .map_err(persistence)?
        {
            self.run.status = status;
        }
        Ok(())
    }

    async fn drive(&mut self) -> Result<Flow, RunError> {
        let agent_id = self.run.agent_id;
        let agent = self
            .session
            .load_agent(agent_id)
            .await
            .map_err(persistence)?
            .ok_or(RunError::AgentNotFound(agent_id))?;
        if !agent.is_active {
            return Err(RunError::AgentInactive(agent_id));
        }

        let resuming = self.run.current_step > 0;
        if resuming {
            let next = self.run.next_item;
            self.log(
                StepRole::System,
                None,
                format!("Resuming outreach workflow at lead {}", next + 1),
                json!({ "next_item": next }),
            )
            .await?;
        } else {
            self.log(
                StepRole::System,
                None,
                "Starting outreach workflow",
                json!({ "agent": agent.name }),
            )
            .await?;
        }

        let items = self.work_items().await?;
        if items.is_empty() {
            self.log(StepRole::System, None, "No leads found", json!({}))
                .await?;
            return Ok(Flow::Finished);
        }
        if !resuming {
            self.log(
                StepRole::System,
                None,
                format!("Found {} leads to process", items.len()),
                json!({ "count": items.len() }),
            )
            .await?;
        }

        let start = self.run.next_item;
        for (index, item) in items.into_iter().enumerate().skip(start) {
            if self.stop_requested().await? {
                return Ok(Flow::Stopped);
            }
            match self.process_item(item).await? {
                ItemFlow::Interrupted => return Ok(Flow::Stopped),
                ItemFlow::Done => self.run.items_processed += 1,
                ItemFlow::Failed => {}
            }
            self.run.next_item = index + 1;
            self.save().await?;
        }

        if self.stop_requested().await? {
            return Ok(Flow::Stopped);
        }
        self.check_responses().await?;
        Ok(Flow::Finished)
    }

    async fn work_items(&mut self) -> Result<Vec<WorkItem>, RunError> {
        let run_id = self.run.id;
        let stored = self
            .session
            .load_work_items(run_id)
            .await
            .map_err(persistence)?;
        if !stored.is_empty() {
            return Ok(stored);
        }
        let Some(sourcer) = self.orch.collaborators.sourcer.clone() else {
            return Ok(Vec::new());
        };
        let prospects = sourcer
            .find(&self.orch.config.lead_criteria)
            .await
            .map_err(|e| RunError::Step {
                step: "lead sourcing",
                message: format!("{e:#}"),
            })?;
        if prospects.is_empty() {
            return Ok(Vec::new());
        }
        self.session
            .insert_work_items(run_id, prospects)
            .await
            .map_err(persistence)
    }

    async fn process_item(&mut self, mut item: WorkItem) -> Result<ItemFlow, RunError> {
        if item.status != WorkItemStatus::New {
            self.log(
                StepRole::System,
                None,
                format!("Skipping {}: already contacted", item.display_name()),
                json!({ "item_id": item.id, "status": item.status }),
            )
            .await?;
            return Ok(ItemFlow::Done);
        }

        let company = item.prospect.company.clone().unwrap_or_default();
        self.log(
            StepRole::System,
            None,
            format!("Processing lead: {} at {company}", item.display_name()),
            json!({ "item_id": item.id }),
        )
        .await?;

        let research = match self.research(&item).await? {
            Ok(summary) => summary,
            Err(e) => return self.item_failed(&item, &e).await,
        };
        if self.stop_requested().await? {
            return Ok(ItemFlow::Interrupted);
        }

        let draft = match self.compose(&item, &research).await? {
            Ok(draft) => draft,
            Err(e) => return self.item_failed(&item, &e).await,
        };
        if self.stop_requested().await? {
            return Ok(ItemFlow::Interrupted);
        }

        self.contact(&mut item, &draft, &research).await
    }

    async fn item_failed(&mut self, item: &WorkItem, error: &ItemError) -> Result<ItemFlow, RunError> {
        warn!(run_id = self.run.id, item_id = item.id, error = %error, "lead failed");
        self.log(
            StepRole::System,
            None,
            format!("Error processing lead {}: {error}", item.display_name()),
            json!({ "item_id": item.id, "error": true }),
        )
        .await?;
        Ok(ItemFlow::Failed)
    }

    async fn research(&mut self, item: &WorkItem) -> Result<Result<String, ItemError>, RunError> {
        let orch = self.orch;
        let Some(researcher) = orch.collaborators.researcher.clone() else {
            self.log(
                StepRole::System,
                None,
                NO_RESEARCH,
                json!({ "item_id": item.id, "skipped": true }),
            )
            .await?;
            return Ok(Ok(NO_RESEARCH.to_string()));
        };

        let company = item.prospect.company.clone().unwrap_or_default();
        let query = prompts::research_query(&company);
        let num_results = orch.config.research_results;
        let outcome = orch
            .pacer
            .perform(ActionType::CompanyResearch, || {
                researcher.search(&query, num_results)
            })
            .await;
        let hits = match outcome {
            PaceOutcome::Performed { output, .. } => match output {
                Ok(hits) => hits,
                Err(e) => return Ok(Err(ItemError::Research(format!("{e:#}")))),
            },
            PaceOutcome::Denied(denial) => {
                self.log(
                    StepRole::System,
                    None,
                    format!("Research deferred: {denial}"),
                    denial_metadata(item.id, &denial),
                )
                .await?;
                return Ok(Ok(NO_RESEARCH.to_string()));
            }
            PaceOutcome::Failed { reason, .. } => return Ok(Err(ItemError::Research(reason))),
        };

        let prompt = prompts::research_summary(&company, &hits);
        let summary = match orch
            .collaborators
            .writer
            .generate(&prompt, SamplingParams::RESEARCH)
            .await
        {
            Ok(text) => text.trim().to_string(),
            Err(e) => return Ok(Err(ItemError::Research(format!("{e:#}")))),
        };
        self.log(
            StepRole::Tool,
            Some("web_search"),
            summary.clone(),
            json!({ "item_id": item.id, "company": company, "results": hits.len() }),
        )
        .await?;
        Ok(Ok(summary))
    }

    async fn compose(
        &mut self,
        item: &WorkItem,
        research: &str,
    ) -> Result<Result<EmailDraft, ItemError>, RunError> {
        let orch = self.orch;
        let prompt = prompts::outreach_email(item, research);
        let text = match orch
            .collaborators
            .writer
            .generate(&prompt, SamplingParams::COMPOSE)
            .await
        {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => return Ok(Err(ItemError::Compose("generator returned no text".into()))),
            Err(e) => return Ok(Err(ItemError::Compose(format!("{e:#}")))),
        };
        let draft = EmailDraft::parse(&text);
        let recipient = item
            .prospect
            .email
            .clone()
            .unwrap_or_else(|| item.display_name());
        self.log(
            StepRole::Assistant,
            None,
            format!("Generated email for {recipient}"),
            json!({ "item_id": item.id, "subject": draft.subject, "preview": draft.preview() }),
        )
        .await?;
        Ok(Ok(draft))
    }

    async fn contact(
        &mut self,
        item: &mut WorkItem,
        draft: &EmailDraft,
        research: &str,
    ) -> Result<ItemFlow, RunError> {
        let orch = self.orch;
        let Some(mail) = orch.collaborators.mail.clone() else {
            self.log(
                StepRole::System,
                None,
                "No mail sender configured; contact skipped",
                json!({ "item_id": item.id, "skipped": true }),
            )
            .await?;
            return Ok(ItemFlow::Done);
        };
        let Some(to) = item
            .prospect
            .email
            .clone()
            .filter(|address| !address.trim().is_empty())
        else {
            return self
                .item_failed(item, &ItemError::Contact("no email address".into()))
                .await;
        };

        let email = OutboundEmail {
            to,
            subject: draft.subject.clone(),
            body: draft.body.clone(),
        };
        let mut waited_out_denial = false;
        loop {
            let outcome = orch
                .pacer
                .perform(ActionType::EmailSend, || mail.send(&email))
                .await;
            match outcome {
                PaceOutcome::Performed { output, waited } => {
                    self.run.actions_sent += 1;
                    let update = match item.mark_contacted(research, orch.clock.now()) {
                        Ok(()) => self
                            .session
                            .update_work_item(item)
                            .await
                            .map_err(|e| ItemError::Update(format!("{e:#}"))),
                        Err(e) => Err(e),
                    };
                    let mut metadata = json!({
                        "item_id": item.id,
                        "recipient": email.to,
                        "success": true,
                        "waited_secs": waited.as_secs_f64(),
                    });
                    if let Err(e) = &update {
                        warn!(run_id = self.run.id, item_id = item.id, error = %e, "lead failed");
                        metadata["error"] = json!(true);
                        metadata["update_error"] = json!(e.to_string());
                    }
                    self.log(
                        StepRole::Tool,
                        Some("send_email"),
                        report_content(&output),
                        metadata,
                    )
                    .await?;
                    return Ok(if update.is_ok() {
                        ItemFlow::Done
                    } else {
                        ItemFlow::Failed
                    });
                }
                PaceOutcome::Denied(denial) => {
                    let wait = denial.retry_after.filter(|wait| {
                        !waited_out_denial
                            && orch.config.max_denial_wait().is_some_and(|max| *wait <= max)
                    });
                    if let Some(wait) = wait {
                        info!(
                            run_id = self.run.id,
                            item_id = item.id,
                            wait_secs = wait.as_secs_f64(),
                            "waiting out send denial"
                        );
                        orch.sleeper.sleep(wait).await;
                        waited_out_denial = true;
                        if self.stop_requested().await? {
                            return Ok(ItemFlow::Interrupted);
                        }
                        continue;
                    }
                    self.log(
                        StepRole::System,
                        None,
                        format!("Send to {} deferred: {denial}", email.to),
                        denial_metadata(item.id, &denial),
                    )
                    .await?;
                    return Ok(ItemFlow::Done);
                }
                PaceOutcome::Failed { output, reason, .. } => {
                    let details = output.map_or(Value::Null, |report| report.details);
                    self.log(
                        StepRole::Tool,
                        Some("send_email"),
                        format!("Send to {} failed: {reason}", email.to),
                        json!({
                            "item_id": item.id,
                            "recipient": email.to,
                            "success": false,
                            "effector_failed": true,
                            "details": details,
                        }),
                    )
                    .await?;
                    return Ok(ItemFlow::Done);
                }
            }
        }
    }

    async fn check_responses(&mut self) -> Result<(), RunError> {
        let orch = self.orch;
        let Some(inbox) = orch.collaborators.inbox.clone() else {
            return Ok(());
        };
        let max_items = orch.config.max_response_items;
        let unread_only = orch.config.unread_only;
        let outcome = orch
            .pacer
            .perform(ActionType::EmailCheck, || inbox.check(max_items, unread_only))
            .await;
        match outcome {
            PaceOutcome::Performed { output: Ok(replies), .. } => {
                let count = replies.iter().filter(|r| r.error.is_none()).count();
                self.run.responses_received = u32::try_from(count).unwrap_or(u32::MAX);
                self.log(
                    StepRole::Tool,
                    Some("read_email"),
                    format!("Found {count} new responses"),
                    json!({ "count": count }),
                )
                .await
            }
            PaceOutcome::Performed { output: Err(e), .. } => {
                self.response_check_failed(format!("{e:#}")).await
            }
            PaceOutcome::Failed { reason, .. } => self.response_check_failed(reason).await,
            PaceOutcome::Denied(denial) => {
                let mut metadata = json!({ "denied": true });
                if let Some(wait) = denial.retry_after {
                    metadata["retry_after_secs"] = json!(wait.as_secs_f64());
                }
                self.log(
                    StepRole::System,
                    None,
                    format!("Response check deferred: {denial}"),
                    metadata,
                )
                .await
            }
        }
    }

    async fn response_check_failed(&mut self, reason: String) -> Result<(), RunError> {
        warn!(run_id = self.run.id, %reason, "response check failed");
        self.log(
            StepRole::Tool,
            Some("read_email"),
            format!("Response check failed: {reason}"),
            json!({ "error": true, "effector_failed": true }),
        )
        .await
    }

    async fn finish(mut self) -> Result<RunReport, RunError> {
        let summary = format!(
            "Outreach workflow finished: {} leads processed, {} emails sent, {} responses",
            self.run.items_processed, self.run.actions_sent, self.run.responses_received
        );
        self.log(
            StepRole::System,
            None,
            summary,
            json!({
                "items_processed": self.run.items_processed,
                "actions_sent": self.run.actions_sent,
                "responses_received": self.run.responses_received,
            }),
        )
        .await?;

        let mut done = self.run.clone();
        done.complete(self.orch.clock.now())?;
        let completed = self
            .session
            .finalize_run(&done, RunStatus::Running)
            .await
            .map_err(persistence)?;
        if completed {
            self.run = done;
            info!(
                run_id = self.run.id,
                items_processed = self.run.items_processed,
                actions_sent = self.run.actions_sent,
                "run completed"
            );
        } else {
            self.sync_status().await?;
        }
        Ok(RunReport::from(&self.run))
    }

    async fn stopped(mut self) -> Result<RunReport, RunError> {
        self.sync_status().await?;
        if self.run.status.is_terminal() {
            info!(run_id = self.run.id, status = %self.run.status, "run already finished elsewhere");
            return Ok(RunReport::from(&self.run));
        }
        let next = self.run.next_item;
        let status = self.run.status;
        self.log(
            StepRole::System,
            None,
            format!("Execution {status} before lead {}", next + 1),
            json!({ "next_item": next, "status": status }),
        )
        .await?;
        info!(run_id = self.run.id, %status, next_item = next, "run stopped");
        Ok(RunReport::from(&self.run))
    }

    async fn fail(mut self, failure: RunError) -> Result<RunReport, RunError> {
        let message = failure.to_string();
        error!(run_id = self.run.id, error = %message, "run failed");
        self.log(
            StepRole::System,
            None,
            format!("Error: {message}"),
            json!({ "error": true }),
        )
        .await?;

        let from = self.run.status;
        let mut failed = self.run.clone();
        failed.fail(message, self.orch.clock.now())?;
        let marked = self
            .session
            .finalize_run(&failed, from)
            .await
            .map_err(persistence)?;
        if marked {
            self.run = failed;
        } else {
            self.sync_status().await?;
        }
        Ok(RunReport::from(&self.run))
    }
}

fn denial_metadata(item_id: ItemId, denial: &Denial) -> Value {
    let mut metadata = json!({
        "item_id": item_id,
        "denied": true,
        "action": denial.action,
        "reason": denial.reason,
    });
    if let Some(wait) = denial.retry_after {
        metadata["retry_after_secs"] = json!(wait.as_secs_f64());
    }
    metadata
}

fn report_content(report: &EffectorReport) -> String {
    serde_json::to_string(report).unwrap_or_else(|_| "email sent".to_string())
}
