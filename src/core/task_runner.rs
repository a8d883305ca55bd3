//! Task runner: retries whole runs and reports permanent failures.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::runtime::RetryPolicy;
use crate::core::audit::{build_audit_event, AuditSink};
use crate::core::error::{QueueError, RunError};
use crate::core::model::{RunReport, RunStatus};
use crate::core::orchestrator::Orchestrator;
use crate::core::persistence::{Persistence, SessionFactory};
use crate::util::clock::{Clock, Sleeper};
use crate::util::types::RunId;

/// At-least-once hand-off of a run to the task runner.
pub trait TaskQueue: Send + Sync {
    /// Schedule `run_id` for execution.
    fn enqueue(&self, run_id: RunId) -> Result<(), QueueError>;
}

/// Final result of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The orchestrator returned a report (the run may itself be FAILED).
    Finished {
        /// Report from the last attempt.
        report: RunReport,
        /// Attempts used.
        attempts: u32,
    },
    /// Retries were exhausted or the error cannot be retried.
    PermanentFailure {
        /// Run that failed.
        run_id: RunId,
        /// Attempts used.
        attempts: u32,
        /// Last error.
        error: String,
    },
    /// Another execution claimed the run; this one stopped without
    /// touching its status.
    Superseded {
        /// Run that was taken over.
        run_id: RunId,
        /// Attempts used.
        attempts: u32,
    },
}

impl TaskOutcome {
    /// Whether the task gave up.
    pub const fn is_permanent_failure(&self) -> bool {
        matches!(self, Self::PermanentFailure { .. })
    }

    /// Attempts used.
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Finished { attempts, .. }
            | Self::PermanentFailure { attempts, .. }
            | Self::Superseded { attempts, .. } => *attempts,
        }
    }
}

/// Wraps orchestrator invocations with sessions, timeouts and retries.
pub struct TaskRunner {
    sessions: Arc<dyn SessionFactory>,
    orchestrator: Orchestrator,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("orchestrator", &self.orchestrator)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl TaskRunner {
    /// Runner opening sessions from `sessions`; `sleeper` waits out backoff.
    pub fn new(
        sessions: Arc<dyn SessionFactory>,
        orchestrator: Orchestrator,
        retry: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let clock = orchestrator.pacer().clock();
        Self {
            sessions,
            orchestrator,
            retry,
            sleeper,
            clock,
            audit: None,
        }
    }

    /// Report retries and permanent failures to an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Execute `run_id`, retrying retryable failures up to the policy limit.
    pub async fn run(&self, run_id: RunId) -> TaskOutcome {
        let max_attempts = self.retry.max_retries.saturating_add(1);
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.attempt(run_id).await {
                Ok(report) => {
                    info!(run_id, attempts, status = %report.status, "task finished");
                    return TaskOutcome::Finished { report, attempts };
                }
                Err(e) if e.is_retryable() && attempts < max_attempts => {
                    let backoff = self.retry.backoff();
                    warn!(
                        run_id,
                        attempt = attempts,
                        max_attempts,
                        backoff_secs = backoff.as_secs(),
                        error = %e,
                        "attempt failed; retrying"
                    );
                    self.audit(run_id, "retry", Some(e.to_string()));
                    self.sleeper.sleep(backoff).await;
                }
                Err(RunError::Superseded(_)) => {
                    info!(run_id, attempts, "run taken over by another execution");
                    return TaskOutcome::Superseded { run_id, attempts };
                }
                Err(e) => {
                    let message = e.to_string();
                    error!(run_id, attempts, error = %message, "task failed permanently");
                    self.mark_failed(run_id, &message).await;
                    self.audit(run_id, "permanent_failure", Some(message.clone()));
                    return TaskOutcome::PermanentFailure {
                        run_id,
                        attempts,
                        error: message,
                    };
                }
            }
        }
    }

    async fn attempt(&self, run_id: RunId) -> Result<RunReport, RunError> {
        let mut session = self
            .sessions
            .open()
            .await
            .map_err(|e| RunError::Persistence(format!("{e:#}")))?;
        let limit = self.retry.attempt_time_limit();
        match tokio::time::timeout(limit, self.orchestrator.execute(session.as_mut(), run_id)).await
        {
            Ok(result) => result,
            Err(_) => Err(RunError::TimedOut(limit)),
        }
    }

    async fn mark_failed(&self, run_id: RunId, message: &str) {
        let mut session = match self.sessions.open().await {
            Ok(session) => session,
            Err(e) => {
                error!(run_id, error = %e, "cannot open session to record failure");
                return;
            }
        };
        if let Err(e) = record_failure(session.as_mut(), run_id, message, self.clock.as_ref()).await {
            error!(run_id, error = %e, "cannot record run failure");
        }
    }

    fn audit(&self, run_id: RunId, action: &str, payload: Option<String>) {
        if let Some(sink) = &self.audit {
            sink.record(build_audit_event("task_runner", run_id.to_string(), action, payload));
        }
    }
}

async fn record_failure(
    session: &mut dyn Persistence,
    run_id: RunId,
    message: &str,
    clock: &dyn Clock,
) -> anyhow::Result<()> {
    let Some(mut run) = session.load_run(run_id).await? else {
        return Ok(());
    };
    if !run.status.can_transition_to(RunStatus::Failed) {
        return Ok(());
    }
    let from = run.status;
    run.fail(message, clock.now())?;
    session.finalize_run(&run, from).await?;
    Ok(())
}
