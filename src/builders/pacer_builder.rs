//! Builders that assemble pacing and run execution from configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, PacingConfig};
use crate::core::{
    ActionLedger, AuditSink, Collaborators, ConfigError, DelaySampler, LedgerStore,
    Orchestrator, Pacer, RateGate, SessionFactory, TaskRunner, WarmupPolicy,
};
use crate::util::clock::{Clock, Sleeper, SystemClock, TokioSleeper};

/// Assembles a [`Pacer`] from a [`PacingConfig`].
///
/// Defaults: system clock, tokio sleeper, uniform delays, an in-memory ledger
/// sized to the longest policy horizon, no audit sink.
pub struct PacerBuilder {
    config: PacingConfig,
    clock: Option<Arc<dyn Clock>>,
    sleeper: Option<Arc<dyn Sleeper>>,
    delays: Option<Arc<dyn DelaySampler>>,
    audit: Option<Arc<dyn AuditSink>>,
    ledger: Option<Arc<ActionLedger>>,
    store: Option<Box<dyn LedgerStore>>,
}

impl std::fmt::Debug for PacerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacerBuilder")
            .field("config", &self.config)
            .field("shared_ledger", &self.ledger.is_some())
            .field("persisted", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl PacerBuilder {
    /// Start from pacing configuration.
    pub fn new(config: PacingConfig) -> Self {
        Self {
            config,
            clock: None,
            sleeper: None,
            delays: None,
            audit: None,
            ledger: None,
            store: None,
        }
    }

    /// Configuration the pacer will be built from.
    pub const fn config(&self) -> &PacingConfig {
        &self.config
    }

    /// Time source.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// What waits out human-like delays.
    #[must_use]
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    /// Delay source.
    #[must_use]
    pub fn delays(mut self, delays: Arc<dyn DelaySampler>) -> Self {
        self.delays = Some(delays);
        self
    }

    /// Audit sink for pacing decisions.
    #[must_use]
    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Share an existing ledger, e.g. between pacers of one account.
    /// Takes precedence over [`PacerBuilder::store`].
    #[must_use]
    pub fn ledger(mut self, ledger: Arc<ActionLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Persist the ledger; history inside the retention horizon is reloaded
    /// at build time.
    #[must_use]
    pub fn store(mut self, store: Box<dyn LedgerStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Validate configuration and build the pacer.
    pub fn build(self) -> Result<Pacer, ConfigError> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let sleeper = self.sleeper.unwrap_or_else(|| Arc::new(TokioSleeper));
        let retention = self.config.policies.retention();
        let ledger = match (self.ledger, self.store) {
            (Some(ledger), _) => ledger,
            (None, Some(store)) => Arc::new(ActionLedger::with_store(
                retention,
                store,
                clock.now(),
            )?),
            (None, None) => Arc::new(ActionLedger::new(retention)),
        };

        let gate = RateGate::new(self.config.policies.clone(), ledger);
        let mut pacer = Pacer::new(gate, clock, sleeper)
            .with_warmup(self.config.warmup.as_ref().map(WarmupPolicy::from_config))
            .with_jitter(self.config.jitter)
            .with_effector_timeout(self.config.effector_timeout_secs.map(Duration::from_secs));
        if let Some(delays) = self.delays {
            pacer = pacer.with_delays(delays);
        }
        if let Some(audit) = self.audit {
            pacer = pacer.with_audit(audit);
        }
        Ok(pacer)
    }
}

/// Build a task runner for `cfg` around an already-built pacer.
pub fn build_task_runner(
    cfg: &AppConfig,
    sessions: Arc<dyn SessionFactory>,
    collaborators: Collaborators,
    pacer: Arc<Pacer>,
    sleeper: Arc<dyn Sleeper>,
) -> Result<TaskRunner, ConfigError> {
    cfg.validate()?;
    let orchestrator = Orchestrator::new(
        collaborators,
        pacer,
        cfg.orchestrator.clone(),
        Arc::clone(&sleeper),
    );
    Ok(TaskRunner::new(sessions, orchestrator, cfg.retry, sleeper))
}
