//! Pacer: the only path through which risky actions are executed.
//!
//! `perform` makes a gate decision, sleeps a human-like delay, calls the
//! effector and records the action, in that order:
//!
//! 1. Pick a uniform random delay in `[min_delay, max_delay]`.
//! 2. Under the action type's ledger lock, evaluate the rate gate (with the
//!    warm-up cap) at `now` and reserve a slot at the time the effector will
//!    run. A denial returns immediately.
//! 3. Outside the lock, sleep the delay (before or after the effector, or not
//!    at all).
//! 4. Run the effector. On its success signal the reservation becomes an
//!    event stamped with the post-sleep time; on failure or timeout the
//!    reservation is released and no budget is consumed.
//!
//! Because the slot sits at the projected effector time, a concurrent caller
//! of the same type measures its minimum spacing from that time rather than
//! from the start of the first caller's sleep.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use crate::config::policy::JitterPlacement;
use crate::core::audit::{build_audit_event, AuditSink};
use crate::core::executor::Outcome;
use crate::core::rate_gate::{evaluate, Denial, GateDecision, RateGate, UsageStats};
use crate::core::warmup::WarmupPolicy;
use crate::util::clock::{to_time_delta, Clock, Sleeper};
use crate::util::types::ActionType;

/// Result of a paced action.
#[derive(Debug)]
pub enum PaceOutcome<O> {
    /// The effector ran and reported success; the action was recorded.
    Performed {
        /// Effector output.
        output: O,
        /// Human-like delay that was slept.
        waited: Duration,
    },
    /// The gate refused; the effector was not called.
    Denied(Denial),
    /// The effector ran (or timed out) without success; nothing was recorded.
    Failed {
        /// Effector output, absent on timeout.
        output: Option<O>,
        /// Failure cause.
        reason: String,
        /// Human-like delay that was slept.
        waited: Duration,
    },
}

impl<O> PaceOutcome<O> {
    /// Whether the action took place.
    pub const fn is_performed(&self) -> bool {
        matches!(self, Self::Performed { .. })
    }

    /// Whether the gate refused.
    pub const fn is_denied(&self) -> bool {
        matches!(self, Self::Denied(_))
    }

    /// Whether the effector failed.
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// The denial, if any.
    pub const fn denial(&self) -> Option<&Denial> {
        match self {
            Self::Denied(d) => Some(d),
            _ => None,
        }
    }

    /// Effector output, if the effector returned.
    pub fn into_output(self) -> Option<O> {
        match self {
            Self::Performed { output, .. } => Some(output),
            Self::Failed { output, .. } => output,
            Self::Denied(_) => None,
        }
    }
}

/// Source of human-like delays.
pub trait DelaySampler: Send + Sync {
    /// A delay in `[min, max]`.
    fn sample(&self, min: Duration, max: Duration) -> Duration;
}

/// Uniformly random delay.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformDelay;

impl DelaySampler for UniformDelay {
    fn sample(&self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        let secs = rand::rng().random_range(min.as_secs_f64()..=max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// Always the lower bound. Deterministic; used in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimumDelay;

impl DelaySampler for MinimumDelay {
    fn sample(&self, min: Duration, _max: Duration) -> Duration {
        min
    }
}

/// Gate, warm-up and jitter wrapped around effector calls.
pub struct Pacer {
    gate: RateGate,
    warmup: Option<WarmupPolicy>,
    jitter: JitterPlacement,
    effector_timeout: Option<Duration>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    delays: Arc<dyn DelaySampler>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl std::fmt::Debug for Pacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pacer")
            .field("gate", &self.gate)
            .field("warmup", &self.warmup)
            .field("jitter", &self.jitter)
            .field("effector_timeout", &self.effector_timeout)
            .finish_non_exhaustive()
    }
}

impl Pacer {
    /// Pacer around `gate` with uniform delays slept before the effector.
    /// [`crate::builders::PacerBuilder`] builds one from configuration.
    pub fn new(gate: RateGate, clock: Arc<dyn Clock>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            gate,
            warmup: None,
            jitter: JitterPlacement::default(),
            effector_timeout: None,
            clock,
            sleeper,
            delays: Arc::new(UniformDelay),
            audit: None,
        }
    }

    /// Apply a warm-up ramp.
    #[must_use]
    pub fn with_warmup(mut self, warmup: Option<WarmupPolicy>) -> Self {
        self.warmup = warmup;
        self
    }

    /// Where to place the human-like delay.
    #[must_use]
    pub const fn with_jitter(mut self, jitter: JitterPlacement) -> Self {
        self.jitter = jitter;
        self
    }

    /// Treat effectors running longer than `limit` as failed.
    #[must_use]
    pub const fn with_effector_timeout(mut self, limit: Option<Duration>) -> Self {
        self.effector_timeout = limit;
        self
    }

    /// Replace the delay source.
    #[must_use]
    pub fn with_delays(mut self, delays: Arc<dyn DelaySampler>) -> Self {
        self.delays = delays;
        self
    }

    /// Record pacing decisions to an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Underlying gate.
    pub const fn gate(&self) -> &RateGate {
        &self.gate
    }

    /// Active warm-up ramp.
    pub const fn warmup(&self) -> Option<&WarmupPolicy> {
        self.warmup.as_ref()
    }

    /// Time source shared with the ledger.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Decide whether `action` could run now, without reserving.
    pub fn check(&self, action: ActionType) -> GateDecision {
        let now = self.clock.now();
        let warmup = self
            .warmup
            .as_ref()
            .and_then(|w| w.ceiling_for(action, now.date_naive()));
        self.gate.can_proceed_with(action, warmup, now)
    }

    /// Usage snapshot for one action type.
    pub fn stats(&self, action: ActionType) -> UsageStats {
        let mut stats = self.gate.stats(action, self.clock.now());
        stats.can_proceed = self.check(action).is_allowed();
        stats
    }

    /// Run `effector` for `action` if the gate allows it.
    pub async fn perform<F, Fut, O>(&self, action: ActionType, effector: F) -> PaceOutcome<O>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = O> + Send,
        O: Outcome + Send,
    {
        let now = self.clock.now();
        let warmup = self
            .warmup
            .as_ref()
            .and_then(|w| w.ceiling_for(action, now.date_naive()));
        let policy = self.gate.policy(action).copied();
        let delay = match (self.jitter, policy) {
            (JitterPlacement::Disabled, _) | (_, None) => Duration::ZERO,
            (_, Some(p)) => self.delays.sample(p.min_delay(), p.max_delay()),
        };
        let slot_at = match self.jitter {
            JitterPlacement::BeforeEffector => now
                .checked_add_signed(to_time_delta(delay))
                .unwrap_or(now),
            _ => now,
        };

        let reservation = match self.gate.ledger().try_reserve(action, slot_at, |history| {
            match evaluate(action, policy.as_ref(), warmup, history, now) {
                GateDecision::Allowed => Ok(()),
                GateDecision::Denied(denial) => Err(denial),
            }
        }) {
            Ok(reservation) => reservation,
            Err(denial) => {
                warn!(
                    action = %action,
                    reason = %denial,
                    retry_after = ?denial.retry_after,
                    "action denied"
                );
                self.audit(action, "deny", Some(denial.to_string()));
                return PaceOutcome::Denied(denial);
            }
        };

        let mut waited = Duration::ZERO;
        if self.jitter == JitterPlacement::BeforeEffector && !delay.is_zero() {
            self.sleeper.sleep(delay).await;
            waited = delay;
        }

        let output = match self.effector_timeout {
            Some(limit) => match tokio::time::timeout(limit, effector()).await {
                Ok(output) => output,
                Err(_) => {
                    reservation.release();
                    let reason = format!("effector timed out after {limit:?}");
                    warn!(action = %action, %reason, "effector failed");
                    self.audit(action, "fail", Some(reason.clone()));
                    return PaceOutcome::Failed {
                        output: None,
                        reason,
                        waited,
                    };
                }
            },
            None => effector().await,
        };

        if !output.succeeded() {
            reservation.release();
            let reason = output.failure_reason();
            warn!(action = %action, %reason, "effector failed");
            self.audit(action, "fail", Some(reason.clone()));
            return PaceOutcome::Failed {
                output: Some(output),
                reason,
                waited,
            };
        }

        let at = reservation.commit(self.clock.now());
        info!(action = %action, at = %at, waited_ms = waited.as_millis(), "action performed");
        self.audit(action, "perform", None);

        if self.jitter == JitterPlacement::AfterEffector && !delay.is_zero() {
            self.sleeper.sleep(delay).await;
            waited = delay;
        }

        PaceOutcome::Performed { output, waited }
    }

    fn audit(&self, action: ActionType, what: &str, payload: Option<String>) {
        if let Some(sink) = &self.audit {
            sink.record(build_audit_event("pacer", action.as_str(), what, payload));
        }
    }
}
