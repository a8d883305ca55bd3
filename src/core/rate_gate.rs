//! Rate gate: decides whether an action may run now.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::policy::{ActionPolicy, PolicyTable, Window};
use crate::core::ledger::{ActionLedger, History};
use crate::util::clock::{to_std_duration, to_time_delta};
use crate::util::types::ActionType;

/// Why an action was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DenialReason {
    /// No policy exists for the action type.
    Unconfigured,
    /// A zero ceiling switches the action off.
    Disabled {
        /// Window whose ceiling is zero.
        window: Window,
    },
    /// A rolling window is full.
    WindowCeiling {
        /// Full window.
        window: Window,
        /// Its ceiling.
        ceiling: u32,
    },
    /// The warm-up ramp caps today's volume below the static ceiling.
    Warmup {
        /// Current warm-up week (1-based).
        week: u32,
        /// Warm-up daily ceiling.
        ceiling: u32,
    },
    /// The previous action was too recent.
    TooSoon {
        /// Configured minimum spacing.
        min_delay: Duration,
    },
}

/// A refused action with an optional hint for when to try again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Denial {
    /// Refused action type.
    pub action: ActionType,
    /// Cause.
    pub reason: DenialReason,
    /// Earliest time the same check could pass; `None` when waiting won't help.
    pub retry_after: Option<Duration>,
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            DenialReason::Unconfigured => write!(f, "No pacing policy for {}", self.action),
            DenialReason::Disabled { window } => write!(
                f,
                "{} is disabled ({} limit is 0)",
                self.action,
                window.adjective().to_lowercase()
            ),
            DenialReason::WindowCeiling { window, ceiling } => write!(
                f,
                "{} limit reached ({ceiling}/{})",
                window.adjective(),
                window.unit()
            ),
            DenialReason::Warmup { week, ceiling } => write!(
                f,
                "Warm-up limit reached ({ceiling}/day in week {week})"
            ),
            DenialReason::TooSoon { .. } => {
                let secs = self.retry_after.map_or(0, |d| d.as_secs_f64().ceil() as u64);
                write!(f, "Too soon. Wait {secs} more seconds")
            }
        }
    }
}

/// Outcome of a gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// The action may run now.
    Allowed,
    /// The action must not run now.
    Denied(Denial),
}

impl GateDecision {
    /// Whether the decision is `Allowed`.
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// The denial, if any.
    pub const fn denial(&self) -> Option<&Denial> {
        match self {
            Self::Allowed => None,
            Self::Denied(d) => Some(d),
        }
    }
}

/// Warm-up cap applied to the daily window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmupLimit {
    /// Current week (1-based).
    pub week: u32,
    /// Daily ceiling for the action's category.
    pub ceiling: u32,
}

/// Evaluate `policy` (and an optional warm-up cap) against `history` at `now`.
///
/// Every violated window and the minimum spacing each produce a candidate
/// denial; the one with the longest wait is reported. A disabled window has no
/// wait and always wins.
pub fn evaluate(
    action: ActionType,
    policy: Option<&ActionPolicy>,
    warmup: Option<WarmupLimit>,
    history: &dyn History,
    now: DateTime<Utc>,
) -> GateDecision {
    let Some(policy) = policy else {
        return GateDecision::Denied(Denial {
            action,
            reason: DenialReason::Unconfigured,
            retry_after: None,
        });
    };

    let mut worst: Option<Denial> = None;
    let mut consider = |denial: Denial| {
        let longer = match (&worst, denial.retry_after) {
            (None, _) => true,
            (Some(current), wait) => match (current.retry_after, wait) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(a), Some(b)) => b > a,
            },
        };
        if longer {
            worst = Some(denial);
        }
    };

    for (window, ceiling, reason) in limits(policy, warmup) {
        let cutoff = now - window.span();
        let count = history.count_since(cutoff);
        if count < ceiling as usize {
            continue;
        }
        if ceiling == 0 {
            consider(Denial {
                action,
                reason: DenialReason::Disabled { window },
                retry_after: None,
            });
            continue;
        }
        // The entry that must age out for the count to drop below the ceiling.
        let retry_after = history
            .nth_since(cutoff, count - ceiling as usize)
            .map(|oldest| to_std_duration(oldest + window.span() - now));
        consider(Denial {
            action,
            reason,
            retry_after,
        });
    }

    let min_delay = policy.min_delay();
    if !min_delay.is_zero() {
        if let Some(latest) = history.latest() {
            let ready_at = latest
                .checked_add_signed(to_time_delta(min_delay))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            if ready_at > now {
                consider(Denial {
                    action,
                    reason: DenialReason::TooSoon { min_delay },
                    retry_after: Some(to_std_duration(ready_at - now)),
                });
            }
        }
    }

    worst.map_or(GateDecision::Allowed, GateDecision::Denied)
}

fn limits(policy: &ActionPolicy, warmup: Option<WarmupLimit>) -> Vec<(Window, u32, DenialReason)> {
    let mut out: Vec<(Window, u32, DenialReason)> = policy
        .ceilings()
        .filter(|(w, _)| *w != Window::Day)
        .map(|(window, ceiling)| (window, ceiling, DenialReason::WindowCeiling { window, ceiling }))
        .collect();

    let daily = match (policy.per_day, warmup) {
        (Some(fixed), Some(w)) if w.ceiling < fixed => Some((w.ceiling, warmup_reason(w))),
        (Some(fixed), _) => Some((
            fixed,
            DenialReason::WindowCeiling {
                window: Window::Day,
                ceiling: fixed,
            },
        )),
        (None, Some(w)) => Some((w.ceiling, warmup_reason(w))),
        (None, None) => None,
    };
    if let Some((ceiling, reason)) = daily {
        out.push((Window::Day, ceiling, reason));
    }
    out
}

const fn warmup_reason(limit: WarmupLimit) -> DenialReason {
    DenialReason::Warmup {
        week: limit.week,
        ceiling: limit.ceiling,
    }
}

/// Usage snapshot for one action type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    /// Action type.
    pub action: ActionType,
    /// Entries in the last minute.
    pub last_minute: usize,
    /// Entries in the last hour.
    pub last_hour: usize,
    /// Entries in the last day.
    pub last_day: usize,
    /// Entries in the last week.
    pub last_week: usize,
    /// Configured policy.
    pub policy: Option<ActionPolicy>,
    /// Whether the gate would allow the action now.
    pub can_proceed: bool,
}

/// Policy table bound to a ledger.
#[derive(Debug, Clone)]
pub struct RateGate {
    policies: PolicyTable,
    ledger: Arc<ActionLedger>,
}

impl RateGate {
    /// Bind `policies` to `ledger`.
    pub const fn new(policies: PolicyTable, ledger: Arc<ActionLedger>) -> Self {
        Self { policies, ledger }
    }

    /// Policy for an action type.
    pub fn policy(&self, action: ActionType) -> Option<&ActionPolicy> {
        self.policies.get(action)
    }

    /// Shared ledger.
    pub const fn ledger(&self) -> &Arc<ActionLedger> {
        &self.ledger
    }

    /// Decide whether `action` may run at `now`, ignoring warm-up.
    pub fn can_proceed(&self, action: ActionType, now: DateTime<Utc>) -> GateDecision {
        self.can_proceed_with(action, None, now)
    }

    /// Decide with an additional warm-up cap on the daily window.
    pub fn can_proceed_with(
        &self,
        action: ActionType,
        warmup: Option<WarmupLimit>,
        now: DateTime<Utc>,
    ) -> GateDecision {
        let policy = self.policy(action);
        self.ledger
            .inspect(action, |history| evaluate(action, policy, warmup, history, now))
    }

    /// Window counts and current decision for one action type.
    pub fn stats(&self, action: ActionType, now: DateTime<Utc>) -> UsageStats {
        let policy = self.policy(action).copied();
        self.ledger.inspect(action, |history| {
            let count = |w: Window| history.count_since(now - w.span());
            UsageStats {
                action,
                last_minute: count(Window::Minute),
                last_hour: count(Window::Hour),
                last_day: count(Window::Day),
                last_week: count(Window::Week),
                policy,
                can_proceed: evaluate(action, policy.as_ref(), None, history, now).is_allowed(),
            }
        })
    }

    /// Stats for every configured action type.
    pub fn all_stats(&self, now: DateTime<Utc>) -> Vec<UsageStats> {
        self.policies
            .iter()
            .map(|(action, _)| self.stats(action, now))
            .collect()
    }
}
