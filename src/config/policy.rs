//! Action pacing policies and warm-up schedule configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::core::ConfigError;
use crate::util::types::{ActionType, WarmupCategory};

/// Longest delay a policy may configure, in seconds (one week).
pub const MAX_DELAY_SECS: u64 = 7 * 24 * 60 * 60;

/// Rolling window a ceiling applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    /// Last 60 seconds.
    Minute,
    /// Last hour.
    Hour,
    /// Last 24 hours.
    Day,
    /// Last 7 days.
    Week,
}

impl Window {
    /// All windows, shortest first.
    pub const ALL: [Self; 4] = [Self::Minute, Self::Hour, Self::Day, Self::Week];

    /// Length of the window.
    pub fn span(self) -> TimeDelta {
        match self {
            Self::Minute => TimeDelta::minutes(1),
            Self::Hour => TimeDelta::hours(1),
            Self::Day => TimeDelta::days(1),
            Self::Week => TimeDelta::days(7),
        }
    }

    /// Unit name used in human-readable reasons ("10/hour").
    pub const fn unit(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
        }
    }

    /// Adjective used in human-readable reasons ("Hourly limit").
    pub const fn adjective(self) -> &'static str {
        match self {
            Self::Minute => "Per-minute",
            Self::Hour => "Hourly",
            Self::Day => "Daily",
            Self::Week => "Weekly",
        }
    }
}

/// Immutable pacing policy for one action type.
///
/// Ceilings are optional per window; a ceiling of zero disables the action
/// under that window. Delays are in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionPolicy {
    /// Maximum actions in any rolling minute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_minute: Option<u32>,
    /// Maximum actions in any rolling hour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_hour: Option<u32>,
    /// Maximum actions in any rolling day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_day: Option<u32>,
    /// Maximum actions in any rolling week.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_week: Option<u32>,
    /// Minimum spacing between two actions of this type.
    #[serde(default)]
    pub min_delay_secs: u64,
    /// Upper bound of the randomized human-like delay.
    #[serde(default)]
    pub max_delay_secs: u64,
}

impl ActionPolicy {
    /// Ceiling configured for a window, if any.
    pub const fn ceiling(&self, window: Window) -> Option<u32> {
        match window {
            Window::Minute => self.per_minute,
            Window::Hour => self.per_hour,
            Window::Day => self.per_day,
            Window::Week => self.per_week,
        }
    }

    /// Configured `(window, ceiling)` pairs, shortest window first.
    pub fn ceilings(&self) -> impl Iterator<Item = (Window, u32)> + '_ {
        Window::ALL
            .into_iter()
            .filter_map(|w| self.ceiling(w).map(|c| (w, c)))
    }

    /// Minimum spacing as a duration.
    pub const fn min_delay(&self) -> Duration {
        Duration::from_secs(self.min_delay_secs)
    }

    /// Maximum human-like delay as a duration.
    pub const fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }

    /// How far back history must be kept to evaluate this policy.
    pub fn horizon(&self) -> TimeDelta {
        let secs = i64::try_from(self.min_delay_secs.min(MAX_DELAY_SECS)).unwrap_or_default();
        let min_delay = TimeDelta::try_seconds(secs).unwrap_or_else(|| Window::Week.span());
        self.ceilings()
            .map(|(w, _)| w.span())
            .fold(min_delay, TimeDelta::max)
    }

    /// Validate delay bounds.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_delay_secs > MAX_DELAY_SECS || self.min_delay_secs > MAX_DELAY_SECS {
            return Err(format!(
                "delays must not exceed {MAX_DELAY_SECS} seconds (min {}, max {})",
                self.min_delay_secs, self.max_delay_secs
            ));
        }
        if self.max_delay_secs < self.min_delay_secs {
            return Err(format!(
                "max_delay_secs ({}) must be >= min_delay_secs ({})",
                self.max_delay_secs, self.min_delay_secs
            ));
        }
        Ok(())
    }
}

/// Policy record per action type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyTable {
    policies: BTreeMap<ActionType, ActionPolicy>,
}

impl PolicyTable {
    /// Build a table from explicit entries.
    pub fn new(policies: impl IntoIterator<Item = (ActionType, ActionPolicy)>) -> Self {
        Self {
            policies: policies.into_iter().collect(),
        }
    }

    /// Conservative limits tuned to keep automated social accounts below
    /// suspension thresholds.
    pub fn conservative() -> Self {
        Self::new([
            (
                ActionType::ConnectionRequest,
                ActionPolicy {
                    per_hour: Some(10),
                    per_day: Some(20),
                    per_week: Some(100),
                    min_delay_secs: 120,
                    max_delay_secs: 300,
                    ..ActionPolicy::default()
                },
            ),
            (
                ActionType::Message,
                ActionPolicy {
                    per_minute: Some(5),
                    per_hour: Some(20),
                    per_day: Some(50),
                    min_delay_secs: 60,
                    max_delay_secs: 180,
                    ..ActionPolicy::default()
                },
            ),
            (
                ActionType::ProfileVisit,
                ActionPolicy {
                    per_hour: Some(40),
                    per_day: Some(80),
                    min_delay_secs: 30,
                    max_delay_secs: 90,
                    ..ActionPolicy::default()
                },
            ),
            (
                ActionType::Engagement,
                ActionPolicy {
                    per_hour: Some(50),
                    per_day: Some(100),
                    min_delay_secs: 20,
                    max_delay_secs: 60,
                    ..ActionPolicy::default()
                },
            ),
            (
                ActionType::Search,
                ActionPolicy {
                    per_hour: Some(20),
                    per_day: Some(50),
                    min_delay_secs: 15,
                    max_delay_secs: 45,
                    ..ActionPolicy::default()
                },
            ),
            (
                ActionType::EmailSend,
                ActionPolicy {
                    per_hour: Some(40),
                    per_day: Some(200),
                    min_delay_secs: 10,
                    max_delay_secs: 30,
                    ..ActionPolicy::default()
                },
            ),
            (
                ActionType::EmailCheck,
                ActionPolicy {
                    per_hour: Some(12),
                    ..ActionPolicy::default()
                },
            ),
            (
                ActionType::CompanyResearch,
                ActionPolicy {
                    per_hour: Some(60),
                    per_day: Some(500),
                    ..ActionPolicy::default()
                },
            ),
        ])
    }

    /// Policy for an action type.
    pub fn get(&self, action: ActionType) -> Option<&ActionPolicy> {
        self.policies.get(&action)
    }

    /// Replace the policy for one action type.
    pub fn set(&mut self, action: ActionType, policy: ActionPolicy) {
        self.policies.insert(action, policy);
    }

    /// Iterate configured policies.
    pub fn iter(&self) -> impl Iterator<Item = (ActionType, &ActionPolicy)> {
        self.policies.iter().map(|(a, p)| (*a, p))
    }

    /// Longest history any policy needs; the ledger prunes beyond this.
    pub fn retention(&self) -> TimeDelta {
        self.policies
            .values()
            .map(ActionPolicy::horizon)
            .fold(Window::Week.span(), TimeDelta::max)
    }

    /// Validate every policy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (action, policy) in &self.policies {
            policy
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("policy `{action}` invalid: {e}")))?;
        }
        Ok(())
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::conservative()
    }
}

/// Daily ceilings for one warm-up week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmupCeilings {
    /// Connection requests per day.
    pub connections: u32,
    /// Direct messages per day.
    pub messages: u32,
    /// Profile visits per day.
    pub visits: u32,
}

impl WarmupCeilings {
    /// Ceiling for a category.
    pub const fn get(&self, category: WarmupCategory) -> u32 {
        match category {
            WarmupCategory::Connections => self.connections,
            WarmupCategory::Messages => self.messages,
            WarmupCategory::Visits => self.visits,
        }
    }
}

/// Weekly escalation schedule. Week `n` (1-based) uses `weeks[n - 1]`; weeks
/// beyond the end hold the last entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmupSchedule {
    /// Ceilings per week, week 1 first.
    pub weeks: Vec<WarmupCeilings>,
}

impl WarmupSchedule {
    /// Last week of the ramp; later weeks hold steady.
    pub fn max_week(&self) -> u32 {
        u32::try_from(self.weeks.len()).unwrap_or(u32::MAX)
    }

    /// Ceilings for a 1-based week index, clamped to the schedule.
    pub fn for_week(&self, week: u32) -> Option<WarmupCeilings> {
        let idx = week.clamp(1, self.max_week().max(1)) as usize - 1;
        self.weeks.get(idx).copied()
    }

    /// The schedule must be non-empty and never decrease week over week.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.weeks.is_empty() {
            return Err(ConfigError::Invalid(
                "warm-up schedule must define at least one week".into(),
            ));
        }
        for (i, pair) in self.weeks.windows(2).enumerate() {
            let (prev, next) = (pair[0], pair[1]);
            if next.connections < prev.connections
                || next.messages < prev.messages
                || next.visits < prev.visits
            {
                return Err(ConfigError::Invalid(format!(
                    "warm-up week {} lowers a ceiling set in week {}",
                    i + 2,
                    i + 1
                )));
            }
        }
        Ok(())
    }
}

impl Default for WarmupSchedule {
    fn default() -> Self {
        Self {
            weeks: vec![
                WarmupCeilings { connections: 5, messages: 10, visits: 20 },
                WarmupCeilings { connections: 10, messages: 20, visits: 40 },
                WarmupCeilings { connections: 15, messages: 35, visits: 60 },
                WarmupCeilings { connections: 20, messages: 50, visits: 80 },
            ],
        }
    }
}

/// Warm-up program for one automated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmupConfig {
    /// First day of automation.
    pub program_start: NaiveDate,
    /// Escalation schedule.
    #[serde(default)]
    pub schedule: WarmupSchedule,
}

/// Where the randomized human-like delay is applied relative to the effector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterPlacement {
    /// Sleep, then act.
    #[default]
    BeforeEffector,
    /// Act, then sleep (only after a successful action).
    AfterEffector,
    /// Never sleep; only the gate applies.
    Disabled,
}

/// Everything the pacer needs, passed in at construction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Per-action policies.
    #[serde(default)]
    pub policies: PolicyTable,
    /// Optional warm-up program.
    #[serde(default)]
    pub warmup: Option<WarmupConfig>,
    /// Placement of the human-like delay.
    #[serde(default)]
    pub jitter: JitterPlacement,
    /// Guard around each effector call; elapsed guards count as failures.
    #[serde(default)]
    pub effector_timeout_secs: Option<u64>,
}

impl PacingConfig {
    /// Validate policies and the warm-up schedule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policies.validate()?;
        if let Some(warmup) = &self.warmup {
            warmup.schedule.validate()?;
        }
        if self.effector_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "effector_timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Parse pacing configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            serde_json::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
