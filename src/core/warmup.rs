//! Warm-up ramp for newly automated accounts.

use chrono::NaiveDate;
use tracing::debug;

use crate::config::policy::{WarmupCeilings, WarmupConfig, WarmupSchedule};
use crate::core::rate_gate::WarmupLimit;
use crate::util::types::ActionType;

/// Week number (1-based) of `today` in a program that began on `start`,
/// clamped to `[1, max_week]`. A start date in the future counts as week 1.
pub fn week_index(start: NaiveDate, today: NaiveDate, max_week: u32) -> u32 {
    let days = (today - start).num_days();
    if days < 0 {
        return 1;
    }
    let week = u32::try_from(days / 7 + 1).unwrap_or(u32::MAX);
    week.clamp(1, max_week.max(1))
}

/// Escalating daily ceilings keyed by the account's automation start date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmupPolicy {
    program_start: NaiveDate,
    schedule: WarmupSchedule,
}

impl WarmupPolicy {
    /// Ramp starting on `program_start`.
    pub const fn new(program_start: NaiveDate, schedule: WarmupSchedule) -> Self {
        Self {
            program_start,
            schedule,
        }
    }

    /// Build from configuration.
    pub fn from_config(config: &WarmupConfig) -> Self {
        Self::new(config.program_start, config.schedule.clone())
    }

    /// First day of automation.
    pub const fn program_start(&self) -> NaiveDate {
        self.program_start
    }

    /// Current week of the ramp.
    pub fn week_index(&self, today: NaiveDate) -> u32 {
        week_index(self.program_start, today, self.schedule.max_week())
    }

    /// Whether the ramp is still escalating.
    pub fn is_ramping(&self, today: NaiveDate) -> bool {
        self.week_index(today) < self.schedule.max_week()
    }

    /// Ceilings in force today.
    pub fn current_ceilings(&self, today: NaiveDate) -> Option<WarmupCeilings> {
        self.schedule.for_week(self.week_index(today))
    }

    /// Daily cap for `action` today; `None` for action types the ramp does
    /// not cover.
    pub fn ceiling_for(&self, action: ActionType, today: NaiveDate) -> Option<WarmupLimit> {
        let category = action.warmup_category()?;
        let week = self.week_index(today);
        let ceilings = self.schedule.for_week(week)?;
        let limit = WarmupLimit {
            week,
            ceiling: ceilings.get(category),
        };
        debug!(action = %action, week, ceiling = limit.ceiling, "warm-up ceiling");
        Some(limit)
    }

    /// Whether `count_today` actions of this type still fit under the ramp.
    pub fn is_within_warmup(&self, action: ActionType, count_today: usize, today: NaiveDate) -> bool {
        self.ceiling_for(action, today)
            .map_or(true, |limit| count_today < limit.ceiling as usize)
    }
}
