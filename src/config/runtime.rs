//! Run orchestration, retry and dispatch configuration.

use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::policy::{PacingConfig, WarmupConfig};
use crate::core::ConfigError;

/// Retry policy applied by the task runner to a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Fixed wait between attempts, in seconds.
    pub backoff_secs: u64,
    /// Wall-clock ceiling per attempt, in seconds.
    pub attempt_time_limit_secs: u64,
}

impl RetryPolicy {
    /// Fixed wait between attempts.
    pub const fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    /// Wall-clock ceiling per attempt.
    pub const fn attempt_time_limit(&self) -> Duration {
        Duration::from_secs(self.attempt_time_limit_secs)
    }

    /// Validate the policy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.attempt_time_limit_secs == 0 {
            return Err(ConfigError::Invalid(
                "attempt_time_limit_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_secs: 60,
            attempt_time_limit_secs: 3600,
        }
    }
}

/// Prospect search criteria handed to the sourcer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadCriteria {
    /// Job titles to target.
    pub person_titles: Vec<String>,
    /// Maximum prospects per search.
    pub per_page: u32,
}

impl Default for LeadCriteria {
    fn default() -> Self {
        Self {
            person_titles: vec![
                "VP of Sales".into(),
                "Director of Sales".into(),
                "Sales Manager".into(),
            ],
            per_page: 10,
        }
    }
}

/// Knobs for the outreach pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Criteria used when a run has no stored work items.
    #[serde(default)]
    pub lead_criteria: LeadCriteria,
    /// Web search results gathered per company.
    #[serde(default = "default_research_results")]
    pub research_results: usize,
    /// Replies fetched by the response check.
    #[serde(default = "default_max_response_items")]
    pub max_response_items: usize,
    /// Only count unread replies.
    #[serde(default = "default_true")]
    pub unread_only: bool,
    /// Wait out a send denial when its retry-after is at most this long;
    /// otherwise the item is skipped for this run.
    #[serde(default)]
    pub max_denial_wait_secs: Option<u64>,
}

const fn default_research_results() -> usize {
    5
}

const fn default_max_response_items() -> usize {
    20
}

const fn default_true() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            lead_criteria: LeadCriteria::default(),
            research_results: default_research_results(),
            max_response_items: default_max_response_items(),
            unread_only: true,
            max_denial_wait_secs: None,
        }
    }
}

impl OrchestratorConfig {
    /// Longest denial the pipeline will sleep through.
    pub fn max_denial_wait(&self) -> Option<Duration> {
        self.max_denial_wait_secs.map(Duration::from_secs)
    }

    /// Validate pipeline settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lead_criteria.per_page == 0 {
            return Err(ConfigError::Invalid("per_page must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Bounded-concurrency dispatch of runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Runs executing at once.
    pub max_concurrent_runs: usize,
    /// Runs waiting before enqueue is rejected.
    pub max_queue_depth: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 4,
            max_queue_depth: 256,
        }
    }
}

impl DispatcherConfig {
    /// Validate dispatcher limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_runs == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_runs must be greater than 0".into(),
            ));
        }
        if self.max_queue_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_queue_depth must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Pacing policies and warm-up.
    #[serde(default)]
    pub pacing: PacingConfig,
    /// Task retry policy.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Pipeline settings.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Dispatcher limits.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
}

impl AppConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pacing.validate()?;
        self.retry.validate()?;
        self.orchestrator.validate()?;
        self.dispatcher.validate()
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            serde_json::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load `.env` (if present) and build configuration from the process
    /// environment. See [`AppConfig::from_vars`] for recognised keys.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(ConfigError::Parse(format!(".env: {e}")));
            }
        }
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build configuration from a variable lookup.
    ///
    /// `OUTREACH_CONFIG_FILE` names a JSON file used as the base; the
    /// remaining keys override individual fields:
    /// `OUTREACH_MAX_RETRIES`, `OUTREACH_RETRY_BACKOFF_SECS`,
    /// `OUTREACH_TASK_TIME_LIMIT_SECS`, `OUTREACH_WARMUP_START` (YYYY-MM-DD),
    /// `OUTREACH_MAX_CONCURRENT_RUNS`.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = match lookup("OUTREACH_CONFIG_FILE") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(v) = parse_var::<u32, _>(&lookup, "OUTREACH_MAX_RETRIES")? {
            cfg.retry.max_retries = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "OUTREACH_RETRY_BACKOFF_SECS")? {
            cfg.retry.backoff_secs = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "OUTREACH_TASK_TIME_LIMIT_SECS")? {
            cfg.retry.attempt_time_limit_secs = v;
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "OUTREACH_MAX_CONCURRENT_RUNS")? {
            cfg.dispatcher.max_concurrent_runs = v;
        }
        if let Some(start) = parse_var::<NaiveDate, _>(&lookup, "OUTREACH_WARMUP_START")? {
            let schedule = cfg
                .pacing
                .warmup
                .take()
                .map(|w| w.schedule)
                .unwrap_or_default();
            cfg.pacing.warmup = Some(WarmupConfig {
                program_start: start,
                schedule,
            });
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|_| ConfigError::Env {
                key: key.to_string(),
                value: raw.clone(),
            })
        })
        .transpose()
}
