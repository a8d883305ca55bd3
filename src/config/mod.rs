//! Configuration models for pacing policies, retries and dispatch.

pub mod policy;
pub mod runtime;

pub use policy::{
    ActionPolicy, JitterPlacement, PacingConfig, PolicyTable, WarmupCeilings, WarmupConfig,
    WarmupSchedule, Window, MAX_DELAY_SECS,
};
pub use runtime::{AppConfig, DispatcherConfig, LeadCriteria, OrchestratorConfig, RetryPolicy};
