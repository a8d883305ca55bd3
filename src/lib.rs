//! # Outreach Pacer
//!
//! Action safety scheduling and run orchestration for automated outreach agents.
//!
//! An outreach agent discovers prospects, researches their companies and
//! contacts them over email and a social-automation provider. Every outbound
//! action is risky: too many connection requests in an hour, or messages sent
//! faster than a human could type them, get accounts flagged. This crate puts a
//! single choke point in front of those actions and drives whole runs through
//! it.
//!
//! ## Key Features
//!
//! - **Rolling-window ceilings**: per-minute, hourly, daily and weekly limits per
//!   action type, evaluated against a process-wide ledger
//! - **Human-like pacing**: minimum spacing between actions plus a random delay
//!   in `[min_delay, max_delay]`
//! - **Warm-up ramp**: daily caps that grow week by week for newly automated
//!   accounts
//! - **Reservations**: the gate decision and the ledger slot are taken under one
//!   per-type lock, so concurrent callers never overshoot a ceiling; failed
//!   effectors give the slot back
//! - **Resumable runs**: each pipeline sub-step appends a step log entry and
//!   persists a cursor, so a crashed or paused run continues where it stopped
//! - **Retries**: the task runner retries transient failures with a fixed
//!   backoff and marks the run FAILED when it gives up
//! - **Bounded dispatch**: at most N runs execute at once; the rest wait in a
//!   FIFO and are woken as slots free up
//!
//! ## Architecture
//!
//! ```text
//! Dispatcher ─▶ TaskRunner ─▶ Orchestrator ─▶ research / compose / send
//!                                   │
//!                                   ▼
//!                                 Pacer ─▶ RateGate + WarmupPolicy ─▶ ActionLedger
//! ```
//!
//! ## Pacing an action
//!
//! ```rust,ignore
//! use outreach_pacer::builders::PacerBuilder;
//! use outreach_pacer::config::PacingConfig;
//! use outreach_pacer::core::EffectorReport;
//! use outreach_pacer::util::ActionType;
//!
//! let pacer = PacerBuilder::new(PacingConfig::default()).build()?;
//! let outcome = pacer
//!     .perform(ActionType::ProfileVisit, || async { EffectorReport::ok(serde_json::Value::Null) })
//!     .await;
//! if let Some(denial) = outcome.denial() {
//!     println!("{denial}");
//! }
//! ```
//!
//! For complete examples, see:
//! - `tests/orchestrator_test.rs` - Full pipeline runs against the in-memory store
//! - `tests/pacing_test.rs` - Gate, warm-up and pacer behaviour
//! - `tests/task_runner_test.rs` - Retries and bounded dispatch

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core pacing abstractions, run orchestration and task execution.
pub mod core;
/// Configuration models for pacing policies, retries and dispatch.
pub mod config;
/// Builders to construct pacers and task runners from configuration.
pub mod builders;
/// Infrastructure adapters for queues, mailboxes, and storage backends.
pub mod infra;
/// Runtime adapters: bounded run dispatch on an async executor.
pub mod runtime;
/// Shared utilities.
pub mod util;
