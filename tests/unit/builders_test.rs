//! Tests for builder modules

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeDelta, TimeZone, Utc};
use outreach_pacer::builders::{build_task_runner, PacerBuilder};
use outreach_pacer::config::{AppConfig, PacingConfig, WarmupConfig, WarmupSchedule};
use outreach_pacer::core::{
    ActionLedger, AppResult, Collaborators, EffectorReport, MinimumDelay, SamplingParams,
    TextGenerator,
};
use outreach_pacer::infra::{JsonlLedgerStore, MemoryStore};
use outreach_pacer::util::{ActionType, Clock, ManualClock};

struct EchoWriter;

#[async_trait]
impl TextGenerator for EchoWriter {
    async fn generate(&self, prompt: &str, _params: SamplingParams) -> AppResult<String> {
        Ok(prompt.to_string())
    }
}

fn clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap())
}

#[test]
fn test_pacer_builder_defaults() {
    let builder = PacerBuilder::new(PacingConfig::default());
    assert!(builder.config().warmup.is_none());

    let pacer = builder.build().unwrap();
    assert!(pacer.warmup().is_none());
    assert!(pacer.gate().policy(ActionType::ConnectionRequest).is_some());
    assert_eq!(pacer.gate().ledger().retention(), TimeDelta::days(7));
}

#[test]
fn test_pacer_builder_applies_warmup() {
    let clock = clock();
    let config = PacingConfig {
        warmup: Some(WarmupConfig {
            program_start: clock.today() - TimeDelta::days(8),
            schedule: WarmupSchedule::default(),
        }),
        ..PacingConfig::default()
    };

    let pacer = PacerBuilder::new(config)
        .clock(Arc::new(clock.clone()))
        .sleeper(Arc::new(clock.clone()))
        .delays(Arc::new(MinimumDelay))
        .build()
        .unwrap();

    let warmup = pacer.warmup().unwrap();
    assert_eq!(warmup.week_index(clock.today()), 2);
}

#[test]
fn test_pacer_builder_rejects_invalid_config() {
    let config = PacingConfig {
        effector_timeout_secs: Some(0),
        ..PacingConfig::default()
    };
    assert!(PacerBuilder::new(config).build().is_err());
}

#[test]
fn test_pacer_builder_shares_ledger() {
    let ledger = Arc::new(ActionLedger::new(TimeDelta::days(7)));
    let first = PacerBuilder::new(PacingConfig::default())
        .ledger(Arc::clone(&ledger))
        .build()
        .unwrap();
    let second = PacerBuilder::new(PacingConfig::default())
        .ledger(Arc::clone(&ledger))
        .build()
        .unwrap();

    assert!(Arc::ptr_eq(first.gate().ledger(), second.gate().ledger()));
}

#[tokio::test]
async fn test_pacer_builder_restores_persisted_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let clock = clock();
    let store = JsonlLedgerStore::new(dir.path(), "acct").unwrap();

    let pacer = PacerBuilder::new(PacingConfig::default())
        .clock(Arc::new(clock.clone()))
        .sleeper(Arc::new(clock.clone()))
        .delays(Arc::new(MinimumDelay))
        .store(Box::new(store.clone()))
        .build()
        .unwrap();
    let outcome = pacer
        .perform(ActionType::Search, || async {
            EffectorReport::ok(serde_json::Value::Null)
        })
        .await;
    assert!(outcome.is_performed());

    let restored = PacerBuilder::new(PacingConfig::default())
        .clock(Arc::new(clock.clone()))
        .store(Box::new(store))
        .build()
        .unwrap();
    let stats = restored.stats(ActionType::Search);
    assert_eq!(stats.last_hour, 1);
}

#[test]
fn test_build_task_runner() {
    let pacer = PacerBuilder::new(PacingConfig::default()).build().unwrap();
    let store = MemoryStore::new();
    let runner = build_task_runner(
        &AppConfig::default(),
        Arc::new(store),
        Collaborators::new(Arc::new(EchoWriter)),
        Arc::new(pacer),
        Arc::new(clock()),
    );
    assert!(runner.is_ok());

    let mut cfg = AppConfig::default();
    cfg.retry.attempt_time_limit_secs = 0;
    let pacer = PacerBuilder::new(PacingConfig::default()).build().unwrap();
    let invalid = build_task_runner(
        &cfg,
        Arc::new(MemoryStore::new()),
        Collaborators::new(Arc::new(EchoWriter)),
        Arc::new(pacer),
        Arc::new(clock()),
    );
    assert!(invalid.is_err());
}
