// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Orchestrator tests
//!
//! These tests verify that:
//! - Every submitted URL produces exactly one event
//! - Quota failures never surface under the hosted API's label
//! - Fresh cache entries short-circuit live backends
//! - Duplicate URLs are each reported
//! - Pool width is enforced and the batch budget stops outstanding work

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use indexy_checker::check::{
    Backends, BatchRun, CachedStatus, CheckError, CheckStatus, Engine, IndexChecker,
    Orchestrator, OrchestratorSettings, Progress, RunOptions,
};
use indexy_checker::storage::{MemoryStorage, Storage};
use mockall::mock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

mock! {
    pub Checker {}

    #[async_trait]
    impl IndexChecker for Checker {
        async fn check(&self, url: &str) -> Result<CheckStatus, CheckError>;
        fn engine(&self) -> Engine;
    }
}

fn checker(engine: Engine, status: CheckStatus) -> Arc<dyn IndexChecker> {
    let mut mock = MockChecker::new();
    mock.expect_engine().return_const(engine);
    mock.expect_check().returning(move |_| Ok(status));
    Arc::new(mock)
}

fn unused(engine: Engine) -> Arc<dyn IndexChecker> {
    let mut mock = MockChecker::new();
    mock.expect_engine().return_const(engine);
    mock.expect_check().never();
    Arc::new(mock)
}

/// Checker that takes `delay` per URL and tracks how many calls overlap
struct Slow {
    engine: Engine,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Slow {
    fn new(engine: Engine, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            engine,
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl IndexChecker for Slow {
    async fn check(&self, _url: &str) -> Result<CheckStatus, CheckError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(CheckStatus::Indexed)
    }

    fn engine(&self) -> Engine {
        self.engine
    }
}

fn orchestrator(storage: Arc<MemoryStorage>, backends: Backends) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(
        storage,
        backends,
        OrchestratorSettings::default(),
    ))
}

async fn drain(mut run: BatchRun) -> Vec<Progress> {
    let mut events = Vec::new();
    while let Some(progress) = run.receiver.recv().await {
        events.push(progress);
    }
    events
}

fn urls(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("https://site.test/page-{}", i)).collect()
}

#[tokio::test]
async fn test_quota_exhaustion_never_labelled_as_api() {
    let storage = Arc::new(MemoryStorage::new());

    let mut api = MockChecker::new();
    api.expect_engine().return_const(Engine::PrimaryApi);
    api.expect_check()
        .times(3)
        .returning(|_| Err(CheckError::QuotaExhausted { status: 402 }));

    let backends = Backends {
        primary_api: Some(Arc::new(api)),
        automation_primary: checker(Engine::AutomationPrimary, CheckStatus::Indexed),
        automation_secondary: unused(Engine::AutomationSecondary),
    };

    let run = orchestrator(storage.clone(), backends).run(urls(3), RunOptions::default());
    assert!(run.chain.uses_primary_api());

    let events = drain(run).await;
    assert_eq!(events.len(), 3);
    for event in &events {
        assert_ne!(event.outcome.engine, Engine::PrimaryApi);
        assert_eq!(event.outcome.engine, Engine::AutomationPrimary);
        assert_eq!(event.outcome.status, CheckStatus::Indexed);
    }

    for url in urls(3) {
        assert_eq!(storage.scan_count(&url), 1);
    }
}

#[tokio::test]
async fn test_every_url_reported_once_with_monotonic_counter() {
    let storage = Arc::new(MemoryStorage::new());
    let backends = Backends {
        primary_api: None,
        automation_primary: checker(Engine::AutomationPrimary, CheckStatus::NotIndexed),
        automation_secondary: unused(Engine::AutomationSecondary),
    };

    let events = drain(orchestrator(storage, backends).run(urls(7), RunOptions::default())).await;

    assert_eq!(events.len(), 7);
    let counters: Vec<usize> = events.iter().map(|e| e.completed).collect();
    assert_eq!(counters, (1..=7).collect::<Vec<_>>());
    assert!(events.iter().all(|e| e.total == 7));

    let mut seen: Vec<String> = events.iter().map(|e| e.outcome.url.clone()).collect();
    seen.sort();
    let mut expected = urls(7);
    expected.sort();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_fresh_cache_skips_live_backends() {
    let storage = Arc::new(MemoryStorage::new());
    storage.insert_scan_at(
        "https://site.test/cached",
        CachedStatus::Indexed,
        Utc::now() - ChronoDuration::hours(2),
    );

    let backends = Backends {
        primary_api: Some(unused(Engine::PrimaryApi)),
        automation_primary: unused(Engine::AutomationPrimary),
        automation_secondary: unused(Engine::AutomationSecondary),
    };

    let events = drain(
        orchestrator(storage.clone(), backends)
            .run(vec!["https://site.test/cached".to_string()], RunOptions::default()),
    )
    .await;

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].outcome.engine, Engine::Cache);
    assert_eq!(events[0].outcome.status, CheckStatus::Indexed);
    // A hit does not append a new observation
    assert_eq!(storage.scan_count("https://site.test/cached"), 1);
}

#[tokio::test]
async fn test_stale_cache_checks_live() {
    let storage = Arc::new(MemoryStorage::new());
    storage.insert_scan_at(
        "https://site.test/old",
        CachedStatus::Indexed,
        Utc::now() - ChronoDuration::days(8),
    );

    let backends = Backends {
        primary_api: None,
        automation_primary: checker(Engine::AutomationPrimary, CheckStatus::NotIndexed),
        automation_secondary: unused(Engine::AutomationSecondary),
    };

    let events = drain(
        orchestrator(storage.clone(), backends)
            .run(vec!["https://site.test/old".to_string()], RunOptions::default()),
    )
    .await;

    assert_eq!(events[0].outcome.engine, Engine::AutomationPrimary);
    assert_eq!(events[0].outcome.status, CheckStatus::NotIndexed);
    assert_eq!(storage.scan_count("https://site.test/old"), 2);
}

#[tokio::test]
async fn test_duplicate_urls_each_reported() {
    let storage = Arc::new(MemoryStorage::new());
    let backends = Backends {
        primary_api: None,
        automation_primary: checker(Engine::AutomationPrimary, CheckStatus::Indexed),
        automation_secondary: unused(Engine::AutomationSecondary),
    };

    let dup = "https://site.test/same".to_string();
    let events = drain(
        orchestrator(storage, backends).run(vec![dup.clone(), dup.clone()], RunOptions::default()),
    )
    .await;

    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.outcome.url == dup));
    assert!(events
        .iter()
        .all(|e| e.outcome.status == CheckStatus::Indexed));
    assert!(events.iter().any(|e| e.outcome.engine != Engine::Cache));
}

#[tokio::test]
async fn test_economy_mode_bypasses_api() {
    let storage = Arc::new(MemoryStorage::new());
    let backends = Backends {
        primary_api: Some(unused(Engine::PrimaryApi)),
        automation_primary: checker(Engine::AutomationPrimary, CheckStatus::Indexed),
        automation_secondary: unused(Engine::AutomationSecondary),
    };

    let run = orchestrator(storage, backends).run(
        urls(2),
        RunOptions {
            economy_mode: true,
            batch_id: None,
        },
    );
    assert!(!run.chain.uses_primary_api());

    let events = drain(run).await;
    assert!(events
        .iter()
        .all(|e| e.outcome.engine == Engine::AutomationPrimary));
}

#[tokio::test]
async fn test_batch_results_persisted_before_channel_closes() {
    let storage = Arc::new(MemoryStorage::new());
    let batch = storage.batch_create(42, 3).await.unwrap();

    let backends = Backends {
        primary_api: None,
        automation_primary: checker(Engine::AutomationPrimary, CheckStatus::Indexed),
        automation_secondary: unused(Engine::AutomationSecondary),
    };

    let events = drain(orchestrator(storage.clone(), backends).run(
        urls(3),
        RunOptions {
            economy_mode: false,
            batch_id: Some(batch.id),
        },
    ))
    .await;
    assert_eq!(events.len(), 3);

    let results = storage.batch_results(batch.id).await.unwrap();
    assert_eq!(results.len(), 3);
    let stored = storage.batch_get_by_id(batch.id).await.unwrap().unwrap();
    assert_eq!(stored.indexed_count, 3);
}

#[tokio::test]
async fn test_errors_are_not_cached_or_batched() {
    let storage = Arc::new(MemoryStorage::new());
    let batch = storage.batch_create(7, 1).await.unwrap();

    let backends = Backends {
        primary_api: None,
        automation_primary: checker(Engine::AutomationPrimary, CheckStatus::Error),
        automation_secondary: checker(Engine::AutomationSecondary, CheckStatus::Error),
    };

    let events = drain(orchestrator(storage.clone(), backends).run(
        vec!["https://site.test/broken".to_string()],
        RunOptions {
            economy_mode: false,
            batch_id: Some(batch.id),
        },
    ))
    .await;

    assert_eq!(events[0].outcome.status, CheckStatus::Error);
    assert_eq!(events[0].outcome.engine, Engine::AutomationSecondary);
    assert_eq!(storage.scan_count("https://site.test/broken"), 0);
    assert!(storage.batch_results(batch.id).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_automation_pool_width_is_two() {
    let storage = Arc::new(MemoryStorage::new());
    let google = Slow::new(Engine::AutomationPrimary, Duration::from_secs(10));
    let backends = Backends {
        primary_api: None,
        automation_primary: google.clone(),
        automation_secondary: unused(Engine::AutomationSecondary),
    };

    let events = drain(orchestrator(storage, backends).run(urls(6), RunOptions::default())).await;

    assert_eq!(events.len(), 6);
    assert_eq!(google.calls.load(Ordering::SeqCst), 6);
    assert_eq!(google.peak.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_api_pool_width_is_ten() {
    let storage = Arc::new(MemoryStorage::new());
    let api = Slow::new(Engine::PrimaryApi, Duration::from_secs(10));
    let backends = Backends {
        primary_api: Some(api.clone() as Arc<dyn IndexChecker>),
        automation_primary: unused(Engine::AutomationPrimary),
        automation_secondary: unused(Engine::AutomationSecondary),
    };

    let events = drain(orchestrator(storage, backends).run(urls(25), RunOptions::default())).await;

    assert_eq!(events.len(), 25);
    assert!(events.iter().all(|e| e.outcome.engine == Engine::PrimaryApi));
    assert_eq!(api.peak.load(Ordering::SeqCst), 10);
}

#[tokio::test(start_paused = true)]
async fn test_batch_budget_stops_outstanding_checks() {
    let storage = Arc::new(MemoryStorage::new());
    let google = Slow::new(Engine::AutomationPrimary, Duration::from_secs(100));
    let backends = Backends {
        primary_api: None,
        automation_primary: google.clone(),
        automation_secondary: unused(Engine::AutomationSecondary),
    };
    let orchestrator = Arc::new(Orchestrator::new(
        storage.clone(),
        backends,
        OrchestratorSettings {
            batch_budget: Duration::from_secs(150),
            ..Default::default()
        },
    ));

    // Width 2: two URLs finish at 100s, two are mid-check at 150s, two never start
    let events = drain(orchestrator.run(urls(6), RunOptions::default())).await;

    assert_eq!(events.len(), 6);
    let counters: Vec<usize> = events.iter().map(|e| e.completed).collect();
    assert_eq!(counters, (1..=6).collect::<Vec<_>>());

    let indexed = events
        .iter()
        .filter(|e| e.outcome.status == CheckStatus::Indexed)
        .count();
    let errors: Vec<_> = events
        .iter()
        .filter(|e| e.outcome.status == CheckStatus::Error)
        .collect();
    assert_eq!(indexed, 2);
    assert_eq!(errors.len(), 4);
    assert!(errors
        .iter()
        .all(|e| e.outcome.engine == Engine::AutomationSecondary));
    assert_eq!(google.calls.load(Ordering::SeqCst), 4);

    // Nothing keeps checking or writing once the stream has ended
    tokio::time::sleep(Duration::from_secs(1000)).await;
    assert_eq!(google.calls.load(Ordering::SeqCst), 4);

    let persisted: usize = urls(6).iter().map(|u| storage.scan_count(u)).sum();
    assert_eq!(persisted, 2);
    for event in errors {
        assert_eq!(storage.scan_count(&event.outcome.url), 0);
    }
}
