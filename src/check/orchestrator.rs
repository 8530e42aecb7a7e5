// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Concurrency-bounded batch orchestrator
//!
//! Each URL walks the batch's [`FallbackChain`] on its own task. Workers
//! report back to a single collector over a channel, and the collector turns
//! completions into [`Progress`] events in completion order.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::cache::{ResultCache, DEFAULT_FRESHNESS_HOURS};
use super::strategy::{FallbackChain, IndexChecker};
use super::types::{CachedStatus, CheckOutcome, CheckStatus, Engine};
use crate::storage::Storage;

/// Wall-clock budget for a whole batch
pub const BATCH_BUDGET: Duration = Duration::from_secs(300);

/// Live backends available to the orchestrator
#[derive(Clone)]
pub struct Backends {
    /// Hosted API, present only when a credential is configured
    pub primary_api: Option<Arc<dyn IndexChecker>>,
    pub automation_primary: Arc<dyn IndexChecker>,
    pub automation_secondary: Arc<dyn IndexChecker>,
}

impl Backends {
    fn for_engine(&self, engine: Engine) -> Option<&Arc<dyn IndexChecker>> {
        match engine {
            Engine::Cache => None,
            Engine::PrimaryApi => self.primary_api.as_ref(),
            Engine::AutomationPrimary => Some(&self.automation_primary),
            Engine::AutomationSecondary => Some(&self.automation_secondary),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub freshness_hours: u64,
    pub batch_budget: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            freshness_hours: DEFAULT_FRESHNESS_HOURS,
            batch_budget: BATCH_BUDGET,
        }
    }
}

/// Per-batch options
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Skip the hosted API even when a credential exists
    pub economy_mode: bool,
    /// Authenticated batch that receives non-error results
    pub batch_id: Option<i64>,
}

/// One completed URL plus running counters
#[derive(Debug, Clone)]
pub struct Progress {
    pub outcome: CheckOutcome,
    pub completed: usize,
    pub total: usize,
}

/// Handle to a running batch
pub struct BatchRun {
    pub total: usize,
    pub chain: FallbackChain,
    /// Yields exactly `total` events, then closes once results are persisted
    pub receiver: mpsc::Receiver<Progress>,
}

type Completion = (usize, CheckOutcome, Option<JoinHandle<()>>);

pub struct Orchestrator {
    cache: ResultCache,
    storage: Arc<dyn Storage>,
    backends: Backends,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(storage: Arc<dyn Storage>, backends: Backends, settings: OrchestratorSettings) -> Self {
        Self {
            cache: ResultCache::new(storage.clone()),
            storage,
            backends,
            settings,
        }
    }

    pub fn has_primary_api(&self) -> bool {
        self.backends.primary_api.is_some()
    }

    /// Start checking `urls` and return the progress channel.
    ///
    /// The batch keeps running if the receiver is dropped; outcomes are still
    /// persisted.
    pub fn run(self: &Arc<Self>, urls: Vec<String>, options: RunOptions) -> BatchRun {
        let chain = FallbackChain::select(self.has_primary_api(), options.economy_mode);
        let total = urls.len();
        let (tx, rx) = mpsc::channel(total.max(1));

        info!(
            "Checking {} URLs via {} (concurrency {})",
            total,
            chain.describe(),
            chain.concurrency()
        );

        let this = self.clone();
        let batch_chain = chain.clone();
        tokio::spawn(async move {
            this.drive(urls, batch_chain, options.batch_id, tx).await;
        });

        BatchRun {
            total,
            chain,
            receiver: rx,
        }
    }

    async fn drive(
        self: Arc<Self>,
        urls: Vec<String>,
        chain: FallbackChain,
        batch_id: Option<i64>,
        tx: mpsc::Sender<Progress>,
    ) {
        let total = urls.len();
        let deadline = Instant::now() + self.settings.batch_budget;
        let semaphore = Arc::new(Semaphore::new(chain.concurrency()));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();

        let mut workers = Vec::with_capacity(total);
        for (index, url) in urls.iter().cloned().enumerate() {
            let this = self.clone();
            let chain = chain.clone();
            let semaphore = semaphore.clone();
            let done_tx = done_tx.clone();

            workers.push(tokio::spawn(async move {
                // Closed once the batch budget is spent
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let (outcome, persist) = this.check_one(&url, &chain, batch_id).await;
                let _ = done_tx.send((index, outcome, persist));
            }));
        }
        drop(done_tx);

        let mut pending: Vec<Option<String>> = urls.into_iter().map(Some).collect();
        let mut completed = 0;
        let mut persists = Vec::new();
        let mut finished = Vec::new();

        loop {
            match tokio::time::timeout_at(deadline, done_rx.recv()).await {
                Ok(Some(completion)) => finished.push(completion),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Batch budget of {}s exhausted with {} URLs pending",
                        self.settings.batch_budget.as_secs(),
                        total - completed
                    );
                    semaphore.close();
                    for worker in &workers {
                        worker.abort();
                    }
                    // Completions that beat the abort still count
                    while let Ok(completion) = done_rx.try_recv() {
                        finished.push(completion);
                    }
                }
            }

            for (index, outcome, persist) in finished.drain(..) {
                if let Some(slot) = pending.get_mut(index) {
                    slot.take();
                }
                persists.extend(persist);
                completed += 1;
                emit(&tx, outcome, completed, total).await;
            }

            if semaphore.is_closed() {
                break;
            }
        }

        // Anything still pending either ran out of time or lost its worker.
        // Those workers were aborted, so nothing is checked or persisted for them.
        let fallback_engine = chain
            .live_steps()
            .last()
            .unwrap_or(Engine::AutomationSecondary);
        for url in pending.iter_mut().filter_map(Option::take) {
            completed += 1;
            let outcome = CheckOutcome::new(url, CheckStatus::Error, fallback_engine);
            emit(&tx, outcome, completed, total).await;
        }

        for handle in persists {
            let _ = handle.await;
        }
        debug!("Batch of {} URLs finished", total);
    }

    /// Walk the chain for one URL.
    ///
    /// Returns the outcome plus the handle of the detached persistence task,
    /// if one was started.
    pub async fn check_one(
        &self,
        url: &str,
        chain: &FallbackChain,
        batch_id: Option<i64>,
    ) -> (CheckOutcome, Option<JoinHandle<()>>) {
        let mut last_engine = None;

        for &engine in chain.steps() {
            if engine == Engine::Cache {
                match self.cache.get(url, self.settings.freshness_hours).await {
                    Ok(Some(entry)) => {
                        info!("[Cache] HIT: {} -> {}", url, entry.status);
                        let outcome = CheckOutcome::new(url, entry.status.into(), Engine::Cache);
                        return (outcome, None);
                    }
                    Ok(None) => {}
                    Err(e) => warn!("[Cache] read failed for {}, checking live: {}", url, e),
                }
                continue;
            }

            let Some(checker) = self.backends.for_engine(engine) else {
                continue;
            };
            last_engine = Some(engine);

            match checker.check(url).await {
                Ok(CheckStatus::Error) => {
                    warn!("[Failover] {} could not decide {}", engine, url);
                }
                Ok(status) => {
                    let persist = CachedStatus::try_from(status)
                        .ok()
                        .map(|cached| self.persist(url, cached, batch_id));
                    return (CheckOutcome::new(url, status, engine), persist);
                }
                Err(e) if e.is_quota() => {
                    warn!("[Failover] {} credits exhausted for {}: {}", engine, url, e);
                }
                Err(e) => {
                    warn!("[Failover] {} failed for {}: {}", engine, url, e);
                }
            }
        }

        let engine = last_engine.unwrap_or(Engine::AutomationSecondary);
        warn!("All backends failed for {}", url);
        (CheckOutcome::new(url, CheckStatus::Error, engine), None)
    }

    fn persist(&self, url: &str, status: CachedStatus, batch_id: Option<i64>) -> JoinHandle<()> {
        let cache = self.cache.clone();
        let storage = self.storage.clone();
        let url = url.to_string();

        tokio::spawn(async move {
            if let Err(e) = cache.put(&url, status.into()).await {
                warn!("[Cache] write failed for {}: {}", url, e);
            }
            if let Some(batch_id) = batch_id {
                if let Err(e) = storage.batch_append_result(batch_id, &url, status).await {
                    warn!("Failed to append {} to batch {}: {}", url, batch_id, e);
                }
            }
        })
    }
}

async fn emit(tx: &mpsc::Sender<Progress>, outcome: CheckOutcome, completed: usize, total: usize) {
    let progress = Progress {
        outcome,
        completed,
        total,
    };
    if tx.send(progress).await.is_err() {
        debug!("Progress receiver dropped, continuing batch");
    }
}
