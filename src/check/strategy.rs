// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Fallback strategies
//!
//! Every live backend implements [`IndexChecker`]. The order in which they
//! are tried is a [`FallbackChain`] of tagged steps chosen once per batch.

use async_trait::async_trait;

use super::types::{CheckError, CheckStatus, Engine};

/// Concurrency when the hosted API serves the batch
pub const API_CONCURRENCY: usize = 10;

/// Concurrency when only the local browser serves the batch
pub const AUTOMATION_CONCURRENCY: usize = 2;

/// A live backend that can answer "is this URL indexed?"
///
/// `Ok(CheckStatus::Error)` means the backend ran but could not decide;
/// `Err` means it failed outright. The orchestrator fails over on both.
#[async_trait]
pub trait IndexChecker: Send + Sync {
    async fn check(&self, url: &str) -> Result<CheckStatus, CheckError>;

    /// Engine label reported for outcomes from this backend
    fn engine(&self) -> Engine;
}

/// Ordered list of steps tried for each URL, stopping at the first answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackChain {
    steps: Vec<Engine>,
}

impl FallbackChain {
    /// Pick the chain for a batch.
    ///
    /// The hosted API is only used when a credential exists and the caller
    /// did not ask for economy mode.
    pub fn select(primary_api_available: bool, economy_mode: bool) -> Self {
        let mut steps = vec![Engine::Cache];
        if primary_api_available && !economy_mode {
            steps.push(Engine::PrimaryApi);
        }
        steps.push(Engine::AutomationPrimary);
        steps.push(Engine::AutomationSecondary);
        Self { steps }
    }

    pub fn steps(&self) -> &[Engine] {
        &self.steps
    }

    /// Steps that perform a live lookup, in order
    pub fn live_steps(&self) -> impl Iterator<Item = Engine> + '_ {
        self.steps.iter().copied().filter(Engine::is_live)
    }

    pub fn uses_primary_api(&self) -> bool {
        self.steps.contains(&Engine::PrimaryApi)
    }

    /// Worker pool width for a batch served by this chain
    pub fn concurrency(&self) -> usize {
        if self.uses_primary_api() {
            API_CONCURRENCY
        } else {
            AUTOMATION_CONCURRENCY
        }
    }

    /// Human-readable mode for logs
    pub fn describe(&self) -> &'static str {
        if self.uses_primary_api() {
            "Serper API"
        } else {
            "local browser"
        }
    }
}
