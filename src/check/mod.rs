// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Index verification pipeline
//!
//! Answers "is this URL indexed by the search engine?" for batches of URLs:
//! - Cache-first lookup with a freshness window
//! - Hosted Serper API as the primary backend
//! - Local browser automation (Google, then Bing) as failover
//! - Bounded concurrency chosen per batch

pub mod cache;
pub mod normalize;
pub mod orchestrator;
pub mod serper;
pub mod strategy;
pub mod timeout;
pub mod types;

pub use cache::ResultCache;
pub use normalize::{containment_match, normalize, site_query};
pub use orchestrator::{Backends, BatchRun, Orchestrator, OrchestratorSettings, Progress, RunOptions};
pub use serper::SerperClient;
pub use strategy::{FallbackChain, IndexChecker};
pub use types::{CachedStatus, CheckError, CheckOutcome, CheckStatus, Engine};
