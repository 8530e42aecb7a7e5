// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Persistence collaborator
//!
//! The check pipeline only talks to storage through the [`Storage`] trait:
//! scan history (the result cache), per-user batches, and guest IP usage.
//! [`SqliteStorage`] is the production libsql implementation and
//! [`MemoryStorage`] backs tests.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::check::types::{CacheEntry, CachedStatus};

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

/// Errors raised by storage backends
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// A batch of URLs submitted by an authenticated user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: i64,
    pub user_id: i64,
    pub total_urls: i64,
    pub indexed_count: i64,
    pub created_at: DateTime<Utc>,
}

/// One persisted outcome inside a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub id: i64,
    pub batch_id: i64,
    pub url: String,
    pub status: CachedStatus,
    pub checked_at: DateTime<Utc>,
}

/// Aggregate numbers for a user's dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_checked: i64,
    pub total_indexed: i64,
    /// Rounded percentage of indexed URLs
    pub avg_index_rate: i64,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_batch_size: i64,
}

impl UserStats {
    pub(crate) fn from_totals(
        total_checked: i64,
        total_indexed: i64,
        last_batch: Option<&Batch>,
    ) -> Self {
        let avg_index_rate = if total_checked > 0 {
            ((total_indexed as f64 / total_checked as f64) * 100.0).round() as i64
        } else {
            0
        };

        Self {
            total_checked,
            total_indexed,
            avg_index_rate,
            last_checked: last_batch.map(|b| b.created_at),
            last_batch_size: last_batch.map(|b| b.total_urls).unwrap_or(0),
        }
    }
}

/// Guest URL usage for the current UTC day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpUsage {
    pub count: u32,
}

/// Storage operations the check pipeline and ingress layer depend on
#[async_trait]
pub trait Storage: Send + Sync {
    /// Most recent observation for `url`, if it is at most `max_age_hours` old
    async fn cache_get(&self, url: &str, max_age_hours: u64) -> Result<Option<CacheEntry>>;

    /// Append an observation. History is never overwritten.
    async fn cache_put(&self, url: &str, status: CachedStatus) -> Result<()>;

    /// Most recent observations across all URLs
    async fn recent_scans(&self, limit: usize) -> Result<Vec<CacheEntry>>;

    async fn batch_create(&self, user_id: i64, total_urls: usize) -> Result<Batch>;

    async fn batch_get_by_id(&self, batch_id: i64) -> Result<Option<Batch>>;

    /// Append a result and bump `indexed_count` when the status is INDEXED
    async fn batch_append_result(
        &self,
        batch_id: i64,
        url: &str,
        status: CachedStatus,
    ) -> Result<()>;

    async fn batch_results(&self, batch_id: i64) -> Result<Vec<BatchResult>>;

    async fn user_batches(&self, user_id: i64, limit: usize) -> Result<Vec<Batch>>;

    async fn user_stats(&self, user_id: i64) -> Result<UserStats>;

    /// Today's usage for a guest IP. A stale day resets to zero.
    async fn ip_usage_get(&self, ip: &str) -> Result<IpUsage>;

    async fn ip_usage_increment(&self, ip: &str, amount: u32) -> Result<()>;
}

/// Whether an observation taken at `checked_at` is still fresh at `now`
pub fn is_fresh(checked_at: DateTime<Utc>, now: DateTime<Utc>, max_age_hours: u64) -> bool {
    let age_ms = (now - checked_at).num_milliseconds();
    let max_ms = i64::try_from(max_age_hours)
        .unwrap_or(i64::MAX / 3_600_000)
        .saturating_mul(3_600_000);
    age_ms <= max_ms
}

/// Calendar day used for guest quota accounting
pub fn usage_day(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}
