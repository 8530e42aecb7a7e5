// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Freshness-windowed result cache over the storage collaborator

use std::sync::Arc;
use tracing::debug;

use super::types::{CacheEntry, CachedStatus, CheckStatus};
use crate::storage::{Storage, StorageError};

/// Default freshness window for the check pipeline (7 days)
pub const DEFAULT_FRESHNESS_HOURS: u64 = 168;

/// Result cache keyed by the raw URL as submitted
#[derive(Clone)]
pub struct ResultCache {
    storage: Arc<dyn Storage>,
}

impl ResultCache {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Most recent entry for `url` if it is no older than `freshness_hours`.
    ///
    /// Stale entries stay in storage as history; they just don't count as hits.
    pub async fn get(
        &self,
        url: &str,
        freshness_hours: u64,
    ) -> Result<Option<CacheEntry>, StorageError> {
        self.storage.cache_get(url, freshness_hours).await
    }

    /// Record an observation. ERROR is ignored and reported as `false`.
    pub async fn put(&self, url: &str, status: CheckStatus) -> Result<bool, StorageError> {
        match CachedStatus::try_from(status) {
            Ok(cached) => {
                self.storage.cache_put(url, cached).await?;
                Ok(true)
            }
            Err(_) => {
                debug!("Not caching {} result for {}", status, url);
                Ok(false)
            }
        }
    }
}
