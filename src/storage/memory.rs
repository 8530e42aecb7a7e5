// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! In-memory storage with failure injection

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{
    is_fresh, usage_day, Batch, BatchResult, IpUsage, Result, Storage, StorageError, UserStats,
};
use crate::check::types::{CacheEntry, CachedStatus};

#[derive(Default)]
struct Tables {
    scans: Vec<CacheEntry>,
    batches: Vec<Batch>,
    batch_results: Vec<BatchResult>,
    rate_limits: HashMap<String, (u32, String)>,
}

/// Process-local [`Storage`] used by tests and the CLI's `--no-db` mode
#[derive(Default)]
pub struct MemoryStorage {
    tables: Mutex<Tables>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read return [`StorageError::Unavailable`]
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write return [`StorageError::Unavailable`]
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Insert a scan with an explicit timestamp
    pub fn insert_scan_at(&self, url: &str, status: CachedStatus, checked_at: DateTime<Utc>) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.scans.push(CacheEntry {
                url: url.to_string(),
                status,
                checked_at,
            });
        }
    }

    /// Seed today's usage for a guest IP
    pub fn set_ip_usage(&self, ip: &str, count: u32) {
        if let Ok(mut tables) = self.tables.lock() {
            tables
                .rate_limits
                .insert(ip.to_string(), (count, usage_day(Utc::now())));
        }
    }

    /// Number of scans recorded for a URL
    pub fn scan_count(&self, url: &str) -> usize {
        self.tables
            .lock()
            .map(|t| t.scans.iter().filter(|s| s.url == url).count())
            .unwrap_or(0)
    }

    fn read(&self) -> Result<std::sync::MutexGuard<'_, Tables>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected read failure".to_string()));
        }
        self.lock()
    }

    fn write(&self) -> Result<std::sync::MutexGuard<'_, Tables>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected write failure".to_string()));
        }
        self.lock()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StorageError::Database("memory storage lock poisoned".to_string()))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn cache_get(&self, url: &str, max_age_hours: u64) -> Result<Option<CacheEntry>> {
        let tables = self.read()?;
        let latest = tables.scans.iter().rev().find(|s| s.url == url);
        Ok(latest
            .filter(|s| is_fresh(s.checked_at, Utc::now(), max_age_hours))
            .cloned())
    }

    async fn cache_put(&self, url: &str, status: CachedStatus) -> Result<()> {
        let mut tables = self.write()?;
        tables.scans.push(CacheEntry {
            url: url.to_string(),
            status,
            checked_at: Utc::now(),
        });
        Ok(())
    }

    async fn recent_scans(&self, limit: usize) -> Result<Vec<CacheEntry>> {
        let tables = self.read()?;
        Ok(tables.scans.iter().rev().take(limit).cloned().collect())
    }

    async fn batch_create(&self, user_id: i64, total_urls: usize) -> Result<Batch> {
        let mut tables = self.write()?;
        let batch = Batch {
            id: tables.batches.len() as i64 + 1,
            user_id,
            total_urls: total_urls as i64,
            indexed_count: 0,
            created_at: Utc::now(),
        };
        tables.batches.push(batch.clone());
        Ok(batch)
    }

    async fn batch_get_by_id(&self, batch_id: i64) -> Result<Option<Batch>> {
        let tables = self.read()?;
        Ok(tables.batches.iter().find(|b| b.id == batch_id).cloned())
    }

    async fn batch_append_result(
        &self,
        batch_id: i64,
        url: &str,
        status: CachedStatus,
    ) -> Result<()> {
        let mut tables = self.write()?;
        let id = tables.batch_results.len() as i64 + 1;
        tables.batch_results.push(BatchResult {
            id,
            batch_id,
            url: url.to_string(),
            status,
            checked_at: Utc::now(),
        });
        if status == CachedStatus::Indexed {
            if let Some(batch) = tables.batches.iter_mut().find(|b| b.id == batch_id) {
                batch.indexed_count += 1;
            }
        }
        Ok(())
    }

    async fn batch_results(&self, batch_id: i64) -> Result<Vec<BatchResult>> {
        let tables = self.read()?;
        Ok(tables
            .batch_results
            .iter()
            .filter(|r| r.batch_id == batch_id)
            .cloned()
            .collect())
    }

    async fn user_batches(&self, user_id: i64, limit: usize) -> Result<Vec<Batch>> {
        let tables = self.read()?;
        Ok(tables
            .batches
            .iter()
            .rev()
            .filter(|b| b.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn user_stats(&self, user_id: i64) -> Result<UserStats> {
        let tables = self.read()?;
        let owned: Vec<&Batch> = tables.batches.iter().filter(|b| b.user_id == user_id).collect();
        let total_checked = owned.iter().map(|b| b.total_urls).sum();
        let total_indexed = owned.iter().map(|b| b.indexed_count).sum();
        Ok(UserStats::from_totals(
            total_checked,
            total_indexed,
            owned.last().copied(),
        ))
    }

    async fn ip_usage_get(&self, ip: &str) -> Result<IpUsage> {
        let mut tables = self.read()?;
        let today = usage_day(Utc::now());
        let entry = tables
            .rate_limits
            .entry(ip.to_string())
            .or_insert((0, today.clone()));
        if entry.1 != today {
            *entry = (0, today);
        }
        Ok(IpUsage { count: entry.0 })
    }

    async fn ip_usage_increment(&self, ip: &str, amount: u32) -> Result<()> {
        let mut tables = self.write()?;
        let today = usage_day(Utc::now());
        let entry = tables
            .rate_limits
            .entry(ip.to_string())
            .or_insert((0, today.clone()));
        if entry.1 != today {
            *entry = (0, today);
        }
        entry.0 = entry.0.saturating_add(amount);
        Ok(())
    }
}
