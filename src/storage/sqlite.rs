// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! libsql-backed storage

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, Database, Row};
use tracing::debug;

use super::{
    is_fresh, usage_day, Batch, BatchResult, IpUsage, Result, Storage, StorageError, UserStats,
};
use crate::check::types::{CacheEntry, CachedStatus};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS scans (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT NOT NULL,
        status TEXT NOT NULL,
        checked_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_scans_url ON scans(url, id)",
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT UNIQUE NOT NULL,
        password_hash TEXT NOT NULL,
        name TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'user',
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS batches (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        total_urls INTEGER NOT NULL DEFAULT 0,
        indexed_count INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        FOREIGN KEY (user_id) REFERENCES users(id)
    )",
    "CREATE TABLE IF NOT EXISTS batch_results (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        batch_id INTEGER NOT NULL,
        url TEXT NOT NULL,
        status TEXT NOT NULL,
        checked_at TEXT NOT NULL,
        FOREIGN KEY (batch_id) REFERENCES batches(id)
    )",
    "CREATE TABLE IF NOT EXISTS rate_limits (
        ip TEXT PRIMARY KEY,
        count INTEGER NOT NULL DEFAULT 0,
        last_reset TEXT NOT NULL
    )",
];

const BUSY_TIMEOUT_PRAGMA: &str = "PRAGMA busy_timeout = 5000";

fn map_err(e: libsql::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidData(format!("bad timestamp {}: {}", raw, e)))
}

fn parse_status(raw: &str) -> Result<CachedStatus> {
    raw.parse().map_err(StorageError::InvalidData)
}

fn row_to_entry(row: &Row) -> Result<CacheEntry> {
    let url: String = row.get(0).map_err(map_err)?;
    let status: String = row.get(1).map_err(map_err)?;
    let checked_at: String = row.get(2).map_err(map_err)?;
    Ok(CacheEntry {
        url,
        status: parse_status(&status)?,
        checked_at: parse_time(&checked_at)?,
    })
}

fn row_to_batch(row: &Row) -> Result<Batch> {
    let created_at: String = row.get(4).map_err(map_err)?;
    Ok(Batch {
        id: row.get(0).map_err(map_err)?,
        user_id: row.get(1).map_err(map_err)?,
        total_urls: row.get(2).map_err(map_err)?,
        indexed_count: row.get(3).map_err(map_err)?,
        created_at: parse_time(&created_at)?,
    })
}

fn row_to_batch_result(row: &Row) -> Result<BatchResult> {
    let status: String = row.get(3).map_err(map_err)?;
    let checked_at: String = row.get(4).map_err(map_err)?;
    Ok(BatchResult {
        id: row.get(0).map_err(map_err)?,
        batch_id: row.get(1).map_err(map_err)?,
        url: row.get(2).map_err(map_err)?,
        status: parse_status(&status)?,
        checked_at: parse_time(&checked_at)?,
    })
}

/// Storage on a local libsql (SQLite) database file
pub struct SqliteStorage {
    db: Database,
}

impl SqliteStorage {
    /// Open (or create) the database at `path` and ensure the schema exists
    pub async fn open(path: &str) -> Result<Self> {
        let db = Builder::new_local(path).build().await.map_err(map_err)?;
        let storage = Self { db };
        storage.init_tables().await?;
        debug!("Opened libsql storage at {}", path);
        Ok(storage)
    }

    /// New connection that waits on locks held by concurrent writers
    async fn conn(&self) -> Result<Connection> {
        let conn = self.db.connect().map_err(map_err)?;
        conn.query(BUSY_TIMEOUT_PRAGMA, ()).await.map_err(map_err)?;
        Ok(conn)
    }

    async fn init_tables(&self) -> Result<()> {
        let conn = self.conn().await?;
        for statement in SCHEMA {
            conn.execute(statement, ()).await.map_err(map_err)?;
        }
        Ok(())
    }

    async fn batch_by_id(conn: &Connection, batch_id: i64) -> Result<Option<Batch>> {
        let mut rows = conn
            .query(
                "SELECT id, user_id, total_urls, indexed_count, created_at
                 FROM batches WHERE id = ?1",
                libsql::params![batch_id],
            )
            .await
            .map_err(map_err)?;

        match rows.next().await.map_err(map_err)? {
            Some(row) => Ok(Some(row_to_batch(&row)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn cache_get(&self, url: &str, max_age_hours: u64) -> Result<Option<CacheEntry>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT url, status, checked_at FROM scans
                 WHERE url = ?1 ORDER BY id DESC LIMIT 1",
                libsql::params![url],
            )
            .await
            .map_err(map_err)?;

        let Some(row) = rows.next().await.map_err(map_err)? else {
            return Ok(None);
        };

        let entry = row_to_entry(&row)?;
        if is_fresh(entry.checked_at, Utc::now(), max_age_hours) {
            Ok(Some(entry))
        } else {
            Ok(None)
        }
    }

    async fn cache_put(&self, url: &str, status: CachedStatus) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO scans (url, status, checked_at) VALUES (?1, ?2, ?3)",
            libsql::params![url, status.as_str(), Utc::now().to_rfc3339()],
        )
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn recent_scans(&self, limit: usize) -> Result<Vec<CacheEntry>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT url, status, checked_at FROM scans ORDER BY id DESC LIMIT ?1",
                libsql::params![limit as i64],
            )
            .await
            .map_err(map_err)?;

        let mut scans = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_err)? {
            scans.push(row_to_entry(&row)?);
        }
        Ok(scans)
    }

    async fn batch_create(&self, user_id: i64, total_urls: usize) -> Result<Batch> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO batches (user_id, total_urls, indexed_count, created_at)
             VALUES (?1, ?2, 0, ?3)",
            libsql::params![user_id, total_urls as i64, Utc::now().to_rfc3339()],
        )
        .await
        .map_err(map_err)?;

        let id = conn.last_insert_rowid();
        Self::batch_by_id(&conn, id)
            .await?
            .ok_or_else(|| StorageError::Database(format!("batch {} vanished after insert", id)))
    }

    async fn batch_get_by_id(&self, batch_id: i64) -> Result<Option<Batch>> {
        let conn = self.conn().await?;
        Self::batch_by_id(&conn, batch_id).await
    }

    async fn batch_append_result(
        &self,
        batch_id: i64,
        url: &str,
        status: CachedStatus,
    ) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO batch_results (batch_id, url, status, checked_at)
             VALUES (?1, ?2, ?3, ?4)",
            libsql::params![batch_id, url, status.as_str(), Utc::now().to_rfc3339()],
        )
        .await
        .map_err(map_err)?;

        if status == CachedStatus::Indexed {
            // Single-statement increment keeps concurrent appends safe
            conn.execute(
                "UPDATE batches SET indexed_count = indexed_count + 1 WHERE id = ?1",
                libsql::params![batch_id],
            )
            .await
            .map_err(map_err)?;
        }
        Ok(())
    }

    async fn batch_results(&self, batch_id: i64) -> Result<Vec<BatchResult>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, batch_id, url, status, checked_at FROM batch_results
                 WHERE batch_id = ?1 ORDER BY id ASC",
                libsql::params![batch_id],
            )
            .await
            .map_err(map_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_err)? {
            results.push(row_to_batch_result(&row)?);
        }
        Ok(results)
    }

    async fn user_batches(&self, user_id: i64, limit: usize) -> Result<Vec<Batch>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, user_id, total_urls, indexed_count, created_at FROM batches
                 WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
                libsql::params![user_id, limit as i64],
            )
            .await
            .map_err(map_err)?;

        let mut batches = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_err)? {
            batches.push(row_to_batch(&row)?);
        }
        Ok(batches)
    }

    async fn user_stats(&self, user_id: i64) -> Result<UserStats> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT COALESCE(SUM(total_urls), 0), COALESCE(SUM(indexed_count), 0)
                 FROM batches WHERE user_id = ?1",
                libsql::params![user_id],
            )
            .await
            .map_err(map_err)?;

        let (total_checked, total_indexed) = match rows.next().await.map_err(map_err)? {
            Some(row) => (
                row.get::<i64>(0).map_err(map_err)?,
                row.get::<i64>(1).map_err(map_err)?,
            ),
            None => (0, 0),
        };

        let last = self.user_batches(user_id, 1).await?;
        Ok(UserStats::from_totals(total_checked, total_indexed, last.first()))
    }

    async fn ip_usage_get(&self, ip: &str) -> Result<IpUsage> {
        let conn = self.conn().await?;
        let today = usage_day(Utc::now());

        let mut rows = conn
            .query(
                "SELECT count, last_reset FROM rate_limits WHERE ip = ?1",
                libsql::params![ip],
            )
            .await
            .map_err(map_err)?;

        if let Some(row) = rows.next().await.map_err(map_err)? {
            let count: i64 = row.get(0).map_err(map_err)?;
            let last_reset: String = row.get(1).map_err(map_err)?;
            if last_reset == today {
                return Ok(IpUsage {
                    count: u32::try_from(count).unwrap_or(u32::MAX),
                });
            }
        }

        conn.execute(
            "INSERT OR REPLACE INTO rate_limits (ip, count, last_reset) VALUES (?1, 0, ?2)",
            libsql::params![ip, today],
        )
        .await
        .map_err(map_err)?;
        Ok(IpUsage { count: 0 })
    }

    async fn ip_usage_increment(&self, ip: &str, amount: u32) -> Result<()> {
        let conn = self.conn().await?;
        let today = usage_day(Utc::now());
        conn.execute(
            "INSERT INTO rate_limits (ip, count, last_reset) VALUES (?1, ?2, ?3)
             ON CONFLICT(ip) DO UPDATE SET
                count = CASE WHEN last_reset = excluded.last_reset
                             THEN count + excluded.count ELSE excluded.count END,
                last_reset = excluded.last_reset",
            libsql::params![ip, amount as i64, today],
        )
        .await
        .map_err(map_err)?;
        Ok(())
    }
}
