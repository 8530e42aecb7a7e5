// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Core types for index verification

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Verification status for a single URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    /// The search engine returned the URL (or a path under it)
    Indexed,
    /// The search engine returned nothing for the URL
    NotIndexed,
    /// No backend could produce an answer
    Error,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Indexed => "INDEXED",
            CheckStatus::NotIndexed => "NOT_INDEXED",
            CheckStatus::Error => "ERROR",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CheckStatus::Error)
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INDEXED" => Ok(CheckStatus::Indexed),
            "NOT_INDEXED" => Ok(CheckStatus::NotIndexed),
            "ERROR" => Ok(CheckStatus::Error),
            other => Err(format!("unknown check status: {}", other)),
        }
    }
}

/// The subset of statuses that may be cached or written to a batch.
///
/// ERROR has no representation here, so the cache can never hold it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CachedStatus {
    Indexed,
    NotIndexed,
}

impl CachedStatus {
    pub fn as_str(&self) -> &'static str {
        CheckStatus::from(*self).as_str()
    }
}

impl From<CachedStatus> for CheckStatus {
    fn from(status: CachedStatus) -> Self {
        match status {
            CachedStatus::Indexed => CheckStatus::Indexed,
            CachedStatus::NotIndexed => CheckStatus::NotIndexed,
        }
    }
}

impl TryFrom<CheckStatus> for CachedStatus {
    type Error = CheckStatus;

    fn try_from(status: CheckStatus) -> Result<Self, Self::Error> {
        match status {
            CheckStatus::Indexed => Ok(CachedStatus::Indexed),
            CheckStatus::NotIndexed => Ok(CachedStatus::NotIndexed),
            CheckStatus::Error => Err(status),
        }
    }
}

impl FromStr for CachedStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status: CheckStatus = s.parse()?;
        CachedStatus::try_from(status).map_err(|s| format!("status {} cannot be cached", s))
    }
}

impl fmt::Display for CachedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend that produced an outcome, in fallback order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Engine {
    #[serde(rename = "Cache")]
    Cache,
    #[serde(rename = "Serper API")]
    PrimaryApi,
    #[serde(rename = "Google (Local)")]
    AutomationPrimary,
    #[serde(rename = "Bing (Backup)")]
    AutomationSecondary,
}

impl Engine {
    /// Display label used on the wire
    pub fn label(&self) -> &'static str {
        match self {
            Engine::Cache => "Cache",
            Engine::PrimaryApi => "Serper API",
            Engine::AutomationPrimary => "Google (Local)",
            Engine::AutomationSecondary => "Bing (Backup)",
        }
    }

    /// Whether this engine performs a live lookup
    pub fn is_live(&self) -> bool {
        !matches!(self, Engine::Cache)
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of verifying one URL. One per URL occurrence per batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub url: String,
    pub status: CheckStatus,
    pub engine: Engine,
    pub checked_at: DateTime<Utc>,
}

impl CheckOutcome {
    pub fn new(url: impl Into<String>, status: CheckStatus, engine: Engine) -> Self {
        Self {
            url: url.into(),
            status,
            engine,
            checked_at: Utc::now(),
        }
    }
}

/// Most recent cached observation for a URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    pub status: CachedStatus,
    pub checked_at: DateTime<Utc>,
}

/// Errors raised by the live backends
#[derive(Debug, Error)]
pub enum CheckError {
    /// Primary API credits or rate limit exhausted (HTTP 402/429)
    #[error("Primary API quota exhausted (HTTP {status})")]
    QuotaExhausted { status: u16 },

    /// Transport or decoding failure talking to the primary API
    #[error("Primary API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// No API credential configured
    #[error("No API key configured for {provider}")]
    NoApiKey { provider: String },

    /// Call exceeded its time budget
    #[error("Timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Browser automation failure
    #[error("Browser error: {0}")]
    Browser(String),

    /// The engine served a bot-mitigation page instead of results
    #[error("Defense challenge detected on {engine}")]
    DefenseDetected { engine: String },
}

impl CheckError {
    /// Quota errors must move on to the next backend rather than retry
    pub fn is_quota(&self) -> bool {
        matches!(self, CheckError::QuotaExhausted { .. })
    }
}
