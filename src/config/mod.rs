// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Environment-driven configuration

use std::env;
use std::path::PathBuf;
use thiserror::Error;

use crate::check::cache::DEFAULT_FRESHNESS_HOURS;
use crate::check::serper::{is_usable_key, SERPER_API_URL};

/// URLs a guest may check per day
pub const GUEST_DAILY_LIMIT: u32 = 30;

/// URLs per request for signed-in users
pub const USER_BATCH_LIMIT: usize = 500;

const DEV_SECRET: &str = "indexy-dev-secret-change-me";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Serper credential; `None` when unset or a placeholder
    pub serper_api_key: Option<String>,
    pub serper_api_url: String,
    pub database_path: PathBuf,
    pub api_host: String,
    pub api_port: u16,
    /// Secret behind the daily request token
    pub api_security_secret: String,
    /// HS256 secret for session cookies
    pub jwt_secret: String,
    pub allowed_origin: Option<String>,
    pub chrome_bin: Option<PathBuf>,
    pub browser_headless: bool,
    pub cache_freshness_hours: u64,
    pub ambiguous_as_indexed: bool,
}

impl CheckerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            serper_api_key: env::var("SERPER_API_KEY")
                .ok()
                .filter(|k| is_usable_key(Some(k))),
            serper_api_url: env::var("SERPER_API_URL").unwrap_or(defaults.serper_api_url),
            database_path: env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            api_host: env::var("API_HOST").unwrap_or(defaults.api_host),
            api_port: env::var("API_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.api_port),
            api_security_secret: env::var("API_SECURITY_SECRET")
                .unwrap_or(defaults.api_security_secret),
            jwt_secret: env::var("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            allowed_origin: env::var("ALLOWED_ORIGIN")
                .ok()
                .filter(|o| !o.trim().is_empty()),
            chrome_bin: env::var("CHROME_BIN").ok().map(PathBuf::from),
            browser_headless: env::var("BROWSER_HEADLESS")
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(true),
            cache_freshness_hours: env::var("CACHE_FRESHNESS_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cache_freshness_hours),
            ambiguous_as_indexed: env::var("AMBIGUOUS_AS_INDEXED")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_security_secret.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "API_SECURITY_SECRET",
                reason: "must not be empty".to_string(),
            });
        }
        if self.jwt_secret.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "JWT_SECRET",
                reason: "must not be empty".to_string(),
            });
        }
        if url::Url::parse(&self.serper_api_url).is_err() {
            return Err(ConfigError::InvalidValue {
                name: "SERPER_API_URL",
                reason: format!("not a URL: {}", self.serper_api_url),
            });
        }
        Ok(())
    }

    pub fn has_primary_api(&self) -> bool {
        self.serper_api_key.is_some()
    }

    /// Whether either secret still has the built-in development value
    pub fn uses_dev_secrets(&self) -> bool {
        self.api_security_secret == DEV_SECRET || self.jwt_secret == DEV_SECRET
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            serper_api_key: None,
            serper_api_url: SERPER_API_URL.to_string(),
            database_path: PathBuf::from("indexy.db"),
            api_host: "0.0.0.0".to_string(),
            api_port: 8080,
            api_security_secret: DEV_SECRET.to_string(),
            jwt_secret: DEV_SECRET.to_string(),
            allowed_origin: None,
            chrome_bin: None,
            browser_headless: true,
            cache_freshness_hours: DEFAULT_FRESHNESS_HOURS,
            ambiguous_as_indexed: false,
        }
    }
}
