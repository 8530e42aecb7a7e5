// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Serper.dev Google Search API client
//!
//! Primary backend. Serper runs the Google queries on its own infrastructure,
//! so it tolerates far more concurrency than the local browser.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, info};

use super::normalize::{containment_match, normalize};
use super::strategy::IndexChecker;
use super::types::{CheckError, CheckStatus, Engine};

pub const SERPER_API_URL: &str = "https://google.serper.dev/search";

/// Request-level timeout for a single API call
pub const SERPER_TIMEOUT: Duration = Duration::from_secs(15);

/// Organic results requested per query
pub const SERPER_NUM_RESULTS: u32 = 5;

/// Placeholder value shipped in sample env files
const PLACEHOLDER_KEY: &str = "your_serper_api_key_here";

/// Whether `key` is a usable credential
pub fn is_usable_key(key: Option<&str>) -> bool {
    matches!(key, Some(k) if !k.trim().is_empty() && k != PLACEHOLDER_KEY)
}

/// Serper API client
pub struct SerperClient {
    api_key: String,
    endpoint: String,
    client: Client,
}

impl SerperClient {
    /// Create a client against the public endpoint
    pub fn new(api_key: String) -> Result<Self, CheckError> {
        Self::with_endpoint(api_key, SERPER_API_URL.to_string())
    }

    /// Create a client against a custom endpoint
    pub fn with_endpoint(api_key: String, endpoint: String) -> Result<Self, CheckError> {
        if !is_usable_key(Some(&api_key)) {
            return Err(CheckError::NoApiKey {
                provider: "serper".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(SERPER_TIMEOUT)
            .build()
            .map_err(|e| CheckError::ApiError {
                status: 0,
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            api_key,
            endpoint,
            client,
        })
    }

    /// Check a URL against Google's index through Serper.
    ///
    /// 402/429 become [`CheckError::QuotaExhausted`]; any other non-2xx is
    /// reported as `CheckStatus::Error`.
    pub async fn check_via_primary(&self, url: &str) -> Result<CheckStatus, CheckError> {
        let site_query = normalize(url);

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&json!({
                "q": format!("site:{}", site_query),
                "num": SERPER_NUM_RESULTS,
                "gl": "us",
                "hl": "en",
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CheckError::Timeout {
                        timeout_ms: SERPER_TIMEOUT.as_millis() as u64,
                    }
                } else {
                    CheckError::ApiError {
                        status: 0,
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();

        if status == 402 || status == 429 {
            return Err(CheckError::QuotaExhausted {
                status: status.as_u16(),
            });
        }

        if !status.is_success() {
            error!("[Serper] HTTP {} for site:{}", status.as_u16(), site_query);
            return Ok(CheckStatus::Error);
        }

        let data: SerperResponse = response.json().await.map_err(|e| CheckError::ApiError {
            status: status.as_u16(),
            message: format!("JSON parse error: {}", e),
        })?;

        let verdict = interpret_organic(&site_query, &data.organic);
        info!("[Serper] {}: site:{}", verdict, site_query);
        Ok(verdict)
    }
}

/// Decide a status from organic results for an already-normalized target
pub fn interpret_organic(normalized_target: &str, organic: &[OrganicResult]) -> CheckStatus {
    if organic.is_empty() {
        return CheckStatus::NotIndexed;
    }

    let matched = organic
        .iter()
        .any(|r| containment_match(normalized_target, &r.link));

    if !matched {
        debug!(
            "[Serper] {} organic results, none under {}",
            organic.len(),
            normalized_target
        );
    }

    if matched {
        CheckStatus::Indexed
    } else {
        CheckStatus::NotIndexed
    }
}

#[async_trait]
impl IndexChecker for SerperClient {
    async fn check(&self, url: &str) -> Result<CheckStatus, CheckError> {
        self.check_via_primary(url).await
    }

    fn engine(&self) -> Engine {
        Engine::PrimaryApi
    }
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

/// One organic result returned by Serper
#[derive(Debug, Clone, Deserialize)]
pub struct OrganicResult {
    pub link: String,
}
