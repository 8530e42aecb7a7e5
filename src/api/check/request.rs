// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Check request types

use serde::{Deserialize, Serialize};

pub const NO_URLS: &str = "No URLs provided";

/// Request body for POST /check
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    #[serde(default)]
    pub urls: Vec<String>,

    /// Skip the hosted API even if it is configured
    #[serde(default)]
    pub economy_mode: bool,
}

impl CheckRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.urls.is_empty() {
            return Err(NO_URLS.to_string());
        }
        Ok(())
    }

    /// Trimmed, non-empty URLs, truncated to `limit`
    pub fn prepared_urls(&self, limit: usize) -> Vec<String> {
        self.urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .take(limit)
            .map(str::to_string)
            .collect()
    }
}
