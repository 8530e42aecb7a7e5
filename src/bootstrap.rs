// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Wiring shared by the server and the CLI

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::browser::{
    AutomationChecker, AutomationEngine, AutomationSettings, BrowserManager, BrowserPoolConfig,
    ChromeBrowserPool,
};
use crate::check::orchestrator::{Backends, Orchestrator, OrchestratorSettings};
use crate::check::serper::SerperClient;
use crate::check::strategy::IndexChecker;
use crate::config::CheckerConfig;
use crate::storage::{SqliteStorage, Storage};

/// Everything needed to run checks
pub struct Pipeline {
    pub orchestrator: Arc<Orchestrator>,
    pub storage: Arc<dyn Storage>,
    pub browser: Arc<dyn BrowserManager>,
}

impl Pipeline {
    /// Release the shared browser
    pub async fn shutdown(&self) {
        self.browser.shutdown().await;
    }
}

/// Open the configured libsql database
pub async fn open_storage(config: &CheckerConfig) -> Result<Arc<dyn Storage>> {
    let storage = SqliteStorage::open(&config.database_path.to_string_lossy()).await?;
    info!("Opened database at {}", config.database_path.display());
    Ok(Arc::new(storage))
}

/// Build backends and orchestrator on top of `storage`
pub fn build_pipeline(config: &CheckerConfig, storage: Arc<dyn Storage>) -> Result<Pipeline> {
    let browser: Arc<dyn BrowserManager> = Arc::new(ChromeBrowserPool::new(BrowserPoolConfig {
        chrome_bin: config.chrome_bin.clone(),
        headless: config.browser_headless,
    }));

    let automation = Arc::new(AutomationEngine::new(
        browser.clone(),
        AutomationSettings {
            ambiguous_as_indexed: config.ambiguous_as_indexed,
            ..Default::default()
        },
    ));

    let primary_api: Option<Arc<dyn IndexChecker>> = match &config.serper_api_key {
        Some(key) => {
            let client = SerperClient::with_endpoint(key.clone(), config.serper_api_url.clone())?;
            info!("Serper API configured");
            Some(Arc::new(client))
        }
        None => {
            warn!("SERPER_API_KEY not set, using local browser only");
            None
        }
    };

    let backends = Backends {
        primary_api,
        automation_primary: Arc::new(AutomationChecker::primary(automation.clone())),
        automation_secondary: Arc::new(AutomationChecker::secondary(automation)),
    };

    let orchestrator = Arc::new(Orchestrator::new(
        storage.clone(),
        backends,
        OrchestratorSettings {
            freshness_hours: config.cache_freshness_hours,
            ..Default::default()
        },
    ));

    Ok(Pipeline {
        orchestrator,
        storage,
        browser,
    })
}
