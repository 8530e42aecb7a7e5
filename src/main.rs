// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use indexy_checker::{
    api::{start_server, AppState},
    auth::{RequestGuard, SessionVerifier},
    bootstrap::{build_pipeline, open_storage},
    config::CheckerConfig,
};
use std::env;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    info!("Starting {}", indexy_checker::version::get_version_string());

    let config = CheckerConfig::from_env();
    config.validate()?;

    if config.uses_dev_secrets() {
        warn!("API_SECURITY_SECRET or JWT_SECRET not set, using development secrets");
    }

    let storage = open_storage(&config).await?;
    let pipeline = build_pipeline(&config, storage)?;

    let state = AppState {
        orchestrator: pipeline.orchestrator.clone(),
        storage: pipeline.storage.clone(),
        guard: RequestGuard::new(
            config.api_security_secret.clone(),
            config.allowed_origin.clone(),
        ),
        sessions: SessionVerifier::new(&config.jwt_secret),
    };

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutting down...");
    };

    let served = start_server(state, &config.bind_address(), shutdown).await;

    pipeline.shutdown().await;
    info!("Browser released");

    served
}
