// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::check::check_handler;
use super::dashboard::{
    batch_results_handler, batches_handler, health_handler, history_handler, stats_handler,
    token_handler,
};
use crate::auth::{RequestGuard, SessionVerifier};
use crate::check::orchestrator::Orchestrator;
use crate::storage::Storage;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub storage: Arc<dyn Storage>,
    pub guard: RequestGuard,
    pub sessions: SessionVerifier,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_handler))
        // Daily request token
        .route("/token", get(token_handler))
        // Index check (SSE)
        .route("/check", post(check_handler))
        // Scan history
        .route("/history", get(history_handler))
        // Dashboard
        .route("/dashboard/stats", get(stats_handler))
        .route("/dashboard/batches", get(batches_handler))
        .route("/dashboard/batches/:id", get(batch_results_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn start_server(
    state: AppState,
    addr: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("API server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
