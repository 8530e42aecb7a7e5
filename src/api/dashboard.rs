// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Read-only endpoints: health, scan history, per-user dashboard

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::api::errors::ApiError;
use crate::api::http_server::AppState;
use crate::auth::Session;
use crate::check::types::CacheEntry;
use crate::storage::{Batch, BatchResult, UserStats};

const HISTORY_LIMIT: usize = 20;
const BATCH_LIST_LIMIT: usize = 20;

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub results: Vec<CacheEntry>,
}

#[derive(Debug, Serialize)]
pub struct BatchesResponse {
    pub batches: Vec<Batch>,
}

#[derive(Debug, Serialize)]
pub struct BatchResultsResponse {
    pub batch: Batch,
    pub results: Vec<BatchResult>,
}

fn require_session(state: &AppState, headers: &HeaderMap) -> Result<Session, ApiError> {
    state
        .sessions
        .session_from_headers(headers)
        .ok_or_else(|| ApiError::Unauthorized("Unauthorized".to_string()))
}

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": crate::version::VERSION_NUMBER,
        "primaryApi": state.orchestrator.has_primary_api(),
    }))
}

/// GET /token - today's request token for the frontend
pub async fn token_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "token": state.guard.current_token() }))
}

/// GET /history - most recent scans across all users
pub async fn history_handler(State(state): State<AppState>) -> Json<HistoryResponse> {
    let results = match state.storage.recent_scans(HISTORY_LIMIT).await {
        Ok(results) => results,
        Err(e) => {
            warn!("History unavailable: {}", e);
            Vec::new()
        }
    };
    Json(HistoryResponse { results })
}

/// GET /dashboard/stats
pub async fn stats_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserStats>, ApiError> {
    let session = require_session(&state, &headers)?;
    Ok(Json(state.storage.user_stats(session.user_id).await?))
}

/// GET /dashboard/batches
pub async fn batches_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<BatchesResponse>, ApiError> {
    let session = require_session(&state, &headers)?;
    let batches = state
        .storage
        .user_batches(session.user_id, BATCH_LIST_LIMIT)
        .await?;
    Ok(Json(BatchesResponse { batches }))
}

/// GET /dashboard/batches/:id
///
/// Batches owned by another user are reported as missing.
pub async fn batch_results_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BatchResultsResponse>, ApiError> {
    let session = require_session(&state, &headers)?;
    let batch_id: i64 = id
        .parse()
        .map_err(|_| ApiError::InvalidRequest("Invalid Batch ID".to_string()))?;

    let batch = state
        .storage
        .batch_get_by_id(batch_id)
        .await?
        .filter(|b| b.user_id == session.user_id)
        .ok_or_else(|| ApiError::NotFound("Batch not found".to_string()))?;

    let results = state.storage.batch_results(batch.id).await?;
    Ok(Json(BatchResultsResponse { batch, results }))
}
