// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Check endpoint handler

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::StreamExt;
use std::convert::Infallible;
use tracing::{info, warn};

use super::request::{CheckRequest, NO_URLS};
use crate::api::errors::ApiError;
use crate::api::http_server::AppState;
use crate::api::streaming::event_stream;
use crate::auth::client_ip;
use crate::check::orchestrator::RunOptions;
use crate::config::{GUEST_DAILY_LIMIT, USER_BATCH_LIMIT};

/// POST /check - Verify a batch of URLs, streaming progress
///
/// # Request
/// - `urls`: URLs to check (required)
/// - `economyMode`: skip the hosted API (default false)
///
/// # Response
/// `text/event-stream` of `meta`, `result` and `done` events.
///
/// # Errors
/// - 400 Bad Request: missing or empty `urls`
/// - 403 Forbidden: origin or request token rejected
/// - 429 Too Many Requests: guest daily limit reached
/// - 500 Internal Server Error: storage failure before streaming
pub async fn check_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CheckRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    if let Err(e) = state.guard.validate(&headers) {
        warn!("[Security] Blocked: {}", e);
        return Err(e.into());
    }

    let Json(request) = body.map_err(|e| {
        warn!("Rejected check body: {}", e);
        ApiError::InvalidRequest(NO_URLS.to_string())
    })?;
    request.validate().map_err(ApiError::InvalidRequest)?;

    let session = state.sessions.session_from_headers(&headers);
    let ip = client_ip(&headers);

    let limit = match &session {
        Some(_) => USER_BATCH_LIMIT,
        None => {
            let usage = state.storage.ip_usage_get(&ip).await?;
            if usage.count >= GUEST_DAILY_LIMIT {
                return Err(ApiError::RateLimitExceeded(format!(
                    "Daily limit reached ({} URLs/day for guests). Create account for unlimited access.",
                    GUEST_DAILY_LIMIT
                )));
            }
            (GUEST_DAILY_LIMIT - usage.count) as usize
        }
    };

    let urls = request.prepared_urls(limit);
    if urls.is_empty() {
        return Err(ApiError::InvalidRequest(NO_URLS.to_string()));
    }

    let batch_id = match &session {
        Some(s) => Some(state.storage.batch_create(s.user_id, urls.len()).await?.id),
        None => {
            // Charged on admission so a disconnect cannot dodge the quota
            if let Err(e) = state.storage.ip_usage_increment(&ip, urls.len() as u32).await {
                warn!("Failed to record guest usage for {}: {}", ip, e);
            }
            None
        }
    };

    info!(
        "[API] {} checking {} URLs{}",
        session
            .as_ref()
            .map(|s| format!("User #{}", s.user_id))
            .unwrap_or_else(|| "Guest".to_string()),
        urls.len(),
        if request.economy_mode { " (economy mode)" } else { "" }
    );

    let run = state.orchestrator.run(
        urls,
        RunOptions {
            economy_mode: request.economy_mode,
            batch_id,
        },
    );

    let events = event_stream(run).map(|event| Ok::<_, Infallible>(Event::default().data(event.to_json())));

    Ok(([("x-accel-buffering", "no")], Sse::new(events)).into_response())
}
