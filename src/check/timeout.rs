// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Hard time budgets that do not cancel the underlying work

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Run `fut` on its own task and wait at most `limit` for it.
///
/// On timeout the caller gets `on_timeout` immediately while the spawned
/// task keeps running to completion, so its cleanup (closing a browser
/// context, say) still happens. A panicking task also yields `on_timeout`.
pub async fn race_detached<F, T>(fut: F, limit: Duration, on_timeout: T) -> T
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(fut);

    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(value)) => value,
        Ok(Err(join_error)) => {
            warn!("Detached check task failed: {}", join_error);
            on_timeout
        }
        Err(_) => {
            warn!("Check exceeded {}ms budget", limit.as_millis());
            on_timeout
        }
    }
}
