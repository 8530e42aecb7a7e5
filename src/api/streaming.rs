// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Progress stream for a running batch
//!
//! `meta` first, one `result` per URL in completion order, then `done` once
//! the orchestrator has closed its channel.

use chrono::SecondsFormat;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;

use crate::check::orchestrator::{BatchRun, Progress};
use crate::check::types::{CheckStatus, Engine};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Meta {
        total: usize,
    },
    Result {
        url: String,
        status: CheckStatus,
        engine: Engine,
        checked_at: String,
        completed: usize,
        total: usize,
    },
    Done {
        total: usize,
    },
}

impl From<Progress> for StreamEvent {
    fn from(progress: Progress) -> Self {
        StreamEvent::Result {
            url: progress.outcome.url,
            status: progress.outcome.status,
            engine: progress.outcome.engine,
            checked_at: progress
                .outcome
                .checked_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            completed: progress.completed,
            total: progress.total,
        }
    }
}

impl StreamEvent {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Wrap a batch in the full event sequence
pub fn event_stream(run: BatchRun) -> impl Stream<Item = StreamEvent> + Send + 'static {
    let total = run.total;
    let results = ReceiverStream::new(run.receiver).map(StreamEvent::from);

    stream::once(async move { StreamEvent::Meta { total } })
        .chain(results)
        .chain(stream::once(async move { StreamEvent::Done { total } }))
}
