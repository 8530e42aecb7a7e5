// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod check;
pub mod dashboard;
pub mod errors;
pub mod http_server;
pub mod streaming;

pub use check::{check_handler, CheckRequest};
pub use errors::{ApiError, ErrorResponse};
pub use http_server::{router, start_server, AppState};
pub use streaming::{event_stream, StreamEvent};
