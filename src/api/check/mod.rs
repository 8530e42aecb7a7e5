// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Index check endpoint
//!
//! `POST /check` streams one event per URL over SSE.

pub mod handler;
pub mod request;

pub use handler::check_handler;
pub use request::CheckRequest;
