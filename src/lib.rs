// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod browser;
pub mod check;
pub mod cli;
pub mod config;
pub mod storage;
pub mod version;

// Re-export main types
pub use api::{router, AppState};
pub use check::{CheckOutcome, CheckStatus, Engine, Orchestrator};
pub use config::CheckerConfig;
pub use storage::{MemoryStorage, SqliteStorage, Storage};
