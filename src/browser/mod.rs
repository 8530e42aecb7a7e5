// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Local browser automation backend
//!
//! Used when the hosted API is unavailable, out of credits, or skipped in
//! economy mode. Google is tried first, Bing second.

pub mod engine;
pub mod pool;
pub mod signals;
pub mod stealth;

pub use engine::{
    AutomationChecker, AutomationEngine, AutomationResult, AutomationSettings, EngineTarget,
    SearchEngineProfile, BING, GOOGLE,
};
pub use pool::{BrowserManager, BrowserPoolConfig, BrowsingContext, ChromeBrowserPool};
pub use signals::{MarkupClassifier, PageClassifier, PageSignal, PageSnapshot};
pub use stealth::{ContextProfile, Viewport};
