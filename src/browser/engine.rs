// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Browser automation against public search result pages
//!
//! Per check: open a fresh context, navigate to the `site:` query, move the
//! pointer around, wait for results or a challenge, dwell, then classify the
//! page. The context is closed on every exit path, and a defense challenge
//! resets the shared browser.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

use super::pool::{BrowserManager, BrowsingContext};
use super::signals::{MarkupClassifier, PageClassifier, PageSignal};
use super::stealth::{pause, pointer_path, ContextProfile};
use crate::check::normalize::normalize;
use crate::check::strategy::IndexChecker;
use crate::check::timeout::race_detached;
use crate::check::types::{CheckError, CheckStatus, Engine};

pub const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);
pub const DOM_WAIT_TIMEOUT: Duration = Duration::from_secs(15);
pub const HARD_TIMEOUT: Duration = Duration::from_secs(45);

/// Error text reported when a challenge page was served
pub const DEFENSE_DETECTED: &str = "defense-detected";

/// Where and how to query one search engine
#[derive(Debug)]
pub struct SearchEngineProfile {
    pub engine: Engine,
    pub name: &'static str,
    pub search_base: &'static str,
    pub extra_params: &'static [(&'static str, &'static str)],
    /// Results region or challenge marker, whichever shows first
    pub wait_selectors: &'static str,
    pub results_selector: &'static str,
    pub stats_selector: Option<&'static str>,
    pub challenge_selector: Option<&'static str>,
    /// Dwell range in ms before reading the page
    pub dwell_ms: (u64, u64),
}

pub static GOOGLE: SearchEngineProfile = SearchEngineProfile {
    engine: Engine::AutomationPrimary,
    name: "Google",
    search_base: "https://www.google.com/search",
    extra_params: &[("hl", "en"), ("gl", "us"), ("num", "5")],
    wait_selectors: "#search, #topstuff, #main, #rcnt, #captcha-form",
    results_selector: "#search",
    stats_selector: Some("#result-stats, #resultStats"),
    challenge_selector: Some("#captcha-form"),
    dwell_ms: (300, 1200),
};

pub static BING: SearchEngineProfile = SearchEngineProfile {
    engine: Engine::AutomationSecondary,
    name: "Bing",
    search_base: "https://www.bing.com/search",
    extra_params: &[],
    wait_selectors: "#b_results, #b_content, #b_captcha",
    results_selector: "#b_results",
    stats_selector: None,
    challenge_selector: Some("#b_captcha"),
    dwell_ms: (1000, 1500),
};

impl SearchEngineProfile {
    /// Result page URL for the `site:` query of `raw_url`
    pub fn search_url(&self, raw_url: &str) -> String {
        let query = format!("site:{}", normalize(raw_url));
        let params = std::iter::once(("q", query.as_str())).chain(self.extra_params.iter().copied());

        match Url::parse_with_params(self.search_base, params) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}?q={}", self.search_base, query),
        }
    }

    /// Page evaluation script producing a `PageSnapshot`
    pub fn snapshot_script(&self) -> String {
        let stats = self
            .stats_selector
            .map(|s| format!("document.querySelector('{}')", s))
            .unwrap_or_else(|| "null".to_string());
        let challenge = self
            .challenge_selector
            .map(|s| format!("document.querySelector('{}') !== null", s))
            .unwrap_or_else(|| "false".to_string());

        format!(
            r#"
            (() => {{
                const results = document.querySelector('{results}');
                const stats = {stats};
                return {{
                    bodyText: document.body ? (document.body.innerText || '') : '',
                    statsText: stats ? (stats.innerText || '') : null,
                    resultsPresent: results !== null,
                    resultLinks: results
                        ? Array.from(results.querySelectorAll('a[href]')).map(a => a.href || '')
                        : [],
                    challengeMarker: {challenge},
                }};
            }})()
            "#,
            results = self.results_selector,
            stats = stats,
            challenge = challenge,
        )
    }
}

/// Outcome of a single automation check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomationResult {
    pub url: String,
    pub status: CheckStatus,
    pub error: Option<String>,
}

impl AutomationResult {
    fn ok(url: &str, status: CheckStatus) -> Self {
        Self {
            url: url.to_string(),
            status,
            error: None,
        }
    }

    fn error(url: &str, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            status: CheckStatus::Error,
            error: Some(error.into()),
        }
    }
}

/// A search engine profile paired with its page classifier
#[derive(Clone)]
pub struct EngineTarget {
    pub profile: &'static SearchEngineProfile,
    pub classifier: Arc<dyn PageClassifier>,
}

impl EngineTarget {
    pub fn google() -> Self {
        Self {
            profile: &GOOGLE,
            classifier: Arc::new(MarkupClassifier::google()),
        }
    }

    pub fn bing() -> Self {
        Self {
            profile: &BING,
            classifier: Arc::new(MarkupClassifier::bing()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AutomationSettings {
    pub navigation_timeout: Duration,
    pub dom_wait: Duration,
    pub hard_timeout: Duration,
    /// Report ambiguous pages as INDEXED instead of NOT_INDEXED
    pub ambiguous_as_indexed: bool,
    /// Apply pointer and dwell jitter
    pub behavioural_jitter: bool,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            navigation_timeout: NAVIGATION_TIMEOUT,
            dom_wait: DOM_WAIT_TIMEOUT,
            hard_timeout: HARD_TIMEOUT,
            ambiguous_as_indexed: false,
            behavioural_jitter: true,
        }
    }
}

pub struct AutomationEngine {
    manager: Arc<dyn BrowserManager>,
    primary: EngineTarget,
    secondary: EngineTarget,
    settings: AutomationSettings,
}

impl AutomationEngine {
    /// Google as primary target, Bing as secondary
    pub fn new(manager: Arc<dyn BrowserManager>, settings: AutomationSettings) -> Self {
        Self::with_targets(manager, EngineTarget::google(), EngineTarget::bing(), settings)
    }

    pub fn with_targets(
        manager: Arc<dyn BrowserManager>,
        primary: EngineTarget,
        secondary: EngineTarget,
        settings: AutomationSettings,
    ) -> Self {
        Self {
            manager,
            primary,
            secondary,
            settings,
        }
    }

    pub fn manager(&self) -> &Arc<dyn BrowserManager> {
        &self.manager
    }

    pub async fn check_primary_engine(self: &Arc<Self>, url: &str) -> AutomationResult {
        self.check_with(self.primary.clone(), url).await
    }

    pub async fn check_secondary_engine(self: &Arc<Self>, url: &str) -> AutomationResult {
        self.check_with(self.secondary.clone(), url).await
    }

    async fn check_with(self: &Arc<Self>, target: EngineTarget, url: &str) -> AutomationResult {
        let limit = self.settings.hard_timeout;
        let this = self.clone();
        let owned = url.to_string();

        race_detached(
            async move { this.run_check(&target, &owned).await },
            limit,
            AutomationResult::error(url, format!("Timed out after {}s", limit.as_secs())),
        )
        .await
    }

    async fn run_check(&self, target: &EngineTarget, url: &str) -> AutomationResult {
        let profile = ContextProfile::random();
        let context = match self.manager.open_context(&profile).await {
            Ok(context) => context,
            Err(e) => {
                error!("[{}] could not open context for {}: {}", target.profile.name, url, e);
                return AutomationResult::error(url, e.to_string());
            }
        };

        let inspected = self.inspect(context.as_ref(), target, &profile, url).await;
        context.close().await;

        let query = normalize(url);
        match inspected {
            Ok(PageSignal::DefenseChallenge) => {
                warn!(
                    "[{}] defense challenge for site:{}, resetting browser",
                    target.profile.name, query
                );
                self.manager.invalidate().await;
                AutomationResult::error(url, DEFENSE_DETECTED)
            }
            Ok(PageSignal::ZeroResults) => {
                info!("[{}] NOT_INDEXED: site:{}", target.profile.name, query);
                AutomationResult::ok(url, CheckStatus::NotIndexed)
            }
            Ok(PageSignal::Positive) => {
                info!("[{}] INDEXED: site:{}", target.profile.name, query);
                AutomationResult::ok(url, CheckStatus::Indexed)
            }
            Ok(PageSignal::Ambiguous) => {
                let status = if self.settings.ambiguous_as_indexed {
                    CheckStatus::Indexed
                } else {
                    CheckStatus::NotIndexed
                };
                warn!(
                    "[{}] ambiguous page for site:{}, treating as {}",
                    target.profile.name, query, status
                );
                AutomationResult::ok(url, status)
            }
            Err(e) => {
                error!("[{}] error checking {}: {}", target.profile.name, url, e);
                AutomationResult::error(url, e.to_string())
            }
        }
    }

    async fn inspect(
        &self,
        context: &dyn BrowsingContext,
        target: &EngineTarget,
        profile: &ContextProfile,
        url: &str,
    ) -> Result<PageSignal, CheckError> {
        let search_url = target.profile.search_url(url);
        info!("[{}] checking site:{}", target.profile.name, normalize(url));

        context
            .navigate(&search_url, self.settings.navigation_timeout)
            .await?;

        if self.settings.behavioural_jitter {
            for (x, y) in pointer_path(profile.viewport) {
                context.move_pointer(x, y).await?;
                pause(100, 300).await;
            }
        }

        if !context
            .wait_for_any(target.profile.wait_selectors, self.settings.dom_wait)
            .await
        {
            warn!(
                "[{}] results region did not appear for {}",
                target.profile.name, url
            );
        }

        if self.settings.behavioural_jitter {
            let (min, max) = target.profile.dwell_ms;
            pause(min, max).await;
        }

        let snapshot = context.snapshot(&target.profile.snapshot_script()).await?;
        Ok(target.classifier.classify(&snapshot))
    }
}

/// [`IndexChecker`] over one automation target
pub struct AutomationChecker {
    engine: Arc<AutomationEngine>,
    which: Engine,
}

impl AutomationChecker {
    pub fn primary(engine: Arc<AutomationEngine>) -> Self {
        Self {
            engine,
            which: Engine::AutomationPrimary,
        }
    }

    pub fn secondary(engine: Arc<AutomationEngine>) -> Self {
        Self {
            engine,
            which: Engine::AutomationSecondary,
        }
    }
}

#[async_trait]
impl IndexChecker for AutomationChecker {
    async fn check(&self, url: &str) -> Result<CheckStatus, CheckError> {
        let result = match self.which {
            Engine::AutomationSecondary => self.engine.check_secondary_engine(url).await,
            _ => self.engine.check_primary_engine(url).await,
        };

        match result.error.as_deref() {
            Some(DEFENSE_DETECTED) => Err(CheckError::DefenseDetected {
                engine: self.which.label().to_string(),
            }),
            Some(message) => Err(CheckError::Browser(message.to_string())),
            None => Ok(result.status),
        }
    }

    fn engine(&self) -> Engine {
        self.which
    }
}
