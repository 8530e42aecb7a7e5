// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Browser automation tests with a scripted browser
//!
//! No real browser is launched. Each opened context pops the next scripted
//! page from a queue, keyed by which engine the check navigated to.

use async_trait::async_trait;
use indexy_checker::browser::{
    AutomationChecker, AutomationEngine, AutomationSettings, BrowserManager, BrowsingContext,
    ContextProfile, PageSnapshot,
};
use indexy_checker::check::{
    Backends, CheckError, CheckStatus, Engine, IndexChecker, Orchestrator, OrchestratorSettings,
    RunOptions,
};
use indexy_checker::storage::MemoryStorage;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
enum Page {
    Snapshot(PageSnapshot),
    Hang,
}

#[derive(Default)]
struct ScriptedBrowser {
    google: Mutex<VecDeque<Page>>,
    bing: Mutex<VecDeque<Page>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    invalidated: AtomicUsize,
    navigations: Mutex<Vec<String>>,
}

impl ScriptedBrowser {
    fn push_google(&self, page: Page) {
        self.google.lock().unwrap().push_back(page);
    }

    fn push_bing(&self, page: Page) {
        self.bing.lock().unwrap().push_back(page);
    }
}

/// Manager handed to the engine; shares the script with the test
struct ScriptedManager(Arc<ScriptedBrowser>);

struct ScriptedContext {
    browser: Arc<ScriptedBrowser>,
    page: Mutex<Option<Page>>,
}

#[async_trait]
impl BrowserManager for ScriptedManager {
    async fn open_context(
        &self,
        profile: &ContextProfile,
    ) -> Result<Box<dyn BrowsingContext>, CheckError> {
        assert!(!profile.user_agent.is_empty());
        self.0.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedContext {
            browser: self.0.clone(),
            page: Mutex::new(None),
        }))
    }

    async fn invalidate(&self) {
        self.0.invalidated.fetch_add(1, Ordering::SeqCst);
    }

    async fn shutdown(&self) {}
}

#[async_trait]
impl BrowsingContext for ScriptedContext {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), CheckError> {
        self.browser.navigations.lock().unwrap().push(url.to_string());
        let queue = if url.contains("bing.com") {
            &self.browser.bing
        } else {
            &self.browser.google
        };
        let page = queue.lock().unwrap().pop_front();
        *self.page.lock().unwrap() = page;
        Ok(())
    }

    async fn move_pointer(&self, _x: f64, _y: f64) -> Result<(), CheckError> {
        Ok(())
    }

    async fn wait_for_any(&self, _selectors: &str, _timeout: Duration) -> bool {
        true
    }

    async fn snapshot(&self, _script: &str) -> Result<PageSnapshot, CheckError> {
        let page = self.page.lock().unwrap().clone();
        match page {
            Some(Page::Snapshot(snapshot)) => Ok(snapshot),
            Some(Page::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(PageSnapshot::default())
            }
            None => Err(CheckError::Browser("no scripted page".to_string())),
        }
    }

    async fn close(&self) {
        self.browser.closed.fetch_add(1, Ordering::SeqCst);
    }
}

fn challenge() -> Page {
    Page::Snapshot(PageSnapshot {
        body_text: "Our systems have detected unusual traffic from your computer".to_string(),
        challenge_marker: true,
        ..Default::default()
    })
}

fn results(link: &str) -> Page {
    Page::Snapshot(PageSnapshot {
        body_text: "About 3 results".to_string(),
        results_present: true,
        result_links: vec![link.to_string()],
        ..Default::default()
    })
}

fn no_results() -> Page {
    Page::Snapshot(PageSnapshot {
        body_text: "Your search - site:example.com/missing - did not match any documents."
            .to_string(),
        ..Default::default()
    })
}

fn ambiguous() -> Page {
    Page::Snapshot(PageSnapshot {
        body_text: "Some unrelated page".to_string(),
        ..Default::default()
    })
}

fn settings() -> AutomationSettings {
    AutomationSettings {
        navigation_timeout: Duration::from_millis(200),
        dom_wait: Duration::from_millis(200),
        hard_timeout: Duration::from_millis(500),
        ambiguous_as_indexed: false,
        behavioural_jitter: false,
    }
}

fn engine(browser: &Arc<ScriptedBrowser>, settings: AutomationSettings) -> Arc<AutomationEngine> {
    Arc::new(AutomationEngine::new(Arc::new(ScriptedManager(browser.clone())), settings))
}

#[tokio::test]
async fn test_positive_and_zero_results() {
    let browser = Arc::new(ScriptedBrowser::default());
    browser.push_google(results("https://example.com/blog"));
    browser.push_google(no_results());
    let engine = engine(&browser, settings());

    let found = engine.check_primary_engine("https://example.com/blog").await;
    assert_eq!(found.status, CheckStatus::Indexed);
    assert!(found.error.is_none());

    let missing = engine.check_primary_engine("https://example.com/missing").await;
    assert_eq!(missing.status, CheckStatus::NotIndexed);

    assert_eq!(browser.opened.load(Ordering::SeqCst), 2);
    assert_eq!(browser.closed.load(Ordering::SeqCst), 2);

    let navigations = browser.navigations.lock().unwrap();
    assert!(navigations[0].starts_with("https://www.google.com/search?"));
    assert!(navigations[0].contains("site%3Aexample.com%2Fblog"));
}

#[tokio::test]
async fn test_ambiguous_page_policy() {
    let browser = Arc::new(ScriptedBrowser::default());
    browser.push_google(ambiguous());
    let strict = engine(&browser, settings());
    assert_eq!(
        strict.check_primary_engine("https://example.com/x").await.status,
        CheckStatus::NotIndexed
    );

    browser.push_google(ambiguous());
    let lenient = engine(
        &browser,
        AutomationSettings {
            ambiguous_as_indexed: true,
            ..settings()
        },
    );
    assert_eq!(
        lenient.check_primary_engine("https://example.com/x").await.status,
        CheckStatus::Indexed
    );
}

#[tokio::test]
async fn test_challenge_resets_browser_and_reports_defense() {
    let browser = Arc::new(ScriptedBrowser::default());
    browser.push_google(challenge());
    let engine = engine(&browser, settings());

    let checker = AutomationChecker::primary(engine);
    let err = checker.check("https://example.com/").await.unwrap_err();
    assert!(matches!(err, CheckError::DefenseDetected { .. }));
    assert_eq!(browser.invalidated.load(Ordering::SeqCst), 1);
    assert_eq!(browser.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_hard_timeout_returns_error() {
    let browser = Arc::new(ScriptedBrowser::default());
    browser.push_google(Page::Hang);
    let engine = engine(&browser, settings());

    let result = engine.check_primary_engine("https://example.com/slow").await;
    assert_eq!(result.status, CheckStatus::Error);
    assert!(result.error.unwrap().contains("Timed out"));
}

#[tokio::test]
async fn test_google_challenge_falls_back_to_bing() {
    let browser = Arc::new(ScriptedBrowser::default());
    browser.push_google(challenge());
    browser.push_google(results("https://example.com/b"));
    browser.push_bing(results("https://example.com/a"));

    let automation = engine(&browser, settings());
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(MemoryStorage::new()),
        Backends {
            primary_api: None,
            automation_primary: Arc::new(AutomationChecker::primary(automation.clone())),
            automation_secondary: Arc::new(AutomationChecker::secondary(automation)),
        },
        OrchestratorSettings::default(),
    ));

    // One URL at a time so the scripted queues are consumed in order
    let mut first = orchestrator.run(vec!["https://example.com/a".to_string()], RunOptions::default());
    let event = first.receiver.recv().await.unwrap();
    assert_eq!(event.outcome.engine, Engine::AutomationSecondary);
    assert_eq!(event.outcome.status, CheckStatus::Indexed);
    assert_eq!(browser.invalidated.load(Ordering::SeqCst), 1);

    let mut second = orchestrator.run(vec!["https://example.com/b".to_string()], RunOptions::default());
    let event = second.receiver.recv().await.unwrap();
    assert_eq!(event.outcome.engine, Engine::AutomationPrimary);
    assert_eq!(event.outcome.status, CheckStatus::Indexed);
}
