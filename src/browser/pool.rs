// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Shared browser process manager
//!
//! One Chromium process is launched lazily and reused. Every check gets its
//! own CDP browser context (separate cookies, UA and viewport) that is
//! disposed when the check ends. [`BrowserManager::invalidate`] tears the
//! process down so the next caller starts clean.

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{BrowserContextId, CloseParams};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetLocaleOverrideParams, SetTimezoneOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::input::{DispatchMouseEventParams, DispatchMouseEventType};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::signals::PageSnapshot;
use super::stealth::ContextProfile;
use crate::check::types::CheckError;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Process-wide owner of the shared browser
#[async_trait]
pub trait BrowserManager: Send + Sync {
    /// Open an isolated context, launching the browser first if needed
    async fn open_context(
        &self,
        profile: &ContextProfile,
    ) -> Result<Box<dyn BrowsingContext>, CheckError>;

    /// Destroy the shared browser; the next `open_context` relaunches it
    async fn invalidate(&self);

    /// Destroy the shared browser for good (process exit)
    async fn shutdown(&self);
}

/// One isolated context with a single page
#[async_trait]
pub trait BrowsingContext: Send + Sync {
    /// Navigate and wait for DOM content only
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), CheckError>;

    async fn move_pointer(&self, x: f64, y: f64) -> Result<(), CheckError>;

    /// Wait until any of the comma-separated selectors matches. `false` on timeout.
    async fn wait_for_any(&self, selectors: &str, timeout: Duration) -> bool;

    /// Run the page evaluation script
    async fn snapshot(&self, script: &str) -> Result<PageSnapshot, CheckError>;

    /// Dispose the context. Never fails.
    async fn close(&self);
}

#[derive(Debug, Clone)]
pub struct BrowserPoolConfig {
    pub chrome_bin: Option<PathBuf>,
    pub headless: bool,
}

impl Default for BrowserPoolConfig {
    fn default() -> Self {
        Self {
            chrome_bin: None,
            headless: true,
        }
    }
}

struct LiveBrowser {
    browser: Arc<Browser>,
    handler_alive: Arc<AtomicBool>,
}

/// chromiumoxide-backed [`BrowserManager`]
pub struct ChromeBrowserPool {
    config: BrowserPoolConfig,
    slot: Mutex<Option<LiveBrowser>>,
}

impl ChromeBrowserPool {
    pub fn new(config: BrowserPoolConfig) -> Self {
        Self {
            config,
            slot: Mutex::new(None),
        }
    }

    /// Shared browser, launched on first use or after a reset
    pub async fn acquire(&self) -> Result<Arc<Browser>, CheckError> {
        let mut slot = self.slot.lock().await;

        if let Some(live) = slot.as_ref() {
            if live.handler_alive.load(Ordering::SeqCst) {
                return Ok(live.browser.clone());
            }
            warn!("Browser event loop is gone, relaunching");
        }

        let live = self.launch().await?;
        let browser = live.browser.clone();
        *slot = Some(live);
        Ok(browser)
    }

    async fn launch(&self) -> Result<LiveBrowser, CheckError> {
        let mut builder = BrowserConfig::builder();
        if let Some(bin) = self.config.chrome_bin.clone().or_else(find_chrome_binary) {
            info!("Using Chromium binary {:?}", bin);
            builder = builder.chrome_executable(bin);
        }
        if !self.config.headless {
            builder = builder.with_head();
        }

        let config = builder
            .args(vec![
                "--no-sandbox",
                "--disable-setuid-sandbox",
                "--disable-blink-features=AutomationControlled",
                "--disable-infobars",
                "--disable-dev-shm-usage",
                "--window-size=1280,800",
                "--lang=en-US",
            ])
            .build()
            .map_err(CheckError::Browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| CheckError::Browser(format!("launch failed: {}", e)))?;

        let handler_alive = Arc::new(AtomicBool::new(true));
        let alive = handler_alive.clone();
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
            alive.store(false, Ordering::SeqCst);
            debug!("Chromium event loop exited");
        });

        info!(
            "Launched shared browser (headless: {})",
            self.config.headless
        );

        Ok(LiveBrowser {
            browser: Arc::new(browser),
            handler_alive,
        })
    }

    async fn take(&self) -> Option<LiveBrowser> {
        self.slot.lock().await.take()
    }
}

async fn close_browser(live: LiveBrowser) {
    if let Err(e) = live.browser.execute(CloseParams::default()).await {
        debug!("Browser close command failed: {}", e);
    }
    live.handler_alive.store(false, Ordering::SeqCst);
}

#[async_trait]
impl BrowserManager for ChromeBrowserPool {
    async fn open_context(
        &self,
        profile: &ContextProfile,
    ) -> Result<Box<dyn BrowsingContext>, CheckError> {
        let browser = self.acquire().await?;

        let created = browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| CheckError::Browser(format!("create context: {}", e)))?;
        let context_id = created.result.browser_context_id.clone();

        match ChromeContext::open(browser.clone(), context_id.clone(), profile).await {
            Ok(ctx) => Ok(Box::new(ctx)),
            Err(e) => {
                // Page setup failed after the context existed
                let _ = browser
                    .execute(DisposeBrowserContextParams::new(context_id))
                    .await;
                Err(e)
            }
        }
    }

    async fn invalidate(&self) {
        if let Some(live) = self.take().await {
            warn!("Resetting shared browser");
            // In-flight checks on the old instance fail and fail over
            tokio::spawn(close_browser(live));
        }
    }

    async fn shutdown(&self) {
        if let Some(live) = self.take().await {
            info!("Shutting down shared browser");
            close_browser(live).await;
        }
    }
}

/// Browser context holding one page
pub struct ChromeContext {
    browser: Arc<Browser>,
    context_id: BrowserContextId,
    page: Page,
}

impl ChromeContext {
    async fn open(
        browser: Arc<Browser>,
        context_id: BrowserContextId,
        profile: &ContextProfile,
    ) -> Result<Self, CheckError> {
        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(CheckError::Browser)?;

        let page = browser
            .new_page(target)
            .await
            .map_err(|e| CheckError::Browser(format!("new page failed: {}", e)))?;

        page.enable_stealth_mode_with_agent(&profile.user_agent)
            .await
            .map_err(browser_err)?;
        page.execute(SetDeviceMetricsOverrideParams::new(
            profile.viewport.width as i64,
            profile.viewport.height as i64,
            1.0,
            false,
        ))
        .await
        .map_err(browser_err)?;
        page.execute(SetTimezoneOverrideParams::new(profile.timezone))
            .await
            .map_err(browser_err)?;
        page.execute(SetLocaleOverrideParams {
            locale: Some(profile.locale.to_string()),
        })
        .await
        .map_err(browser_err)?;

        Ok(Self {
            browser,
            context_id,
            page,
        })
    }

    async fn ready_state(&self) -> Option<String> {
        self.page
            .evaluate("document.readyState")
            .await
            .ok()
            .and_then(|v| v.into_value::<String>().ok())
    }
}

fn browser_err(e: impl std::fmt::Display) -> CheckError {
    CheckError::Browser(e.to_string())
}

#[async_trait]
impl BrowsingContext for ChromeContext {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), CheckError> {
        let deadline = Instant::now() + timeout;
        let timeout_err = || CheckError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        };

        tokio::time::timeout_at(deadline, self.page.execute(NavigateParams::new(url)))
            .await
            .map_err(|_| timeout_err())?
            .map_err(|e| CheckError::Browser(format!("navigation failed: {}", e)))?;

        // DOM content loaded is enough; don't wait for network idle
        loop {
            match self.ready_state().await.as_deref() {
                Some("interactive") | Some("complete") => return Ok(()),
                _ => {}
            }
            if Instant::now() + POLL_INTERVAL > deadline {
                return Err(timeout_err());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn move_pointer(&self, x: f64, y: f64) -> Result<(), CheckError> {
        let cmd = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseMoved)
            .x(x)
            .y(y)
            .build()
            .map_err(CheckError::Browser)?;
        self.page.execute(cmd).await.map_err(browser_err)?;
        Ok(())
    }

    async fn wait_for_any(&self, selectors: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.page.find_element(selectors).await.is_ok() {
                return true;
            }
            if Instant::now() + POLL_INTERVAL > deadline {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn snapshot(&self, script: &str) -> Result<PageSnapshot, CheckError> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| CheckError::Browser(format!("JS evaluation failed: {}", e)))?
            .into_value::<PageSnapshot>()
            .map_err(|e| CheckError::Browser(format!("bad page snapshot: {}", e)))
    }

    async fn close(&self) {
        if let Err(e) = self.page.clone().close().await {
            debug!("Page close failed: {}", e);
        }
        if let Err(e) = self
            .browser
            .execute(DisposeBrowserContextParams::new(self.context_id.clone()))
            .await
        {
            debug!("Context dispose failed: {}", e);
        }
    }
}

/// Locate a Chromium binary: `CHROME_BIN` first, then common install paths
pub fn find_chrome_binary() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CHROME_BIN") {
        let p = PathBuf::from(path);
        if p.exists() {
            return Some(p);
        }
    }

    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];

    candidates
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}
