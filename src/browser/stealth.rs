// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Per-context fingerprint randomization and behavioural jitter

use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;

pub const USER_AGENTS: [&str; 6] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_3) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_6) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

pub const VIEWPORTS: [Viewport; 4] = [
    Viewport { width: 1366, height: 768 },
    Viewport { width: 1920, height: 1080 },
    Viewport { width: 1536, height: 864 },
    Viewport { width: 1440, height: 900 },
];

pub const LOCALE: &str = "en-US";
pub const TIMEZONE: &str = "America/New_York";

/// Identity applied to one isolated browsing context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextProfile {
    pub user_agent: String,
    pub viewport: Viewport,
    pub locale: &'static str,
    pub timezone: &'static str,
}

impl ContextProfile {
    /// Draw a user agent and viewport from the fixed pools
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let user_agent = USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0]);
        let viewport = VIEWPORTS.choose(&mut rng).copied().unwrap_or(VIEWPORTS[0]);

        Self {
            user_agent: user_agent.to_string(),
            viewport,
            locale: LOCALE,
            timezone: TIMEZONE,
        }
    }
}

/// 2-3 random points inside the viewport for synthetic pointer movement
pub fn pointer_path(viewport: Viewport) -> Vec<(f64, f64)> {
    let mut rng = rand::thread_rng();
    let points = rng.gen_range(2..=3);
    (0..points)
        .map(|_| {
            (
                rng.gen_range(0..viewport.width.max(1)) as f64,
                rng.gen_range(0..viewport.height.max(1)) as f64,
            )
        })
        .collect()
}

/// Random delay in `[min_ms, max_ms)`
pub fn jitter(min_ms: u64, max_ms: u64) -> Duration {
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..max_ms))
}

/// Sleep for a jittered duration
pub async fn pause(min_ms: u64, max_ms: u64) {
    let delay = jitter(min_ms, max_ms);
    tokio::time::sleep(delay).await;
}
