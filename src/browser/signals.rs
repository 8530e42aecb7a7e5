// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Page-signal classification
//!
//! Turns a snapshot of a rendered results page into one of four signals.
//! All knowledge of the engines' markup lives here and in the snapshot
//! script, so it can change without touching orchestration.

use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

/// What the page evaluation script reports back
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageSnapshot {
    pub body_text: String,
    pub stats_text: Option<String>,
    pub results_present: bool,
    pub result_links: Vec<String>,
    pub challenge_marker: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSignal {
    /// Bot-mitigation page instead of results
    DefenseChallenge,
    /// Explicit "no results" phrasing or a zero stats count
    ZeroResults,
    /// External result links or a non-zero stats count
    Positive,
    /// Neither signal found
    Ambiguous,
}

pub trait PageClassifier: Send + Sync {
    fn classify(&self, snapshot: &PageSnapshot) -> PageSignal;
}

/// Text/DOM rules for one search engine
#[derive(Debug, Clone, Copy)]
pub struct MarkupRules {
    /// Links containing this are the engine's own navigation
    pub engine_domain: &'static str,
    pub challenge_phrases: &'static [&'static str],
    pub zero_result_phrases: &'static [&'static str],
    /// Whether the stats bar ("About N results") is meaningful
    pub uses_stats: bool,
}

pub const GOOGLE_RULES: MarkupRules = MarkupRules {
    engine_domain: "google.com",
    challenge_phrases: &["unusual traffic", "not a robot", "captcha"],
    zero_result_phrases: &[
        "did not match any documents",
        "did not match any results",
        "No results found for",
    ],
    uses_stats: true,
};

pub const BING_RULES: MarkupRules = MarkupRules {
    engine_domain: "bing.com",
    challenge_phrases: &["unusual traffic", "solve the challenge", "captcha"],
    zero_result_phrases: &[
        "did not match any documents",
        "There are no results for",
        "We did not find any results",
    ],
    uses_stats: false,
};

fn zero_stats_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)About\s+0\s+results").expect("static regex"))
}

fn positive_stats_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)About\s+[1-9]").expect("static regex"))
}

/// Classifier driven by [`MarkupRules`]
#[derive(Debug, Clone, Copy)]
pub struct MarkupClassifier {
    rules: MarkupRules,
}

impl MarkupClassifier {
    pub const fn new(rules: MarkupRules) -> Self {
        Self { rules }
    }

    pub fn google() -> Self {
        Self::new(GOOGLE_RULES)
    }

    pub fn bing() -> Self {
        Self::new(BING_RULES)
    }

    fn is_challenge(&self, snapshot: &PageSnapshot) -> bool {
        snapshot.challenge_marker
            || self
                .rules
                .challenge_phrases
                .iter()
                .any(|p| snapshot.body_text.contains(p))
    }

    fn is_zero(&self, snapshot: &PageSnapshot) -> bool {
        let phrase = self
            .rules
            .zero_result_phrases
            .iter()
            .any(|p| snapshot.body_text.contains(p));

        phrase || (self.rules.uses_stats && self.stats_match(snapshot, zero_stats_re()))
    }

    fn is_positive(&self, snapshot: &PageSnapshot) -> bool {
        let external_link = snapshot.results_present
            && snapshot
                .result_links
                .iter()
                .any(|href| href.starts_with("http") && !href.contains(self.rules.engine_domain));

        external_link || (self.rules.uses_stats && self.stats_match(snapshot, positive_stats_re()))
    }

    fn stats_match(&self, snapshot: &PageSnapshot, re: &Regex) -> bool {
        snapshot
            .stats_text
            .as_deref()
            .map(|t| re.is_match(t))
            .unwrap_or(false)
    }
}

impl PageClassifier for MarkupClassifier {
    fn classify(&self, snapshot: &PageSnapshot) -> PageSignal {
        if self.is_challenge(snapshot) {
            PageSignal::DefenseChallenge
        } else if self.is_zero(snapshot) {
            PageSignal::ZeroResults
        } else if self.is_positive(snapshot) {
            PageSignal::Positive
        } else {
            PageSignal::Ambiguous
        }
    }
}
