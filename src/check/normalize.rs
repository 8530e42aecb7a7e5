// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! `site:` query normalization
//!
//! Search engines expect `site:host/path` with no scheme and no trailing
//! slash. Every backend (and any "verify manually" link) builds its query
//! from [`normalize`], so the two must never drift apart.

use url::Url;

/// Convert a raw URL into the fragment used after `site:`.
///
/// Never fails: unparseable input falls back to stripping a leading
/// `http://`/`https://` and one trailing slash.
pub fn normalize(raw_url: &str) -> String {
    let raw = raw_url.trim();

    match Url::parse(raw) {
        Ok(parsed) if parsed.has_host() => {
            let host = parsed.host_str().unwrap_or_default();
            let joined = format!("{}{}", host, parsed.path());
            strip_trailing_slash(&joined).to_string()
        }
        _ => {
            let without_scheme = strip_scheme(raw);
            strip_trailing_slash(without_scheme).to_string()
        }
    }
}

/// Build the full `site:` query for a raw URL
pub fn site_query(raw_url: &str) -> String {
    format!("site:{}", normalize(raw_url))
}

/// Whether a search result link counts as a hit for the normalized target.
///
/// True when the link is the target itself or a path under it, or when the
/// target lives on the link's host. Both sides are compared lowercase.
pub fn containment_match(normalized_target: &str, result_link: &str) -> bool {
    let target = normalized_target.to_lowercase();
    let link = normalize(result_link).to_lowercase();

    if target.is_empty() || link.is_empty() {
        return false;
    }

    if is_same_or_under(&link, &target) {
        return true;
    }

    let link_host = link.split('/').next().unwrap_or_default();
    !link_host.is_empty() && is_same_or_under(&target, link_host)
}

fn is_same_or_under(candidate: &str, base: &str) -> bool {
    match candidate.strip_prefix(base) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn strip_scheme(raw: &str) -> &str {
    raw.strip_prefix("https://")
        .or_else(|| raw.strip_prefix("http://"))
        .unwrap_or(raw)
}

fn strip_trailing_slash(s: &str) -> &str {
    s.strip_suffix('/').unwrap_or(s)
}
