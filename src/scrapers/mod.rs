//! Trend keyword scraping.
//!
//! The pipeline only sees the [`TrendSource`] capability: given a dashboard
//! URL and a container selector, return candidate strings. A failed fetch
//! is the caller's to turn into an empty list.
//!
//! # Modules
//!
//! | Module | Role |
//! |--------|------|
//! | [`browserless`] | Rendering-service HTTP client |
//! | [`dashboard`] | Creator trend dashboard scraper |
//!
//! Candidate clean-up shared by every source lives here:
//! [`filter_candidates`] for the current view and [`filter_previous_view`]
//! for yesterday's.

use crate::config::PolicyConfig;
use crate::errors::ScrapeError;
use crate::utils::is_korean_consonants_only;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

pub mod browserless;
pub mod dashboard;

/// Any day or month token such as `3월` or `19일`.
static DAY_OR_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d(월|일)").expect("day or month pattern"));

/// Source of raw candidate keywords.
pub trait TrendSource {
    async fn fetch_candidates(&self, url: &str, selector: &str) -> Result<Vec<String>, ScrapeError>;
}

/// Drop duplicates and strings that cannot be keywords: 3 characters or
/// fewer, hashtags, bare numbers, dashboard placeholders, and strings of
/// only initial consonants (quiz hints).
pub fn filter_candidates(raw: &[String], policy: &PolicyConfig) -> Vec<String> {
    let unique: Vec<&String> = raw.iter().unique().collect();

    let consonant_hints: Vec<_> = unique
        .iter()
        .filter(|k| is_korean_consonants_only(k))
        .collect();
    if !consonant_hints.is_empty() {
        info!(?consonant_hints, "Excluding consonant-only quiz hints");
    }

    unique
        .into_iter()
        .filter(|k| k.chars().count() > 3)
        .filter(|k| !k.starts_with('#'))
        .filter(|k| !k.chars().all(|c| c.is_ascii_digit()))
        .filter(|k| !policy.is_placeholder(k))
        .filter(|k| !is_korean_consonants_only(k))
        .cloned()
        .collect()
}

/// [`filter_candidates`] plus the exclusions for a stale view: quiz
/// keywords, anything carrying a day or month, and annual topics.
pub fn filter_previous_view(raw: &[String], policy: &PolicyConfig) -> Vec<String> {
    let (kept, stale): (Vec<String>, Vec<String>) = filter_candidates(raw, policy)
        .into_iter()
        .partition(|k| !policy.is_quiz(k) && !DAY_OR_MONTH.is_match(k) && !policy.is_annual(k));
    if !stale.is_empty() {
        info!(?stale, "Excluding date, quiz and annual keywords from previous view");
    }
    kept
}
