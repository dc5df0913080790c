//! Trend dashboard scraper.
//!
//! Renders the creator trend dashboard through Browserless and reads the
//! keyword items out of the swiper slides. When the current view looks
//! wrong (too few keywords, or category headers where keywords should be)
//! the scraper follows the dashboard's "previous" link once and uses
//! yesterday's view instead.
//!
//! # Selectors
//!
//! Keyword items are read with the first of these that matches anything:
//!
//! | Selector | Element |
//! |----------|---------|
//! | `.u_ni_keyword_item` | Keyword items |
//! | `.u_ni_rel_keyword_item` | Related keyword items |
//! | `.u_ni_trend_text` | Trend text items |
//! | `.u_ni_section_unit li a` | List links within section units |
//!
//! Failing all of them, text nodes under the container selector are used.

use super::browserless::BrowserlessClient;
use super::{TrendSource, filter_candidates, filter_previous_view};
use crate::config::PolicyConfig;
use crate::errors::ScrapeError;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

const ITEM_SELECTORS: [&str; 4] = [
    ".u_ni_keyword_item",
    ".u_ni_rel_keyword_item",
    ".u_ni_trend_text",
    ".u_ni_section_unit li a",
];

const PREVIOUS_SELECTORS: [&str; 3] = [".u_ni_btn_prev", ".u_ni_ico_prev", "[class*='prev']"];

/// [`TrendSource`] reading the creator trend dashboard.
#[derive(Debug)]
pub struct DashboardScraper<'a> {
    client: BrowserlessClient,
    policy: &'a PolicyConfig,
}

impl<'a> DashboardScraper<'a> {
    pub fn new(client: BrowserlessClient, policy: &'a PolicyConfig) -> Self {
        Self { client, policy }
    }
}

impl TrendSource for DashboardScraper<'_> {
    #[instrument(level = "info", skip(self))]
    async fn fetch_candidates(&self, url: &str, selector: &str) -> Result<Vec<String>, ScrapeError> {
        let html = self.client.content(url).await?;
        let page = parse_page(&html, selector)?;
        let raw = page.keywords;
        let filtered = filter_candidates(&raw, self.policy);

        let placeholders_seen = raw.iter().any(|k| self.policy.is_placeholder(k));
        if filtered.len() >= self.policy.min_candidates && !placeholders_seen {
            info!(count = filtered.len(), %url, "Extracted trend keywords");
            return Ok(filtered);
        }

        info!(
            valid = filtered.len(),
            required = self.policy.min_candidates,
            placeholders_seen,
            "Keyword view looks incomplete; trying the previous view once"
        );
        let Some(previous) = page.previous_href.and_then(|href| resolve(url, &href)) else {
            warn!("No previous-view link found; using current keywords");
            return Ok(filtered);
        };

        match self.client.content(previous.as_str()).await {
            Ok(prev_html) => {
                let prev_raw = parse_page(&prev_html, selector)?.keywords;
                if prev_raw.is_empty() {
                    warn!(url = %previous, "Previous view yielded nothing; using current keywords");
                    return Ok(filtered);
                }
                let prev_filtered = filter_previous_view(&prev_raw, self.policy);
                info!(
                    count = prev_filtered.len(),
                    total = prev_raw.len(),
                    url = %previous,
                    "Extracted trend keywords from previous view"
                );
                Ok(prev_filtered)
            }
            Err(e) => {
                warn!(error = %e, "Failed to load previous view; using current keywords");
                Ok(filtered)
            }
        }
    }
}

/// What one rendered dashboard page offers.
#[derive(Debug, Default, PartialEq, Eq)]
struct DashboardPage {
    keywords: Vec<String>,
    previous_href: Option<String>,
}

fn parse_selector(selector: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(selector).map_err(|_| ScrapeError::Selector(selector.to_string()))
}

fn element_text<'b>(element: scraper::ElementRef<'b>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_page(html: &str, container_selector: &str) -> Result<DashboardPage, ScrapeError> {
    let document = Html::parse_document(html);
    let mut keywords = Vec::new();

    for item_selector in ITEM_SELECTORS {
        let selector = parse_selector(item_selector)?;
        keywords.extend(
            document
                .select(&selector)
                .map(element_text)
                .filter(|k| k.chars().count() >= 2),
        );
        if !keywords.is_empty() {
            debug!(selector = item_selector, count = keywords.len(), "Matched keyword items");
            break;
        }
    }

    if keywords.is_empty() {
        let container = parse_selector(container_selector)?;
        for slide in document.select(&container) {
            keywords.extend(
                slide
                    .text()
                    .map(str::trim)
                    .filter(|t| t.chars().count() >= 2)
                    .map(str::to_string),
            );
        }
        debug!(count = keywords.len(), "Fell back to container text nodes");
    }

    let mut previous_href = None;
    for prev_selector in PREVIOUS_SELECTORS {
        let selector = parse_selector(prev_selector)?;
        previous_href = document
            .select(&selector)
            .find_map(|el| el.value().attr("href").map(str::to_string));
        if previous_href.is_some() {
            break;
        }
    }

    Ok(DashboardPage {
        keywords,
        previous_href,
    })
}

fn resolve(base: &str, href: &str) -> Option<Url> {
    Url::parse(base).and_then(|b| b.join(href)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTAINER: &str = "#root .u_ni_section_wrap .swiper-wrapper .swiper-slide";

    #[test]
    fn test_parse_item_selectors() {
        let html = r#"
            <div id="root"><div class="u_ni_section_wrap"><div class="swiper-wrapper">
              <div class="swiper-slide">
                <span class="u_ni_keyword_item">삼성전자   관련주</span>
                <span class="u_ni_keyword_item">오늘의퀴즈</span>
                <span class="u_ni_keyword_item">a</span>
              </div>
            </div></div></div>
            <a class="u_ni_btn_prev" href="?date=2025-04-18">이전</a>
        "#;
        let page = parse_page(html, CONTAINER).unwrap();
        assert_eq!(page.keywords, vec!["삼성전자 관련주", "오늘의퀴즈"]);
        assert_eq!(page.previous_href.as_deref(), Some("?date=2025-04-18"));
    }

    #[test]
    fn test_parse_falls_back_to_container_text() {
        let html = r#"
            <div id="root"><div class="u_ni_section_wrap"><div class="swiper-wrapper">
              <div class="swiper-slide"><p>건강보험 3월 1일</p><p> 날씨 </p><p>x</p></div>
            </div></div></div>
        "#;
        let page = parse_page(html, CONTAINER).unwrap();
        assert_eq!(page.keywords, vec!["건강보험 3월 1일", "날씨"]);
        assert_eq!(page.previous_href, None);
    }

    #[test]
    fn test_invalid_container_selector() {
        let err = parse_page("<p></p>", "[[[").unwrap_err();
        assert!(matches!(err, ScrapeError::Selector(_)));
    }

    #[test]
    fn test_resolve_previous_href() {
        let url = resolve(
            "https://creator-advisor.naver.com/naver_blog/trends",
            "?date=2025-04-18",
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://creator-advisor.naver.com/naver_blog/trends?date=2025-04-18"
        );
    }
}
