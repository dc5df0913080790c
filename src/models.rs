//! Data models for keywords, work items and run reports.
//!
//! - [`Keyword`]: a candidate topic with the flags the policy derives from it
//! - [`WorkItem`]: a keyword that survived filtering, with its target length
//! - [`RunSummary`]: counts reported at the end of every run
//!
//! Ledger records live in [`crate::ledger::PostRecord`].

use crate::classifier::Classifier;
use crate::config::PolicyConfig;
use crate::normalizer::has_date_token;
use serde::{Deserialize, Serialize};

/// A candidate topic and what the policy says about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    /// The text as it will be posted.
    pub text: String,
    /// Carries a `M월 D일` token.
    pub has_date: bool,
    /// Contains a quiz marker.
    pub quiz: bool,
    /// Matches the annual-topic list; posted at most once a calendar year.
    pub annual: bool,
    /// Contains a stock marker; exempt from same-day dedup.
    pub stock_related: bool,
}

impl Keyword {
    pub fn analyze(text: &str, policy: &PolicyConfig) -> Self {
        Self {
            text: text.to_string(),
            has_date: has_date_token(text),
            quiz: policy.is_quiz(text),
            annual: policy.is_annual(text),
            stock_related: policy.is_stock_related(text),
        }
    }
}

/// One entry of the ordered work list handed to the posting loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub keyword: Keyword,
    /// Name of the length category that matched.
    pub category: String,
    /// Target body length in characters.
    pub target_length: usize,
}

impl WorkItem {
    pub fn new(text: &str, policy: &PolicyConfig, classifier: &Classifier<'_>) -> Self {
        let classification = classifier.classify(text);
        Self {
            keyword: Keyword::analyze(text, policy),
            category: classification.name().to_string(),
            target_length: classification.target_length(),
        }
    }

    pub fn text(&self) -> &str {
        &self.keyword.text
    }
}

/// Outcome counts for one run, reported even when the run ends early.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RunSummary {
    /// KST date of the run in `YYYY-MM-DD` format.
    pub date: String,
    /// Raw candidates returned by the scraper.
    pub candidates: usize,
    /// Keywords left on the work list after filtering and grouping.
    pub considered: usize,
    /// Keywords published and recorded.
    pub posted: usize,
    /// Keywords skipped as already posted.
    pub skipped: usize,
    /// Keywords whose generation or publish failed.
    pub failed: usize,
    /// The keyword loop stopped on an interrupt.
    pub cancelled: bool,
    /// Reason the run ended on a fatal error, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_flags() {
        let policy = PolicyConfig::default();
        let kw = Keyword::analyze("건강보험 4월 19일", &policy);
        assert!(kw.annual);
        assert!(kw.has_date);
        assert!(!kw.quiz);
        assert!(!kw.stock_related);

        let stock = Keyword::analyze("삼성전자 관련주", &policy);
        assert!(stock.stock_related);
        assert!(!stock.annual);
    }

    #[test]
    fn test_work_item_classification() {
        let policy = PolicyConfig::default();
        let classifier = Classifier::new(&policy);
        let item = WorkItem::new("오늘의퀴즈 4월 19일", &policy, &classifier);
        assert_eq!(item.category, "quiz");
        assert_eq!(item.target_length, 300);
        assert!(item.keyword.quiz);
    }

    #[test]
    fn test_summary_json_omits_missing_abort() {
        let summary = RunSummary {
            date: "2025-04-19".into(),
            considered: 2,
            posted: 2,
            ..Default::default()
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("aborted"));
        let back: RunSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, summary);
    }
}
