//! Target-length classification.
//!
//! A keyword is tested against the policy's category term lists in order;
//! the first category with a contained term decides the body length. This
//! is a lookup table, not a scored classifier: overlaps resolve purely by
//! list order.

use crate::config::{CategoryRule, PolicyConfig};
use tracing::debug;

/// Category picked for a keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification<'a> {
    /// Matched one of the configured categories.
    Category(&'a CategoryRule),
    /// Matched nothing; the default length applies.
    Default(usize),
}

impl Classification<'_> {
    pub fn name(&self) -> &str {
        match self {
            Classification::Category(rule) => &rule.name,
            Classification::Default(_) => "default",
        }
    }

    pub fn target_length(&self) -> usize {
        match self {
            Classification::Category(rule) => rule.length,
            Classification::Default(length) => *length,
        }
    }
}

/// Maps keywords to target body lengths using a [`PolicyConfig`].
#[derive(Debug, Clone, Copy)]
pub struct Classifier<'a> {
    policy: &'a PolicyConfig,
}

impl<'a> Classifier<'a> {
    pub fn new(policy: &'a PolicyConfig) -> Self {
        Self { policy }
    }

    pub fn classify(&self, keyword: &str) -> Classification<'a> {
        let policy = self.policy;
        let found = policy
            .categories
            .iter()
            .find(|rule| rule.matches(keyword))
            .map(Classification::Category)
            .unwrap_or(Classification::Default(policy.default_length));
        debug!(
            %keyword,
            category = found.name(),
            target_length = found.target_length(),
            "Classified keyword"
        );
        found
    }

    /// Target body length in characters for the keyword.
    #[cfg(test)]
    pub fn determine_target_length(&self, keyword: &str) -> usize {
        self.classify(keyword).target_length()
    }
}
