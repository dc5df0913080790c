//! Pure string functions for tags, keyword dates and similarity grouping.
//!
//! - [`normalize_tag`]: sanitize a tag to Korean syllables, `a-z` and digits
//! - [`normalize_keyword_date`]: swap a scraped `M월 D일` token for today's
//! - [`group_keywords`] / [`group_similar`]: collapse near-duplicate keywords
//!
//! The similarity heuristic is deliberately loose (character-set overlap,
//! not edit distance). Downstream dedup relies on exactly this looseness.

use crate::config::PolicyConfig;
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

/// Korean month/day token such as `3월 10일` or `12월1일`.
static DATE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})월\s*(\d{1,2})일").expect("date token pattern"));

/// Lowercase and strip everything that is not a Hangul syllable, `a-z` or `0-9`.
///
/// Idempotent: `normalize_tag(&normalize_tag(x)) == normalize_tag(x)`.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(normalize_tag("M&A 시장"), "ma시장");
/// assert_eq!(normalize_tag("AI/ML 기술"), "aiml기술");
/// ```
pub fn normalize_tag(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .chars()
        .filter(|c| matches!(c, '가'..='힣' | 'a'..='z' | '0'..='9'))
        .collect()
}

/// Today's date as the `M월 D일` token used in keywords.
pub fn month_day_token(today: NaiveDate) -> String {
    format!("{}월 {}일", today.month(), today.day())
}

/// `true` if the keyword carries a `M월 D일` token.
pub fn has_date_token(keyword: &str) -> bool {
    DATE_TOKEN.is_match(keyword)
}

/// Replace a stale `M월 D일` token with today's, or append today's date to
/// quiz keywords that carry none.
///
/// Quiz keywords that did carry a token go through a second pass: every
/// token is rewritten and, should the quiz marker have gone missing in the
/// process, today's date is appended again.
///
/// ```ignore
/// // today = 2025-04-19
/// normalize_keyword_date("3월 10일 퀴즈", today, &policy); // "4월 19일 퀴즈"
/// normalize_keyword_date("오늘의퀴즈", today, &policy);    // "오늘의퀴즈 4월 19일"
/// ```
pub fn normalize_keyword_date(keyword: &str, today: NaiveDate, policy: &PolicyConfig) -> String {
    let today_token = month_day_token(today);
    let found = DATE_TOKEN.find(keyword);
    let is_quiz = policy.is_quiz(keyword);

    let mut processed = match found {
        Some(m) => keyword.replace(m.as_str(), &today_token),
        None if is_quiz => format!("{keyword} {today_token}"),
        None => keyword.to_string(),
    };

    if is_quiz && found.is_some() {
        processed = DATE_TOKEN
            .replace_all(keyword, today_token.as_str())
            .trim()
            .to_string();
        if !policy.is_quiz(&processed) {
            processed = format!("{processed} {today_token}");
        }
    }

    if processed != keyword {
        debug!(%keyword, %processed, "Normalized keyword date");
    }
    processed
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove every ASCII space.
pub fn strip_spaces(text: &str) -> String {
    text.replace(' ', "")
}

/// Comparison form used for grouping: no spaces, no punctuation.
pub fn similarity_key(keyword: &str) -> String {
    strip_spaces(keyword)
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect()
}

/// `true` if two similarity keys belong in the same group.
fn is_similar(a: &str, b: &str) -> bool {
    if a.contains(b) || b.contains(a) {
        return true;
    }
    if a.chars().count() < 3 || b.chars().count() < 3 {
        return false;
    }
    let a_chars: HashSet<char> = a.chars().collect();
    let shared = b.chars().collect::<HashSet<char>>();
    a_chars.intersection(&shared).count() >= 2
}

/// A set of keywords judged similar to the group's first member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordGroup {
    key: String,
    members: Vec<String>,
}

impl KeywordGroup {
    fn new(keyword: String) -> Self {
        Self {
            key: similarity_key(&keyword),
            members: vec![keyword],
        }
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Longest member by character count; the first one wins a tie.
    pub fn representative(&self) -> &str {
        self.members
            .iter()
            .fold(None::<&String>, |best, kw| match best {
                Some(b) if b.chars().count() >= kw.chars().count() => Some(b),
                _ => Some(kw),
            })
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// Partition keywords into similarity groups.
///
/// Each keyword is compared against the first member of every existing
/// group in creation order and joins the first group it matches; it never
/// moves afterwards.
pub fn group_keywords(keywords: &[String]) -> Vec<KeywordGroup> {
    let mut groups: Vec<KeywordGroup> = Vec::new();
    for keyword in keywords {
        let key = similarity_key(keyword);
        match groups.iter_mut().find(|g| is_similar(&key, &g.key)) {
            Some(group) => group.members.push(keyword.clone()),
            None => groups.push(KeywordGroup::new(keyword.clone())),
        }
    }
    groups
}

/// One representative per similarity group, in group-creation order.
pub fn group_similar(keywords: &[String]) -> Vec<String> {
    group_keywords(keywords)
        .iter()
        .map(|group| {
            let representative = group.representative();
            if group.members().len() > 1 {
                debug!(%representative, members = ?group.members(), "Collapsed similar keywords");
            }
            representative.to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn april_19() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 19).unwrap()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_tag() {
        assert_eq!(normalize_tag("김현승 전무"), "김현승전무");
        assert_eq!(normalize_tag("M&A 시장"), "ma시장");
        assert_eq!(normalize_tag("AI/ML 기술"), "aiml기술");
        assert_eq!(normalize_tag("  #2025_Tax!  "), "2025tax");
        assert_eq!(normalize_tag("ㄱㄴㄷ"), "");
    }

    #[test]
    fn test_normalize_tag_idempotent_and_restricted() {
        let inputs = [
            "Hello, World!",
            "삼성전자 관련주",
            "ÀÉÎ ÕÜ ß",
            "İstanbul 여행",
            "日本語 テスト 123",
            "tab\there\nnewline",
            "",
        ];
        for input in inputs {
            let once = normalize_tag(input);
            assert_eq!(normalize_tag(&once), once, "not idempotent for {input:?}");
            assert!(
                once.chars()
                    .all(|c| matches!(c, '가'..='힣' | 'a'..='z' | '0'..='9')),
                "unexpected character in {once:?}"
            );
        }
    }

    #[test]
    fn test_date_token_replaced() {
        let policy = PolicyConfig::default();
        assert_eq!(
            normalize_keyword_date("3월 10일 퀴즈", april_19(), &policy),
            "4월 19일 퀴즈"
        );
        assert_eq!(
            normalize_keyword_date("건강보험 3월 1일", april_19(), &policy),
            "건강보험 4월 19일"
        );
        assert_eq!(
            normalize_keyword_date("12월1일 지급일 안내", april_19(), &policy),
            "4월 19일 지급일 안내"
        );
    }

    #[test]
    fn test_quiz_without_date_gets_today() {
        let policy = PolicyConfig::default();
        assert_eq!(
            normalize_keyword_date("오늘의퀴즈", april_19(), &policy),
            "오늘의퀴즈 4월 19일"
        );
    }

    #[test]
    fn test_plain_keyword_untouched() {
        let policy = PolicyConfig::default();
        assert_eq!(
            normalize_keyword_date("삼성전자 관련주", april_19(), &policy),
            "삼성전자 관련주"
        );
    }

    #[test]
    fn test_quiz_with_date_rewrites_every_token() {
        let policy = PolicyConfig::default();
        assert_eq!(
            normalize_keyword_date(" 퀴즈 3월 1일 정답 3월  2일 ", april_19(), &policy),
            "퀴즈 4월 19일 정답 4월 19일"
        );
    }

    #[test]
    fn test_group_similar_example() {
        let groups = group_keywords(&strings(&["AI 투자", "AI투자 전략", "완전다른주제"]));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members().len(), 2);
        assert_eq!(groups[0].representative(), "AI투자 전략");
        assert_eq!(groups[1].representative(), "완전다른주제");
    }

    #[test]
    fn test_group_by_shared_characters() {
        // no substring relation, but "세" and "금" are shared
        let reps = group_similar(&strings(&["세금 환급", "종합소득세금"]));
        assert_eq!(reps, strings(&["종합소득세금"]));
    }

    #[test]
    fn test_short_keys_need_substring() {
        // both keys shorter than 3 characters: overlap alone is not enough
        let reps = group_similar(&strings(&["가나", "나가"]));
        assert_eq!(reps.len(), 2);
    }

    #[test]
    fn test_representative_tie_keeps_first() {
        let reps = group_similar(&strings(&["날씨 서울", "서울 날씨"]));
        assert_eq!(reps, strings(&["날씨 서울"]));
    }

    #[test]
    fn test_first_matching_group_wins() {
        let groups = group_keywords(&strings(&["사과", "배", "사과배"]));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members(), strings(&["사과", "사과배"]).as_slice());
    }

    #[test]
    fn test_collapse_and_strip() {
        assert_eq!(collapse_whitespace("  AI   투자 "), "AI 투자");
        assert_eq!(strip_spaces("AI 투자 전략"), "AI투자전략");
        assert_eq!(similarity_key("AI, 투자!"), "AI투자");
    }
}
