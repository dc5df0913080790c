//! Keyword policy configuration.
//!
//! Every term list the pipeline consults lives in [`PolicyConfig`]: the
//! blocklist, the annual-topic terms, quiz and stock markers, the length
//! categories and the scrape placeholders. The value is built once at
//! startup (from built-in defaults or a YAML file) and passed by reference
//! into the [`Classifier`](crate::classifier::Classifier) and
//! [`KeywordPipeline`](crate::pipeline::KeywordPipeline).
//!
//! # YAML Layout
//!
//! Any field may be omitted; omitted fields keep their defaults.
//!
//! ```yaml
//! blocklist: ["도박", "마약"]
//! annual_terms: ["연말정산", "건강보험"]
//! quiz_markers: ["퀴즈"]
//! stock_markers: ["관련주"]
//! default_length: 400
//! categories:
//!   - name: quiz
//!     length: 300
//!     terms: ["퀴즈", "이벤트"]
//! ```

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::Path;
use tracing::{info, instrument};

/// A content-length category tested by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CategoryRule {
    /// Category label used in logs and reports.
    pub name: String,
    /// Target body length in characters.
    pub length: usize,
    /// Substrings that place a keyword in this category.
    pub terms: Vec<String>,
}

impl CategoryRule {
    fn new(name: &str, length: usize, terms: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            length,
            terms: to_strings(terms),
        }
    }

    /// `true` if the keyword contains any of this category's terms.
    pub fn matches(&self, keyword: &str) -> bool {
        self.terms.iter().any(|t| keyword.contains(t.as_str()))
    }
}

/// Immutable keyword policy shared by the classifier and pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Forbidden substrings; a candidate containing any of them is dropped.
    pub blocklist: Vec<String>,
    /// Recurring once-a-year subjects (tax, pension, insurance terms).
    pub annual_terms: Vec<String>,
    /// Terms marking quiz keywords, which always get today's date injected.
    pub quiz_markers: Vec<String>,
    /// Terms marking stock keywords, which may be reposted the same day.
    pub stock_markers: Vec<String>,
    /// Length categories in precedence order; the first match wins.
    pub categories: Vec<CategoryRule>,
    /// Length used when no category matches.
    pub default_length: usize,
    /// Dashboard header strings that show up when extraction misfires.
    pub placeholder_terms: Vec<String>,
    /// Below this many valid candidates the scraper pages back one view.
    pub min_candidates: usize,
    /// Annual topics are moved to the front during months `1..=priority_months`.
    pub priority_months: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            blocklist: to_strings(&[
                "자살",
                "살해",
                "성폭행",
                "불법",
                "마약",
                "범죄",
                "성인",
                "도박",
                "음란",
                "포르노",
                "성매매",
                "주식 리딩방",
                "투자 사기",
                "선물 사기",
            ]),
            annual_terms: to_strings(&[
                "건강보험",
                "연말정산",
                "종합소득세",
                "국민연금",
                "의료보험",
                "근로소득세",
                "퇴직금",
                "소득공제",
                "세금",
                "공제",
                "세액공제",
                "지급일",
                "납부일",
            ]),
            quiz_markers: to_strings(&["퀴즈"]),
            stock_markers: to_strings(&["관련주"]),
            categories: vec![
                CategoryRule::new(
                    "quiz",
                    300,
                    &["퀴즈", "이벤트", "정답", "맞추기", "축구퀴즈", "비트버니"],
                ),
                CategoryRule::new(
                    "policy",
                    500,
                    &[
                        "정책", "지원", "연말정산", "신청", "세금", "공제", "제도", "지급일",
                        "실업급여", "국민연금", "건강보험", "지원금", "복지",
                    ],
                ),
                CategoryRule::new(
                    "politics",
                    500,
                    &[
                        "대통령",
                        "후보",
                        "이재명",
                        "윤석열",
                        "정부",
                        "대선",
                        "총선",
                        "선거",
                        "윤심",
                        "국민의힘",
                        "더불어민주당",
                        "의원",
                        "대통령실",
                        "청와대",
                        "국회",
                        "관련주",
                        "홍준표",
                        "대변인",
                        "정치",
                        "장관",
                    ],
                ),
                CategoryRule::new(
                    "financial",
                    450,
                    &[
                        "주식",
                        "투자",
                        "금융",
                        "금리",
                        "은행",
                        "배당금",
                        "코스피",
                        "코스닥",
                        "채권",
                        "펀드",
                        "자산",
                        "부동산",
                        "청년내일저축",
                        "파킹통장",
                        "계좌",
                        "돈나무",
                        "입출금",
                        "kb",
                        "하나",
                        "신한",
                        "삼성전자",
                        "증권",
                        "보험",
                    ],
                ),
            ],
            default_length: 400,
            placeholder_terms: to_strings(&[
                "검색 유입 트렌드",
                "메인 유입 트렌드",
                "주제별 비교",
                "주제별 트렌드",
                "주제별 인기유입검색어",
                "성별,연령별 인기유입검색어",
                "성별, 연령별 인기유입검색어",
            ]),
            min_candidates: 20,
            priority_months: 2,
        }
    }
}

impl PolicyConfig {
    /// Load a policy from a YAML file, filling omitted fields with defaults.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let policy = Self::from_yaml(&raw)?;
        info!(
            blocklist = policy.blocklist.len(),
            annual_terms = policy.annual_terms.len(),
            categories = policy.categories.len(),
            "Loaded keyword policy"
        );
        Ok(policy)
    }

    /// Parse a policy from YAML text.
    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    /// First blocklisted term contained in the keyword, if any.
    pub fn blocked_term(&self, keyword: &str) -> Option<&str> {
        self.blocklist
            .iter()
            .map(String::as_str)
            .find(|term| keyword.contains(term))
    }

    pub fn is_annual(&self, keyword: &str) -> bool {
        self.annual_terms.iter().any(|t| keyword.contains(t.as_str()))
    }

    pub fn is_quiz(&self, keyword: &str) -> bool {
        self.quiz_markers.iter().any(|t| keyword.contains(t.as_str()))
    }

    pub fn is_stock_related(&self, keyword: &str) -> bool {
        self.stock_markers.iter().any(|t| keyword.contains(t.as_str()))
    }

    /// `true` if the text contains one of the dashboard placeholder strings.
    pub fn is_placeholder(&self, text: &str) -> bool {
        self.placeholder_terms
            .iter()
            .any(|t| text.contains(t.as_str()))
    }
}

fn to_strings(terms: &[&str]) -> Vec<String> {
    terms.iter().map(|t| t.to_string()).collect()
}
