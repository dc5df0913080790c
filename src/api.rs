//! LLM content and tag generation with exponential backoff retry logic.
//!
//! This module provides the [`ContentGenerator`] capability the pipeline
//! consumes, backed by an OpenAI-compatible LLM API through `awful_aj`.
//! Two independently configured clients are used: one writes the post body,
//! the other derives tags from that body.
//!
//! # Architecture
//!
//! - [`AskAsync`]: Core trait defining async LLM interaction
//! - [`AskFnWrapper`]: Wraps the `awful_aj` library's `ask` function
//! - [`RetryAsk`]: Decorator that adds retry logic to any `AskAsync` implementation
//! - [`LlmContentGenerator`]: Prompt construction and response clean-up
//!
//! # Retry Strategy
//!
//! - Maximum 5 retry attempts
//! - Exponential backoff starting at 1 second
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use crate::errors::GenerateError;
use crate::normalizer::normalize_tag;
use crate::utils::truncate_for_log;
use awful_aj::api::ask;
use awful_aj::{config, config::AwfulJadeConfig, template, template::ChatTemplate};
use itertools::Itertools;
use once_cell::sync::Lazy;
use rand::{Rng, rng};
use regex::Regex;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Characters reserved for the reference list when sizing the body.
const REFERENCE_ALLOWANCE: usize = 150;
/// Smallest body length ever requested.
const MIN_BODY_LENGTH: usize = 300;

static REFERENCES_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)참고문헌\s*|references\s*").expect("references heading pattern"));
static CITATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("citation pattern"));
static REFERENCE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\[(\d+)\]").expect("reference line pattern"));
/// `[n] 출처명, "제목", https://...` at the start of a line.
static REFERENCE_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*\[\d+\][ \t]+[\w \t]+,[ \t]+"[^"]+",[ \t]+https?://\S+"#)
        .expect("reference entry pattern")
});

/// Text-generation capability consumed by the pipeline.
///
/// Treated as slow and unreliable; the pipeline performs no retries of its
/// own beyond what an implementation does internally.
pub trait ContentGenerator {
    /// Write a post body about `keyword`, dated `today`, of roughly
    /// `target_length` characters.
    async fn generate_content(
        &self,
        keyword: &str,
        today: &str,
        target_length: usize,
    ) -> Result<String, GenerateError>;

    /// Candidate tags for a post body. Empty on failure.
    async fn generate_tags(&self, content: &str) -> Vec<String>;
}

/// Trait for async LLM interaction.
///
/// Implementors of this trait can send text to an LLM and receive a response.
/// This abstraction allows for different LLM backends or decorators (like retry logic).
pub trait AskAsync {
    /// The type of response returned by the LLM.
    type Response;

    /// Send text to the LLM and receive a response.
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
///
/// The delay between retries follows this formula:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryAsk<T> {
    /// The underlying LLM client to wrap.
    inner: T,
    /// Maximum number of retry attempts before giving up.
    max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    base_delay: StdDuration,
    /// Maximum delay cap to prevent excessive waiting.
    max_delay: StdDuration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync + fmt::Debug,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.ask(text).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "ask() exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self
                        .base_delay
                        .saturating_mul(1 << (attempt - 1).min(16))
                        .min(self.max_delay);
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Wrapper around `awful_aj::api::ask` that implements [`AskAsync`].
#[derive(Debug)]
pub struct AskFnWrapper<'a> {
    /// LLM configuration (API key, endpoint, model settings).
    pub config: &'a AwfulJadeConfig,
    /// Chat template defining the system prompt and conversation structure.
    pub template: &'a ChatTemplate,
}

impl AskAsync for AskFnWrapper<'_> {
    type Response = String;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let res = ask(self.config, text.to_string(), self.template, None, None).await;
        if let Err(e) = &res {
            warn!(elapsed_ms = t0.elapsed().as_millis() as u64, error = %e, "API call failed");
        }
        res
    }
}

/// One LLM endpoint: its configuration and the template it is driven with.
#[derive(Debug)]
pub struct LlmEndpoint {
    pub config: AwfulJadeConfig,
    pub template: ChatTemplate,
}

impl LlmEndpoint {
    /// Load an `awful_aj` config file and a named template.
    #[instrument(level = "info")]
    pub async fn load(config_path: &str, template_name: &str) -> Result<Self, Box<dyn Error>> {
        let config = config::load_config(config_path)?;
        let template = template::load_template(template_name).await?;
        info!(config_path, template_name, "Loaded LLM endpoint");
        Ok(Self { config, template })
    }

    async fn ask_with_backoff(&self, text: &str) -> Result<String, Box<dyn Error>> {
        let t0 = Instant::now();
        let client = AskFnWrapper {
            config: &self.config,
            template: &self.template,
        };
        let api = RetryAsk::new(client, 5, StdDuration::from_secs(1));
        let res = api.ask(text).await;
        let elapsed_ms_total = t0.elapsed().as_millis() as u64;
        match &res {
            Ok(_) => info!(elapsed_ms_total, "ask_with_backoff succeeded"),
            Err(e) => error!(elapsed_ms_total, error = %e, "ask_with_backoff failed"),
        }
        res
    }
}

/// [`ContentGenerator`] backed by two LLM endpoints.
#[derive(Debug)]
pub struct LlmContentGenerator {
    body: LlmEndpoint,
    tags: LlmEndpoint,
}

impl LlmContentGenerator {
    pub fn new(body: LlmEndpoint, tags: LlmEndpoint) -> Self {
        Self { body, tags }
    }
}

impl ContentGenerator for LlmContentGenerator {
    #[instrument(level = "info", skip(self))]
    async fn generate_content(
        &self,
        keyword: &str,
        today: &str,
        target_length: usize,
    ) -> Result<String, GenerateError> {
        let body_length = adjusted_target_length(target_length);
        let prompt = content_prompt(keyword, today, body_length);
        let raw = self
            .body
            .ask_with_backoff(&prompt)
            .await
            .map_err(|e| GenerateError::Failed(e.to_string()))?;
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(GenerateError::Empty);
        }
        debug!(excerpt = %truncate_for_log(raw, 100), "Generated body");
        Ok(tidy_references(raw, body_length))
    }

    #[instrument(level = "info", skip_all)]
    async fn generate_tags(&self, content: &str) -> Vec<String> {
        match self.tags.ask_with_backoff(&tag_prompt(content)).await {
            Ok(raw) => {
                let tags = parse_tags(&raw);
                info!(?tags, "Generated tags");
                tags
            }
            Err(e) => {
                warn!(error = %e, "Tag generation failed");
                Vec::new()
            }
        }
    }
}

/// Body length to ask for once room for the reference list is set aside.
pub fn adjusted_target_length(target_length: usize) -> usize {
    target_length
        .saturating_sub(REFERENCE_ALLOWANCE)
        .max(MIN_BODY_LENGTH)
}

fn content_prompt(keyword: &str, today: &str, body_length: usize) -> String {
    format!(
        "오늘은 {today}입니다.\n\n\
         1. '{keyword}'에 대해 최근 48시간 이내에 나온 신뢰할 수 있는 웹 자료를 조사하고, \
         여러 출처에서 공통으로 확인되는 핵심 내용을 종합하세요.\n\
         2. 종합한 내용만으로 본문을 {body_length}자(±10%) 분량으로 작성하세요. \
         서론, 본론(최신 동향, 주요 영향, 전망), 결론 구조를 갖추세요.\n\
         3. 본문에서 인용한 정보에는 [1], [2] 형식의 번호를 붙이세요.\n\
         4. 본문 뒤에 빈 줄 두 개를 두고 \"참고문헌\" 제목 아래 출처를 번호 순서대로 \
         `[번호] 출처명, \"제목\", URL (날짜)` 형식으로 나열하세요.\n\n\
         제약: 검색 결과에 없는 내용은 쓰지 마세요. {today} 기준 48시간 이내의 출처만 사용하세요. \
         응답에는 본문과 참고문헌만 포함하고 제목이나 태그는 넣지 마세요. \
         본문에서 인용한 번호의 참고문헌은 빠짐없이 제공하세요."
    )
}

fn tag_prompt(content: &str) -> String {
    format!(
        "다음 블로그 글에 어울리는 태그를 5~10개 만들어 콤마(,)로 구분해 답하세요. \
         각 태그는 2~15자, 공백과 특수문자 없이 한글 또는 소문자 영문으로만 씁니다. \
         예: \"김현승 전무\" -> 김현승전무, \"M&A 시장\" -> ma시장\n\n\
         블로그 내용:\n{content}"
    )
}

/// Split a comma-separated tag response into normalized, unique tags.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(normalize_tag)
        .filter(|tag| !tag.is_empty())
        .unique()
        .collect()
}

/// Re-emit the body with a canonical `참고문헌` section.
///
/// The reference list starts at a `참고문헌`/`references` heading or,
/// failing that, at the first line shaped like `[n] 출처, "제목", URL`.
/// Logs a warning when a citation used in the body has no matching entry
/// in the reference list, and when the body length is more than 20% off
/// the requested length. Content with neither is returned unchanged.
pub fn tidy_references(content: &str, body_length: usize) -> String {
    let Some((main, references)) = split_references(content) else {
        warn!("No references section found in generated content");
        return content.to_string();
    };

    let cited: BTreeSet<u32> = CITATION
        .captures_iter(main)
        .filter_map(|c| c[1].parse().ok())
        .collect();
    let listed: BTreeSet<u32> = references
        .lines()
        .filter_map(|line| REFERENCE_LINE.captures(line))
        .filter_map(|c| c[1].parse().ok())
        .collect();
    let missing: Vec<_> = cited.difference(&listed).collect();
    if !missing.is_empty() {
        warn!(?missing, "Reference section might be incomplete");
    }

    let main_length = main.chars().count();
    if main_length.abs_diff(body_length) * 5 > body_length {
        warn!(main_length, body_length, "Body length differs significantly from target");
    }

    format!("{}\n\n참고문헌\n{}", main.trim_end(), references)
}

/// Body and reference list, both trimmed.
fn split_references(content: &str) -> Option<(&str, &str)> {
    let mut parts = REFERENCES_HEADING.splitn(content, 2);
    let main = parts.next().unwrap_or_default();
    if let Some(references) = parts.next() {
        return Some((main.trim(), references.trim()));
    }

    let entry = REFERENCE_ENTRY.find(content)?;
    let main = content[..entry.start()].trim();
    if main.is_empty() {
        return None;
    }
    info!("Reference list found without a heading");
    Some((main, content[entry.start()..].trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug)]
    struct Flaky {
        failures: usize,
        calls: Cell<usize>,
    }

    impl AskAsync for Flaky {
        type Response = String;

        async fn ask(&self, text: &str) -> Result<String, Box<dyn Error>> {
            let n = self.calls.get() + 1;
            self.calls.set(n);
            if n <= self.failures {
                Err(format!("transient failure {n}").into())
            } else {
                Ok(text.to_uppercase())
            }
        }
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let flaky = Flaky {
            failures: 2,
            calls: Cell::new(0),
        };
        let api = RetryAsk::new(flaky, 5, StdDuration::ZERO);
        assert_eq!(api.ask("ok").await.unwrap(), "OK");
        assert_eq!(api.inner.calls.get(), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let flaky = Flaky {
            failures: 10,
            calls: Cell::new(0),
        };
        let api = RetryAsk::new(flaky, 1, StdDuration::ZERO);
        assert!(api.ask("nope").await.is_err());
        assert_eq!(api.inner.calls.get(), 2);
    }

    #[test]
    fn test_adjusted_target_length() {
        assert_eq!(adjusted_target_length(500), 350);
        assert_eq!(adjusted_target_length(400), 300);
        assert_eq!(adjusted_target_length(300), 300);
        assert_eq!(adjusted_target_length(0), 300);
    }

    #[test]
    fn test_parse_tags() {
        let tags = parse_tags(" 김현승 전무, M&A 시장 , , AI/ML 기술, ma시장, ### ");
        assert_eq!(tags, vec!["김현승전무", "ma시장", "aiml기술"]);
        assert!(parse_tags("").is_empty());
    }

    #[test]
    fn test_tidy_references_rejoins_sections() {
        let content = "본문입니다 [1] 그리고 [2].\n\n\nReferences\n[1] 신문, \"기사\", https://a.example (2025.04.19)\n[2] 방송, \"뉴스\", https://b.example (2025.04.19)";
        let tidy = tidy_references(content, 300);
        assert!(tidy.starts_with("본문입니다 [1] 그리고 [2]."));
        assert!(tidy.contains("\n\n참고문헌\n"));
        assert!(tidy.ends_with("(2025.04.19)"));
        assert!(!tidy.contains("References"));
    }

    #[test]
    fn test_tidy_references_finds_unheaded_list() {
        let content = "본문 [1] 내용과 [2] 내용.\n\n[1] 연합뉴스, \"금리 동결\", https://a.example/1 (2025.04.19)\n[2] KBS 뉴스, \"시장 반응\", https://b.example/2 (2025.04.18)";
        let tidy = tidy_references(content, 300);
        assert_eq!(
            tidy,
            "본문 [1] 내용과 [2] 내용.\n\n참고문헌\n[1] 연합뉴스, \"금리 동결\", https://a.example/1 (2025.04.19)\n[2] KBS 뉴스, \"시장 반응\", https://b.example/2 (2025.04.18)"
        );
    }

    #[test]
    fn test_inline_citations_alone_are_not_a_reference_list() {
        let content = "본문 [1] 인용만 있고 출처 목록은 없음";
        assert_eq!(tidy_references(content, 300), content);
    }

    #[test]
    fn test_tidy_references_without_heading_is_unchanged() {
        let content = "참고할 출처가 없는 본문";
        assert_eq!(tidy_references(content, 300), content);
    }

    #[test]
    fn test_prompts_mention_inputs() {
        let prompt = content_prompt("AI 투자", "2025년 04월 19일", 350);
        assert!(prompt.contains("'AI 투자'"));
        assert!(prompt.contains("350자"));
        assert!(prompt.contains("2025년 04월 19일"));
        assert!(tag_prompt("본문").ends_with("본문"));
    }
}
