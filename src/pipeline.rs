//! Keyword pipeline: from scraped candidates to published posts.
//!
//! One run walks these steps in order:
//!
//! 1. **Fetch** candidates from the [`TrendSource`]; a failure means zero work
//! 2. **Blocklist**: drop candidates containing a forbidden term
//! 3. **Annual pre-filter**: drop annual topics already posted this year
//! 4. **Date-normalize** every survivor to today's `M월 D일`
//! 5. **Deduplicate** exact strings, then **group** near-duplicates
//! 6. **Seasonal reorder**: annual topics first in January and February
//! 7. **Final pass**: re-check annual topics against this year's posts
//! 8. **Post** each keyword in order: dedup check, classify, generate body
//!    and tags, publish, then append to the ledger
//!
//! Steps 2-7 are pure ([`KeywordPipeline::prepare`]). Step 8 is strictly
//! sequential: every external call completes before the next starts. A
//! record is appended only after its publish succeeded, and before the next
//! keyword is touched.
//!
//! # Failure Policy
//!
//! | Failure | Effect |
//! |---------|--------|
//! | Publisher login refused | Run aborts before fetching |
//! | Fetch fails | Empty candidate list, run continues |
//! | Body generation fails | That keyword is skipped |
//! | Tag generation empty | Keyword itself becomes the only tag |
//! | Publish fails | That keyword is skipped |
//! | Panic while processing a keyword | That keyword is skipped |
//! | Publish auth rejected | Run aborts |
//! | Ledger append exhausted | Run aborts |

use crate::api::ContentGenerator;
use crate::classifier::Classifier;
use crate::config::PolicyConfig;
use crate::errors::RunError;
use crate::events::{FilterStage, PipelineEvent, PipelineObserver};
use crate::ledger::{Ledger, RunState};
use crate::models::{RunSummary, WorkItem};
use crate::normalizer::{group_similar, normalize_keyword_date, normalize_tag, strip_spaces};
use crate::publisher::Publisher;
use crate::scrapers::TrendSource;
use crate::utils::title_date;
use chrono::Datelike;
use futures::FutureExt;
use itertools::Itertools;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::sleep;

/// Where the candidates come from.
#[derive(Debug, Clone)]
pub struct TrendTarget {
    pub url: String,
    pub selector: String,
}

/// The external capabilities and shared resources for one run.
pub struct RunContext<'a, S, G, P> {
    pub source: &'a S,
    pub generator: &'a G,
    pub publisher: &'a P,
    pub ledger: &'a Ledger,
    pub cancel: &'a AtomicBool,
}

/// How one keyword ended, short of a fatal error.
#[derive(Debug)]
enum KeywordOutcome {
    Posted { title: String, tags: Vec<String> },
    ContentFailed(String),
    PublishFailed(String),
}

pub struct KeywordPipeline<'a, O> {
    policy: &'a PolicyConfig,
    classifier: Classifier<'a>,
    observer: &'a O,
    post_delay: Duration,
}

impl<'a, O: PipelineObserver> KeywordPipeline<'a, O> {
    pub fn new(policy: &'a PolicyConfig, observer: &'a O, post_delay: Duration) -> Self {
        Self {
            policy,
            classifier: Classifier::new(policy),
            observer,
            post_delay,
        }
    }

    fn emit(&self, event: PipelineEvent) {
        self.observer.on_event(&event);
    }

    /// Turn raw candidates into the ordered work list.
    pub fn prepare(&self, raw: Vec<String>, state: &RunState) -> Vec<WorkItem> {
        let policy = self.policy;

        let allowed: Vec<String> = raw
            .into_iter()
            .filter(|kw| match policy.blocked_term(kw) {
                Some(term) => {
                    self.emit(PipelineEvent::Blocked {
                        keyword: kw.clone(),
                        term: term.to_string(),
                    });
                    false
                }
                None => true,
            })
            .filter(|kw| {
                let posted = policy.is_annual(kw) && {
                    let bare = strip_spaces(kw);
                    state
                        .annual_this_year
                        .iter()
                        .any(|p| bare.contains(&strip_spaces(p)))
                };
                if posted {
                    self.emit(PipelineEvent::AnnualAlreadyPosted {
                        keyword: kw.clone(),
                        stage: FilterStage::PreFilter,
                    });
                }
                !posted
            })
            .collect();

        let dated: Vec<String> = allowed
            .into_iter()
            .map(|kw| {
                let normalized = normalize_keyword_date(&kw, state.today, policy);
                if normalized != kw {
                    self.emit(PipelineEvent::DateNormalized {
                        from: kw,
                        to: normalized.clone(),
                    });
                }
                normalized
            })
            .collect();

        let unique: Vec<String> = dated.into_iter().sorted().dedup().collect();
        let grouped = group_similar(&unique);
        self.emit(PipelineEvent::Grouped {
            before: unique.len(),
            after: grouped.len(),
        });

        let ordered = if state.today.month() <= policy.priority_months {
            let (annual, other): (Vec<String>, Vec<String>) =
                grouped.into_iter().partition(|kw| policy.is_annual(kw));
            if !annual.is_empty() {
                self.emit(PipelineEvent::Prioritized {
                    annual: annual.clone(),
                });
            }
            annual.into_iter().chain(other).collect()
        } else {
            grouped
        };

        let items: Vec<WorkItem> = ordered
            .into_iter()
            .filter(|kw| {
                let posted = policy.is_annual(kw) && self.matches_posted_annual(kw, state);
                if posted {
                    self.emit(PipelineEvent::AnnualAlreadyPosted {
                        keyword: kw.clone(),
                        stage: FilterStage::FinalPass,
                    });
                }
                !posted
            })
            .map(|kw| WorkItem::new(&kw, policy, &self.classifier))
            .collect();

        self.emit(PipelineEvent::WorkListReady {
            keywords: items.iter().map(|i| i.text().to_string()).collect(),
        });
        items
    }

    /// Exact (case- and edge-whitespace-insensitive) or substring match
    /// against this year's annual posts.
    fn matches_posted_annual(&self, keyword: &str, state: &RunState) -> bool {
        let kw = keyword.trim().to_lowercase();
        state.annual_this_year.iter().any(|posted| {
            let posted = posted.trim().to_lowercase();
            kw == posted || kw.contains(&posted)
        })
    }

    /// One publisher session around [`execute`](Self::execute): log in,
    /// run, and close the session exactly once whatever the outcome. A
    /// refused login ends the run before any keyword is fetched.
    pub async fn run_session<S, G, P>(
        &self,
        ctx: &RunContext<'_, S, G, P>,
        target: &TrendTarget,
        state: &mut RunState,
        summary: &mut RunSummary,
    ) -> Result<(), RunError>
    where
        S: TrendSource,
        G: ContentGenerator,
        P: Publisher,
    {
        let result = match ctx.publisher.login().await {
            Ok(()) => self.execute(ctx, target, state, summary).await,
            Err(e) => {
                let fatal = RunError::Auth(e.to_string());
                summary.aborted = Some(fatal.to_string());
                self.emit(PipelineEvent::Aborted {
                    reason: fatal.to_string(),
                });
                Err(fatal)
            }
        };
        ctx.publisher.close().await;
        result
    }

    /// Full run: fetch, prepare, post.
    ///
    /// `summary` is filled in as the run goes, so it holds accurate counts
    /// even when a fatal error cuts the run short.
    pub async fn execute<S, G, P>(
        &self,
        ctx: &RunContext<'_, S, G, P>,
        target: &TrendTarget,
        state: &mut RunState,
        summary: &mut RunSummary,
    ) -> Result<(), RunError>
    where
        S: TrendSource,
        G: ContentGenerator,
        P: Publisher,
    {
        let raw = match ctx.source.fetch_candidates(&target.url, &target.selector).await {
            Ok(raw) => raw,
            Err(e) => {
                self.emit(PipelineEvent::FetchFailed {
                    reason: e.to_string(),
                });
                Vec::new()
            }
        };
        summary.date = state.today.to_string();
        summary.candidates = raw.len();
        self.emit(PipelineEvent::RunStarted {
            date: state.today,
            candidates: raw.len(),
        });

        let items = self.prepare(raw, state);
        let result = self.process(ctx, &items, state, summary).await;

        if let Err(e) = &result {
            summary.aborted = Some(e.to_string());
            self.emit(PipelineEvent::Aborted {
                reason: e.to_string(),
            });
        }
        self.emit(PipelineEvent::RunCompleted {
            considered: summary.considered,
            posted: summary.posted,
        });
        result
    }

    /// Post every work item in order.
    pub async fn process<S, G, P>(
        &self,
        ctx: &RunContext<'_, S, G, P>,
        items: &[WorkItem],
        state: &mut RunState,
        summary: &mut RunSummary,
    ) -> Result<(), RunError>
    where
        G: ContentGenerator,
        P: Publisher,
    {
        summary.considered = items.len();
        let today_title = title_date(state.today);

        for (index, item) in items.iter().enumerate() {
            if ctx.cancel.load(Ordering::SeqCst) {
                summary.cancelled = true;
                self.emit(PipelineEvent::Cancelled {
                    remaining: items.len() - index,
                });
                break;
            }

            let keyword = item.text();
            if state.is_already_posted(keyword, self.policy) && !item.keyword.stock_related {
                summary.skipped += 1;
                self.emit(PipelineEvent::SkippedAlreadyPosted {
                    keyword: keyword.to_string(),
                    annual: item.keyword.annual,
                });
                continue;
            }
            if item.keyword.stock_related && state.posted_today(keyword) {
                self.emit(PipelineEvent::RepostAllowed {
                    keyword: keyword.to_string(),
                });
            }

            self.emit(PipelineEvent::Processing {
                index,
                total: items.len(),
                keyword: keyword.to_string(),
                category: item.category.clone(),
                target_length: item.target_length,
                quiz: item.keyword.quiz,
                has_date: item.keyword.has_date,
            });

            let attempt = AssertUnwindSafe(self.process_one(ctx, item, &today_title))
                .catch_unwind()
                .await;

            let published = match attempt {
                Err(_) => {
                    summary.failed += 1;
                    self.emit(PipelineEvent::KeywordPanicked {
                        keyword: keyword.to_string(),
                    });
                    false
                }
                Ok(Err(fatal)) => return Err(fatal),
                Ok(Ok(KeywordOutcome::ContentFailed(reason))) => {
                    summary.failed += 1;
                    self.emit(PipelineEvent::ContentFailed {
                        keyword: keyword.to_string(),
                        reason,
                    });
                    false
                }
                Ok(Ok(KeywordOutcome::PublishFailed(reason))) => {
                    summary.failed += 1;
                    self.emit(PipelineEvent::PublishFailed {
                        keyword: keyword.to_string(),
                        reason,
                    });
                    true
                }
                Ok(Ok(KeywordOutcome::Posted { title, tags })) => {
                    ctx.ledger.append(state.today, keyword).await?;
                    state.record(keyword, self.policy);
                    summary.posted += 1;
                    self.emit(PipelineEvent::Posted {
                        keyword: keyword.to_string(),
                        title,
                        tags,
                    });
                    true
                }
            };

            if published && index + 1 < items.len() && !self.post_delay.is_zero() {
                sleep(self.post_delay).await;
            }
        }
        Ok(())
    }

    async fn process_one<S, G, P>(
        &self,
        ctx: &RunContext<'_, S, G, P>,
        item: &WorkItem,
        today_title: &str,
    ) -> Result<KeywordOutcome, RunError>
    where
        G: ContentGenerator,
        P: Publisher,
    {
        let keyword = item.text();
        let content = match ctx
            .generator
            .generate_content(keyword, today_title, item.target_length)
            .await
        {
            Ok(content) => content,
            Err(e) => return Ok(KeywordOutcome::ContentFailed(e.to_string())),
        };

        let mut tags = ctx.generator.generate_tags(&content).await;
        if tags.is_empty() {
            let fallback = fallback_tag(keyword);
            self.emit(PipelineEvent::TagFallback {
                keyword: keyword.to_string(),
                tag: fallback.clone(),
            });
            tags = vec![fallback];
        }

        let title = post_title(keyword, today_title);
        match ctx.publisher.publish(&title, &content, &tags).await {
            Ok(()) => Ok(KeywordOutcome::Posted { title, tags }),
            Err(e) if e.is_fatal() => Err(RunError::Auth(e.to_string())),
            Err(e) => Ok(KeywordOutcome::PublishFailed(e.to_string())),
        }
    }
}

/// `<keyword> 최신 동향 (<YYYY년 MM월 DD일>)`
pub fn post_title(keyword: &str, today_title: &str) -> String {
    format!("{keyword} 최신 동향 ({today_title})")
}

/// Single tag used when tag generation comes back empty.
fn fallback_tag(keyword: &str) -> String {
    let tag = normalize_tag(keyword);
    if tag.is_empty() {
        strip_spaces(keyword)
    } else {
        tag
    }
}
