//! Structured pipeline events and the observer seam.
//!
//! The [`KeywordPipeline`](crate::pipeline::KeywordPipeline) does not log
//! its decisions directly. It emits a [`PipelineEvent`] for every skip,
//! post and failure to a [`PipelineObserver`], which keeps the decision
//! logic testable without capturing log output. In production the
//! [`TracingObserver`] turns each event into a structured `tracing` record.
//!
//! # Event Kinds
//!
//! | Event Kind | Description |
//! |------------|-------------|
//! | `run.fetch_failed` | Scraping failed; the run continues with no candidates |
//! | `run.started` | Candidates fetched for today's run |
//! | `keyword.blocked` | Candidate contains a blocklisted term |
//! | `keyword.annual_posted` | Annual topic already posted this year |
//! | `keyword.date_normalized` | Stale date token replaced with today's |
//! | `keywords.grouped` | Near-duplicates collapsed into representatives |
//! | `keywords.prioritized` | Annual topics moved to the front (Jan/Feb) |
//! | `worklist.ready` | Final ordered work list |
//! | `keyword.skipped` | Already posted today or this year |
//! | `keyword.repost_allowed` | Stock keyword reposted the same day |
//! | `keyword.processing` | Work on one keyword begins |
//! | `keyword.content_failed` | Body generation failed; keyword skipped |
//! | `keyword.tag_fallback` | Tag generation empty; keyword used as tag |
//! | `keyword.posted` | Published and recorded in the ledger |
//! | `keyword.publish_failed` | Destination refused or errored |
//! | `keyword.panicked` | Unexpected panic while processing a keyword |
//! | `run.cancelled` | Interrupt received; remaining keywords dropped |
//! | `run.aborted` | Fatal error ended the keyword loop |
//! | `run.completed` | Final counts for the run |

use chrono::NaiveDate;
use tracing::{debug, error, info, warn};

/// Where an annual-topic candidate was caught.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStage {
    /// Before date normalization, on the raw candidate.
    PreFilter,
    /// After grouping, on the representative.
    FinalPass,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    FetchFailed { reason: String },
    RunStarted { date: NaiveDate, candidates: usize },
    Blocked { keyword: String, term: String },
    AnnualAlreadyPosted { keyword: String, stage: FilterStage },
    DateNormalized { from: String, to: String },
    Grouped { before: usize, after: usize },
    Prioritized { annual: Vec<String> },
    WorkListReady { keywords: Vec<String> },
    SkippedAlreadyPosted { keyword: String, annual: bool },
    RepostAllowed { keyword: String },
    Processing {
        index: usize,
        total: usize,
        keyword: String,
        category: String,
        target_length: usize,
        quiz: bool,
        has_date: bool,
    },
    ContentFailed { keyword: String, reason: String },
    TagFallback { keyword: String, tag: String },
    Posted {
        keyword: String,
        title: String,
        tags: Vec<String>,
    },
    PublishFailed { keyword: String, reason: String },
    KeywordPanicked { keyword: String },
    Cancelled { remaining: usize },
    Aborted { reason: String },
    RunCompleted { considered: usize, posted: usize },
}

impl PipelineEvent {
    /// Stable dotted name of the event.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::FetchFailed { .. } => "run.fetch_failed",
            PipelineEvent::RunStarted { .. } => "run.started",
            PipelineEvent::Blocked { .. } => "keyword.blocked",
            PipelineEvent::AnnualAlreadyPosted { .. } => "keyword.annual_posted",
            PipelineEvent::DateNormalized { .. } => "keyword.date_normalized",
            PipelineEvent::Grouped { .. } => "keywords.grouped",
            PipelineEvent::Prioritized { .. } => "keywords.prioritized",
            PipelineEvent::WorkListReady { .. } => "worklist.ready",
            PipelineEvent::SkippedAlreadyPosted { .. } => "keyword.skipped",
            PipelineEvent::RepostAllowed { .. } => "keyword.repost_allowed",
            PipelineEvent::Processing { .. } => "keyword.processing",
            PipelineEvent::ContentFailed { .. } => "keyword.content_failed",
            PipelineEvent::TagFallback { .. } => "keyword.tag_fallback",
            PipelineEvent::Posted { .. } => "keyword.posted",
            PipelineEvent::PublishFailed { .. } => "keyword.publish_failed",
            PipelineEvent::KeywordPanicked { .. } => "keyword.panicked",
            PipelineEvent::Cancelled { .. } => "run.cancelled",
            PipelineEvent::Aborted { .. } => "run.aborted",
            PipelineEvent::RunCompleted { .. } => "run.completed",
        }
    }
}

/// Receives every decision the pipeline makes.
pub trait PipelineObserver {
    fn on_event(&self, event: &PipelineEvent);
}

/// Forwards pipeline events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        let event_kind = event.kind();
        match event {
            PipelineEvent::FetchFailed { reason } => {
                error!(event_kind, %reason, "Keyword scraping failed; proceeding without keywords")
            }
            PipelineEvent::RunStarted { date, candidates } => {
                info!(event_kind, %date, candidates, "Trend run started")
            }
            PipelineEvent::Blocked { keyword, term } => {
                info!(event_kind, %keyword, %term, "Skipping keyword containing blocked term")
            }
            PipelineEvent::AnnualAlreadyPosted { keyword, stage } => {
                info!(event_kind, %keyword, ?stage, "Annual keyword already posted this year")
            }
            PipelineEvent::DateNormalized { from, to } => {
                debug!(event_kind, %from, %to, "Replaced keyword date")
            }
            PipelineEvent::Grouped { before, after } => {
                info!(event_kind, before, after, removed = before.saturating_sub(*after), "Grouped similar keywords")
            }
            PipelineEvent::Prioritized { annual } => {
                info!(event_kind, count = annual.len(), ?annual, "Prioritizing annual keywords")
            }
            PipelineEvent::WorkListReady { keywords } => {
                info!(event_kind, count = keywords.len(), ?keywords, "Keywords to handle")
            }
            PipelineEvent::SkippedAlreadyPosted { keyword, annual } => {
                info!(event_kind, %keyword, annual, "Skipping keyword already posted")
            }
            PipelineEvent::RepostAllowed { keyword } => {
                info!(event_kind, %keyword, "Already posted today, reposting stock keyword")
            }
            PipelineEvent::Processing {
                index,
                total,
                keyword,
                category,
                target_length,
                quiz,
                has_date,
            } => info!(
                event_kind,
                index = index + 1,
                total,
                %keyword,
                %category,
                target_length,
                quiz,
                has_date,
                "Processing keyword"
            ),
            PipelineEvent::ContentFailed { keyword, reason } => {
                warn!(event_kind, %keyword, %reason, "Content generation failed; skipping keyword")
            }
            PipelineEvent::TagFallback { keyword, tag } => {
                warn!(event_kind, %keyword, %tag, "Tag generation empty; using keyword as tag")
            }
            PipelineEvent::Posted {
                keyword,
                title,
                tags,
            } => info!(event_kind, %keyword, %title, ?tags, "Posted keyword"),
            PipelineEvent::PublishFailed { keyword, reason } => {
                warn!(event_kind, %keyword, %reason, "Failed to post keyword")
            }
            PipelineEvent::KeywordPanicked { keyword } => {
                error!(event_kind, %keyword, "Unexpected panic while processing keyword; continuing")
            }
            PipelineEvent::Cancelled { remaining } => {
                warn!(event_kind, remaining, "Interrupt received; stopping keyword processing")
            }
            PipelineEvent::Aborted { reason } => {
                error!(event_kind, %reason, "Run aborted")
            }
            PipelineEvent::RunCompleted { considered, posted } => {
                info!(event_kind, considered, posted, "Trend run finished")
            }
        }
    }
}
