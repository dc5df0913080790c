//! # Trend Blogger
//!
//! Turns today's trending search keywords into blog posts, once per keyword
//! per day (once per year for annual topics), using a plain-text posting
//! ledger as the memory of what has already been published.
//!
//! ## Usage
//!
//! ```sh
//! trend_blogger --content-config body.yaml --tag-config tags.yaml
//! trend_blogger --content-config body.yaml --tag-config tags.yaml --daily-at 01:00
//! ```
//!
//! ## Architecture
//!
//! Each run goes through these phases:
//! 1. **Setup**: credentials and LLM configs must load before anything else
//! 2. **Ledger**: compact the posting ledger, load today's and this year's posts
//! 3. **Login**: open the blog session; refusal ends the run
//! 4. **Pipeline**: scrape, filter, group and post keywords one at a time
//! 5. **Cleanup**: close the session, log the summary, write the report

use chrono::NaiveTime;
use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod classifier;
mod cli;
mod config;
mod errors;
mod events;
mod ledger;
mod models;
mod normalizer;
mod pipeline;
mod publisher;
mod report;
mod scrapers;
mod utils;

use api::{LlmContentGenerator, LlmEndpoint};
use cli::Cli;
use config::PolicyConfig;
use errors::{LedgerError, RunError};
use events::TracingObserver;
use ledger::{Ledger, RunState};
use models::RunSummary;
use pipeline::{KeywordPipeline, RunContext, TrendTarget};
use publisher::HttpBlogPublisher;
use scrapers::browserless::BrowserlessClient;
use scrapers::dashboard::DashboardScraper;
use utils::{duration_until_next, kst_now, kst_today};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "trend_blogger starting up");

    let args = Cli::parse();
    debug!(ledger = %args.ledger, policy = ?args.policy, daily_at = ?args.daily_at, "Parsed CLI arguments");

    let policy = match &args.policy {
        Some(path) => PolicyConfig::load(path)?,
        None => PolicyConfig::default(),
    };

    let cancel = Arc::new(AtomicBool::new(false));
    spawn_interrupt_listener(Arc::clone(&cancel));

    match args.daily_at {
        None => run_and_report(&args, &policy, &cancel).await.map_err(Into::into),
        Some(at) => {
            run_daily(&args, &policy, &cancel, at).await;
            Ok(())
        }
    }
}

/// Set `cancel` on Ctrl-C. The keyword loop checks it before each keyword.
fn spawn_interrupt_listener(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Unable to listen for Ctrl-C");
                return;
            }
            warn!("Interrupt received; finishing the current keyword and cleaning up");
            cancel.store(true, Ordering::SeqCst);
        }
    });
}

/// Run once a day at `at` (KST) until interrupted. A failed run is logged
/// and the loop goes on.
async fn run_daily(args: &Cli, policy: &PolicyConfig, cancel: &AtomicBool, at: NaiveTime) {
    loop {
        let wait = duration_until_next(at, kst_now());
        info!(next_run_in_secs = wait.as_secs(), %at, "Waiting for next scheduled run");
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted while waiting; exiting");
                return;
            }
        }

        if let Err(e) = run_and_report(args, policy, cancel).await {
            error!(error = %e, "Scheduled run failed; will try again tomorrow");
        }
        if cancel.load(Ordering::SeqCst) {
            info!("Interrupted during run; exiting");
            return;
        }
    }
}

/// One run plus its summary: always logged, written as JSON when a report
/// directory is configured.
async fn run_and_report(args: &Cli, policy: &PolicyConfig, cancel: &AtomicBool) -> Result<(), RunError> {
    let start_time = std::time::Instant::now();
    let mut summary = RunSummary {
        date: kst_today().to_string(),
        ..Default::default()
    };

    let result = run_once(args, policy, cancel, &mut summary).await;
    if let Err(e) = &result
        && summary.aborted.is_none()
    {
        summary.aborted = Some(e.to_string());
    }

    let elapsed = start_time.elapsed();
    info!(
        date = %summary.date,
        candidates = summary.candidates,
        considered = summary.considered,
        posted = summary.posted,
        skipped = summary.skipped,
        failed = summary.failed,
        cancelled = summary.cancelled,
        aborted = ?summary.aborted,
        secs = elapsed.as_secs(),
        "Run summary"
    );

    if let Some(dir) = &args.report_dir
        && let Err(e) = report::write_summary(&summary, dir).await
    {
        error!(error = %e, "Failed to write run report");
    }

    result
}

#[instrument(level = "info", skip_all)]
async fn run_once(
    args: &Cli,
    policy: &PolicyConfig,
    cancel: &AtomicBool,
    summary: &mut RunSummary,
) -> Result<(), RunError> {
    // ---- Credentials and LLM configs, before the ledger is touched ----
    let credentials = BlogCredentials::from_args(args)?;

    let body = LlmEndpoint::load(&args.content_config, &args.content_template)
        .await
        .map_err(|e| RunError::Setup(format!("content LLM config {}: {e}", args.content_config)))?;
    let tags = LlmEndpoint::load(&args.tag_config, &args.tag_template)
        .await
        .map_err(|e| RunError::Setup(format!("tag LLM config {}: {e}", args.tag_config)))?;
    let generator = LlmContentGenerator::new(body, tags);

    let publisher = HttpBlogPublisher::new(credentials.url, credentials.user, credentials.password)
        .map_err(|e| RunError::Setup(e.to_string()))?;
    let browserless = BrowserlessClient::new(&args.browserless_url, args.browserless_token.as_deref())
        .map_err(|e| RunError::Setup(e.to_string()))?;
    let source = DashboardScraper::new(browserless, policy);

    // ---- Ledger ----
    let ledger = Ledger::new(&args.ledger);
    match ledger.compact().await {
        Ok(report) => debug!(kept = report.kept, dropped = report.dropped, "Ledger compaction finished"),
        Err(e @ LedgerError::CompactionRestored { .. }) => {
            warn!(error = %e, "Ledger compaction failed; original restored")
        }
        Err(e) => warn!(error = %e, "Ledger compaction failed; continuing with the file as is"),
    }
    let today = kst_today();
    let mut state = RunState::load(&ledger, today, policy).await?;

    // ---- Login, pipeline, cleanup ----
    let observer = TracingObserver;
    let pipeline = KeywordPipeline::new(policy, &observer, Duration::from_secs(args.post_delay_secs));
    let ctx = RunContext {
        source: &source,
        generator: &generator,
        publisher: &publisher,
        ledger: &ledger,
        cancel,
    };
    let target = TrendTarget {
        url: args.trend_url.clone(),
        selector: args.keywords_selector.clone(),
    };

    pipeline.run_session(&ctx, &target, &mut state, summary).await
}

/// Blog destination credentials, all present and non-empty.
#[derive(Debug)]
struct BlogCredentials<'a> {
    url: &'a str,
    user: &'a str,
    password: &'a str,
}

impl<'a> BlogCredentials<'a> {
    fn from_args(args: &'a Cli) -> Result<Self, RunError> {
        fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, RunError> {
            value
                .as_deref()
                .filter(|v| !v.trim().is_empty())
                .ok_or(RunError::MissingCredential(name))
        }
        Ok(Self {
            url: required(&args.blog_url, "BLOG_API_URL")?,
            user: required(&args.blog_user, "BLOG_USER")?,
            password: required(&args.blog_password, "BLOG_PASSWORD")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    /// CLI args whose LLM configs point at a file that is not valid YAML.
    fn args_with(ledger: &Path, extra: &[&str]) -> Cli {
        let llm_config = ledger.with_file_name("llm.yaml");
        std::fs::write(&llm_config, "api_key: [unterminated").unwrap();
        let llm_config = llm_config.to_str().unwrap().to_string();
        let mut argv = vec![
            "trend_blogger".to_string(),
            "--content-config".to_string(),
            llm_config.clone(),
            "--tag-config".to_string(),
            llm_config,
            "--ledger".to_string(),
            ledger.to_str().unwrap().to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        Cli::parse_from(argv)
    }

    #[test]
    fn test_credentials_reject_blank_values() {
        let dir = tempfile::tempdir().unwrap();
        let args = args_with(
            &dir.path().join("posted_log.txt"),
            &["--blog-url", "https://blog.example.com", "--blog-user", "me", "--blog-password", " "],
        );
        let err = BlogCredentials::from_args(&args).unwrap_err();
        assert!(matches!(err, RunError::MissingCredential("BLOG_PASSWORD")));
    }

    #[tokio::test]
    async fn test_missing_credential_leaves_ledger_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = dir.path().join("posted_log.txt");
        let args = args_with(
            &ledger,
            &["--blog-url", "https://blog.example.com", "--blog-user", "", "--blog-password", "pw"],
        );
        let policy = PolicyConfig::default();
        let cancel = AtomicBool::new(false);
        let mut summary = RunSummary::default();

        let result = run_once(&args, &policy, &cancel, &mut summary).await;

        assert!(matches!(result, Err(RunError::MissingCredential("BLOG_USER"))));
        assert!(!ledger.exists());
        assert!(!dir.path().join("posted_log.txt.bak").exists());
        assert_eq!(summary.considered, 0);
    }

    #[tokio::test]
    async fn test_unloadable_llm_config_leaves_ledger_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = dir.path().join("posted_log.txt");
        let args = args_with(
            &ledger,
            &["--blog-url", "https://blog.example.com", "--blog-user", "me", "--blog-password", "pw"],
        );
        let policy = PolicyConfig::default();
        let cancel = AtomicBool::new(false);
        let mut summary = RunSummary::default();

        let result = run_once(&args, &policy, &cancel, &mut summary).await;

        assert!(matches!(result, Err(RunError::Setup(_))));
        assert!(!ledger.exists());
    }
}
