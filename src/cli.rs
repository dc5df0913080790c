//! Command-line interface definitions for Trend Blogger.
//!
//! Endpoints and credentials can also come from environment variables so
//! they stay out of shell history and cron lines.

use chrono::NaiveTime;
use clap::Parser;

/// Command-line arguments for the Trend Blogger application.
///
/// # Examples
///
/// ```sh
/// # One run, credentials from the environment
/// BLOG_API_URL=https://blog.example.com BLOG_USER=me BLOG_PASSWORD=secret \
///   trend_blogger --content-config body.yaml --tag-config tags.yaml
///
/// # Every day at 01:00 KST, with a JSON report per run
/// trend_blogger --content-config body.yaml --tag-config tags.yaml \
///   --daily-at 01:00 --report-dir ./reports
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the posting ledger
    #[arg(short, long, default_value = "posted_log.txt")]
    pub ledger: String,

    /// Optional path to a YAML policy file (blocklist, annual terms, categories)
    #[arg(short, long)]
    pub policy: Option<String>,

    /// Trend dashboard URL
    #[arg(
        long,
        default_value = "https://creator-advisor.naver.com/naver_blog/gongnyangi/trends#trend-by-categories"
    )]
    pub trend_url: String,

    /// CSS selector of the keyword slide containers
    #[arg(
        long,
        default_value = "#root .u_ni_section_wrap .swiper-wrapper .swiper-slide"
    )]
    pub keywords_selector: String,

    /// Browserless rendering service URL
    #[arg(long, env = "BROWSERLESS_URL", default_value = "http://localhost:3000")]
    pub browserless_url: String,

    /// Browserless API token
    #[arg(long, env = "BROWSERLESS_TOKEN")]
    pub browserless_token: Option<String>,

    /// Blog API base URL
    #[arg(long, env = "BLOG_API_URL")]
    pub blog_url: Option<String>,

    /// Blog account user name
    #[arg(long, env = "BLOG_USER")]
    pub blog_user: Option<String>,

    /// Blog account password
    #[arg(long, env = "BLOG_PASSWORD", hide_env_values = true)]
    pub blog_password: Option<String>,

    /// awful_aj config file for body generation
    #[arg(long)]
    pub content_config: String,

    /// awful_aj config file for tag generation
    #[arg(long)]
    pub tag_config: String,

    /// Template name for body generation
    #[arg(long, default_value = "blog_writer")]
    pub content_template: String,

    /// Template name for tag generation
    #[arg(long, default_value = "tag_writer")]
    pub tag_template: String,

    /// Seconds to wait between posts
    #[arg(long, default_value_t = 15)]
    pub post_delay_secs: u64,

    /// Optional directory for the JSON run report
    #[arg(short, long)]
    pub report_dir: Option<String>,

    /// Run every day at this KST time (HH:MM) instead of once
    #[arg(long, value_parser = parse_daily_at)]
    pub daily_at: Option<NaiveTime>,
}

fn parse_daily_at(raw: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw, "%H:%M").map_err(|e| format!("expected HH:MM ({e})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 5] = [
        "trend_blogger",
        "--content-config",
        "body.yaml",
        "--tag-config",
        "tags.yaml",
    ];

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(REQUIRED);

        assert_eq!(cli.ledger, "posted_log.txt");
        assert_eq!(cli.post_delay_secs, 15);
        assert_eq!(cli.content_template, "blog_writer");
        assert!(cli.keywords_selector.ends_with(".swiper-slide"));
        assert!(cli.daily_at.is_none());
        assert!(cli.report_dir.is_none());
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from(
            REQUIRED
                .iter()
                .copied()
                .chain(["-l", "/tmp/log.txt", "-p", "policy.yaml", "-r", "/tmp/reports"]),
        );

        assert_eq!(cli.ledger, "/tmp/log.txt");
        assert_eq!(cli.policy.as_deref(), Some("policy.yaml"));
        assert_eq!(cli.report_dir.as_deref(), Some("/tmp/reports"));
    }

    #[test]
    fn test_cli_daily_at() {
        let cli = Cli::parse_from(REQUIRED.iter().copied().chain(["--daily-at", "01:00"]));
        assert_eq!(cli.daily_at, NaiveTime::from_hms_opt(1, 0, 0));

        let err = Cli::try_parse_from(REQUIRED.iter().copied().chain(["--daily-at", "25:00"]));
        assert!(err.is_err());
    }
}
