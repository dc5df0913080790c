//! Append-only posting ledger.
//!
//! The ledger is a UTF-8 text file with one record per line:
//!
//! ```text
//! 2025-04-19,건강보험 4월 19일
//! 2025-04-19,삼성전자 관련주
//! ```
//!
//! It is the only persisted state and the source of truth for dedup across
//! restarts. Records are appended only after a successful publish, and each
//! append is flushed and synced before the next keyword is touched.
//! Uniqueness is not enforced; lookups are set-membership checks so repeated
//! lines are harmless.
//!
//! Malformed lines are skipped on read and removed by [`Ledger::compact`].

use crate::config::PolicyConfig;
use crate::errors::LedgerError;
use crate::normalizer::{collapse_whitespace, strip_spaces};
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

const DATE_FORMAT: &str = "%Y-%m-%d";

static RECORD_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2}),(.*)$").expect("record line pattern"));

/// One successful post: the KST date and the keyword as published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRecord {
    pub date: NaiveDate,
    pub keyword: String,
}

impl PostRecord {
    pub fn new(date: NaiveDate, keyword: &str) -> Self {
        Self {
            date,
            keyword: sanitize_keyword(keyword),
        }
    }

    /// Parse a `YYYY-MM-DD,keyword` line. Returns `None` for anything else,
    /// including an empty keyword or an impossible calendar date.
    pub fn parse(line: &str) -> Option<Self> {
        let caps = RECORD_LINE.captures(line.trim())?;
        let date = NaiveDate::parse_from_str(&caps[1], DATE_FORMAT).ok()?;
        let keyword = caps[2].trim();
        if keyword.is_empty() {
            return None;
        }
        Some(Self {
            date,
            keyword: keyword.to_string(),
        })
    }

    pub fn to_line(&self) -> String {
        format!("{},{}", self.date.format(DATE_FORMAT), self.keyword)
    }
}

/// Keywords never span lines in the ledger.
fn sanitize_keyword(keyword: &str) -> String {
    keyword.replace(['\r', '\n'], " ").trim().to_string()
}

/// Outcome of [`Ledger::compact`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CompactReport {
    pub kept: usize,
    pub dropped: usize,
}

/// Handle to the ledger file.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    max_attempts: usize,
    retry_delay: Duration,
}

impl Ledger {
    /// A ledger at `path` with 3 append attempts spaced one second apart.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    #[cfg(test)]
    pub fn with_retry(mut self, max_attempts: usize, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".bak");
        PathBuf::from(name)
    }

    fn io_error(&self, source: io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Raw lines of the ledger; a missing file reads as empty. Invalid UTF-8
    /// is replaced rather than rejected.
    async fn read_lines(&self) -> Result<Vec<String>, LedgerError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes)
                .lines()
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "Ledger not found; assuming no prior posts");
                Ok(Vec::new())
            }
            Err(e) => Err(self.io_error(e)),
        }
    }

    /// All well-formed records in file order.
    pub async fn records(&self) -> Result<Vec<PostRecord>, LedgerError> {
        let lines = self.read_lines().await?;
        let mut records = Vec::with_capacity(lines.len());
        for line in lines {
            match PostRecord::parse(&line) {
                Some(record) => records.push(record),
                None if line.trim().is_empty() => {}
                None => warn!(path = %self.path.display(), %line, "Skipping malformed ledger line"),
            }
        }
        Ok(records)
    }

    /// Keywords recorded for `today`, plus their whitespace-collapsed forms.
    #[instrument(level = "info", skip(self), fields(path = %self.path.display()))]
    pub async fn load_posted_today(&self, today: NaiveDate) -> Result<HashSet<String>, LedgerError> {
        let mut posted = HashSet::new();
        for record in self.records().await? {
            if record.date == today {
                insert_with_variant(&mut posted, record.keyword);
            }
        }
        info!(count = posted.len(), "Loaded keywords already posted today");
        debug!(?posted, "Posted today");
        Ok(posted)
    }

    /// Annual-topic keywords recorded during `year`, plus their
    /// whitespace-collapsed forms. A new year starts from an empty set.
    #[instrument(level = "info", skip(self, policy), fields(path = %self.path.display()))]
    pub async fn load_annual_posted_this_year(
        &self,
        year: i32,
        policy: &PolicyConfig,
    ) -> Result<HashSet<String>, LedgerError> {
        let mut posted = HashSet::new();
        for record in self.records().await? {
            if record.date.year() == year && policy.is_annual(&record.keyword) {
                insert_with_variant(&mut posted, record.keyword);
            }
        }
        info!(count = posted.len(), "Loaded annual keywords already posted this year");
        debug!(?posted, "Annual posted this year");
        Ok(posted)
    }

    /// Durably append one record.
    ///
    /// The line is flushed and synced to disk before returning. Failed
    /// attempts are retried; once attempts run out the error is returned
    /// and the caller must stop posting, since a lost record means a
    /// duplicate post on the next run.
    #[instrument(level = "info", skip(self), fields(path = %self.path.display()))]
    pub async fn append(&self, today: NaiveDate, keyword: &str) -> Result<(), LedgerError> {
        let record = PostRecord::new(today, keyword);
        let line = format!("{}\n", record.to_line());
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            match self.try_append(&line).await {
                Ok(()) => {
                    info!(record = %record.to_line(), "Recorded posted keyword");
                    return Ok(());
                }
                Err(e) if attempt < self.max_attempts => {
                    warn!(
                        attempt,
                        max = self.max_attempts,
                        error = %e,
                        "Ledger append failed; retrying"
                    );
                    sleep(self.retry_delay).await;
                }
                Err(e) => {
                    error!(
                        attempt,
                        record = %record.to_line(),
                        error = %e,
                        "Ledger append exhausted retries"
                    );
                    return Err(LedgerError::AppendExhausted {
                        path: self.path.clone(),
                        keyword: record.keyword,
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }

    async fn try_append(&self, line: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await
    }

    /// Drop malformed lines, keeping every well-formed record in order.
    ///
    /// A copy of the untouched file is written to `<ledger>.bak` first; if
    /// the rewrite fails the copy is restored. Running it twice is the same
    /// as running it once.
    pub async fn compact(&self) -> Result<CompactReport, LedgerError> {
        self.compact_with(|path, contents| async move { write_durably(&path, &contents).await })
            .await
    }

    /// [`compact`](Self::compact) with a caller-supplied rewrite step.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn compact_with<F, Fut>(&self, rewrite: F) -> Result<CompactReport, LedgerError>
    where
        F: FnOnce(PathBuf, String) -> Fut,
        Fut: Future<Output = io::Result<()>>,
    {
        if fs::metadata(&self.path).await.is_err() {
            info!("Ledger does not exist yet; nothing to compact");
            return Ok(CompactReport::default());
        }

        let backup = self.backup_path();
        fs::copy(&self.path, &backup)
            .await
            .map_err(|e| self.io_error(e))?;
        debug!(backup = %backup.display(), "Backed up ledger");

        let lines = self.read_lines().await?;
        let mut contents = String::new();
        let mut report = CompactReport::default();
        for line in &lines {
            match PostRecord::parse(line) {
                Some(record) => {
                    contents.push_str(&record.to_line());
                    contents.push('\n');
                    report.kept += 1;
                }
                None => report.dropped += 1,
            }
        }

        if let Err(e) = rewrite(self.path.clone(), contents).await {
            error!(error = %e, "Ledger rewrite failed; restoring backup");
            fs::copy(&backup, &self.path)
                .await
                .map_err(|restore| self.io_error(restore))?;
            return Err(LedgerError::CompactionRestored {
                path: self.path.clone(),
                source: e,
            });
        }

        info!(kept = report.kept, dropped = report.dropped, "Compacted ledger");
        Ok(report)
    }
}

async fn write_durably(path: &Path, contents: &str) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(contents.as_bytes()).await?;
    file.flush().await?;
    file.sync_all().await
}

fn insert_with_variant(set: &mut HashSet<String>, keyword: String) {
    let collapsed = collapse_whitespace(&keyword);
    if collapsed != keyword {
        set.insert(collapsed);
    }
    set.insert(keyword);
}

/// `true` if the keyword, its whitespace-collapsed form, or its space-free
/// form matches an entry of `posted`.
pub fn contains_variant(keyword: &str, posted: &HashSet<String>) -> bool {
    if posted.contains(keyword) || posted.contains(&collapse_whitespace(keyword)) {
        return true;
    }
    let bare = strip_spaces(keyword);
    posted.iter().any(|p| strip_spaces(p) == bare)
}

/// Dedup check for one keyword.
///
/// Annual-topic keywords are checked against this year's annual set (when
/// one is given); all other keywords against today's set.
pub fn is_already_posted(
    keyword: &str,
    posted_today: &HashSet<String>,
    annual_this_year: Option<&HashSet<String>>,
    policy: &PolicyConfig,
) -> bool {
    match annual_this_year {
        Some(annual) if policy.is_annual(keyword) => contains_variant(keyword, annual),
        _ => contains_variant(keyword, posted_today),
    }
}

/// Dedup state for one run, loaded from the ledger at start and updated in
/// memory as posts succeed.
#[derive(Debug, Clone)]
pub struct RunState {
    pub today: NaiveDate,
    pub posted_today: HashSet<String>,
    pub annual_this_year: HashSet<String>,
}

impl RunState {
    pub async fn load(
        ledger: &Ledger,
        today: NaiveDate,
        policy: &PolicyConfig,
    ) -> Result<Self, LedgerError> {
        Ok(Self {
            today,
            posted_today: ledger.load_posted_today(today).await?,
            annual_this_year: ledger
                .load_annual_posted_this_year(today.year(), policy)
                .await?,
        })
    }

    pub fn is_already_posted(&self, keyword: &str, policy: &PolicyConfig) -> bool {
        is_already_posted(
            keyword,
            &self.posted_today,
            Some(&self.annual_this_year),
            policy,
        )
    }

    /// Same-day check only, ignoring the annual rule.
    pub fn posted_today(&self, keyword: &str) -> bool {
        contains_variant(keyword, &self.posted_today)
    }

    pub fn record(&mut self, keyword: &str, policy: &PolicyConfig) {
        self.posted_today.insert(keyword.to_string());
        if policy.is_annual(keyword) {
            self.annual_this_year.insert(keyword.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ledger_in(dir: &tempfile::TempDir) -> Ledger {
        Ledger::new(dir.path().join("posted_log.txt")).with_retry(2, Duration::ZERO)
    }

    #[test]
    fn test_parse_record() {
        let record = PostRecord::parse("2025-04-19,AI 투자, 전략 ").unwrap();
        assert_eq!(record.date, date(2025, 4, 19));
        assert_eq!(record.keyword, "AI 투자, 전략");
        assert!(PostRecord::parse("AI 투자").is_none());
        assert!(PostRecord::parse("2025-04-19,").is_none());
        assert!(PostRecord::parse("2025-13-40,잘못된 날짜").is_none());
        assert!(PostRecord::parse("25-04-19,짧은 연도").is_none());
    }

    #[test]
    fn test_record_line_has_no_newlines() {
        let record = PostRecord::new(date(2025, 4, 19), "줄\n바꿈\r\n");
        assert_eq!(record.to_line(), "2025-04-19,줄 바꿈");
    }

    #[tokio::test]
    async fn test_missing_ledger_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        assert!(ledger.load_posted_today(date(2025, 4, 19)).await.unwrap().is_empty());
        assert_eq!(ledger.compact().await.unwrap(), CompactReport::default());
    }

    #[tokio::test]
    async fn test_load_posted_today_adds_collapsed_variant() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        std::fs::write(
            ledger.path(),
            "2025-04-18,어제 키워드\n2025-04-19,AI  투자\nbroken line\n2025-04-19,날씨\n",
        )
        .unwrap();

        let posted = ledger.load_posted_today(date(2025, 4, 19)).await.unwrap();
        assert!(posted.contains("AI  투자"));
        assert!(posted.contains("AI 투자"));
        assert!(posted.contains("날씨"));
        assert!(!posted.contains("어제 키워드"));
    }

    #[tokio::test]
    async fn test_append_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("nested/dir/posted_log.txt"));
        ledger.append(date(2025, 4, 19), "삼성전자 관련주").await.unwrap();
        ledger.append(date(2025, 4, 19), "삼성전자 관련주").await.unwrap();

        let text = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(text, "2025-04-19,삼성전자 관련주\n2025-04-19,삼성전자 관련주\n");
        let posted = ledger.load_posted_today(date(2025, 4, 19)).await.unwrap();
        assert_eq!(posted.len(), 1);
    }

    #[tokio::test]
    async fn test_append_exhausts_retries() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where the file should be makes every open fail
        let path = dir.path().join("posted_log.txt");
        std::fs::create_dir(&path).unwrap();
        let ledger = Ledger::new(&path).with_retry(3, Duration::ZERO);

        let err = ledger.append(date(2025, 4, 19), "AI 투자").await.unwrap_err();
        match err {
            LedgerError::AppendExhausted { attempts, keyword, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(keyword, "AI 투자");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_daily_dedup_resets_next_day() {
        let policy = PolicyConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        ledger.append(date(2025, 4, 19), "AI 투자").await.unwrap();

        let today = RunState::load(&ledger, date(2025, 4, 19), &policy).await.unwrap();
        assert!(today.is_already_posted("AI 투자", &policy));
        assert!(today.is_already_posted("AI  투자", &policy));
        assert!(today.is_already_posted("AI투자", &policy));

        let tomorrow = RunState::load(&ledger, date(2025, 4, 20), &policy).await.unwrap();
        assert!(!tomorrow.is_already_posted("AI 투자", &policy));
    }

    #[tokio::test]
    async fn test_annual_dedup_spans_the_year() {
        let policy = PolicyConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        ledger.append(date(2024, 1, 10), "연말정산 환급").await.unwrap();

        let later = RunState::load(&ledger, date(2024, 11, 3), &policy).await.unwrap();
        assert!(later.is_already_posted("연말정산 환급", &policy));
        assert!(later.is_already_posted("연말정산  환급", &policy));
        assert!(!later.posted_today("연말정산 환급"));

        let next_year = RunState::load(&ledger, date(2025, 1, 2), &policy).await.unwrap();
        assert!(!next_year.is_already_posted("연말정산 환급", &policy));
    }

    #[test]
    fn test_is_already_posted_without_annual_set_uses_today() {
        let policy = PolicyConfig::default();
        let today: HashSet<String> = ["국민연금 인상".to_string()].into_iter().collect();
        assert!(is_already_posted("국민연금 인상", &today, None, &policy));
        let annual = HashSet::new();
        assert!(!is_already_posted("국민연금 인상", &today, Some(&annual), &policy));
    }

    #[test]
    fn test_record_updates_both_sets() {
        let policy = PolicyConfig::default();
        let mut state = RunState {
            today: date(2025, 4, 19),
            posted_today: HashSet::new(),
            annual_this_year: HashSet::new(),
        };
        state.record("건강보험 4월 19일", &policy);
        state.record("날씨", &policy);
        assert_eq!(state.posted_today.len(), 2);
        assert_eq!(state.annual_this_year.len(), 1);
    }

    #[tokio::test]
    async fn test_compact_drops_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        std::fs::write(ledger.path(), "2025-04-19,AI 투자\nAI 투자 without date\n").unwrap();

        let report = ledger.compact().await.unwrap();
        assert_eq!(report, CompactReport { kept: 1, dropped: 1 });
        assert_eq!(
            std::fs::read_to_string(ledger.path()).unwrap(),
            "2025-04-19,AI 투자\n"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("posted_log.txt.bak")).unwrap(),
            "2025-04-19,AI 투자\nAI 투자 without date\n"
        );

        let again = ledger.compact().await.unwrap();
        assert_eq!(again, CompactReport { kept: 1, dropped: 0 });
        assert_eq!(
            std::fs::read_to_string(ledger.path()).unwrap(),
            "2025-04-19,AI 투자\n"
        );
    }

    #[tokio::test]
    async fn test_compact_restores_backup_on_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        let original = "2025-04-19,AI 투자\nAI 투자 without date\n";
        std::fs::write(ledger.path(), original).unwrap();

        let result = ledger
            .compact_with(|path, _contents| async move {
                fs::write(&path, "partial wri").await?;
                Err(io::Error::other("simulated write failure"))
            })
            .await;

        assert!(matches!(result, Err(LedgerError::CompactionRestored { .. })));
        assert_eq!(std::fs::read_to_string(ledger.path()).unwrap(), original);
    }
}
