//! Utility functions for KST dates, log truncation and output directories.
//!
//! - KST clock helpers (the run's calendar day is always Korean Standard Time)
//! - Title date formatting
//! - Next-run computation for the daily schedule
//! - String truncation for logging
//! - File system validation for output directories

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

const KST_OFFSET_SECS: i32 = 9 * 3600;

/// The fixed UTC+9 offset.
pub fn kst() -> FixedOffset {
    FixedOffset::east_opt(KST_OFFSET_SECS).expect("UTC+9 is in range")
}

/// Current wall-clock time in KST.
pub fn kst_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&kst())
}

/// Today's calendar date in KST.
pub fn kst_today() -> NaiveDate {
    kst_now().date_naive()
}

/// Date as used in post titles and prompts: `2025년 04월 19일`.
pub fn title_date(date: NaiveDate) -> String {
    format!("{}년 {:02}월 {:02}일", date.year(), date.month(), date.day())
}

/// Time left until the next occurrence of `at` (wall-clock in `now`'s
/// offset). An exact hit schedules for the following day.
pub fn duration_until_next(at: NaiveTime, now: DateTime<FixedOffset>) -> std::time::Duration {
    let today_at = now.date_naive().and_time(at);
    let mut next = today_at;
    if next <= now.naive_local() {
        next += Duration::days(1);
    }
    (next - now.naive_local())
        .to_std()
        .unwrap_or(std::time::Duration::ZERO)
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters with an ellipsis and a
/// character count of what was dropped.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"가".repeat(50), 10), "가가가가가가가가가가…(+40 chars)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    let total = s.chars().count();
    if total <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{}…(+{} chars)", head, total - max)
    }
}

/// `true` if the text is made only of Hangul initial consonants (`ㄱ`..`ㅎ`),
/// the shape quiz hints take on the trend dashboard.
pub fn is_korean_consonants_only(text: &str) -> bool {
    const CONSONANTS: &str = "ㄱㄲㄴㄷㄸㄹㅁㅂㅃㅅㅆㅇㅈㅉㅊㅋㅌㅍㅎ";
    !text.is_empty() && text.chars().all(|c| CONSONANTS.contains(c))
}

/// Ensure a directory exists and is writable.
///
/// This function creates the directory if it doesn't exist, then performs
/// a write test by creating and immediately deleting a scratch file.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let scratch_path = format!("{}/..__write_check__", path.trim_end_matches('/'));
    stdfs::File::create(&scratch_path)?;
    let _ = stdfs::remove_file(&scratch_path);
    info!("Output directory is writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_multibyte() {
        let s = "가".repeat(50);
        let result = truncate_for_log(&s, 10);
        assert!(result.starts_with(&"가".repeat(10)));
        assert!(result.ends_with("…(+40 chars)"));
    }

    #[test]
    fn test_title_date() {
        let date = NaiveDate::from_ymd_opt(2025, 4, 9).unwrap();
        assert_eq!(title_date(date), "2025년 04월 09일");
    }

    #[test]
    fn test_kst_date_rolls_over_before_utc() {
        // 2025-04-18 16:30 UTC is already 2025-04-19 in Seoul
        let utc = Utc.with_ymd_and_hms(2025, 4, 18, 16, 30, 0).unwrap();
        assert_eq!(
            utc.with_timezone(&kst()).date_naive(),
            NaiveDate::from_ymd_opt(2025, 4, 19).unwrap()
        );
    }

    #[test]
    fn test_duration_until_next() {
        let one_am = NaiveTime::from_hms_opt(1, 0, 0).unwrap();
        let before = kst().with_ymd_and_hms(2025, 4, 19, 0, 30, 0).unwrap();
        assert_eq!(
            duration_until_next(one_am, before),
            std::time::Duration::from_secs(30 * 60)
        );

        let after = kst().with_ymd_and_hms(2025, 4, 19, 2, 0, 0).unwrap();
        assert_eq!(
            duration_until_next(one_am, after),
            std::time::Duration::from_secs(23 * 3600)
        );

        let exact = kst().with_ymd_and_hms(2025, 4, 19, 1, 0, 0).unwrap();
        assert_eq!(
            duration_until_next(one_am, exact),
            std::time::Duration::from_secs(24 * 3600)
        );
    }

    #[test]
    fn test_consonants_only() {
        assert!(is_korean_consonants_only("ㄱㄴㄷ"));
        assert!(!is_korean_consonants_only("ㄱ나ㄷ"));
        assert!(!is_korean_consonants_only(""));
    }
}
