//! JSON run report.
//!
//! One file per KST day:
//! ```text
//! report_dir/
//! ├── 2025-04-18.json
//! └── 2025-04-19.json
//! ```
//!
//! A second run on the same day overwrites that day's report.

use crate::models::RunSummary;
use crate::utils::ensure_writable_dir;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

/// Write a [`RunSummary`] to `{report_dir}/{date}.json` and return the path.
#[instrument(level = "info", skip_all, fields(report_dir = %report_dir))]
pub async fn write_summary(summary: &RunSummary, report_dir: &str) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(summary)?;

    if let Err(e) = ensure_writable_dir(report_dir).await {
        error!(%report_dir, error = %e, "Report directory is not writable");
        return Err(e);
    }

    let path = PathBuf::from(report_dir).join(format!("{}.json", summary.date));
    info!(path = %path.display(), "Writing run report");
    fs::write(&path, json).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_summary_creates_dated_file() {
        let dir = tempfile::tempdir().unwrap();
        let report_dir = dir.path().join("reports");
        let summary = RunSummary {
            date: "2025-04-19".into(),
            candidates: 3,
            considered: 2,
            posted: 1,
            failed: 1,
            aborted: Some("blog authentication failed".into()),
            ..Default::default()
        };

        let path = write_summary(&summary, report_dir.to_str().unwrap())
            .await
            .unwrap();

        assert_eq!(path, report_dir.join("2025-04-19.json"));
        let back: RunSummary =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, summary);
    }
}
