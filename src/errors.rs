//! Error types for the ledger, the external capabilities and the run itself.
//!
//! Per-keyword failures ([`GenerateError`], non-auth [`PublishError`]) are
//! logged and skipped. [`RunError`] is reserved for conditions that end the
//! whole run: missing credentials, a rejected login, or a ledger write that
//! could not be made durable.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to append '{keyword}' to {path} after {attempts} attempts: {source}")]
    AppendExhausted {
        path: PathBuf,
        keyword: String,
        attempts: usize,
        #[source]
        source: io::Error,
    },

    #[error("ledger compaction failed for {path}, original restored from backup: {source}")]
    CompactionRestored {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rendering service error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid selector '{0}'")]
    Selector(String),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl From<reqwest::Error> for ScrapeError {
    fn from(err: reqwest::Error) -> Self {
        ScrapeError::Network(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("content generation failed: {0}")]
    Failed(String),

    #[error("model returned empty content")]
    Empty,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("destination rejected the post (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),
}

impl PublishError {
    /// Auth failures end the run; everything else skips one keyword.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PublishError::Auth(_))
    }
}

impl From<reqwest::Error> for PublishError {
    fn from(err: reqwest::Error) -> Self {
        PublishError::Network(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("setup failed: {0}")]
    Setup(String),

    #[error("publish destination rejected authentication: {0}")]
    Auth(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_auth_is_fatal() {
        assert!(PublishError::Auth("expired".into()).is_fatal());
        assert!(!PublishError::Network("reset".into()).is_fatal());
        assert!(
            !PublishError::Rejected {
                status: 500,
                message: "oops".into()
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_ledger_error_message_names_keyword() {
        let err = LedgerError::AppendExhausted {
            path: PathBuf::from("posted_log.txt"),
            keyword: "AI 투자".into(),
            attempts: 3,
            source: io::Error::other("disk full"),
        };
        let msg = err.to_string();
        assert!(msg.contains("AI 투자"));
        assert!(msg.contains("3 attempts"));
    }
}
