//! HTTP client for a Browserless rendering service.
//!
//! The trend dashboard is a script-rendered page, so the raw HTML from a
//! plain GET is empty. Browserless runs a headless browser and its
//! `/content` endpoint returns the fully rendered document.

use crate::errors::ScrapeError;
use std::time::Duration;
use tracing::{debug, instrument};

/// Rendering-service client shared by every scrape in a run.
#[derive(Debug, Clone)]
pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        })
    }

    fn endpoint(&self) -> String {
        match &self.token {
            Some(token) => format!(
                "{}/content?token={}",
                self.base_url,
                urlencoding::encode(token)
            ),
            None => format!("{}/content", self.base_url),
        }
    }

    /// Fetch fully-rendered HTML content for a URL via the `/content` endpoint.
    #[instrument(level = "info", skip(self))]
    pub async fn content(&self, url: &str) -> Result<String, ScrapeError> {
        let body = serde_json::json!({
            "url": url,
            "waitForSelector": { "selector": ".swiper-slide", "timeout": 30000 },
        });

        let resp = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ScrapeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let html = resp.text().await?;
        debug!(bytes = html.len(), "Rendered page");
        Ok(html)
    }
}
