//! Blog publishing capability and its HTTP session adapter.
//!
//! The pipeline sees only [`Publisher`]: log in once, publish title, body
//! and tags all-or-nothing, close once. [`HttpBlogPublisher`] implements it
//! against the blog's session API:
//!
//! | Call | Request |
//! |------|---------|
//! | login | `POST {base}/api/session` with `{user, password}` → `{token}` |
//! | publish | `POST {base}/api/posts` with bearer token and `{title, content, tags}` |
//! | close | `DELETE {base}/api/session` |
//!
//! An expired session during publish triggers one re-login; if that is
//! refused the error is [`PublishError::Auth`], which ends the run.

use crate::errors::PublishError;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Publish capability consumed by the pipeline.
pub trait Publisher {
    /// Open a session. Failure is fatal for the run.
    async fn login(&self) -> Result<(), PublishError>;

    /// Publish one post; all-or-nothing.
    async fn publish(&self, title: &str, body: &str, tags: &[String]) -> Result<(), PublishError>;

    /// End the session. Called exactly once at run end, whatever happened.
    async fn close(&self);
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    user: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Serialize)]
struct PostRequest<'a> {
    title: &'a str,
    content: &'a str,
    tags: &'a [String],
}

/// Session-holding HTTP client for the blog destination.
#[derive(Debug)]
pub struct HttpBlogPublisher {
    client: reqwest::Client,
    base_url: String,
    user: String,
    password: String,
    token: Mutex<Option<String>>,
}

impl HttpBlogPublisher {
    pub fn new(base_url: &str, user: &str, password: &str) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user: user.to_string(),
            password: password.to_string(),
            token: Mutex::new(None),
        })
    }

    fn session_url(&self) -> String {
        format!("{}/api/session", self.base_url)
    }

    fn posts_url(&self) -> String {
        format!("{}/api/posts", self.base_url)
    }

    fn token(&self) -> Option<String> {
        self.token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_token(&self, token: Option<String>) -> Option<String> {
        let mut guard = self
            .token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, token)
    }

    async fn authenticate(&self) -> Result<String, PublishError> {
        let resp = self
            .client
            .post(self.session_url())
            .json(&LoginRequest {
                user: &self.user,
                password: &self.password,
            })
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PublishError::Auth(format!("login refused (status {status})")));
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(PublishError::Auth(format!(
                "login failed (status {status}): {message}"
            )));
        }

        let login: LoginResponse = resp
            .json()
            .await
            .map_err(|e| PublishError::Auth(format!("unreadable login response: {e}")))?;
        self.set_token(Some(login.token.clone()));
        Ok(login.token)
    }

    async fn send_post(
        &self,
        token: &str,
        post: &PostRequest<'_>,
    ) -> Result<StatusCode, PublishError> {
        let resp = self
            .client
            .post(self.posts_url())
            .bearer_auth(token)
            .json(post)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() || status == StatusCode::UNAUTHORIZED {
            return Ok(status);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(PublishError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

impl Publisher for HttpBlogPublisher {
    #[instrument(level = "info", skip(self), fields(user = %self.user))]
    async fn login(&self) -> Result<(), PublishError> {
        self.authenticate().await?;
        info!("Blog login successful");
        Ok(())
    }

    #[instrument(level = "info", skip(self, body), fields(body_chars = body.chars().count()))]
    async fn publish(&self, title: &str, body: &str, tags: &[String]) -> Result<(), PublishError> {
        let post = PostRequest {
            title,
            content: body,
            tags,
        };
        let token = match self.token() {
            Some(token) => token,
            None => self.authenticate().await?,
        };

        if self.send_post(&token, &post).await? == StatusCode::UNAUTHORIZED {
            warn!("Session expired; logging in again");
            let fresh = self.authenticate().await?;
            if self.send_post(&fresh, &post).await? == StatusCode::UNAUTHORIZED {
                return Err(PublishError::Auth("session rejected after re-login".into()));
            }
        }
        info!("Published post");
        Ok(())
    }

    #[instrument(level = "info", skip(self))]
    async fn close(&self) {
        let Some(token) = self.set_token(None) else {
            return;
        };
        match self
            .client
            .delete(self.session_url())
            .bearer_auth(token)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => info!("Closed blog session"),
            Ok(resp) => warn!(status = %resp.status(), "Blog session close returned an error"),
            Err(e) => warn!(error = %e, "Failed to close blog session"),
        }
    }
}
