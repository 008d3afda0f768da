pub mod cache;
pub mod github;
pub mod gitlab;

use std::error::Error;
use std::time::Duration;

use serde::Deserialize;

use crate::diff::{Address, PositionScheme};

pub use github::GitHubClient;
pub use gitlab::GitLabClient;

/// Pull/merge request metadata, normalized across hosts.
#[derive(Debug, Clone, Deserialize)]
pub struct PrInfo {
    pub number: u64,
    pub title: String,
    pub description: String,
    pub author: String,
    pub source_branch: String,
    pub target_branch: String,
    pub state: String,
    pub head_sha: String,
    pub base_sha: String,
    pub start_sha: String,
    pub html_url: String,
    pub created_at: String,
}

/// One host-agnostic inline comment ready to post.
#[derive(Debug, Clone)]
pub struct InlineComment {
    pub file: String,
    pub address: Address,
    pub body: String,
}

/// Hosts are a closed set, so plain enum dispatch instead of trait objects.
pub enum Provider {
    GitHub(GitHubClient),
    GitLab(GitLabClient),
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Provider::GitHub(_) => "github",
            Provider::GitLab(_) => "gitlab",
        }
    }

    /// The comment addressing each host natively supports.
    pub fn default_scheme(&self) -> PositionScheme {
        match self {
            Provider::GitHub(_) => PositionScheme::Position,
            Provider::GitLab(_) => PositionScheme::Line,
        }
    }

    pub async fn fetch_pr(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PrInfo, Box<dyn Error>> {
        match self {
            Provider::GitHub(c) => c.fetch_pr(owner, repo, number).await,
            Provider::GitLab(c) => c.fetch_mr(owner, repo, number).await,
        }
    }

    pub async fn fetch_diff(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<String, Box<dyn Error>> {
        match self {
            Provider::GitHub(c) => c.fetch_diff(owner, repo, number).await,
            Provider::GitLab(c) => c.fetch_diff(owner, repo, number).await,
        }
    }

    pub async fn post_summary(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<(), Box<dyn Error>> {
        match self {
            Provider::GitHub(c) => c.post_summary(owner, repo, number, body).await,
            Provider::GitLab(c) => c.post_summary(owner, repo, number, body).await,
        }
    }

    pub async fn post_inline_comment(
        &self,
        owner: &str,
        repo: &str,
        pr: &PrInfo,
        comment: &InlineComment,
    ) -> Result<(), Box<dyn Error>> {
        match self {
            Provider::GitHub(c) => c.post_inline_comment(owner, repo, pr, comment).await,
            Provider::GitLab(c) => c.post_inline_comment(owner, repo, pr, comment).await,
        }
    }

    /// Cheap authenticated call to fail fast on a bad token.
    pub async fn validate_token(&self) -> Result<(), Box<dyn Error>> {
        match self {
            Provider::GitHub(c) => c.validate_token().await,
            Provider::GitLab(c) => c.validate_token().await,
        }
    }
}

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Retry transient failures (connect errors, 429, 5xx) with a doubling delay.
/// Auth and client errors return immediately.
pub(crate) async fn send_with_retry(
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, Box<dyn Error>> {
    let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

    for attempt in 1..=RETRY_ATTEMPTS {
        let Some(req) = request.try_clone() else {
            return Ok(request.send().await?);
        };

        match req.send().await {
            Ok(response) => {
                let status = response.status();
                let retryable = status.as_u16() == 429 || status.is_server_error();
                if !retryable || attempt == RETRY_ATTEMPTS {
                    return Ok(response);
                }
            }
            Err(e) => {
                if !e.is_connect() && !e.is_timeout() {
                    return Err(e.into());
                }
                if attempt == RETRY_ATTEMPTS {
                    return Err(e.into());
                }
            }
        }

        tokio::time::sleep(delay).await;
        delay *= 2;
    }

    unreachable!("retry loop always returns")
}
