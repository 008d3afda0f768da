use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::error::Error;

use crate::diff::Address;
use crate::providers::{send_with_retry, InlineComment, PrInfo};

const GITHUB_API_BASE: &str = "https://api.github.com";

pub struct GitHubClient {
    client: Client,
    token: String,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    number: u64,
    title: String,
    body: Option<String>,
    state: String,
    html_url: String,
    created_at: String,
    user: UserRef,
    head: BranchRef,
    base: BranchRef,
}

#[derive(Debug, Deserialize)]
struct UserRef {
    login: String,
}

#[derive(Debug, Deserialize)]
struct BranchRef {
    #[serde(rename = "ref")]
    branch: String,
    sha: String,
}

#[derive(Serialize)]
struct SummaryBody<'a> {
    body: &'a str,
}

#[derive(Serialize)]
struct PositionCommentBody<'a> {
    body: &'a str,
    commit_id: &'a str,
    path: &'a str,
    position: u32,
}

#[derive(Serialize)]
struct LineCommentBody<'a> {
    body: &'a str,
    commit_id: &'a str,
    path: &'a str,
    line: u32,
    side: &'static str,
}

impl GitHubClient {
    pub fn new(token: String) -> Self {
        Self {
            client: Client::new(),
            token,
        }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", "prlink")
            .header("Accept", "application/vnd.github.v3+json")
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", "prlink")
            .header("Accept", "application/vnd.github.v3+json")
    }

    pub async fn validate_token(&self) -> Result<(), Box<dyn Error>> {
        let url = format!("{}/user", GITHUB_API_BASE);
        let response = send_with_retry(self.get(&url)).await?;
        if !response.status().is_success() {
            return Err(format!("GitHub token rejected: {}", response.status()).into());
        }
        Ok(())
    }

    pub async fn fetch_pr(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PrInfo, Box<dyn Error>> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{}",
            GITHUB_API_BASE, owner, repo, number
        );
        let response = send_with_retry(self.get(&url)).await?;
        if !response.status().is_success() {
            return Err(format!("GitHub API error: {}", response.status()).into());
        }

        let pull: PullResponse = response.json().await?;
        Ok(PrInfo {
            number: pull.number,
            title: pull.title,
            description: pull.body.unwrap_or_default(),
            author: pull.user.login,
            source_branch: pull.head.branch,
            target_branch: pull.base.branch,
            state: pull.state,
            head_sha: pull.head.sha,
            // GitHub's position scheme never needs the merge-base shas, but
            // the normalized record carries them for parity with GitLab.
            base_sha: pull.base.sha.clone(),
            start_sha: pull.base.sha,
            html_url: pull.html_url,
            created_at: pull.created_at,
        })
    }

    /// The raw unified diff, via GitHub's diff media type.
    pub async fn fetch_diff(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<String, Box<dyn Error>> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{}",
            GITHUB_API_BASE, owner, repo, number
        );
        let request = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", "prlink")
            .header("Accept", "application/vnd.github.v3.diff");

        let response = send_with_retry(request).await?;
        if !response.status().is_success() {
            return Err(format!("GitHub API error: {}", response.status()).into());
        }
        Ok(response.text().await?)
    }

    pub async fn post_summary(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<(), Box<dyn Error>> {
        let url = format!(
            "{}/repos/{}/{}/issues/{}/comments",
            GITHUB_API_BASE, owner, repo, number
        );
        let response = send_with_retry(self.post(&url).json(&SummaryBody { body })).await?;
        if !response.status().is_success() {
            return Err(format!("Failed to post summary: {}", response.status()).into());
        }
        Ok(())
    }

    pub async fn post_inline_comment(
        &self,
        owner: &str,
        repo: &str,
        pr: &PrInfo,
        comment: &InlineComment,
    ) -> Result<(), Box<dyn Error>> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{}/comments",
            GITHUB_API_BASE, owner, repo, pr.number
        );

        let request = match comment.address {
            Address::Position(position) => self.post(&url).json(&PositionCommentBody {
                body: &comment.body,
                commit_id: &pr.head_sha,
                path: &comment.file,
                position,
            }),
            Address::Line(line) => self.post(&url).json(&LineCommentBody {
                body: &comment.body,
                commit_id: &pr.head_sha,
                path: &comment.file,
                line,
                side: "RIGHT",
            }),
        };

        let response = send_with_retry(request).await?;
        if !response.status().is_success() {
            return Err(format!(
                "Failed to comment on {}: {}",
                comment.file,
                response.status()
            )
            .into());
        }
        Ok(())
    }
}
