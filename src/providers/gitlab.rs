use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::error::Error;

use crate::diff::Address;
use crate::providers::{send_with_retry, InlineComment, PrInfo};

const GITLAB_API_BASE: &str = "https://gitlab.com/api/v4";

pub struct GitLabClient {
    client: Client,
    token: String,
}

#[derive(Debug, Deserialize)]
struct MergeRequestResponse {
    iid: u64,
    title: String,
    description: Option<String>,
    state: String,
    web_url: String,
    created_at: String,
    source_branch: String,
    target_branch: String,
    author: AuthorRef,
    diff_refs: DiffRefs,
}

#[derive(Debug, Deserialize)]
struct AuthorRef {
    username: String,
}

#[derive(Debug, Deserialize)]
struct DiffRefs {
    base_sha: String,
    head_sha: String,
    start_sha: String,
}

#[derive(Debug, Deserialize)]
struct ChangesResponse {
    changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    old_path: String,
    new_path: String,
    diff: String,
}

#[derive(Serialize)]
struct NoteBody<'a> {
    body: &'a str,
}

#[derive(Serialize)]
struct DiscussionBody<'a> {
    body: &'a str,
    position: DiscussionPosition<'a>,
}

#[derive(Serialize)]
struct DiscussionPosition<'a> {
    position_type: &'static str,
    base_sha: &'a str,
    head_sha: &'a str,
    start_sha: &'a str,
    new_path: &'a str,
    new_line: u32,
}

impl GitLabClient {
    pub fn new(token: String) -> Self {
        Self {
            client: Client::new(),
            token,
        }
    }

    // Project paths go into the URL as a single %2F-encoded segment.
    fn project_id(owner: &str, repo: &str) -> String {
        format!("{}%2F{}", owner, repo)
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header("PRIVATE-TOKEN", &self.token)
            .header("User-Agent", "prlink")
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("PRIVATE-TOKEN", &self.token)
            .header("User-Agent", "prlink")
    }

    pub async fn validate_token(&self) -> Result<(), Box<dyn Error>> {
        let url = format!("{}/user", GITLAB_API_BASE);
        let response = send_with_retry(self.get(&url)).await?;
        if !response.status().is_success() {
            return Err(format!("GitLab token rejected: {}", response.status()).into());
        }
        Ok(())
    }

    pub async fn fetch_mr(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PrInfo, Box<dyn Error>> {
        let url = format!(
            "{}/projects/{}/merge_requests/{}",
            GITLAB_API_BASE,
            Self::project_id(owner, repo),
            number
        );
        let response = send_with_retry(self.get(&url)).await?;
        if !response.status().is_success() {
            return Err(format!("GitLab API error: {}", response.status()).into());
        }

        let mr: MergeRequestResponse = response.json().await?;
        Ok(PrInfo {
            number: mr.iid,
            title: mr.title,
            description: mr.description.unwrap_or_default(),
            author: mr.author.username,
            source_branch: mr.source_branch,
            target_branch: mr.target_branch,
            state: mr.state,
            head_sha: mr.diff_refs.head_sha,
            base_sha: mr.diff_refs.base_sha,
            start_sha: mr.diff_refs.start_sha,
            html_url: mr.web_url,
            created_at: mr.created_at,
        })
    }

    /// GitLab returns per-file diff bodies without `---`/`+++` headers, so we
    /// synthesize them to get one standard unified diff.
    pub async fn fetch_diff(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<String, Box<dyn Error>> {
        let url = format!(
            "{}/projects/{}/merge_requests/{}/changes",
            GITLAB_API_BASE,
            Self::project_id(owner, repo),
            number
        );
        let response = send_with_retry(self.get(&url)).await?;
        if !response.status().is_success() {
            return Err(format!("GitLab API error: {}", response.status()).into());
        }

        let changes: ChangesResponse = response.json().await?;
        Ok(synthesize_diff(&changes.changes))
    }

    pub async fn post_summary(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<(), Box<dyn Error>> {
        let url = format!(
            "{}/projects/{}/merge_requests/{}/notes",
            GITLAB_API_BASE,
            Self::project_id(owner, repo),
            number
        );
        let response = send_with_retry(self.post(&url).json(&NoteBody { body })).await?;
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
        let new_line = match comment.address {
            Address::Line(line) => line,
            Address::Position(_) => {
                return Err("GitLab comments require line addressing, not patch positions".into());
            }
        };

        let url = format!(
            "{}/projects/{}/merge_requests/{}/discussions",
            GITLAB_API_BASE,
            Self::project_id(owner, repo),
            pr.number
        );
        let request = self.post(&url).json(&DiscussionBody {
            body: &comment.body,
            position: DiscussionPosition {
                position_type: "text",
                base_sha: &pr.base_sha,
                head_sha: &pr.head_sha,
                start_sha: &pr.start_sha,
                new_path: &comment.file,
                new_line,
            },
        });

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

/// GitLab's `/changes` endpoint returns each file's hunks without the
/// `---`/`+++` header pair, so one is synthesized per file to produce a
/// standard unified diff.
fn synthesize_diff(changes: &[Change]) -> String {
    let mut diff = String::new();
    for change in changes {
        diff.push_str(&format!("--- a/{}\n", change.old_path));
        diff.push_str(&format!("+++ b/{}\n", change.new_path));
        diff.push_str(&change.diff);
        if !change.diff.ends_with('\n') {
            diff.push('\n');
        }
    }
    diff
}
