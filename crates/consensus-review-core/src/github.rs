//! Minimal GitHub REST client: pull-request diff and metadata, issue comments.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::config::{env_value, parse_number, ConfigError, FileConfig};
use crate::pipeline::{DiffSource, Publisher};

const DEFAULT_API_URL: &str = "https://api.github.com";
const DEFAULT_SERVER_URL: &str = "https://github.com";
const DIFF_MEDIA_TYPE: &str = "application/vnd.github.v3.diff";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";

/// Identifies the pull request under review and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubSettings {
    pub token: String,
    /// `owner/name`.
    pub repo: String,
    pub pr_number: u64,
    /// REST API base, e.g. `https://api.github.com`.
    pub api_url: String,
    /// Web base used for links, e.g. `https://github.com`.
    pub server_url: String,
}

impl GitHubSettings {
    const TOKEN_ENV: &'static str = "GITHUB_TOKEN";
    const REPO_ENV: &'static str = "GITHUB_REPO";
    const PR_ENV: &'static str = "PR_NUMBER";
    const API_URL_ENV: &'static str = "GITHUB_API_URL";
    const SERVER_URL_ENV: &'static str = "GITHUB_SERVER_URL";

    pub(crate) fn from_map(
        vars: &HashMap<String, String>,
        file: &FileConfig,
    ) -> Result<Self, ConfigError> {
        let token = env_value(vars, Self::TOKEN_ENV);
        let repo = env_value(vars, Self::REPO_ENV);
        let pr_number = env_value(vars, Self::PR_ENV);

        let (token, repo, pr_number) = match (token, repo, pr_number) {
            (Some(token), Some(repo), Some(pr_number)) => (token, repo, pr_number),
            (token, repo, pr_number) => {
                let missing = [
                    (Self::TOKEN_ENV, token.is_none()),
                    (Self::REPO_ENV, repo.is_none()),
                    (Self::PR_ENV, pr_number.is_none()),
                ]
                .into_iter()
                .filter(|(_, absent)| *absent)
                .map(|(name, _)| name.to_string())
                .collect();
                return Err(ConfigError::MissingVars(missing));
            }
        };

        if !is_repo_slug(&repo) {
            return Err(ConfigError::InvalidValue {
                name: Self::REPO_ENV.to_string(),
                value: repo,
                reason: "expected `owner/name`".into(),
            });
        }
        let pr_number: u64 = parse_number(Self::PR_ENV, &pr_number)?;
        if pr_number == 0 {
            return Err(ConfigError::InvalidValue {
                name: Self::PR_ENV.to_string(),
                value: "0".into(),
                reason: "pull request numbers start at 1".into(),
            });
        }

        let api_url = env_value(vars, Self::API_URL_ENV)
            .or_else(|| file.github_api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let server_url = env_value(vars, Self::SERVER_URL_ENV)
            .or_else(|| file.github_server_url.clone())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());

        Ok(Self {
            token,
            repo,
            pr_number,
            api_url: api_url.trim_end_matches('/').to_string(),
            server_url: server_url.trim_end_matches('/').to_string(),
        })
    }
}

fn is_repo_slug(repo: &str) -> bool {
    let mut parts = repo.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
    )
}

#[derive(Debug, Serialize)]
struct CreateCommentRequest<'a> {
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct CommentResponse {
    id: u64,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PullRequestResponse {
    head: PullRequestRefResponse,
}

#[derive(Debug, Deserialize)]
struct PullRequestRefResponse {
    sha: String,
}

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    api_url: String,
    repo: String,
    pr_number: u64,
    token: String,
}

impl GitHubClient {
    pub fn new(settings: &GitHubSettings) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("consensus-review/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build GitHub HTTP client")?;
        Ok(Self {
            http,
            api_url: settings.api_url.clone(),
            repo: settings.repo.clone(),
            pr_number: settings.pr_number,
            token: settings.token.clone(),
        })
    }

    fn pull_url(&self) -> String {
        format!(
            "{}/repos/{}/pulls/{}",
            self.api_url, self.repo, self.pr_number
        )
    }

    fn comments_url(&self) -> String {
        format!(
            "{}/repos/{}/issues/{}/comments",
            self.api_url, self.repo, self.pr_number
        )
    }

    async fn get(&self, url: &str, accept: &str) -> Result<reqwest::Response> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .header("Accept", accept)
            .send()
            .await
            .with_context(|| format!("failed to send GitHub request to {url}"))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("GitHub API error ({}): {}", status, body);
        }
        Ok(response)
    }

    /// Unified diff of the pull request.
    #[instrument(skip(self), fields(repo = %self.repo, pr = self.pr_number))]
    pub async fn fetch_diff(&self) -> Result<String> {
        let response = self.get(&self.pull_url(), DIFF_MEDIA_TYPE).await?;
        response
            .text()
            .await
            .context("failed to read pull request diff")
    }

    /// SHA of the pull request's head commit.
    #[instrument(skip(self), fields(repo = %self.repo, pr = self.pr_number))]
    pub async fn fetch_head_sha(&self) -> Result<String> {
        let response = self.get(&self.pull_url(), JSON_MEDIA_TYPE).await?;
        let pull: PullRequestResponse = response
            .json()
            .await
            .context("failed to parse pull request metadata")?;
        Ok(pull.head.sha)
    }

    /// Post a new issue comment on the pull request.
    #[instrument(
        skip(self, body),
        fields(repo = %self.repo, pr = self.pr_number, body_len = body.len())
    )]
    pub async fn post_comment(&self, body: &str) -> Result<()> {
        let response = self
            .http
            .post(self.comments_url())
            .bearer_auth(&self.token)
            .header("Accept", JSON_MEDIA_TYPE)
            .json(&CreateCommentRequest { body })
            .send()
            .await
            .context("failed to send comment to GitHub")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("GitHub rejected comment ({}): {}", status, body);
        }

        let comment: CommentResponse = response
            .json()
            .await
            .context("failed to parse GitHub comment response")?;
        info!(
            comment_id = comment.id,
            url = comment.html_url.as_deref().unwrap_or(""),
            "posted review comment"
        );
        Ok(())
    }
}

#[async_trait]
impl DiffSource for GitHubClient {
    async fn diff(&self) -> Result<String> {
        self.fetch_diff().await
    }

    async fn head_sha(&self) -> Result<Option<String>> {
        self.fetch_head_sha().await.map(Some)
    }
}

#[async_trait]
impl Publisher for GitHubClient {
    async fn publish(&self, body: &str) -> Result<()> {
        self.post_comment(body).await
    }
}
