//! GitHub REST implementation of [`RepositorySource`].
//!
//! Unauthenticated requests work against public repositories with a low rate
//! limit; a token from [`GitHubConfig`] is sent as a bearer credential.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::AppConfig;
use crate::error::SourceError;
use crate::source::{CommitSummary, RepositorySource, RepositorySummary};

const ACCEPT_HEADER: &str = "application/vnd.github.v3+json";

/// GitHub API client configuration
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub api_base: String,
    pub token: Option<String>,
    pub user_agent: String,
    pub commit_limit: usize,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            token: None,
            user_agent: format!("showcase/{}", env!("CARGO_PKG_VERSION")),
            commit_limit: 5,
        }
    }
}

impl GitHubConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            api_base: config.github_api_base.trim_end_matches('/').to_string(),
            token: config.github_token.clone(),
            commit_limit: config.commit_limit,
            ..Self::default()
        }
    }
}

/// Repository source backed by the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubSource {
    client: reqwest::Client,
    config: GitHubConfig,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct CommitEnvelope {
    sha: String,
    #[serde(default)]
    html_url: String,
    commit: CommitDetail,
    author: Option<CommitAccount>,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    #[serde(default)]
    message: String,
    author: Option<CommitSignature>,
}

#[derive(Debug, Deserialize)]
struct CommitSignature {
    name: Option<String>,
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CommitAccount {
    login: Option<String>,
}

impl From<CommitEnvelope> for CommitSummary {
    fn from(envelope: CommitEnvelope) -> Self {
        let signature = envelope.commit.author;
        let author = signature
            .as_ref()
            .and_then(|sig| sig.name.clone())
            .or_else(|| envelope.author.and_then(|account| account.login))
            .unwrap_or_default();
        let date = signature
            .and_then(|sig| sig.date)
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        CommitSummary {
            short_sha: envelope.sha.chars().take(7).collect(),
            message: envelope
                .commit
                .message
                .lines()
                .next()
                .unwrap_or_default()
                .to_string(),
            author,
            date,
            url: envelope.html_url,
        }
    }
}

impl GitHubSource {
    pub fn new(config: GitHubConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    fn repo_url(&self, owner: &str, repo: &str) -> String {
        format!("{}/repos/{}/{}", self.config.api_base, owner, repo)
    }

    async fn get(&self, url: impl reqwest::IntoUrl) -> Result<Response, SourceError> {
        let mut request = self
            .client
            .get(url)
            .header("User-Agent", &self.config.user_agent)
            .header("Accept", ACCEPT_HEADER);

        if let Some(token) = &self.config.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        Ok(request.send().await?)
    }

    /// Maps a non-success response to a [`SourceError`].
    async fn error_for(response: Response, owner: &str, repo: &str) -> SourceError {
        let status = response.status();

        let rate_limit_exhausted = response
            .headers()
            .get("X-RateLimit-Remaining")
            .and_then(|h| h.to_str().ok())
            .is_some_and(|remaining| remaining == "0");

        if status == StatusCode::TOO_MANY_REQUESTS
            || (status == StatusCode::FORBIDDEN && rate_limit_exhausted)
        {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            warn!(owner, repo, ?retry_after, "Rate limited by GitHub API");
            return SourceError::RateLimited { retry_after };
        }

        if status == StatusCode::NOT_FOUND {
            return SourceError::NotFound {
                owner: owner.to_string(),
                repo: repo.to_string(),
            };
        }

        let body = response.text().await.unwrap_or_default();
        SourceError::Api {
            status: status.as_u16(),
            message: body,
        }
    }

    async fn fetch_content(
        &self,
        url: String,
        owner: &str,
        repo: &str,
    ) -> Result<Option<Vec<u8>>, SourceError> {
        let response = self.get(url).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::error_for(response, owner, repo).await);
        }

        // Directory listings come back as arrays and are not files.
        let body: serde_json::Value = response.json().await?;
        if !body.is_object() {
            return Ok(None);
        }

        let content: ContentResponse = serde_json::from_value(body)?;
        if content.encoding != "base64" {
            return Ok(Some(content.content.into_bytes()));
        }

        let compact: String = content
            .content
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        Ok(Some(STANDARD.decode(compact)?))
    }
}

#[async_trait]
impl RepositorySource for GitHubSource {
    async fn fetch_summary(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<RepositorySummary, SourceError> {
        debug!(owner, repo, "Fetching repository summary");
        let response = self.get(self.repo_url(owner, repo)).await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response, owner, repo).await);
        }

        Ok(response.json().await?)
    }

    async fn fetch_readme(&self, owner: &str, repo: &str) -> Result<Option<String>, SourceError> {
        let url = format!("{}/readme", self.repo_url(owner, repo));
        let bytes = self.fetch_content(url, owner, repo).await?;
        Ok(bytes.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    async fn fetch_file_if_exists(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, SourceError> {
        let url = format!(
            "{}/contents/{}",
            self.repo_url(owner, repo),
            path.trim_start_matches('/')
        );
        self.fetch_content(url, owner, repo).await
    }

    async fn fetch_recent_commits(
        &self,
        owner: &str,
        repo: &str,
        limit: usize,
    ) -> Result<Vec<CommitSummary>, SourceError> {
        let mut url = Url::parse(&format!("{}/commits", self.repo_url(owner, repo)))
            .map_err(|err| SourceError::Decode(err.to_string()))?;
        url.query_pairs_mut()
            .append_pair("per_page", &limit.to_string());

        let response = self.get(url).await?;
        if !response.status().is_success() {
            return Err(Self::error_for(response, owner, repo).await);
        }

        let commits: Vec<CommitEnvelope> = response.json().await?;
        Ok(commits
            .into_iter()
            .take(limit)
            .map(CommitSummary::from)
            .collect())
    }

    fn commit_limit(&self) -> usize {
        self.config.commit_limit
    }
}
