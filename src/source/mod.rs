//! # Repository Source
//!
//! The upstream collaborator that supplies repository data. [`RepositorySource`]
//! exposes the individual GitHub calls plus a provided
//! [`fetch_repository`](RepositorySource::fetch_repository) that composes them
//! into a [`FetchedRepository`] ready for the reconciler.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::metadata::{METADATA_PATHS, parse_metadata_file};

pub mod github;

pub use github::{GitHubConfig, GitHubSource};

static GITHUB_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:https?://)?(?:www\.)?github\.com[/:]([^/]+)/([^/\s?#]+)")
        .expect("Invalid regex")
});

/// Owner and name of a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

/// Canonical storage form of a repository url.
///
/// Surrounding whitespace, query strings, fragments, trailing slashes and a
/// `.git` suffix are removed.
pub fn normalize_repo_url(url: &str) -> String {
    let mut normalized = url.trim();
    if let Some(index) = normalized.find(['?', '#']) {
        normalized = &normalized[..index];
    }
    let mut normalized = normalized.trim_end_matches('/');
    if let Some(stripped) = normalized.strip_suffix(".git") {
        normalized = stripped.trim_end_matches('/');
    }
    normalized.to_string()
}

/// Extracts owner and repository name from the common GitHub url shapes,
/// including `git@github.com:owner/repo.git`.
pub fn parse_github_url(url: &str) -> Result<RepoRef, SourceError> {
    let captures = GITHUB_URL
        .captures(url.trim())
        .ok_or_else(|| SourceError::InvalidUrl {
            url: url.to_string(),
        })?;

    let owner = captures[1].to_string();
    let name = captures[2].trim_end_matches(".git").to_string();

    if owner.is_empty() || name.is_empty() {
        return Err(SourceError::InvalidUrl {
            url: url.to_string(),
        });
    }

    Ok(RepoRef { owner, name })
}

/// Account owning a repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryOwner {
    #[serde(default)]
    pub login: String,
    pub avatar_url: Option<String>,
    pub html_url: Option<String>,
}

/// Repository statistics as reported by `GET /repos/{owner}/{repo}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySummary {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "stargazers_count", default)]
    pub stars: u64,
    #[serde(rename = "forks_count", default)]
    pub forks: u64,
    #[serde(rename = "watchers_count", default)]
    pub watchers: u64,
    pub language: Option<String>,
    #[serde(rename = "open_issues_count", default)]
    pub open_issues: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub owner: RepositoryOwner,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub topics: Vec<String>,
    pub default_branch: Option<String>,
}

/// One entry of the recent commit list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    /// First seven characters of the commit sha
    pub short_sha: String,
    /// First line of the commit message
    pub message: String,
    pub author: String,
    /// Author date as `YYYY-MM-DD`
    pub date: String,
    pub url: String,
}

/// Everything fetched upstream for one repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedRepository {
    pub summary: RepositorySummary,
    pub readme: Option<String>,
    /// Contents of the first metadata file found, or `{}`
    pub custom_metadata: JsonValue,
    /// Path the metadata was read from
    pub metadata_path: Option<String>,
    pub recent_commits: Vec<CommitSummary>,
}

#[async_trait]
pub trait RepositorySource: Send + Sync {
    async fn fetch_summary(&self, owner: &str, repo: &str)
    -> Result<RepositorySummary, SourceError>;

    /// Decoded README text, `None` when the repository has none.
    async fn fetch_readme(&self, owner: &str, repo: &str) -> Result<Option<String>, SourceError>;

    /// Raw file contents, `None` when the path does not exist.
    async fn fetch_file_if_exists(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, SourceError>;

    async fn fetch_recent_commits(
        &self,
        owner: &str,
        repo: &str,
        limit: usize,
    ) -> Result<Vec<CommitSummary>, SourceError>;

    /// Number of commits [`fetch_repository`](Self::fetch_repository) requests.
    fn commit_limit(&self) -> usize {
        5
    }

    /// Fetches the summary, README, metadata file and recent commits.
    ///
    /// Only url parsing and the summary call can fail the whole fetch; the
    /// other parts degrade to empty values with a warning.
    async fn fetch_repository(&self, url: &str) -> Result<FetchedRepository, SourceError> {
        let repo_ref = parse_github_url(url)?;
        let (owner, name) = (repo_ref.owner.as_str(), repo_ref.name.as_str());

        let summary = self.fetch_summary(owner, name).await?;

        let readme = match self.fetch_readme(owner, name).await {
            Ok(readme) => readme,
            Err(error) => {
                warn!(owner, repo = name, %error, "Failed to fetch README");
                None
            }
        };

        let mut custom_metadata = JsonValue::Object(Map::new());
        let mut metadata_path = None;
        for path in METADATA_PATHS {
            match self.fetch_file_if_exists(owner, name, path).await {
                Ok(Some(bytes)) => match parse_metadata_file(&bytes) {
                    Some(value) => {
                        debug!(owner, repo = name, path, "Found project metadata");
                        custom_metadata = value;
                        metadata_path = Some(path.to_string());
                        break;
                    }
                    None => {
                        warn!(owner, repo = name, path, "Metadata file is not a JSON object");
                    }
                },
                Ok(None) => {}
                Err(error) => {
                    warn!(owner, repo = name, path, %error, "Failed to fetch metadata file");
                }
            }
        }

        let recent_commits = match self
            .fetch_recent_commits(owner, name, self.commit_limit())
            .await
        {
            Ok(commits) => commits,
            Err(error) => {
                warn!(owner, repo = name, %error, "Failed to fetch recent commits");
                Vec::new()
            }
        };

        Ok(FetchedRepository {
            summary,
            readme,
            custom_metadata,
            metadata_path,
            recent_commits,
        })
    }
}
