//! Backend-neutral repository and technology records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A stored repository summary, as returned by every backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    /// Backend-assigned identity (SQLite row id, Deta key or Firestore document id)
    pub id: String,
    pub repo_url: String,
    pub name: String,
    pub owner: String,
    pub description: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub language: Option<String>,
    /// Upstream `updated_at` as `YYYY-MM-DD`
    pub last_updated: String,
    pub last_synced: DateTime<Utc>,
    /// Project metadata; always a JSON object
    pub metadata: JsonValue,
}

impl RepositoryRecord {
    /// Drops the backend identity, e.g. to copy the record into another backend.
    pub fn to_draft(&self) -> RepositoryDraft {
        RepositoryDraft {
            repo_url: self.repo_url.clone(),
            name: self.name.clone(),
            owner: self.owner.clone(),
            description: self.description.clone(),
            stars: self.stars,
            forks: self.forks,
            language: self.language.clone(),
            last_updated: self.last_updated.clone(),
            last_synced: self.last_synced,
            metadata: self.metadata.clone(),
        }
    }

    /// Primary language when present and non-empty.
    pub fn primary_language(&self) -> Option<&str> {
        self.language.as_deref().filter(|lang| !lang.is_empty())
    }
}

/// Repository fields before a backend has assigned an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryDraft {
    pub repo_url: String,
    pub name: String,
    pub owner: String,
    pub description: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub language: Option<String>,
    pub last_updated: String,
    pub last_synced: DateTime<Utc>,
    pub metadata: JsonValue,
}

impl RepositoryDraft {
    pub fn into_record(self, id: impl Into<String>) -> RepositoryRecord {
        RepositoryRecord {
            id: id.into(),
            repo_url: self.repo_url,
            name: self.name,
            owner: self.owner,
            description: self.description,
            stars: self.stars,
            forks: self.forks,
            language: self.language,
            last_updated: self.last_updated,
            last_synced: self.last_synced,
            metadata: self.metadata,
        }
    }
}

/// Number of tracked repositories referencing a technology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnologyCount {
    pub name: String,
    pub count: u64,
}

impl TechnologyCount {
    pub fn new(name: impl Into<String>, count: u64) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}
