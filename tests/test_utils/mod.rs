//! Test utilities shared by the integration tests.
//!
//! Provides in-memory SQLite stores with migrations applied, fetched
//! repository fixtures and scripted stand-ins for the store and source seams.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use showcase::error::{SourceError, StoreError, StoreResult};
use showcase::models::{RepositoryDraft, RepositoryRecord, TechnologyCount};
use showcase::source::{
    CommitSummary, FetchedRepository, RepositoryOwner, RepositorySource, RepositorySummary,
    normalize_repo_url,
};
use showcase::store::{RepositoryStore, SqliteStore};

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// A [`SqliteStore`] over a fresh in-memory database.
#[allow(dead_code)]
pub async fn sqlite_store() -> Result<Arc<SqliteStore>> {
    let db = setup_test_db().await?;
    Ok(Arc::new(SqliteStore::new(Arc::new(db))))
}

/// Builds fetched data for `owner/name` with the given language and metadata.
#[allow(dead_code)]
pub fn fetched_repo(
    owner: &str,
    name: &str,
    language: Option<&str>,
    custom_metadata: JsonValue,
) -> FetchedRepository {
    FetchedRepository {
        summary: RepositorySummary {
            name: name.to_string(),
            description: Some(format!("{} by {}", name, owner)),
            stars: 42,
            forks: 7,
            watchers: 42,
            language: language.map(str::to_string),
            open_issues: 3,
            created_at: Some(timestamp("2020-01-01T00:00:00Z")),
            updated_at: Some(timestamp("2024-05-01T12:30:00Z")),
            owner: RepositoryOwner {
                login: owner.to_string(),
                avatar_url: None,
                html_url: Some(format!("https://github.com/{}", owner)),
            },
            html_url: format!("https://github.com/{}/{}", owner, name),
            topics: vec!["showcase".to_string()],
            default_branch: Some("main".to_string()),
        },
        readme: Some(format!("# {}", name)),
        custom_metadata,
        metadata_path: None,
        recent_commits: vec![CommitSummary {
            short_sha: "abc1234".to_string(),
            message: "Initial commit".to_string(),
            author: owner.to_string(),
            date: "2024-05-01".to_string(),
            url: format!("https://github.com/{}/{}/commit/abc1234", owner, name),
        }],
    }
}

#[allow(dead_code)]
pub fn timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .unwrap()
        .with_timezone(&Utc)
}

/// A draft ready to insert directly into a store.
#[allow(dead_code)]
pub fn draft(url: &str, language: Option<&str>, last_synced: &str) -> RepositoryDraft {
    RepositoryDraft {
        repo_url: url.to_string(),
        name: url.rsplit('/').next().unwrap_or_default().to_string(),
        owner: "owner".to_string(),
        description: None,
        stars: 1,
        forks: 0,
        language: language.map(str::to_string),
        last_updated: "2024-05-01".to_string(),
        last_synced: timestamp(last_synced),
        metadata: json!({"tagline": "fixture"}),
    }
}

/// Store whose reads succeed empty and whose writes always hit lock contention.
///
/// Clones share the attempt counter.
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct ContendedStore {
    pub write_attempts: Arc<AtomicU32>,
}

#[allow(dead_code)]
impl ContendedStore {
    pub fn attempts(&self) -> u32 {
        self.write_attempts.load(Ordering::SeqCst)
    }

    fn locked(&self) -> StoreError {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        StoreError::TransientWriteConflict("database is locked".to_string())
    }
}

#[async_trait]
impl RepositoryStore for ContendedStore {
    async fn find_by_url(&self, _url: &str) -> StoreResult<Option<RepositoryRecord>> {
        Ok(None)
    }

    async fn insert(&self, _draft: RepositoryDraft) -> StoreResult<RepositoryRecord> {
        Err(self.locked())
    }

    async fn replace(&self, _url: &str, _draft: RepositoryDraft) -> StoreResult<RepositoryRecord> {
        Err(self.locked())
    }

    async fn list_all(&self) -> StoreResult<Vec<RepositoryRecord>> {
        Ok(Vec::new())
    }

    async fn delete_by_url(&self, _url: &str) -> StoreResult<RepositoryRecord> {
        Err(self.locked())
    }

    async fn upsert_tally_count(&self, _name: &str, _delta: i64) -> StoreResult<u64> {
        Err(self.locked())
    }

    async fn list_technologies(&self) -> StoreResult<Vec<TechnologyCount>> {
        Ok(Vec::new())
    }

    fn backend_name(&self) -> &'static str {
        "contended"
    }
}

/// Source serving canned repositories by normalized url. Unknown urls fail
/// as if GitHub were unreachable.
#[allow(dead_code)]
#[derive(Default)]
pub struct StaticSource {
    repositories: HashMap<String, FetchedRepository>,
}

#[allow(dead_code)]
impl StaticSource {
    pub fn with(mut self, url: &str, fetched: FetchedRepository) -> Self {
        self.repositories.insert(normalize_repo_url(url), fetched);
        self
    }

    fn unavailable() -> SourceError {
        SourceError::Api {
            status: 503,
            message: "upstream unavailable".to_string(),
        }
    }
}

#[async_trait]
impl RepositorySource for StaticSource {
    async fn fetch_summary(
        &self,
        _owner: &str,
        _repo: &str,
    ) -> Result<RepositorySummary, SourceError> {
        Err(Self::unavailable())
    }

    async fn fetch_readme(&self, _owner: &str, _repo: &str) -> Result<Option<String>, SourceError> {
        Err(Self::unavailable())
    }

    async fn fetch_file_if_exists(
        &self,
        _owner: &str,
        _repo: &str,
        _path: &str,
    ) -> Result<Option<Vec<u8>>, SourceError> {
        Err(Self::unavailable())
    }

    async fn fetch_recent_commits(
        &self,
        _owner: &str,
        _repo: &str,
        _limit: usize,
    ) -> Result<Vec<CommitSummary>, SourceError> {
        Err(Self::unavailable())
    }

    async fn fetch_repository(&self, url: &str) -> Result<FetchedRepository, SourceError> {
        self.repositories
            .get(&normalize_repo_url(url))
            .cloned()
            .ok_or_else(Self::unavailable)
    }
}
