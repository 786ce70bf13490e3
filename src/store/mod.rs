//! # Backend Store Adapter
//!
//! [`RepositoryStore`] is the single persistence seam. Three adapters
//! implement it:
//!
//! - [`SqliteStore`]: embedded SQLite through SeaORM, wrapped in a
//!   [`RetryingStore`] to ride out lock contention from other processes
//! - [`DetaStore`]: Deta Base HTTP API
//! - [`FirestoreStore`]: Firestore REST API
//!
//! [`connect`] selects the adapter from [`AppConfig::backend`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use migration::{Migrator, MigratorTrait};

use crate::config::{AppConfig, BackendKind};
use crate::db;
use crate::error::{StoreError, StoreResult};
use crate::models::{RepositoryDraft, RepositoryRecord, TechnologyCount};

pub mod deta;
pub mod disconnected;
pub mod firestore;
mod http;
pub mod retry;
pub mod sqlite;

pub use deta::DetaStore;
pub use disconnected::DisconnectedStore;
pub use firestore::FirestoreStore;
pub use retry::{BackoffPolicy, RetryingStore};
pub use sqlite::SqliteStore;

/// Persistence operations shared by every storage backend.
///
/// Urls passed in are expected to be normalized already.
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    async fn find_by_url(&self, url: &str) -> StoreResult<Option<RepositoryRecord>>;

    /// Stores a new record. Fails with [`StoreError::AlreadyExists`] when the url is taken.
    async fn insert(&self, draft: RepositoryDraft) -> StoreResult<RepositoryRecord>;

    /// Overwrites every field of the record stored under `url`, keeping its id.
    /// Fails with [`StoreError::NotFound`] when nothing is stored there.
    async fn replace(&self, url: &str, draft: RepositoryDraft) -> StoreResult<RepositoryRecord>;

    /// All records, most recently synced first.
    async fn list_all(&self) -> StoreResult<Vec<RepositoryRecord>>;

    /// Removes and returns the record stored under `url`.
    async fn delete_by_url(&self, url: &str) -> StoreResult<RepositoryRecord>;

    /// Adds `delta` to the count of `name` and returns the new count.
    ///
    /// An entry whose count drops to zero or below is removed and `0` is
    /// returned. A missing entry with `delta <= 0` is left absent.
    async fn upsert_tally_count(&self, name: &str, delta: i64) -> StoreResult<u64>;

    /// Technology counts in insertion order.
    async fn list_technologies(&self) -> StoreResult<Vec<TechnologyCount>>;

    fn backend_name(&self) -> &'static str;
}

/// Orders records by `last_synced`, newest first. Ties keep their order.
pub(crate) fn sort_by_last_synced(records: &mut [RepositoryRecord]) {
    records.sort_by(|a, b| b.last_synced.cmp(&a.last_synced));
}

/// Parses a stored sync time. Accepts RFC 3339 and the legacy
/// `YYYY-MM-DD HH:MM:SS` form written by earlier releases.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Opens the backend selected in `config`.
pub async fn connect(config: &AppConfig) -> StoreResult<Arc<dyn RepositoryStore>> {
    connect_backend(config, config.backend).await
}

/// Opens a specific backend using the credentials in `config`.
pub async fn connect_backend(
    config: &AppConfig,
    kind: BackendKind,
) -> StoreResult<Arc<dyn RepositoryStore>> {
    match kind {
        BackendKind::Sqlite => {
            let conn = db::init_pool(config)
                .await
                .map_err(|err| StoreError::BackendUnavailable(format!("{:#}", err)))?;
            Migrator::up(&conn, None).await?;

            let store = SqliteStore::new(Arc::new(conn));
            let policy = BackoffPolicy::from_config(&config.retry);
            Ok(Arc::new(RetryingStore::new(store, policy)))
        }
        BackendKind::Deta => {
            let project_key = config.deta_project_key.as_deref().ok_or_else(|| {
                StoreError::BackendUnavailable("Deta project key is not configured".to_string())
            })?;
            Ok(Arc::new(DetaStore::new(project_key, &config.deta_api_base)?))
        }
        BackendKind::Firestore => {
            let project_id = config.firestore_project_id.as_deref().ok_or_else(|| {
                StoreError::BackendUnavailable("Firestore project id is not configured".to_string())
            })?;
            let token = config.firestore_access_token.as_deref().ok_or_else(|| {
                StoreError::BackendUnavailable(
                    "Firestore access token is not configured".to_string(),
                )
            })?;
            Ok(Arc::new(FirestoreStore::new(
                project_id,
                token,
                &config.firestore_api_base,
            )))
        }
    }
}

/// Like [`connect`], but degrades to a [`DisconnectedStore`] when the backend
/// cannot be initialized.
pub async fn connect_or_disconnected(config: &AppConfig) -> Arc<dyn RepositoryStore> {
    match connect(config).await {
        Ok(store) => store,
        Err(error) => {
            tracing::error!(
                backend = %config.backend,
                %error,
                "Storage backend unavailable; continuing without storage"
            );
            Arc::new(DisconnectedStore::new(config.backend, error.to_string()))
        }
    }
}
