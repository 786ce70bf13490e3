//! # Error Handling
//!
//! Error taxonomy shared by the storage backends, the GitHub source and the
//! reconciler. Storage failures are classified once here so that every
//! backend reports `AlreadyExists`, `BackendUnavailable` and
//! `TransientWriteConflict` the same way.

use sea_orm::{ConnAcquireErr, DbErr, RuntimeErr};
use thiserror::Error;

/// Result alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by a [`RepositoryStore`](crate::store::RepositoryStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("a repository with this url already exists")]
    AlreadyExists,
    #[error("storage backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("write contention: {0}")]
    TransientWriteConflict(String),
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("failed to serialize stored value: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether retrying the same write may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::TransientWriteConflict(_))
    }

    /// Short machine-readable label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::NotFound => "not_found",
            StoreError::AlreadyExists => "already_exists",
            StoreError::BackendUnavailable(_) => "backend_unavailable",
            StoreError::TransientWriteConflict(_) => "transient_write_conflict",
            StoreError::Backend(_) => "backend",
            StoreError::Serialization(_) => "serialization",
        }
    }
}

impl From<DbErr> for StoreError {
    fn from(error: DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return StoreError::AlreadyExists;
        }

        if is_write_contention(&error) {
            return StoreError::TransientWriteConflict(error.to_string());
        }

        match error {
            DbErr::RecordNotFound(_) => StoreError::NotFound,
            DbErr::Conn(err) => StoreError::BackendUnavailable(err.to_string()),
            DbErr::ConnectionAcquire(err) => StoreError::BackendUnavailable(err.to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() {
            StoreError::BackendUnavailable(error.to_string())
        } else if error.is_decode() {
            StoreError::Backend(format!("malformed response: {}", error))
        } else {
            StoreError::Backend(error.to_string())
        }
    }
}

fn sqlx_error(error: &DbErr) -> Option<&sea_orm::sqlx::Error> {
    match error {
        DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | DbErr::Exec(RuntimeErr::SqlxError(sqlx_err))
        | DbErr::Conn(RuntimeErr::SqlxError(sqlx_err)) => Some(sqlx_err),
        _ => None,
    }
}

/// Detects a `UNIQUE` constraint violation reported by SQLite.
pub fn is_unique_violation(error: &DbErr) -> bool {
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let Some(db_error) = sqlx_error(error).and_then(|err| err.as_database_error()) else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    db_error
        .code()
        .is_some_and(|code| SQLITE_DUPLICATE_CODES.contains(&code.as_ref()))
}

/// Detects SQLite busy/locked failures caused by concurrent writers.
pub fn is_write_contention(error: &DbErr) -> bool {
    // SQLITE_BUSY, SQLITE_LOCKED and their extended variants.
    const SQLITE_CONTENTION_CODES: &[&str] = &["5", "6", "261", "262", "517", "773"];

    if matches!(error, DbErr::ConnectionAcquire(ConnAcquireErr::Timeout)) {
        return true;
    }

    let Some(sqlx_err) = sqlx_error(error) else {
        return false;
    };

    if let Some(db_error) = sqlx_err.as_database_error() {
        if db_error
            .code()
            .is_some_and(|code| SQLITE_CONTENTION_CODES.contains(&code.as_ref()))
        {
            return true;
        }
        let message = db_error.message();
        return message.contains("database is locked") || message.contains("database table is locked");
    }

    matches!(sqlx_err, sea_orm::sqlx::Error::PoolTimedOut)
}

/// Errors raised while fetching repository data from GitHub.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid GitHub repository url '{url}'")]
    InvalidUrl { url: String },

    #[error("repository not found: {owner}/{repo}")]
    NotFound { owner: String, repo: String },

    #[error("GitHub API rate limit exceeded")]
    RateLimited { retry_after: Option<u64> },

    #[error("GitHub API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("failed to decode GitHub response: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for SourceError {
    fn from(error: serde_json::Error) -> Self {
        SourceError::Decode(error.to_string())
    }
}

impl From<base64::DecodeError> for SourceError {
    fn from(error: base64::DecodeError) -> Self {
        SourceError::Decode(error.to_string())
    }
}
