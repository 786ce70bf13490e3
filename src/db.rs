//! Database connection and maintenance for the embedded SQLite backend.
//!
//! The pool is created through SeaORM with configurable parameters. Every
//! connection runs in WAL journal mode with a busy timeout so that a second
//! process writing the same file waits before reporting a lock.

use anyhow::{Context, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::AppConfig;

/// Milliseconds SQLite waits on a locked database before failing a statement.
pub const BUSY_TIMEOUT_MS: u64 = 20_000;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {source}")]
    ConnectionFailed {
        #[from]
        source: sea_orm::DbErr,
    },
    #[error("Database connection timeout after {timeout_ms}ms")]
    ConnectionTimeout { timeout_ms: u64 },
    #[error("Invalid database configuration: {message}")]
    InvalidConfiguration { message: String },
}

/// Initializes a SQLite connection pool with the given configuration.
///
/// Connection attempts are retried with exponential backoff, starting at
/// 100ms. Once connected, the journal mode is switched to WAL and the busy
/// timeout is applied.
///
/// # Examples
///
/// ```no_run
/// use showcase::{config::AppConfig, db::init_pool};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = AppConfig::default();
///     let db = init_pool(&config).await?;
///     showcase::db::health_check(&db).await?;
///     Ok(())
/// }
/// ```
pub async fn init_pool(cfg: &AppConfig) -> Result<DatabaseConnection> {
    if cfg.database_url.is_empty() {
        return Err(DatabaseError::InvalidConfiguration {
            message: "Database URL cannot be empty".to_string(),
        }
        .into());
    }

    if !cfg.database_url.starts_with("sqlite:") {
        return Err(DatabaseError::InvalidConfiguration {
            message: format!("Unsupported database URL '{}'", cfg.database_url),
        }
        .into());
    }

    let mut opt = ConnectOptions::new(&cfg.database_url);
    opt.max_connections(cfg.db_max_connections)
        .acquire_timeout(Duration::from_millis(cfg.db_acquire_timeout_ms))
        .idle_timeout(Duration::from_secs(600)) // 10 minutes
        .max_lifetime(Duration::from_secs(1800)) // 30 minutes
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let max_retries = 5;
    let mut retry_delay = Duration::from_millis(100);

    for attempt in 1..=max_retries {
        match Database::connect(opt.clone()).await {
            Ok(conn) => {
                log::info!("Successfully connected to database (attempt {})", attempt);
                configure_connection(&conn).await?;
                return Ok(conn);
            }
            Err(e) => {
                if attempt == max_retries {
                    log::error!(
                        "Failed to connect to database after {} attempts: {}",
                        max_retries,
                        e
                    );
                    return Err(DatabaseError::ConnectionFailed { source: e }.into());
                }

                log::warn!(
                    "Database connection attempt {} failed: {}, retrying in {:?}",
                    attempt,
                    e,
                    retry_delay
                );

                sleep(retry_delay).await;
                retry_delay *= 2;
            }
        }
    }

    Err(DatabaseError::ConnectionTimeout {
        timeout_ms: cfg.db_acquire_timeout_ms,
    }
    .into())
}

async fn configure_connection(db: &DatabaseConnection) -> Result<()> {
    // In-memory databases ignore WAL and report "memory" instead.
    db.execute_unprepared("PRAGMA journal_mode = WAL")
        .await
        .context("Failed to enable WAL journal mode")?;
    db.execute_unprepared(&format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS))
        .await
        .context("Failed to set busy timeout")?;
    Ok(())
}

/// Health check for the database connection.
pub async fn health_check(db: &DatabaseConnection) -> Result<()> {
    let stmt = Statement::from_string(db.get_database_backend(), "SELECT 1".to_string());

    db.query_one(stmt)
        .await
        .context("Database health check failed")?;

    Ok(())
}

/// Rebuilds the database file, reclaiming free pages.
pub async fn vacuum(db: &DatabaseConnection) -> Result<()> {
    log::info!("Running VACUUM");
    db.execute_unprepared("VACUUM")
        .await
        .context("VACUUM failed")?;
    Ok(())
}

/// Result of a `wal_checkpoint(FULL)` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointStats {
    pub busy: bool,
    pub log_frames: i64,
    pub checkpointed_frames: i64,
}

/// Copies the write-ahead log back into the main database file.
pub async fn checkpoint_wal(db: &DatabaseConnection) -> Result<CheckpointStats> {
    log::info!("Running WAL checkpoint");
    let stmt = Statement::from_string(
        db.get_database_backend(),
        "PRAGMA wal_checkpoint(FULL)".to_string(),
    );

    let row = db
        .query_one(stmt)
        .await
        .context("WAL checkpoint failed")?
        .context("WAL checkpoint returned no row")?;

    let busy: i64 = row.try_get_by_index(0).context("missing busy column")?;
    let log_frames: i64 = row.try_get_by_index(1).context("missing log column")?;
    let checkpointed_frames: i64 = row
        .try_get_by_index(2)
        .context("missing checkpointed column")?;

    Ok(CheckpointStats {
        busy: busy != 0,
        log_frames,
        checkpointed_frames,
    })
}
