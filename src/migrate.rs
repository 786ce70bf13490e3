//! Copying data between storage backends.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{StoreError, StoreResult};
use crate::store::RepositoryStore;

/// Outcome of [`copy_between`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub source: String,
    pub target: String,
    /// Repositories inserted into the target
    pub copied: usize,
    /// Repositories the target already had
    pub skipped: usize,
    /// Repositories that could not be written, with the reason
    pub failed: Vec<(String, String)>,
    /// Technology entries whose target count was adjusted
    pub technologies: usize,
}

/// Repository and technology counts of one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub backend: String,
    pub repositories: usize,
    pub technologies: usize,
    pub technology_references: u64,
}

/// Copies every repository missing from `target`, then aligns the target's
/// technology counts with the source's.
///
/// Existing target records are left untouched. Reading either side failing
/// aborts the copy; individual write failures are collected in the report.
pub async fn copy_between(
    source: &dyn RepositoryStore,
    target: &dyn RepositoryStore,
) -> StoreResult<MigrationReport> {
    let mut report = MigrationReport {
        source: source.backend_name().to_string(),
        target: target.backend_name().to_string(),
        ..MigrationReport::default()
    };

    for record in source.list_all().await? {
        if target.find_by_url(&record.repo_url).await?.is_some() {
            report.skipped += 1;
            continue;
        }

        match target.insert(record.to_draft()).await {
            Ok(_) => report.copied += 1,
            Err(StoreError::AlreadyExists) => report.skipped += 1,
            Err(err) => {
                warn!(repo_url = %record.repo_url, error = %err, "Failed to copy repository");
                report.failed.push((record.repo_url, err.to_string()));
            }
        }
    }

    let existing: HashMap<String, u64> = target
        .list_technologies()
        .await?
        .into_iter()
        .map(|entry| (entry.name, entry.count))
        .collect();

    for entry in source.list_technologies().await? {
        let current = existing.get(&entry.name).copied().unwrap_or_default();
        let delta = i64::try_from(entry.count).unwrap_or(i64::MAX)
            - i64::try_from(current).unwrap_or(i64::MAX);
        if delta == 0 {
            continue;
        }

        target.upsert_tally_count(&entry.name, delta).await?;
        report.technologies += 1;
    }

    info!(
        source = %report.source,
        target = %report.target,
        copied = report.copied,
        skipped = report.skipped,
        failed = report.failed.len(),
        technologies = report.technologies,
        "Migration finished"
    );
    Ok(report)
}

pub async fn describe(store: &dyn RepositoryStore) -> StoreResult<StoreSummary> {
    let repositories = store.list_all().await?.len();
    let technologies = store.list_technologies().await?;

    Ok(StoreSummary {
        backend: store.backend_name().to_string(),
        repositories,
        technology_references: technologies.iter().map(|entry| entry.count).sum(),
        technologies: technologies.len(),
    })
}
