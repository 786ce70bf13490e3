//! # Repository Reconciler
//!
//! Turns freshly fetched upstream data into stored records and keeps the
//! technology tally in step. Every operation reports an outcome value rather
//! than an error; failures are logged and counted.
//!
//! Tally bookkeeping is asymmetric:
//!
//! - `add` increments the primary language and every `tech_stack` entry
//! - `update` leaves the tally alone
//! - `remove` decrements the primary language only
//!
//! so `tech_stack` counts only ever grow.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::StoreError;
use crate::metadata;
use crate::models::{RepositoryDraft, RepositoryRecord, TechnologyCount};
use crate::source::{FetchedRepository, RepositorySource, normalize_repo_url};
use crate::store::RepositoryStore;
use crate::tally::TechnologyTally;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum AddOutcome {
    Added(RepositoryRecord),
    AlreadyExists,
    ValidationFailed(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum UpdateOutcome {
    Updated(RepositoryRecord),
    NotFound,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum RemoveOutcome {
    Removed(RepositoryRecord),
    NotFound,
    Failed(String),
}

/// Result of refreshing one url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum RefreshOutcome {
    Updated,
    NotFound,
    UpstreamFetchFailed(String),
    Failed(String),
}

impl RefreshOutcome {
    pub fn is_failure(&self) -> bool {
        !matches!(self, RefreshOutcome::Updated)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshEntry {
    pub url: String,
    pub outcome: RefreshOutcome,
}

/// Per-url results of a batch refresh, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub entries: Vec<RefreshEntry>,
}

impl RefreshReport {
    pub fn updated(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| !entry.outcome.is_failure())
            .count()
    }

    pub fn failures(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.outcome.is_failure())
            .count()
    }
}

fn record_outcome(operation: &'static str, outcome: &'static str) {
    metrics::counter!(
        "showcase_reconciler_outcomes_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

/// Builds the storable form of `fetched` for `url`, stamping `last_synced`.
pub fn build_draft(url: &str, fetched: &FetchedRepository) -> Result<RepositoryDraft, String> {
    let repo_url = normalize_repo_url(url);
    if repo_url.is_empty() {
        return Err("repository url is empty".to_string());
    }

    let summary = &fetched.summary;
    if summary.name.trim().is_empty() {
        return Err("fetched repository has no name".to_string());
    }
    if summary.owner.login.trim().is_empty() {
        return Err("fetched repository has no owner".to_string());
    }

    Ok(RepositoryDraft {
        repo_url,
        name: summary.name.clone(),
        owner: summary.owner.login.clone(),
        description: summary.description.clone(),
        stars: summary.stars,
        forks: summary.forks,
        language: summary.language.clone(),
        last_updated: summary
            .updated_at
            .map(|ts| ts.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        last_synced: Utc::now(),
        metadata: metadata::ensure_object(fetched.custom_metadata.clone()),
    })
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn RepositoryStore>,
    tally: TechnologyTally,
}

impl Reconciler {
    pub fn new(store: Arc<dyn RepositoryStore>) -> Self {
        Self {
            tally: TechnologyTally::new(store.clone()),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn RepositoryStore> {
        &self.store
    }

    pub fn tally(&self) -> &TechnologyTally {
        &self.tally
    }

    /// Stores a repository that is not tracked yet and counts its technologies.
    pub async fn add(&self, url: &str, fetched: &FetchedRepository) -> AddOutcome {
        let draft = match build_draft(url, fetched) {
            Ok(draft) => draft,
            Err(reason) => {
                warn!(url, %reason, "Rejected repository");
                record_outcome("add", "validation_failed");
                return AddOutcome::ValidationFailed(reason);
            }
        };

        match self.store.find_by_url(&draft.repo_url).await {
            Ok(Some(_)) => {
                info!(repo_url = %draft.repo_url, "Repository already tracked");
                record_outcome("add", "already_exists");
                return AddOutcome::AlreadyExists;
            }
            Ok(None) => {}
            Err(err) => return self.add_failed(&draft.repo_url, err),
        }

        let repo_url = draft.repo_url.clone();
        let language = draft.language.clone().filter(|lang| !lang.is_empty());
        let tech_stack = metadata::tech_stack(&draft.metadata);

        let record = match self.store.insert(draft).await {
            Ok(record) => record,
            Err(StoreError::AlreadyExists) => {
                record_outcome("add", "already_exists");
                return AddOutcome::AlreadyExists;
            }
            Err(err) => return self.add_failed(&repo_url, err),
        };

        if let Some(language) = &language {
            self.adjust_tally(language, true).await;
        }
        for technology in &tech_stack {
            self.adjust_tally(technology, true).await;
        }

        info!(
            repo_url = %record.repo_url,
            id = %record.id,
            backend = self.store.backend_name(),
            "Added repository"
        );
        record_outcome("add", "added");
        AddOutcome::Added(record)
    }

    fn add_failed(&self, url: &str, err: StoreError) -> AddOutcome {
        error!(url, error = %err, kind = err.kind(), "Failed to add repository");
        record_outcome("add", "failed");
        AddOutcome::Failed(err.to_string())
    }

    /// Overwrites a tracked repository with fresh data. The tally is not touched.
    pub async fn update(&self, url: &str, fetched: &FetchedRepository) -> UpdateOutcome {
        let draft = match build_draft(url, fetched) {
            Ok(draft) => draft,
            Err(reason) => {
                warn!(url, %reason, "Rejected repository update");
                record_outcome("update", "failed");
                return UpdateOutcome::Failed(reason);
            }
        };

        let repo_url = draft.repo_url.clone();
        match self.store.replace(&repo_url, draft).await {
            Ok(record) => {
                info!(%repo_url, "Updated repository");
                record_outcome("update", "updated");
                UpdateOutcome::Updated(record)
            }
            Err(StoreError::NotFound) => {
                record_outcome("update", "not_found");
                UpdateOutcome::NotFound
            }
            Err(err) => {
                error!(%repo_url, error = %err, kind = err.kind(), "Failed to update repository");
                record_outcome("update", "failed");
                UpdateOutcome::Failed(err.to_string())
            }
        }
    }

    /// Deletes a tracked repository and releases its primary language.
    ///
    /// The record is deleted before the count is released, so a failed delete
    /// leaves the tally untouched.
    pub async fn remove(&self, url: &str) -> RemoveOutcome {
        let repo_url = normalize_repo_url(url);

        let existing = match self.store.find_by_url(&repo_url).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                record_outcome("remove", "not_found");
                return RemoveOutcome::NotFound;
            }
            Err(err) => return self.remove_failed(&repo_url, err),
        };

        let record = match self.store.delete_by_url(&repo_url).await {
            Ok(record) => record,
            Err(StoreError::NotFound) => {
                record_outcome("remove", "not_found");
                return RemoveOutcome::NotFound;
            }
            Err(err) => return self.remove_failed(&repo_url, err),
        };

        if let Some(language) = existing.primary_language() {
            self.adjust_tally(language, false).await;
        }

        info!(%repo_url, "Removed repository");
        record_outcome("remove", "removed");
        RemoveOutcome::Removed(record)
    }

    fn remove_failed(&self, url: &str, err: StoreError) -> RemoveOutcome {
        error!(url, error = %err, kind = err.kind(), "Failed to remove repository");
        record_outcome("remove", "failed");
        RemoveOutcome::Failed(err.to_string())
    }

    /// Re-fetches and updates each url in order. Failures are reported per url.
    pub async fn refresh_all(
        &self,
        source: &dyn RepositorySource,
        urls: &[String],
    ) -> RefreshReport {
        let mut report = RefreshReport::default();

        for url in urls {
            let outcome = match source.fetch_repository(url).await {
                Err(err) => {
                    warn!(url = %url, error = %err, "Upstream fetch failed during refresh");
                    RefreshOutcome::UpstreamFetchFailed(err.to_string())
                }
                Ok(fetched) => match self.update(url, &fetched).await {
                    UpdateOutcome::Updated(_) => RefreshOutcome::Updated,
                    UpdateOutcome::NotFound => RefreshOutcome::NotFound,
                    UpdateOutcome::Failed(reason) => RefreshOutcome::Failed(reason),
                },
            };

            if outcome.is_failure() {
                metrics::counter!("showcase_refresh_failures_total").increment(1);
            }
            report.entries.push(RefreshEntry {
                url: url.clone(),
                outcome,
            });
        }

        info!(
            updated = report.updated(),
            failed = report.failures(),
            "Refresh finished"
        );
        report
    }

    /// Refreshes every stored repository.
    pub async fn refresh_all_stored(&self, source: &dyn RepositorySource) -> RefreshReport {
        let urls: Vec<String> = self
            .list()
            .await
            .into_iter()
            .map(|record| record.repo_url)
            .collect();
        self.refresh_all(source, &urls).await
    }

    pub async fn get(&self, url: &str) -> Result<Option<RepositoryRecord>, StoreError> {
        self.store.find_by_url(&normalize_repo_url(url)).await
    }

    /// Stored repositories, newest sync first. Empty when the store fails.
    pub async fn list(&self) -> Vec<RepositoryRecord> {
        self.store.list_all().await.unwrap_or_else(|err| {
            warn!(error = %err, "Failed to list repositories");
            Vec::new()
        })
    }

    /// Technology counts, highest first. Empty when the store fails.
    pub async fn technology_stats(&self) -> Vec<TechnologyCount> {
        self.tally.snapshot().await.unwrap_or_else(|err| {
            warn!(error = %err, "Failed to read technology counts");
            Vec::new()
        })
    }

    async fn adjust_tally(&self, name: &str, increment: bool) {
        let result = if increment {
            self.tally.increment(name).await
        } else {
            self.tally.decrement(name).await
        };

        if let Err(err) = result {
            warn!(
                technology = name,
                increment,
                error = %err,
                "Failed to update technology count"
            );
        }
    }
}
