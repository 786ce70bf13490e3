//! Store used when the configured backend could not be initialized.
//!
//! Every operation reports [`StoreError::BackendUnavailable`], so callers can
//! keep running and degrade to empty reads or failed writes.

use async_trait::async_trait;

use crate::config::BackendKind;
use crate::error::{StoreError, StoreResult};
use crate::models::{RepositoryDraft, RepositoryRecord, TechnologyCount};
use crate::store::RepositoryStore;

#[derive(Debug, Clone)]
pub struct DisconnectedStore {
    backend: BackendKind,
    reason: String,
}

impl DisconnectedStore {
    pub fn new(backend: BackendKind, reason: impl Into<String>) -> Self {
        Self {
            backend,
            reason: reason.into(),
        }
    }

    fn unavailable(&self) -> StoreError {
        StoreError::BackendUnavailable(self.reason.clone())
    }
}

#[async_trait]
impl RepositoryStore for DisconnectedStore {
    async fn find_by_url(&self, _url: &str) -> StoreResult<Option<RepositoryRecord>> {
        Err(self.unavailable())
    }

    async fn insert(&self, _draft: RepositoryDraft) -> StoreResult<RepositoryRecord> {
        Err(self.unavailable())
    }

    async fn replace(&self, _url: &str, _draft: RepositoryDraft) -> StoreResult<RepositoryRecord> {
        Err(self.unavailable())
    }

    async fn list_all(&self) -> StoreResult<Vec<RepositoryRecord>> {
        Err(self.unavailable())
    }

    async fn delete_by_url(&self, _url: &str) -> StoreResult<RepositoryRecord> {
        Err(self.unavailable())
    }

    async fn upsert_tally_count(&self, _name: &str, _delta: i64) -> StoreResult<u64> {
        Err(self.unavailable())
    }

    async fn list_technologies(&self) -> StoreResult<Vec<TechnologyCount>> {
        Err(self.unavailable())
    }

    fn backend_name(&self) -> &'static str {
        self.backend.as_str()
    }
}
