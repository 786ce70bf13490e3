//! SQLite store backed by SeaORM.
//!
//! Uniqueness of `repo_url` and technology names is enforced by the schema;
//! tally updates run inside a transaction so concurrent writers cannot lose
//! increments.

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::metadata;
use crate::models::{
    RepositoryDraft, RepositoryRecord, TechnologyCount,
    repository::{self, Entity as Repository},
    technology::{self, Entity as Technology},
};
use crate::store::RepositoryStore;

/// Store for the embedded SQLite database
#[derive(Debug, Clone)]
pub struct SqliteStore {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl SqliteStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn to_record(model: repository::Model) -> RepositoryRecord {
        let metadata = metadata::parse_stored(model.metadata.as_deref(), &model.repo_url);
        RepositoryRecord {
            id: model.id.to_string(),
            repo_url: model.repo_url,
            name: model.name,
            owner: model.owner,
            description: model.description,
            stars: u64::try_from(model.stars).unwrap_or_default(),
            forks: u64::try_from(model.forks).unwrap_or_default(),
            language: model.language,
            last_updated: model.last_updated.unwrap_or_default(),
            last_synced: model.last_synced,
            metadata,
        }
    }

    /// Copies the draft into every column of `active`.
    fn apply_draft(active: &mut repository::ActiveModel, draft: RepositoryDraft) -> StoreResult<()> {
        let metadata = serde_json::to_string(&metadata::ensure_object(draft.metadata))?;
        active.repo_url = Set(draft.repo_url);
        active.name = Set(draft.name);
        active.owner = Set(draft.owner);
        active.description = Set(draft.description);
        active.stars = Set(i64::try_from(draft.stars).unwrap_or(i64::MAX));
        active.forks = Set(i64::try_from(draft.forks).unwrap_or(i64::MAX));
        active.language = Set(draft.language);
        active.last_updated = Set(Some(draft.last_updated));
        active.last_synced = Set(draft.last_synced);
        active.metadata = Set(Some(metadata));
        Ok(())
    }

    async fn find_model(&self, url: &str) -> StoreResult<Option<repository::Model>> {
        Ok(Repository::find()
            .filter(repository::Column::RepoUrl.eq(url))
            .one(&*self.db)
            .await?)
    }
}

#[async_trait]
impl RepositoryStore for SqliteStore {
    async fn find_by_url(&self, url: &str) -> StoreResult<Option<RepositoryRecord>> {
        Ok(self.find_model(url).await?.map(Self::to_record))
    }

    async fn insert(&self, draft: RepositoryDraft) -> StoreResult<RepositoryRecord> {
        let mut active = repository::ActiveModel {
            ..Default::default()
        };
        Self::apply_draft(&mut active, draft)?;

        let model = active.insert(&*self.db).await?;
        Ok(Self::to_record(model))
    }

    async fn replace(&self, url: &str, draft: RepositoryDraft) -> StoreResult<RepositoryRecord> {
        let existing = self.find_model(url).await?.ok_or(StoreError::NotFound)?;

        let mut active: repository::ActiveModel = existing.into();
        Self::apply_draft(&mut active, draft)?;

        let model = active.update(&*self.db).await?;
        Ok(Self::to_record(model))
    }

    async fn list_all(&self) -> StoreResult<Vec<RepositoryRecord>> {
        let models = Repository::find()
            .order_by_desc(repository::Column::LastSynced)
            .order_by_desc(repository::Column::Id)
            .all(&*self.db)
            .await?;
        Ok(models.into_iter().map(Self::to_record).collect())
    }

    async fn delete_by_url(&self, url: &str) -> StoreResult<RepositoryRecord> {
        let existing = self.find_model(url).await?.ok_or(StoreError::NotFound)?;
        let record = Self::to_record(existing.clone());

        let result = existing.delete(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(record)
    }

    async fn upsert_tally_count(&self, name: &str, delta: i64) -> StoreResult<u64> {
        let txn = self.db.begin().await?;

        let existing = Technology::find()
            .filter(technology::Column::Name.eq(name))
            .one(&txn)
            .await?;

        let new_count = match existing {
            Some(model) => {
                let count = model.count.saturating_add(delta);
                if count <= 0 {
                    model.delete(&txn).await?;
                    0
                } else {
                    let mut active: technology::ActiveModel = model.into();
                    active.count = Set(count);
                    active.update(&txn).await?;
                    count
                }
            }
            None if delta > 0 => {
                technology::ActiveModel {
                    name: Set(name.to_string()),
                    count: Set(delta),
                    ..Default::default()
                }
                .insert(&txn)
                .await?;
                delta
            }
            None => 0,
        };

        txn.commit().await?;
        Ok(u64::try_from(new_count).unwrap_or_default())
    }

    async fn list_technologies(&self) -> StoreResult<Vec<TechnologyCount>> {
        let models = Technology::find()
            .order_by_asc(technology::Column::Id)
            .all(&*self.db)
            .await?;
        Ok(models
            .into_iter()
            .map(|model| TechnologyCount::new(model.name, u64::try_from(model.count).unwrap_or_default()))
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
