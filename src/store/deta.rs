//! Deta Base store.
//!
//! Repositories and technologies live in the `repositories` and
//! `technologies` bases of the project. Deta has no unique indexes, so
//! uniqueness of `repo_url` is checked with a query before every insert.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::metadata;
use crate::models::{RepositoryDraft, RepositoryRecord, TechnologyCount};
use crate::store::http::check_status;
use crate::store::{RepositoryStore, parse_timestamp, sort_by_last_synced};

const REPOSITORIES_BASE: &str = "repositories";
const TECHNOLOGIES_BASE: &str = "technologies";
const BACKEND: &str = "deta";

/// Store backed by the Deta Base HTTP API.
#[derive(Debug, Clone)]
pub struct DetaStore {
    client: reqwest::Client,
    project_key: String,
    /// `{api_base}/{project_id}`
    project_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct RepositoryItem {
    key: String,
    repo_url: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    owner: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    stars: u64,
    #[serde(default)]
    forks: u64,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    last_updated: Option<String>,
    #[serde(default)]
    last_synced: Option<String>,
    #[serde(default)]
    metadata: Option<String>,
}

impl RepositoryItem {
    fn from_draft(key: String, draft: RepositoryDraft) -> StoreResult<Self> {
        Ok(Self {
            key,
            metadata: Some(serde_json::to_string(&metadata::ensure_object(
                draft.metadata,
            ))?),
            repo_url: draft.repo_url,
            name: draft.name,
            owner: draft.owner,
            description: draft.description,
            stars: draft.stars,
            forks: draft.forks,
            language: draft.language,
            last_updated: Some(draft.last_updated),
            last_synced: Some(draft.last_synced.to_rfc3339()),
        })
    }

    fn into_record(self) -> RepositoryRecord {
        let metadata = metadata::parse_stored(self.metadata.as_deref(), &self.repo_url);
        let last_synced = self
            .last_synced
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(|| {
                warn!(repo_url = %self.repo_url, "Stored last_synced is missing or malformed");
                DateTime::<Utc>::UNIX_EPOCH
            });

        RepositoryRecord {
            id: self.key,
            repo_url: self.repo_url,
            name: self.name,
            owner: self.owner,
            description: self.description,
            stars: self.stars,
            forks: self.forks,
            language: self.language,
            last_updated: self.last_updated.unwrap_or_default(),
            last_synced,
            metadata,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TechnologyItem {
    key: String,
    name: String,
    #[serde(default)]
    count: i64,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    paging: Paging,
    #[serde(default)]
    items: Vec<JsonValue>,
}

#[derive(Debug, Default, Deserialize)]
struct Paging {
    last: Option<String>,
}

impl DetaStore {
    /// Creates a store for the project identified by `project_key`
    /// (`<project_id>_<secret>`).
    pub fn new(project_key: &str, api_base: &str) -> StoreResult<Self> {
        let project_id = project_key
            .split_once('_')
            .map(|(id, _)| id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                StoreError::BackendUnavailable("malformed Deta project key".to_string())
            })?;

        Ok(Self {
            client: reqwest::Client::new(),
            project_key: project_key.to_string(),
            project_url: format!("{}/{}", api_base.trim_end_matches('/'), project_id),
        })
    }

    fn base_url(&self, base: &str) -> String {
        format!("{}/{}", self.project_url, base)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("X-API-Key", &self.project_key)
            .header("Content-Type", "application/json")
    }

    /// Runs a query against `base`, following `paging.last` until exhausted.
    async fn query(&self, base: &str, filter: Option<JsonValue>) -> StoreResult<Vec<JsonValue>> {
        let mut items = Vec::new();
        let mut last: Option<String> = None;

        loop {
            let mut body = json!({
                "query": filter.iter().cloned().collect::<Vec<_>>(),
            });
            if let Some(last) = &last {
                body["last"] = json!(last);
            }

            let response = self
                .request(reqwest::Method::POST, format!("{}/query", self.base_url(base)))
                .json(&body)
                .send()
                .await?;
            let page: QueryResponse = check_status(response, BACKEND).await?.json().await?;

            items.extend(page.items);
            match page.paging.last {
                Some(next) if !next.is_empty() => last = Some(next),
                _ => break,
            }
        }

        Ok(items)
    }

    async fn find_item(&self, url: &str) -> StoreResult<Option<RepositoryItem>> {
        let items = self
            .query(REPOSITORIES_BASE, Some(json!({ "repo_url": url })))
            .await?;
        match items.into_iter().next() {
            Some(item) => Ok(Some(serde_json::from_value(item)?)),
            None => Ok(None),
        }
    }

    async fn find_technology(&self, name: &str) -> StoreResult<Option<TechnologyItem>> {
        let items = self
            .query(TECHNOLOGIES_BASE, Some(json!({ "name": name })))
            .await?;
        match items.into_iter().next() {
            Some(item) => Ok(Some(serde_json::from_value(item)?)),
            None => Ok(None),
        }
    }

    async fn delete_item(&self, base: &str, key: &str) -> StoreResult<()> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                format!("{}/items/{}", self.base_url(base), key),
            )
            .send()
            .await?;
        check_status(response, BACKEND).await?;
        Ok(())
    }
}

#[async_trait]
impl RepositoryStore for DetaStore {
    async fn find_by_url(&self, url: &str) -> StoreResult<Option<RepositoryRecord>> {
        Ok(self.find_item(url).await?.map(RepositoryItem::into_record))
    }

    async fn insert(&self, draft: RepositoryDraft) -> StoreResult<RepositoryRecord> {
        if self.find_item(&draft.repo_url).await?.is_some() {
            return Err(StoreError::AlreadyExists);
        }

        let item = RepositoryItem::from_draft(Uuid::new_v4().simple().to_string(), draft)?;
        let response = self
            .request(
                reqwest::Method::POST,
                format!("{}/items", self.base_url(REPOSITORIES_BASE)),
            )
            .json(&json!({ "item": item }))
            .send()
            .await?;
        check_status(response, BACKEND).await?;

        debug!(key = %item.key, repo_url = %item.repo_url, "Inserted Deta item");
        Ok(item.into_record())
    }

    async fn replace(&self, url: &str, draft: RepositoryDraft) -> StoreResult<RepositoryRecord> {
        let existing = self.find_item(url).await?.ok_or(StoreError::NotFound)?;

        let item = RepositoryItem::from_draft(existing.key, draft)?;
        let response = self
            .request(
                reqwest::Method::PUT,
                format!("{}/items", self.base_url(REPOSITORIES_BASE)),
            )
            .json(&json!({ "items": [&item] }))
            .send()
            .await?;
        check_status(response, BACKEND).await?;

        Ok(item.into_record())
    }

    async fn list_all(&self) -> StoreResult<Vec<RepositoryRecord>> {
        let mut records = self
            .query(REPOSITORIES_BASE, None)
            .await?
            .into_iter()
            .map(|item| serde_json::from_value::<RepositoryItem>(item).map(RepositoryItem::into_record))
            .collect::<Result<Vec<_>, _>>()?;
        sort_by_last_synced(&mut records);
        Ok(records)
    }

    async fn delete_by_url(&self, url: &str) -> StoreResult<RepositoryRecord> {
        let existing = self.find_item(url).await?.ok_or(StoreError::NotFound)?;
        let key = existing.key.clone();
        let record = existing.into_record();

        self.delete_item(REPOSITORIES_BASE, &key).await?;
        Ok(record)
    }

    async fn upsert_tally_count(&self, name: &str, delta: i64) -> StoreResult<u64> {
        match self.find_technology(name).await? {
            Some(existing) => {
                let count = existing.count.saturating_add(delta);
                if count <= 0 {
                    self.delete_item(TECHNOLOGIES_BASE, &existing.key).await?;
                    return Ok(0);
                }

                let response = self
                    .request(
                        reqwest::Method::PATCH,
                        format!(
                            "{}/items/{}",
                            self.base_url(TECHNOLOGIES_BASE),
                            existing.key
                        ),
                    )
                    .json(&json!({ "set": { "count": count } }))
                    .send()
                    .await?;
                check_status(response, BACKEND).await?;
                Ok(u64::try_from(count).unwrap_or_default())
            }
            None if delta > 0 => {
                let item = json!({
                    "key": Uuid::new_v4().simple().to_string(),
                    "name": name,
                    "count": delta,
                    "created_at": Utc::now().to_rfc3339(),
                });
                let response = self
                    .request(
                        reqwest::Method::POST,
                        format!("{}/items", self.base_url(TECHNOLOGIES_BASE)),
                    )
                    .json(&json!({ "item": item }))
                    .send()
                    .await?;
                check_status(response, BACKEND).await?;
                Ok(u64::try_from(delta).unwrap_or_default())
            }
            None => Ok(0),
        }
    }

    async fn list_technologies(&self) -> StoreResult<Vec<TechnologyCount>> {
        let mut items = self
            .query(TECHNOLOGIES_BASE, None)
            .await?
            .into_iter()
            .map(serde_json::from_value::<TechnologyItem>)
            .collect::<Result<Vec<_>, _>>()?;

        // Items written without `created_at` sort first, by key.
        items.sort_by(|a, b| {
            let created = |item: &TechnologyItem| item.created_at.as_deref().and_then(parse_timestamp);
            created(a)
                .cmp(&created(b))
                .then_with(|| a.key.cmp(&b.key))
        });

        Ok(items
            .into_iter()
            .filter(|item| item.count > 0)
            .map(|item| TechnologyCount::new(item.name, u64::try_from(item.count).unwrap_or_default()))
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_id_is_key_prefix() {
        let store = DetaStore::new("a0abc123_secret", "https://database.deta.sh/v1/").unwrap();
        assert_eq!(store.project_url, "https://database.deta.sh/v1/a0abc123");
        assert!(DetaStore::new("nounderscore", "https://database.deta.sh/v1").is_err());
    }

    #[test]
    fn test_item_with_malformed_metadata_decodes() {
        let item: RepositoryItem = serde_json::from_value(json!({
            "key": "k1",
            "repo_url": "https://github.com/a/b",
            "name": "b",
            "owner": "a",
            "stars": 3,
            "last_synced": "2024-01-02 03:04:05",
            "metadata": "{broken"
        }))
        .unwrap();

        let record = item.into_record();
        assert_eq!(record.id, "k1");
        assert_eq!(record.metadata, json!({}));
        assert_eq!(record.stars, 3);
    }
}
