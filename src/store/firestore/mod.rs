//! Firestore store using the REST API.
//!
//! Documents live in the `repositories` and `technologies` collections of the
//! project's default database. `metadata` is stored as a native map field and
//! `last_synced` as a timestamp. Requests authenticate with an OAuth access
//! token supplied through configuration.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue, json};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::metadata;
use crate::models::{RepositoryDraft, RepositoryRecord, TechnologyCount};
use crate::store::http::check_status;
use crate::store::{RepositoryStore, parse_timestamp, sort_by_last_synced};

pub mod value;

const REPOSITORIES: &str = "repositories";
const TECHNOLOGIES: &str = "technologies";
const BACKEND: &str = "firestore";
const PAGE_SIZE: &str = "300";

/// Store backed by the Firestore REST API.
#[derive(Debug, Clone)]
pub struct FirestoreStore {
    client: reqwest::Client,
    access_token: String,
    documents_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    name: String,
    #[serde(default)]
    fields: Option<JsonValue>,
    create_time: Option<DateTime<Utc>>,
}

impl Document {
    /// Last path segment of the document name.
    fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or_default()
    }

    fn plain_fields(&self) -> JsonValue {
        value::decode_fields(self.fields.as_ref())
    }
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    document: Option<Document>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

fn string_field(fields: &JsonValue, key: &str) -> Option<String> {
    fields.get(key).and_then(JsonValue::as_str).map(str::to_string)
}

fn count_field(fields: &JsonValue, key: &str) -> i64 {
    fields.get(key).and_then(JsonValue::as_i64).unwrap_or_default()
}

/// Encodes a draft as Firestore document fields.
fn encode_draft(draft: RepositoryDraft) -> JsonValue {
    let metadata = metadata::ensure_object(draft.metadata);
    json!({
        "repo_url": { "stringValue": draft.repo_url },
        "name": { "stringValue": draft.name },
        "owner": { "stringValue": draft.owner },
        "description": value::encode(&json!(draft.description)),
        "stars": { "integerValue": draft.stars.to_string() },
        "forks": { "integerValue": draft.forks.to_string() },
        "language": value::encode(&json!(draft.language)),
        "last_updated": { "stringValue": draft.last_updated },
        "last_synced": { "timestampValue": draft.last_synced.to_rfc3339() },
        "metadata": value::encode(&metadata),
    })
}

fn decode_record(document: &Document) -> RepositoryRecord {
    let fields = document.plain_fields();
    let repo_url = string_field(&fields, "repo_url").unwrap_or_default();

    // Older documents stored metadata as a serialized string.
    let metadata = match fields.get("metadata") {
        Some(JsonValue::Object(map)) => JsonValue::Object(map.clone()),
        Some(JsonValue::String(raw)) => metadata::parse_stored(Some(raw), &repo_url),
        Some(JsonValue::Null) | None => JsonValue::Object(Map::new()),
        Some(_) => {
            warn!(%repo_url, "Stored metadata is not a JSON object; using {{}}");
            JsonValue::Object(Map::new())
        }
    };

    let last_synced = string_field(&fields, "last_synced")
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or_else(|| {
            warn!(%repo_url, "Stored last_synced is missing or malformed");
            DateTime::<Utc>::UNIX_EPOCH
        });

    RepositoryRecord {
        id: document.id().to_string(),
        name: string_field(&fields, "name").unwrap_or_default(),
        owner: string_field(&fields, "owner").unwrap_or_default(),
        description: string_field(&fields, "description"),
        stars: u64::try_from(count_field(&fields, "stars")).unwrap_or_default(),
        forks: u64::try_from(count_field(&fields, "forks")).unwrap_or_default(),
        language: string_field(&fields, "language"),
        last_updated: string_field(&fields, "last_updated").unwrap_or_default(),
        last_synced,
        metadata,
        repo_url,
    }
}

impl FirestoreStore {
    pub fn new(project_id: &str, access_token: &str, api_base: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token: access_token.to_string(),
            documents_url: format!(
                "{}/v1/projects/{}/databases/(default)/documents",
                api_base.trim_end_matches('/'),
                project_id
            ),
        }
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.access_token)
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.documents_url, collection, id)
    }

    /// First document in `collection` whose `field` equals `value`.
    async fn find_one(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<Option<Document>> {
        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": collection }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": field },
                        "op": "EQUAL",
                        "value": { "stringValue": value }
                    }
                },
                "limit": 1
            }
        });

        let response = self
            .request(
                reqwest::Method::POST,
                format!("{}:runQuery", self.documents_url),
            )
            .json(&body)
            .send()
            .await?;
        let results: Vec<QueryResult> = check_status(response, BACKEND).await?.json().await?;

        Ok(results.into_iter().find_map(|result| result.document))
    }

    async fn list_documents(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .request(
                    reqwest::Method::GET,
                    format!("{}/{}", self.documents_url, collection),
                )
                .query(&[("pageSize", PAGE_SIZE)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request.send().await?;
            let page: ListResponse = check_status(response, BACKEND).await?.json().await?;
            documents.extend(page.documents);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(documents)
    }

    async fn create_document(&self, collection: &str, fields: JsonValue) -> StoreResult<Document> {
        let response = self
            .request(
                reqwest::Method::POST,
                format!("{}/{}", self.documents_url, collection),
            )
            .query(&[("documentId", Uuid::new_v4().simple().to_string())])
            .json(&json!({ "fields": fields }))
            .send()
            .await?;
        Ok(check_status(response, BACKEND).await?.json().await?)
    }

    async fn delete_document(&self, collection: &str, id: &str) -> StoreResult<()> {
        let response = self
            .request(reqwest::Method::DELETE, self.document_url(collection, id))
            .send()
            .await?;
        check_status(response, BACKEND).await?;
        Ok(())
    }
}

#[async_trait]
impl RepositoryStore for FirestoreStore {
    async fn find_by_url(&self, url: &str) -> StoreResult<Option<RepositoryRecord>> {
        Ok(self
            .find_one(REPOSITORIES, "repo_url", url)
            .await?
            .as_ref()
            .map(decode_record))
    }

    async fn insert(&self, draft: RepositoryDraft) -> StoreResult<RepositoryRecord> {
        if self
            .find_one(REPOSITORIES, "repo_url", &draft.repo_url)
            .await?
            .is_some()
        {
            return Err(StoreError::AlreadyExists);
        }

        let document = self
            .create_document(REPOSITORIES, encode_draft(draft))
            .await?;
        debug!(id = document.id(), "Created Firestore document");
        Ok(decode_record(&document))
    }

    async fn replace(&self, url: &str, draft: RepositoryDraft) -> StoreResult<RepositoryRecord> {
        let existing = self
            .find_one(REPOSITORIES, "repo_url", url)
            .await?
            .ok_or(StoreError::NotFound)?;

        let response = self
            .request(
                reqwest::Method::PATCH,
                self.document_url(REPOSITORIES, existing.id()),
            )
            .json(&json!({ "fields": encode_draft(draft) }))
            .send()
            .await?;
        let document: Document = check_status(response, BACKEND).await?.json().await?;
        Ok(decode_record(&document))
    }

    async fn list_all(&self) -> StoreResult<Vec<RepositoryRecord>> {
        let mut records: Vec<RepositoryRecord> = self
            .list_documents(REPOSITORIES)
            .await?
            .iter()
            .map(decode_record)
            .collect();
        sort_by_last_synced(&mut records);
        Ok(records)
    }

    async fn delete_by_url(&self, url: &str) -> StoreResult<RepositoryRecord> {
        let existing = self
            .find_one(REPOSITORIES, "repo_url", url)
            .await?
            .ok_or(StoreError::NotFound)?;
        let record = decode_record(&existing);

        self.delete_document(REPOSITORIES, existing.id()).await?;
        Ok(record)
    }

    async fn upsert_tally_count(&self, name: &str, delta: i64) -> StoreResult<u64> {
        match self.find_one(TECHNOLOGIES, "name", name).await? {
            Some(existing) => {
                let count = count_field(&existing.plain_fields(), "count").saturating_add(delta);
                if count <= 0 {
                    self.delete_document(TECHNOLOGIES, existing.id()).await?;
                    return Ok(0);
                }

                let response = self
                    .request(
                        reqwest::Method::PATCH,
                        self.document_url(TECHNOLOGIES, existing.id()),
                    )
                    .query(&[("updateMask.fieldPaths", "count")])
                    .json(&json!({
                        "fields": { "count": { "integerValue": count.to_string() } }
                    }))
                    .send()
                    .await?;
                check_status(response, BACKEND).await?;
                Ok(u64::try_from(count).unwrap_or_default())
            }
            None if delta > 0 => {
                self.create_document(
                    TECHNOLOGIES,
                    json!({
                        "name": { "stringValue": name },
                        "count": { "integerValue": delta.to_string() },
                    }),
                )
                .await?;
                Ok(u64::try_from(delta).unwrap_or_default())
            }
            None => Ok(0),
        }
    }

    async fn list_technologies(&self) -> StoreResult<Vec<TechnologyCount>> {
        let mut documents = self.list_documents(TECHNOLOGIES).await?;
        documents.sort_by_key(|document| document.create_time);

        Ok(documents
            .iter()
            .filter_map(|document| {
                let fields = document.plain_fields();
                let name = string_field(&fields, "name")?;
                let count = u64::try_from(count_field(&fields, "count")).ok()?;
                (count > 0).then(|| TechnologyCount::new(name, count))
            })
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}
