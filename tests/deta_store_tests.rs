//! Integration tests for the Deta Base store against a mocked HTTP API.

mod test_utils;

use serde_json::json;
use showcase::error::StoreError;
use showcase::models::TechnologyCount;
use showcase::store::{DetaStore, RepositoryStore};
use test_utils::draft;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROJECT_KEY: &str = "a0test_secretvalue";

fn store_for(server: &MockServer) -> DetaStore {
    DetaStore::new(PROJECT_KEY, &server.uri()).unwrap()
}

fn stored_item(key: &str, url: &str, last_synced: &str) -> serde_json::Value {
    json!({
        "key": key,
        "repo_url": url,
        "name": url.rsplit('/').next().unwrap(),
        "owner": "acme",
        "description": null,
        "stars": 10,
        "forks": 2,
        "language": "Go",
        "last_updated": "2024-05-01",
        "last_synced": last_synced,
        "metadata": "{\"tech_stack\": [\"Docker\"]}"
    })
}

fn page(items: Vec<serde_json::Value>, last: Option<&str>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "paging": { "size": items.len(), "last": last },
        "items": items,
    }))
}

#[tokio::test]
async fn test_insert_checks_for_duplicates_first() {
    let mock_server = MockServer::start().await;
    let url = "https://github.com/acme/a";

    Mock::given(method("POST"))
        .and(path("/a0test/repositories/query"))
        .and(header("x-api-key", PROJECT_KEY))
        .and(body_partial_json(json!({ "query": [{ "repo_url": url }] })))
        .respond_with(page(vec![], None))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/a0test/repositories/items"))
        .and(body_partial_json(json!({ "item": { "repo_url": url, "language": "Go" } })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let record = store_for(&mock_server)
        .insert(draft(url, Some("Go"), "2024-05-01T00:00:00Z"))
        .await
        .unwrap();

    assert_eq!(record.repo_url, url);
    assert_eq!(record.id.len(), 32);
    assert_eq!(record.metadata, json!({"tagline": "fixture"}));
}

#[tokio::test]
async fn test_insert_existing_url_is_rejected() {
    let mock_server = MockServer::start().await;
    let url = "https://github.com/acme/a";

    Mock::given(method("POST"))
        .and(path("/a0test/repositories/query"))
        .respond_with(page(
            vec![stored_item("k1", url, "2024-05-01T00:00:00+00:00")],
            None,
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/a0test/repositories/items"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&mock_server)
        .await;

    let result = store_for(&mock_server)
        .insert(draft(url, None, "2024-05-01T00:00:00Z"))
        .await;

    assert!(matches!(result, Err(StoreError::AlreadyExists)));
}

#[tokio::test]
async fn test_find_decodes_stored_item() {
    let mock_server = MockServer::start().await;
    let url = "https://github.com/acme/a";

    Mock::given(method("POST"))
        .and(path("/a0test/repositories/query"))
        .respond_with(page(vec![stored_item("k1", url, "2024-05-01 10:00:00")], None))
        .mount(&mock_server)
        .await;

    let record = store_for(&mock_server)
        .find_by_url(url)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(record.id, "k1");
    assert_eq!(record.stars, 10);
    assert_eq!(record.metadata, json!({"tech_stack": ["Docker"]}));
    assert_eq!(record.last_synced.to_rfc3339(), "2024-05-01T10:00:00+00:00");
}

#[tokio::test]
async fn test_list_follows_paging_and_sorts() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/a0test/repositories/query"))
        .and(body_partial_json(json!({ "last": "k2" })))
        .respond_with(page(
            vec![stored_item(
                "k3",
                "https://github.com/acme/newest",
                "2024-07-01T00:00:00+00:00",
            )],
            None,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/a0test/repositories/query"))
        .respond_with(page(
            vec![
                stored_item("k1", "https://github.com/acme/old", "2024-01-01T00:00:00+00:00"),
                stored_item("k2", "https://github.com/acme/mid", "2024-03-01T00:00:00+00:00"),
            ],
            Some("k2"),
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let keys: Vec<String> = store_for(&mock_server)
        .list_all()
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.id)
        .collect();

    assert_eq!(keys, vec!["k3", "k2", "k1"]);
}

#[tokio::test]
async fn test_tally_creates_missing_entry() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/a0test/technologies/query"))
        .respond_with(page(vec![], None))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/a0test/technologies/items"))
        .and(body_partial_json(json!({ "item": { "name": "Go", "count": 1 } })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    let count = store_for(&mock_server)
        .upsert_tally_count("Go", 1)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_tally_patches_existing_entry() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/a0test/technologies/query"))
        .respond_with(page(vec![json!({"key": "t1", "name": "Go", "count": 2})], None))
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/a0test/technologies/items/t1"))
        .and(body_partial_json(json!({ "set": { "count": 3 } })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let count = store_for(&mock_server)
        .upsert_tally_count("Go", 1)
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_tally_deletes_entry_reaching_zero() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/a0test/technologies/query"))
        .respond_with(page(vec![json!({"key": "t1", "name": "Go", "count": 1})], None))
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/a0test/technologies/items/t1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let count = store_for(&mock_server)
        .upsert_tally_count("Go", -1)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_technologies_are_listed_in_creation_order() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/a0test/technologies/query"))
        .respond_with(page(
            vec![
                json!({"key": "t2", "name": "Docker", "count": 1, "created_at": "2024-02-01T00:00:00+00:00"}),
                json!({"key": "t1", "name": "Go", "count": 4, "created_at": "2024-01-01T00:00:00+00:00"}),
            ],
            None,
        ))
        .mount(&mock_server)
        .await;

    let technologies = store_for(&mock_server).list_technologies().await.unwrap();
    assert_eq!(
        technologies,
        vec![TechnologyCount::new("Go", 4), TechnologyCount::new("Docker", 1)]
    );
}

#[tokio::test]
async fn test_items_without_creation_time_sort_first_by_key() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/a0test/technologies/query"))
        .respond_with(page(
            vec![
                json!({"key": "t9", "name": "Rust", "count": 2, "created_at": "2024-02-01T00:00:00+00:00"}),
                json!({"key": "b2", "name": "Docker", "count": 1}),
                json!({"key": "a1", "name": "Go", "count": 3}),
            ],
            None,
        ))
        .mount(&mock_server)
        .await;

    let technologies = store_for(&mock_server).list_technologies().await.unwrap();
    assert_eq!(
        technologies,
        vec![
            TechnologyCount::new("Go", 3),
            TechnologyCount::new("Docker", 1),
            TechnologyCount::new("Rust", 2),
        ]
    );
}

#[tokio::test]
async fn test_rejected_key_reports_backend_unavailable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/a0test/repositories/query"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&mock_server)
        .await;

    let result = store_for(&mock_server).list_all().await;
    assert!(matches!(result, Err(StoreError::BackendUnavailable(_))));
}
