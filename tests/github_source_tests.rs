//! Integration tests for the GitHub source against a mocked REST API.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::json;
use showcase::error::SourceError;
use showcase::source::{GitHubConfig, GitHubSource, RepositorySource};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn source_for(server: &MockServer) -> GitHubSource {
    GitHubSource::new(GitHubConfig {
        api_base: server.uri(),
        commit_limit: 3,
        ..GitHubConfig::default()
    })
}

/// Encodes like the contents API does, wrapped at 60 columns.
fn contents_body(raw: &str) -> serde_json::Value {
    let encoded = STANDARD.encode(raw);
    let wrapped = encoded
        .as_bytes()
        .chunks(60)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("\n");
    json!({ "content": wrapped, "encoding": "base64" })
}

async fn mount_summary(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/repos/golang/go"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "go",
            "description": "The Go programming language",
            "stargazers_count": 120000,
            "forks_count": 17000,
            "watchers_count": 120000,
            "language": "Go",
            "open_issues_count": 9000,
            "created_at": "2014-08-19T04:33:40Z",
            "updated_at": "2024-05-01T10:00:00Z",
            "owner": {"login": "golang"},
            "html_url": "https://github.com/golang/go",
            "topics": ["go"],
            "default_branch": "master"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_repository_composes_all_parts() {
    let mock_server = MockServer::start().await;
    mount_summary(&mock_server).await;

    let readme = "# The Go Programming Language\n\nGo is an open source programming language that makes it simple to build secure, scalable systems.";
    Mock::given(method("GET"))
        .and(path("/repos/golang/go/readme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(contents_body(readme)))
        .mount(&mock_server)
        .await;

    // The first candidate path is missing; the second one is used.
    Mock::given(method("GET"))
        .and(path("/repos/golang/go/contents/project_metadata.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(contents_body(
            r#"{"tagline": "Build simple systems", "tech_stack": ["Go"]}"#,
        )))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/golang/go/commits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "sha": "a1b2c3d4e5f6",
                "html_url": "https://github.com/golang/go/commit/a1b2c3d",
                "commit": {
                    "message": "cmd/go: fix build",
                    "author": {"name": "Gopher", "date": "2024-05-02T08:00:00Z"}
                }
            }
        ])))
        .mount(&mock_server)
        .await;

    let fetched = source_for(&mock_server)
        .fetch_repository("https://github.com/golang/go/")
        .await
        .unwrap();

    assert_eq!(fetched.summary.stars, 120000);
    assert_eq!(fetched.summary.owner.login, "golang");
    assert_eq!(fetched.readme.as_deref(), Some(readme));
    assert_eq!(
        fetched.custom_metadata,
        json!({"tagline": "Build simple systems", "tech_stack": ["Go"]})
    );
    assert_eq!(
        fetched.metadata_path.as_deref(),
        Some("project_metadata.json")
    );
    assert_eq!(fetched.recent_commits.len(), 1);
    assert_eq!(fetched.recent_commits[0].short_sha, "a1b2c3d");
    assert_eq!(fetched.recent_commits[0].date, "2024-05-02");
}

#[tokio::test]
async fn test_invalid_metadata_falls_through_to_next_path() {
    let mock_server = MockServer::start().await;
    mount_summary(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/repos/golang/go/contents/.github/project_metadata.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(contents_body("{ not json")))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/golang/go/contents/docs/project_metadata.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(contents_body(r#"{"demo_url": "https://go.dev"}"#)),
        )
        .mount(&mock_server)
        .await;

    let fetched = source_for(&mock_server)
        .fetch_repository("https://github.com/golang/go")
        .await
        .unwrap();

    assert_eq!(fetched.custom_metadata, json!({"demo_url": "https://go.dev"}));
    assert_eq!(
        fetched.metadata_path.as_deref(),
        Some("docs/project_metadata.json")
    );
}

#[tokio::test]
async fn test_optional_parts_degrade_to_empty() {
    let mock_server = MockServer::start().await;
    mount_summary(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/repos/golang/go/commits"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    let fetched = source_for(&mock_server)
        .fetch_repository("https://github.com/golang/go")
        .await
        .unwrap();

    assert!(fetched.readme.is_none());
    assert_eq!(fetched.custom_metadata, json!({}));
    assert!(fetched.metadata_path.is_none());
    assert!(fetched.recent_commits.is_empty());
}

#[tokio::test]
async fn test_missing_repository_fails_the_fetch() {
    let mock_server = MockServer::start().await;

    let error = source_for(&mock_server)
        .fetch_repository("https://github.com/nobody/nothing")
        .await
        .unwrap_err();

    assert!(matches!(error, SourceError::NotFound { .. }));
}

#[tokio::test]
async fn test_non_github_url_is_rejected_without_requests() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let error = source_for(&mock_server)
        .fetch_repository("https://gitlab.com/a/b")
        .await
        .unwrap_err();

    assert!(matches!(error, SourceError::InvalidUrl { .. }));
}
