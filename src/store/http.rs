//! Response handling shared by the HTTP-backed stores.

use reqwest::{Response, StatusCode};

use crate::error::{StoreError, StoreResult};

/// Passes successful responses through and classifies the rest.
pub(crate) async fn check_status(response: Response, backend: &str) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::debug!(backend, status = status.as_u16(), %body, "Storage request failed");

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::BackendUnavailable(
            format!("{} rejected the credentials ({})", backend, status),
        ),
        StatusCode::NOT_FOUND => StoreError::NotFound,
        StatusCode::CONFLICT => StoreError::AlreadyExists,
        status if status.is_server_error() => StoreError::BackendUnavailable(format!(
            "{} returned {}: {}",
            backend, status, body
        )),
        status => StoreError::Backend(format!("{} returned {}: {}", backend, status, body)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn status_error(code: u16) -> StoreError {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(code).set_body_string("nope"))
            .mount(&mock_server)
            .await;

        let response = reqwest::get(mock_server.uri()).await.unwrap();
        check_status(response, "test").await.unwrap_err()
    }

    #[tokio::test]
    async fn test_status_classification() {
        assert!(matches!(status_error(401).await, StoreError::BackendUnavailable(_)));
        assert!(matches!(status_error(404).await, StoreError::NotFound));
        assert!(matches!(status_error(409).await, StoreError::AlreadyExists));
        assert!(matches!(status_error(503).await, StoreError::BackendUnavailable(_)));
        assert!(matches!(status_error(400).await, StoreError::Backend(_)));
    }
}
