//! Integration tests for the catalog client.
//!
//! These tests verify the retry matrix and the domain allowlist against a
//! mock HTTP server.

use civlens_core::{ApiError, CatalogClient, ClientConfig};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> CatalogClient {
    CatalogClient::new(ClientConfig::for_test_server(&server.uri()))
        .expect("client should build")
}

#[tokio::test]
async fn test_successful_get_returns_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 7, "name": "thing"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let model = client.fetch_model_by_id(7, "").await.expect("fetch should succeed");
    assert_eq!(model.id, Some(7));
    assert_eq!(model.name.as_deref(), Some("thing"));
}

#[tokio::test]
async fn test_bearer_token_is_attached_when_present() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models/1"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = client.fetch_model_by_id(1, "secret-token").await;
    assert!(result.is_ok(), "authorized fetch should succeed: {result:?}");
}

#[tokio::test]
async fn test_rate_limit_retries_after_header_delay() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models/9"))
        .respond_with(
            ResponseTemplate::new(429).insert_header("retry-after", "0"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/models/9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 9})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let model = client.fetch_model_by_id(9, "").await.expect("retry should recover");
    assert_eq!(model.id, Some(9));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_rate_limit_exhausts_attempt_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models/9"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.fetch_model_by_id(9, "").await.expect_err("should exhaust retries");
    assert!(
        matches!(err, ApiError::RateLimited { attempts: 3, .. }),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn test_server_error_retries_then_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models/3"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/models/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 3})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let model = client.fetch_model_by_id(3, "").await.expect("retry should recover");
    assert_eq!(model.id, Some(3));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_forbidden_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models/5"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.fetch_model_by_id(5, "").await.expect_err("403 should fail");
    assert!(matches!(err, ApiError::AccessDenied { .. }));
}

#[tokio::test]
async fn test_unauthorized_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models/5"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.fetch_model_by_id(5, "").await.expect_err("401 should fail");
    assert!(matches!(err, ApiError::Unauthorized { .. }));
}

#[tokio::test]
async fn test_not_found_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models/404"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.fetch_model_by_id(404, "").await.expect_err("404 should fail");
    assert!(matches!(err, ApiError::NotFound { .. }));
}

#[tokio::test]
async fn test_blocked_url_sends_no_request() {
    let server = MockServer::start().await;

    // Allowlist is pinned to the mock server's host; everything else is
    // rejected before any connection is attempted.
    let client = client_for(&server);
    let err = client
        .get("https://example.com/api/v1/models", "")
        .await
        .expect_err("foreign host should be blocked");
    assert!(matches!(err, ApiError::BlockedUrl { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_production_config_blocks_plain_http() {
    let client = CatalogClient::new(ClientConfig::default()).expect("client should build");
    let err = client
        .get("http://civitai.com/api/v1/models", "")
        .await
        .expect_err("http should be blocked");
    assert!(matches!(err, ApiError::BlockedUrl { .. }));
}

#[tokio::test]
async fn test_malformed_json_surfaces_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.fetch_model_by_id(1, "").await.expect_err("bad body should fail");
    assert!(matches!(err, ApiError::Decode { .. }), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_resolve_creators_returns_usernames() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/creators"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [{"username": "artist42"}, {"username": null}, {"username": "other"}]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let creators = client.resolve_creators("art", "").await.expect("lookup should succeed");
    assert_eq!(creators, vec!["artist42".to_string(), "other".to_string()]);
}
