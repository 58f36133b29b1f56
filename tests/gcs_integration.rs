//! Gateway tests against a mock Cloud Storage JSON API.
//!
//! The full router runs in-process with `tower::ServiceExt::oneshot`; the
//! production `GcsBackend` talks HTTP to a `wiremock` server.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use gcs_gateway::{AppState, GatewayConfig, GcsBackend, app};
use http_body_util::BodyExt;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{header as request_header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn object_path(encoded_name: &str) -> String {
    format!("/storage/v1/b/b1/o/{encoded_name}")
}

fn resource(name: &str, size: usize) -> serde_json::Value {
    json!({
        "kind": "storage#object",
        "bucket": "b1",
        "name": name,
        "contentType": "text/plain",
        "updated": "2024-03-05T09:04:07.123Z",
        "size": size.to_string(),
        "metadata": { "Blocked": "false", "Owner": "alice" }
    })
}

/// Serve `content` under the wire-encoded name. The media route is mounted
/// first because the attribute route matches any query string.
async fn mount_object(server: &MockServer, encoded_name: &str, name: &str, content: &str) {
    Mock::given(method("GET"))
        .and(path(object_path(encoded_name)))
        .and(query_param("alt", "media"))
        .respond_with(ResponseTemplate::new(200).set_body_string(content))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(object_path(encoded_name)))
        .respond_with(ResponseTemplate::new(200).set_body_json(resource(name, content.len())))
        .mount(server)
        .await;
}

fn create_test_app(server: &MockServer, config: GatewayConfig) -> Router {
    let backend = GcsBackend::new(reqwest::Client::new(), &server.uri(), None)
        .expect("Failed to create backend");
    app(AppState::new(Arc::new(backend), config))
}

async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Helper to read response body as string.
async fn body_to_string(body: Body) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ============================================================================
// Object names
// ============================================================================

#[tokio::test]
async fn test_names_reach_gcs_verbatim() {
    let server = MockServer::start().await;
    mount_object(&server, "a~b.txt", "a~b.txt", "tilde").await;
    mount_object(&server, "notes%231.txt", "notes#1.txt", "hash").await;
    mount_object(&server, "a%2F%2Fb.txt", "a//b.txt", "double slash").await;
    mount_object(&server, "dir%2Fsub%2Fc.txt", "dir/sub/c.txt", "nested").await;

    let cases = [
        ("/b1/a~b.txt", "tilde"),
        ("/b1/notes%231.txt", "hash"),
        ("/b1/a//b.txt", "double slash"),
        ("/b1/dir/sub/c.txt", "nested"),
    ];
    for (uri, expected) in cases {
        let response = send(create_test_app(&server, GatewayConfig::default()), get(uri)).await;

        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain", "{uri}");
        assert_eq!(
            response.headers()[header::LAST_MODIFIED],
            "Tue, 05 Mar 2024 09:04:07 GMT",
            "{uri}"
        );
        assert_eq!(body_to_string(response.into_body()).await, expected, "{uri}");
    }
}

#[tokio::test]
async fn test_missing_object_returns_gcs_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": 404, "message": "No such object: b1/missing.txt" }
        })))
        .mount(&server)
        .await;

    let response = send(
        create_test_app(&server, GatewayConfig::default()),
        get("/b1/missing.txt"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_to_string(response.into_body()).await,
        "No such object: b1/missing.txt"
    );
}

// ============================================================================
// Compression
// ============================================================================

async fn mount_gzip_object(server: &MockServer) {
    let stored = b"\x1f\x8b stored".to_vec();
    Mock::given(method("GET"))
        .and(path(object_path("c.gz")))
        .and(query_param("alt", "media"))
        .and(request_header("accept-encoding", "gzip"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-encoding", "gzip")
                .set_body_bytes(stored.clone()),
        )
        .mount(server)
        .await;
    // Decompressive transcoding: no stored encoding on the response.
    Mock::given(method("GET"))
        .and(path(object_path("c.gz")))
        .and(query_param("alt", "media"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-goog-stored-content-encoding", "gzip")
                .set_body_string("inflated text"),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(object_path("c.gz")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "c.gz",
            "contentEncoding": "gzip",
            "updated": "2024-03-05T09:04:07Z",
            "size": stored.len().to_string()
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_gzip_clients_get_stored_bytes() {
    let server = MockServer::start().await;
    mount_gzip_object(&server).await;

    let request = Request::builder()
        .uri("/b1/c.gz")
        .header(header::ACCEPT_ENCODING, "gzip, deflate")
        .body(Body::empty())
        .unwrap();
    let response = send(create_test_app(&server, GatewayConfig::default()), request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "9");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"\x1f\x8b stored");
}

#[tokio::test]
async fn test_other_clients_get_transcoded_content() {
    let server = MockServer::start().await;
    mount_gzip_object(&server).await;

    for accept_encoding in [None, Some("gzip;q=0"), Some("br")] {
        let mut request = Request::builder().uri("/b1/c.gz");
        if let Some(value) = accept_encoding {
            request = request.header(header::ACCEPT_ENCODING, value);
        }
        let response = send(
            create_test_app(&server, GatewayConfig::default()),
            request.body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK, "{accept_encoding:?}");
        assert!(
            response.headers().get(header::CONTENT_ENCODING).is_none(),
            "{accept_encoding:?}"
        );
        assert_eq!(
            body_to_string(response.into_body()).await,
            "inflated text",
            "{accept_encoding:?}"
        );
    }
}

// ============================================================================
// Policy
// ============================================================================

#[tokio::test]
async fn test_block_rule_and_passthrough_use_gcs_metadata() {
    let server = MockServer::start().await;
    mount_object(&server, "a.txt", "a.txt", "hello").await;

    let blocking = GatewayConfig {
        block_if: Some("blocked:false".into()),
        ..Default::default()
    };
    let response = send(create_test_app(&server, blocking), get("/b1/a.txt")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_to_string(response.into_body()).await.is_empty());

    let passing = GatewayConfig {
        pass_through: Some("Owner".into()),
        ..Default::default()
    };
    let response = send(create_test_app(&server, passing), get("/b1/a.txt")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-goog-meta-owner"], "alice");
    assert!(response.headers().get("x-goog-meta-blocked").is_none());
}
