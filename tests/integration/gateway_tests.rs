//! Gateway pipeline integration tests
//!
//! Local routes, headers added by the pipeline, panic recovery and the
//! access log, exercised through the complete router.

use std::path::PathBuf;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::get,
    Router,
};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use portal_gatekeeper::middleware::apply_pipeline;

use crate::common::{test_config, TestApp};

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    let app = TestApp::new();
    let response = app.get("/health").await;

    response.assert_ok();

    let json: serde_json::Value = response.json();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_liveness_probe() {
    let app = TestApp::new();
    app.get("/health/live").await.assert_ok();
}

#[tokio::test]
async fn test_readiness_without_upstream() {
    let app = TestApp::new();
    app.get("/health/ready")
        .await
        .assert_service_unavailable();
}

#[tokio::test]
async fn test_readiness_follows_upstream_health() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let app = TestApp::with_upstream(&server);
    app.get("/health/ready").await.assert_ok();
    app.get("/health/ready")
        .await
        .assert_service_unavailable();
}

#[tokio::test]
async fn test_pipeline_headers_on_local_routes() {
    let app = TestApp::new();
    let response = app.get("/health").await;

    assert!(response.header("x-correlation-id").is_some());
    assert_eq!(response.header("x-content-type-options"), Some("nosniff"));
    assert_eq!(response.header("x-frame-options"), Some("DENY"));
    assert_eq!(response.header("x-xss-protection"), Some("1; mode=block"));
    assert_eq!(
        response.header("referrer-policy"),
        Some("strict-origin-when-cross-origin")
    );
    assert!(response.header("content-security-policy").is_some());
    assert_eq!(response.header("access-control-allow-origin"), Some("*"));
}

#[tokio::test]
async fn test_correlation_id_is_echoed() {
    let app = TestApp::new();
    let response = app
        .request(
            Request::builder()
                .uri("/health")
                .header("X-Request-ID", "trace-me-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.header("x-correlation-id"), Some("trace-me-123"));
}

#[tokio::test]
async fn test_preflight_is_answered_locally() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let app = TestApp::with_upstream(&server);
    let response = app
        .request(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/items")
                .header("Origin", "https://elsewhere.example")
                .header("Access-Control-Request-Method", "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    response.assert_ok();
    assert_eq!(response.header("access-control-allow-origin"), Some("*"));
    assert_eq!(response.header("x-frame-options"), Some("DENY"));
    assert!(response.header("x-correlation-id").is_some());
}

#[tokio::test]
async fn test_unlisted_method_on_local_route() {
    let app = TestApp::new();
    let response = app
        .request_with_csrf(
            Request::builder()
                .method("DELETE")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
    let json: serde_json::Value = response.json();
    assert_eq!(json["error"], "method_not_allowed");
}

#[tokio::test]
async fn test_csrf_runs_before_method_dispatch() {
    let app = TestApp::new();
    let response = app.post_json("/health", serde_json::json!({})).await;
    response.assert_forbidden();
}

#[tokio::test]
async fn test_rejected_request_is_logged_with_its_correlation_id() {
    let mut app = TestApp::new();
    let response = app.post_json("/some-form", serde_json::json!({})).await;
    response.assert_forbidden();
    assert_eq!(response.header("x-frame-options"), Some("DENY"));

    let record = app.next_access_record().await;
    assert_eq!(record.status, 403);
    assert_eq!(record.method, "POST");
    assert_eq!(record.path, "/some-form");
    assert_eq!(
        Some(record.correlation_id.as_str()),
        response.header("x-correlation-id")
    );
    assert_eq!(record.bytes, response.body.len() as u64);
}

async fn boom() -> &'static str {
    panic!("handler exploded")
}

#[tokio::test]
async fn test_panic_is_contained_and_logged() {
    let app = TestApp::new();
    let mut access_app = TestApp::new();
    let state = access_app.state.clone();

    let router = apply_pipeline(
        Router::new()
            .route("/boom", get(boom))
            .route("/fine", get(|| async { "fine" }))
            .with_state(state.clone()),
        &state,
    );

    let response = router
        .clone()
        .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().contains_key("x-correlation-id"));
    assert!(response.headers().contains_key("x-frame-options"));
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(!String::from_utf8_lossy(&body).contains("handler exploded"));

    let record = access_app.next_access_record().await;
    assert_eq!(record.status, 500);
    assert_eq!(record.path, "/boom");

    let response = router
        .oneshot(Request::builder().uri("/fine").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // An unrelated application is unaffected as well
    app.get("/health").await.assert_ok();
}

#[tokio::test]
async fn test_static_assets_are_served() {
    let dir: PathBuf = std::env::temp_dir().join(format!("portal-static-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("app.css"), "body { margin: 0 }").unwrap();

    let mut config = test_config();
    config.server.static_dir = Some(dir.clone());
    let app = TestApp::with_config(config);

    let response = app.get("/static/app.css").await;
    response.assert_ok();
    assert_eq!(response.text(), "body { margin: 0 }");
    assert_eq!(response.header("x-content-type-options"), Some("nosniff"));

    std::fs::remove_dir_all(&dir).ok();
}
