//! Reverse proxy integration tests
//!
//! A wiremock server stands in for the upstream API.

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use futures::future::join_all;
use portal_gatekeeper::config::MIB;
use rstest::rstest;
use wiremock::{
    matchers::{body_string, header, method, path, query_param},
    Mock, MockServer, Respond, ResponseTemplate,
};

use crate::common::{test_config, TestApp};

/// Echoes the request's `n` query parameter back in the JSON body
struct EchoQuery;

impl Respond for EchoQuery {
    fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
        let n = request
            .url
            .query_pairs()
            .find(|(key, _)| key == "n")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();
        ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok", "n": n}))
    }
}

#[tokio::test]
async fn test_concurrent_requests_are_isolated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/status"))
        .respond_with(EchoQuery)
        .expect(100)
        .mount(&server)
        .await;

    let app = TestApp::with_upstream(&server);

    let responses = join_all((0..100).map(|i| {
        let app = &app;
        async move { (i, app.get(&format!("/api/status?n={}", i)).await) }
    }))
    .await;

    for (i, response) in responses {
        response.assert_ok();
        let json: serde_json::Value = response.json();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["n"], i.to_string());
    }
}

#[rstest]
#[case::invalid_json(b"{not json at all".as_slice())]
#[case::truncated_json(b"{\"status\": \"ok\", \"items\": [1, 2".as_slice())]
#[case::empty(b"".as_slice())]
#[tokio::test]
async fn test_upstream_body_relayed_byte_for_byte(#[case] payload: &'static [u8]) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/report"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/json")
                .set_body_bytes(payload),
        )
        .mount(&server)
        .await;

    let app = TestApp::with_upstream(&server);
    let response = app.get("/api/report").await;

    response.assert_ok();
    assert_eq!(&response.body[..], payload);
    assert_eq!(response.header("content-type"), Some("application/json"));
}

#[tokio::test]
async fn test_request_is_forwarded_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/items"))
        .and(query_param("draft", "true"))
        .and(header("authorization", "Bearer machine-token"))
        .and(header("x-custom", "kept"))
        .and(body_string(r#"{"name":"widget"}"#))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("X-Upstream", "yes")
                .insert_header("Set-Cookie", "upstream_pref=dark; Path=/")
                .set_body_string(r#"{"id":1}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::with_upstream(&server);
    let response = app
        .request(
            Request::builder()
                .method("POST")
                .uri("/api/items?draft=true")
                .header("Authorization", "Bearer machine-token")
                .header("X-Custom", "kept")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"name":"widget"}"#))
                .unwrap(),
        )
        .await;

    response.assert_status(StatusCode::CREATED);
    assert_eq!(response.header("x-upstream"), Some("yes"));
    assert!(response
        .set_cookies()
        .iter()
        .any(|c| c.starts_with("upstream_pref=dark")));
    assert_eq!(response.text(), r#"{"id":1}"#);
}

#[tokio::test]
async fn test_browser_cookies_are_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dashboard"))
        .and(header("cookie", "session=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::with_upstream(&server);
    let response = app
        .request(
            Request::builder()
                .uri("/dashboard")
                .header("Cookie", "session=abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    response.assert_ok();
    assert_eq!(response.text(), "<html></html>");
}

#[rstest]
#[case(301)]
#[case(307)]
#[case(404)]
#[case(422)]
#[case(500)]
#[tokio::test]
async fn test_upstream_status_is_relayed(#[case] status: u16) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(status).set_body_string("upstream says no"))
        .mount(&server)
        .await;

    let app = TestApp::with_upstream(&server);
    let response = app.get("/api/thing").await;

    assert_eq!(response.status.as_u16(), status);
    assert_eq!(response.text(), "upstream says no");
}

#[tokio::test]
async fn test_upstream_redirect_is_relayed_not_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/callback"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "/dashboard")
                .append_header("Set-Cookie", "session=abc; HttpOnly; Path=/")
                .append_header("Set-Cookie", "oauth_state=; Max-Age=0; Path=/"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dashboard"))
        .respond_with(ResponseTemplate::new(200).set_body_string("dashboard page"))
        .expect(0)
        .mount(&server)
        .await;

    let app = TestApp::with_upstream(&server);
    let response = app.get("/auth/callback?code=x").await;

    response.assert_status(StatusCode::FOUND);
    assert_eq!(response.header("location"), Some("/dashboard"));
    let cookies = response.set_cookies();
    assert!(cookies.iter().any(|c| c == "session=abc; HttpOnly; Path=/"));
    assert!(cookies.iter().any(|c| c == "oauth_state=; Max-Age=0; Path=/"));
    assert_ne!(response.text(), "dashboard page");
}

#[tokio::test]
async fn test_connection_headers_are_not_relayed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/items"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Keep-Alive", "timeout=5")
                .insert_header("X-Upstream", "yes"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::with_upstream(&server);
    let response = app
        .request(
            Request::builder()
                .uri("/api/items")
                .header("Connection", "X-Hop")
                .header("X-Hop", "secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    response.assert_ok();
    assert_eq!(response.header("x-upstream"), Some("yes"));
    assert!(response.header("keep-alive").is_none());

    let received = server.received_requests().await.unwrap();
    assert!(received[0].headers.get("x-hop").is_none());
}

#[tokio::test]
async fn test_no_upstream_configured() {
    let app = TestApp::new();
    let response = app.get("/anything").await;

    response.assert_service_unavailable();
    let json: serde_json::Value = response.json();
    assert_eq!(json["error"], "service_unavailable");
}

#[tokio::test]
async fn test_unreachable_upstream() {
    // Bind then release a port so nothing is listening on it
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = test_config();
    config.upstream.url = Some(format!("http://{}", addr));
    let app = TestApp::with_config(config);

    app.get("/api/items").await.assert_service_unavailable();
}

#[tokio::test]
async fn test_upstream_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let mut config = test_config();
    config.upstream.url = Some(server.uri());
    config.upstream.timeout_secs = 1;
    let app = TestApp::with_config(config);

    app.get("/api/slow").await.assert_service_unavailable();
}

#[tokio::test]
async fn test_protocol_endpoint_accepts_ten_mib() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(200).set_body_string("accepted"))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::with_upstream(&server);
    let response = app.post_bytes("/mcp", 10 * MIB).await;

    response.assert_ok();
    assert_eq!(response.text(), "accepted");

    let received = server.received_requests().await.unwrap();
    assert_eq!(received[0].body.len(), 10 * MIB);
}

#[tokio::test]
async fn test_ordinary_route_rejects_ten_mib() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let app = TestApp::with_upstream(&server);
    let response = app.post_bytes("/api/upload", 10 * MIB).await;

    response.assert_payload_too_large();
    let json: serde_json::Value = response.json();
    assert_eq!(json["error"], "payload_too_large");

    // The service keeps working after the rejection
    app.get("/health").await.assert_ok();
}

#[tokio::test]
async fn test_ordinary_route_accepts_its_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::with_upstream(&server);
    app.post_bytes("/api/upload", MIB).await.assert_ok();
}

#[rstest]
#[case("GET")]
#[case("DELETE")]
#[tokio::test]
async fn test_protocol_endpoint_methods(#[case] verb: &str) {
    let server = MockServer::start().await;
    Mock::given(method(verb))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::with_upstream(&server);
    let response = app
        .request(
            Request::builder()
                .method(verb)
                .uri("/mcp")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    response.assert_ok();
}

#[tokio::test]
async fn test_protocol_endpoint_rejects_other_methods() {
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
                .method("PUT")
                .uri("/mcp")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
}
