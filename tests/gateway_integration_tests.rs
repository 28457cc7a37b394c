//! # Gateway Integration Tests
//!
//! Drive the composed axum app end to end with `oneshot`. Backends (and the admin
//! check on the users backend) are `wiremock` servers; the identity provider is the
//! stub from `common`.

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use common::{
    body_string, concrete_path, gateway_app, registered_routes, send, StubAuthService,
};
use std::sync::Arc;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, Request as MockRequest, Respond, ResponseTemplate};

/// Answers 201 with the body it received
struct EchoBody;

impl Respond for EchoBody {
    fn respond(&self, request: &MockRequest) -> ResponseTemplate {
        ResponseTemplate::new(201).set_body_bytes(request.body.clone())
    }
}

fn request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, token);
    }
    builder.body(Body::empty()).unwrap()
}

fn json_request(method: Method, uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Routes reachable without a valid token
fn is_public(method: &Method, pattern: &str) -> bool {
    pattern == "/users" && (*method == Method::POST || *method == Method::GET)
}

#[tokio::test]
async fn test_protected_routes_reject_missing_or_invalid_tokens() {
    let backend = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&backend)
        .await;

    let auth = Arc::new(StubAuthService::default());
    let protected: Vec<(Method, String)> = registered_routes(&backend.uri(), auth.clone())
        .into_iter()
        .filter(|(method, pattern)| !is_public(method, pattern))
        .collect();
    assert_eq!(protected.len(), 29);

    for (method, pattern) in &protected {
        let uri = concrete_path(pattern);
        for token in [None, Some("forged")] {
            let app = gateway_app(&backend.uri(), auth.clone());
            let response = send(app, request(method.clone(), &uri, token)).await;
            assert_eq!(
                response.status(),
                StatusCode::UNAUTHORIZED,
                "{} {} {:?}",
                method,
                uri,
                token
            );
        }
    }

    // Missing headers never reach the identity provider
    assert_eq!(auth.verify_calls(), protected.len() as u32);
}

#[tokio::test]
async fn test_non_admin_is_rejected_after_one_admin_check() {
    let auth = Arc::new(StubAuthService::default());
    let routes: Vec<(Method, String)> = registered_routes("http://127.0.0.1:9", auth.clone())
        .into_iter()
        .filter(|(_, pattern)| pattern.starts_with("/admins"))
        .collect();
    assert_eq!(routes.len(), 8);

    for (verb, pattern) in &routes {
        let backend = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admins/123"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&backend)
            .await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&backend)
            .await;

        let uri = concrete_path(pattern);
        let app = gateway_app(&backend.uri(), auth.clone());
        let response = send(app, json_request(verb.clone(), &uri, Some("abc"), "[]")).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{} {}", verb, uri);
        backend.verify().await;
    }
}

#[tokio::test]
async fn test_admin_listing_is_forwarded_with_admin_flag() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admins/123"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&backend)
        .await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("admin", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"[{"uid":"123"}]"#))
        .expect(1)
        .mount(&backend)
        .await;

    let app = gateway_app(&backend.uri(), Arc::new(StubAuthService::default()));
    let response = send(app, request(Method::GET, "/admins/users", Some("abc"))).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, r#"[{"uid":"123"}]"#);
}

#[tokio::test]
async fn test_admin_block_update_reaches_users_backend() {
    let backend = MockServer::start().await;
    let updates = serde_json::json!([{ "uid": "7", "blocked": true }]);
    Mock::given(method("GET"))
        .and(path("/admins/123"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&backend)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/users"))
        .and(query_param("admin", "true"))
        .and(body_json(updates.clone()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&backend)
        .await;

    let app = gateway_app(&backend.uri(), Arc::new(StubAuthService::default()));
    let response = send(
        app,
        json_request(Method::PATCH, "/admins/users", Some("abc"), &updates.to_string()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_sign_up_forwards_canonical_record() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .respond_with(EchoBody)
        .expect(1)
        .mount(&backend)
        .await;

    let app = gateway_app(&backend.uri(), Arc::new(StubAuthService::default()));
    let response = send(
        app,
        json_request(
            Method::POST,
            "/users",
            None,
            r#"{"email":"abc@xyz.com","username":"abc","password":"123"}"#,
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        body_string(response).await,
        r#"{"uid":"123","username":"abc","email":"abc@xyz.com"}"#
    );
}

#[tokio::test]
async fn test_sign_up_rejected_by_identity_provider() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&backend)
        .await;

    let app = gateway_app(&backend.uri(), Arc::new(StubAuthService::default()));
    let response = send(
        app,
        json_request(
            Method::POST,
            "/users",
            None,
            r#"{"email":"abc@xyz.com","username":"abc","password":"12"}"#,
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_string(response).await, r#"{"error":"too short"}"#);
}

#[tokio::test]
async fn test_sign_up_with_malformed_body() {
    let backend = MockServer::start().await;
    let app = gateway_app(&backend.uri(), Arc::new(StubAuthService::default()));

    let response = send(app, json_request(Method::POST, "/users", None, "{not json")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_refused_backend_is_bad_gateway() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let backend = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let app = gateway_app(&backend, Arc::new(StubAuthService::default()));
    let response = send(app, request(Method::GET, "/users/123", Some("abc"))).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(body_string(response).await.is_empty());
}

#[tokio::test]
async fn test_user_listing_branches_on_identity() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/123"))
        .respond_with(ResponseTemplate::new(200).set_body_string("mine"))
        .expect(1)
        .mount(&backend)
        .await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("admin", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_string("public"))
        .expect(2)
        .mount(&backend)
        .await;

    let auth = Arc::new(StubAuthService::default());

    let response = send(
        gateway_app(&backend.uri(), auth.clone()),
        request(Method::GET, "/users", Some("abc")),
    )
    .await;
    assert_eq!(body_string(response).await, "mine");

    for token in [None, Some("forged")] {
        let response = send(
            gateway_app(&backend.uri(), auth.clone()),
            request(Method::GET, "/users", token),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "public");
    }
}

#[tokio::test]
async fn test_uid_scoped_routes() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/goals/123"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&backend)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/trainings/favourites/9/123"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&backend)
        .await;

    let auth = Arc::new(StubAuthService::default());
    let response = send(
        gateway_app(&backend.uri(), auth.clone()),
        request(Method::GET, "/goals", Some("abc")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        gateway_app(&backend.uri(), auth),
        request(Method::DELETE, "/trainings/favourites/9", Some("abc")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_preflight_is_answered_by_gateway() {
    let backend = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&backend)
        .await;

    let app = gateway_app(&backend.uri(), Arc::new(StubAuthService::default()));
    let preflight = Request::builder()
        .method(Method::OPTIONS)
        .uri("/plans/7")
        .header(header::ORIGIN, "http://app.example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PATCH")
        .body(Body::empty())
        .unwrap();
    let response = send(app, preflight).await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://app.example.com"
    );
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
        "true"
    );
    let methods = headers
        .get(header::ACCESS_CONTROL_ALLOW_METHODS)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(methods.contains("PATCH"));
    let allowed = headers
        .get(header::ACCESS_CONTROL_ALLOW_HEADERS)
        .unwrap()
        .to_str()
        .unwrap()
        .to_lowercase();
    assert!(allowed.contains("authorization"));
}

#[tokio::test]
async fn test_cors_headers_on_regular_responses() {
    let backend = MockServer::start().await;
    let app = gateway_app(&backend.uri(), Arc::new(StubAuthService::default()));

    let request = Request::builder()
        .uri("/users/123")
        .header(header::ORIGIN, "http://app.example.com")
        .body(Body::empty())
        .unwrap();
    let response = send(app, request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://app.example.com"
    );
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let backend = MockServer::start().await;
    let app = gateway_app(&backend.uri(), Arc::new(StubAuthService::default()));

    let response = send(app, request(Method::GET, "/unknown", Some("abc"))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_string(response).await, r#"{"error":"route not found"}"#);

    let app = gateway_app(&backend.uri(), Arc::new(StubAuthService::default()));
    let response = send(app, request(Method::DELETE, "/users", Some("abc"))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
