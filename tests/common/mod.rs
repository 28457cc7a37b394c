//! Shared fixtures for the gateway integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use fit_gateway::proxy::build_proxy_client;
use fit_gateway::{
    build_route_table, AuthService, AuthServiceError, GatewayConfig, GatewayServer,
    RouteDependencies, SignUp, UserRecord,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Identity provider double: token `abc` belongs to uid `123`
#[derive(Debug, Default)]
pub struct StubAuthService {
    verify_calls: AtomicU32,
}

impl StubAuthService {
    pub fn verify_calls(&self) -> u32 {
        self.verify_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AuthService for StubAuthService {
    async fn create_user(&self, signup: &SignUp) -> Result<UserRecord, AuthServiceError> {
        if signup.password.len() < 3 {
            return Err(AuthServiceError::Rejected("too short".to_string()));
        }
        Ok(UserRecord {
            uid: "123".to_string(),
            username: signup.username.clone(),
            email: signup.email.clone(),
        })
    }

    async fn verify_token(&self, token: &str) -> Result<String, AuthServiceError> {
        self.verify_calls.fetch_add(1, Ordering::Relaxed);
        match token {
            "abc" => Ok("123".to_string()),
            _ => Err(AuthServiceError::Rejected("invalid token".to_string())),
        }
    }

    async fn get_user(&self, uid: &str) -> Result<UserRecord, AuthServiceError> {
        if uid == "z" {
            return Err(AuthServiceError::Rejected("user doesn't exist".to_string()));
        }
        Ok(UserRecord {
            uid: uid.to_string(),
            username: "abc".to_string(),
            email: "abc@xyz.com".to_string(),
        })
    }

    async fn set_block_status(&self, _uid: &str, _blocked: bool) -> Result<(), AuthServiceError> {
        Ok(())
    }
}

/// Configuration with every backend pointing at `backend`
pub fn config_for(backend: &str) -> GatewayConfig {
    let env: HashMap<&str, String> = HashMap::from([
        ("USERS_URL", backend.to_string()),
        ("TRAINERS_URL", backend.to_string()),
        ("METRICS_URL", backend.to_string()),
        ("GOALS_URL", backend.to_string()),
        ("AUTH_URL", "http://identity.invalid".to_string()),
        ("GATEWAY_UPSTREAM_TIMEOUT", "5s".to_string()),
    ]);
    GatewayConfig::from_lookup(|key| env.get(key).cloned()).unwrap()
}

/// Gateway app wired to the stub identity provider
pub fn gateway_app(backend: &str, auth: Arc<StubAuthService>) -> Router {
    GatewayServer::new(&config_for(backend), auth).unwrap().app()
}

/// Every `(method, pattern)` pair the gateway registers
pub fn registered_routes(backend: &str, auth: Arc<StubAuthService>) -> Vec<(Method, String)> {
    let config = config_for(backend);
    let client = build_proxy_client(Duration::from_secs(1));
    let deps = RouteDependencies::from_config(&config, auth, client);
    build_route_table(&deps).unwrap().routes().to_vec()
}

/// Concrete request path for a route pattern, with every parameter filled in
pub fn concrete_path(pattern: &str) -> String {
    pattern
        .split('/')
        .map(|segment| match segment.chars().next() {
            Some(':') => "7",
            Some('*') => "weekly",
            _ => segment,
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

pub async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
