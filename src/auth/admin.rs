//! Admin elevation through the users backend.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{BackendTarget, GatewayRequest, RequestContext};
use crate::middleware::pipeline::{Handler, HandlerOutcome};

/// Elevates the caller to admin when `GET {users}/admins/{uid}` answers 200
///
/// Any other status, or a failed call, aborts with 401.
#[derive(Debug, Clone)]
pub struct AdminElevationChecker {
    client: Client,
    users: Arc<BackendTarget>,
}

impl AdminElevationChecker {
    pub fn new(users: Arc<BackendTarget>, timeout: Duration) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                GatewayError::config(format!("Failed to build admin check client: {}", e))
            })?;
        Ok(Self { client, users })
    }

    fn admin_url(&self, uid: &str) -> String {
        format!(
            "{}/admins/{}",
            self.users.base_url.as_str().trim_end_matches('/'),
            urlencoding::encode(uid)
        )
    }
}

#[async_trait]
impl Handler for AdminElevationChecker {
    fn name(&self) -> &str {
        "admin_elevation"
    }

    async fn handle(
        &self,
        _request: &mut GatewayRequest,
        context: &mut RequestContext,
    ) -> GatewayResult<HandlerOutcome> {
        let uid = context.require_uid()?.to_string();

        match self.client.get(self.admin_url(&uid)).send().await {
            Ok(response) if response.status() == StatusCode::OK => {
                context.elevate()?;
                debug!(request_id = %context.request_id, uid = %uid, "Caller elevated to admin");
                Ok(HandlerOutcome::Next)
            }
            Ok(response) => {
                debug!(
                    request_id = %context.request_id,
                    uid = %uid,
                    status = response.status().as_u16(),
                    "Admin check declined"
                );
                Err(GatewayError::authz("admin privileges required"))
            }
            Err(e) => {
                warn!(
                    request_id = %context.request_id,
                    service = %self.users.name,
                    error = %e,
                    "Admin check failed"
                );
                Err(GatewayError::authz("admin privileges required"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn checker(base: &str) -> AdminElevationChecker {
        let users = BackendTarget::new("users", Url::parse(base).unwrap());
        AdminElevationChecker::new(users, Duration::from_secs(2)).unwrap()
    }

    fn request() -> GatewayRequest {
        Request::builder().uri("/admins/users").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_admin_is_elevated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admins/123"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut context = RequestContext::new("/admins/users", None);
        context.authorize("123");
        checker(&server.uri())
            .handle(&mut request(), &mut context)
            .await
            .unwrap();

        assert!(context.is_admin());
    }

    #[tokio::test]
    async fn test_non_admin_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admins/123"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let mut context = RequestContext::new("/admins/users", None);
        context.authorize("123");
        let err = checker(&server.uri())
            .handle(&mut request(), &mut context)
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
        assert!(!context.is_admin());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_rejected() {
        let mut context = RequestContext::new("/admins/users", None);
        context.authorize("123");

        let err = checker("http://127.0.0.1:1")
            .handle(&mut request(), &mut context)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_missing_uid_is_internal_error() {
        let mut context = RequestContext::new("/admins/users", None);

        let err = checker("http://127.0.0.1:1")
            .handle(&mut request(), &mut context)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }
}
