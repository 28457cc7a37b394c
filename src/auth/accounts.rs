//! # Account Handlers
//!
//! Handlers that talk to the identity provider on behalf of the users backend and
//! substitute the request body before forwarding:
//!
//! - [`AccountCreate`]: sign-up (or federated lookup) on `POST /users`
//! - [`AdminCreate`]: sign-up on `POST /admins`
//! - [`BlockStatusUpdate`]: block/unblock accounts on `PATCH /admins/users`

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use axum::http::HeaderValue;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::auth::service::{AuthService, SignUp, UserRecord};
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{GatewayRequest, RequestContext};
use crate::middleware::pipeline::{Handler, HandlerOutcome};

/// Read the whole request body, leaving the request with an empty one
async fn take_body(request: &mut GatewayRequest, max_body_size: usize) -> GatewayResult<Bytes> {
    let body = std::mem::take(request.body_mut());
    axum::body::to_bytes(body, max_body_size)
        .await
        .map_err(|e| GatewayError::invalid_input(format!("failed to read request body: {}", e)))
}

/// Install a new body and fix the framing headers to match it
fn replace_body(request: &mut GatewayRequest, bytes: Bytes, json: bool) {
    let headers = request.headers_mut();
    headers.remove(TRANSFER_ENCODING);
    headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len()));
    if json {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    *request.body_mut() = Body::from(bytes);
}

fn parse_signup(bytes: &[u8]) -> GatewayResult<SignUp> {
    let signup: SignUp = serde_json::from_slice(bytes)
        .map_err(|e| GatewayError::invalid_input(format!("invalid sign-up payload: {}", e)))?;
    signup.validate().map_err(GatewayError::invalid_input)?;
    Ok(signup)
}

fn substitute_record(request: &mut GatewayRequest, record: &UserRecord) -> GatewayResult<()> {
    let payload = serde_json::to_vec(record)?;
    replace_body(request, Bytes::from(payload), true);
    Ok(())
}

/// Creates the account (or looks up a federated one) and forwards the canonical record
pub struct AccountCreate {
    service: Arc<dyn AuthService>,
    max_body_size: usize,
}

impl AccountCreate {
    pub fn new(service: Arc<dyn AuthService>, max_body_size: usize) -> Self {
        Self {
            service,
            max_body_size,
        }
    }
}

impl fmt::Debug for AccountCreate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCreate")
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Handler for AccountCreate {
    fn name(&self) -> &str {
        "account_create"
    }

    async fn handle(
        &self,
        request: &mut GatewayRequest,
        context: &mut RequestContext,
    ) -> GatewayResult<HandlerOutcome> {
        let bytes = take_body(request, self.max_body_size).await?;
        let signup = parse_signup(&bytes)?;

        let record = if signup.is_federated {
            self.service.get_user(&signup.uid).await
        } else {
            self.service.create_user(&signup).await
        }
        .map_err(|e| GatewayError::conflict(e.to_string()))?;

        substitute_record(request, &record)?;
        info!(
            request_id = %context.request_id,
            uid = %record.uid,
            federated = signup.is_federated,
            "Account registered with identity provider"
        );
        Ok(HandlerOutcome::Next)
    }
}

/// Creates an admin account; federated sign-ups are not looked up
pub struct AdminCreate {
    service: Arc<dyn AuthService>,
    max_body_size: usize,
}

impl AdminCreate {
    pub fn new(service: Arc<dyn AuthService>, max_body_size: usize) -> Self {
        Self {
            service,
            max_body_size,
        }
    }
}

impl fmt::Debug for AdminCreate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCreate")
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Handler for AdminCreate {
    fn name(&self) -> &str {
        "admin_create"
    }

    async fn handle(
        &self,
        request: &mut GatewayRequest,
        context: &mut RequestContext,
    ) -> GatewayResult<HandlerOutcome> {
        let bytes = take_body(request, self.max_body_size).await?;
        let signup: SignUp = serde_json::from_slice(&bytes)
            .map_err(|e| GatewayError::invalid_input(format!("invalid sign-up payload: {}", e)))?;
        SignUp {
            is_federated: false,
            ..signup.clone()
        }
        .validate()
        .map_err(GatewayError::invalid_input)?;

        let record = self
            .service
            .create_user(&signup)
            .await
            .map_err(|e| GatewayError::conflict(e.to_string()))?;

        substitute_record(request, &record)?;
        info!(
            request_id = %context.request_id,
            uid = %record.uid,
            created_by = context.uid().unwrap_or("-"),
            "Admin account registered with identity provider"
        );
        Ok(HandlerOutcome::Next)
    }
}

/// One entry of a block-status update
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BlockStatus {
    pub uid: String,
    pub blocked: bool,
}

/// Applies block statuses at the identity provider, then forwards the original body
///
/// Every uid is looked up before any status changes, so an unknown uid leaves all
/// accounts untouched.
pub struct BlockStatusUpdate {
    service: Arc<dyn AuthService>,
    max_body_size: usize,
}

impl BlockStatusUpdate {
    pub fn new(service: Arc<dyn AuthService>, max_body_size: usize) -> Self {
        Self {
            service,
            max_body_size,
        }
    }
}

impl fmt::Debug for BlockStatusUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockStatusUpdate")
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Handler for BlockStatusUpdate {
    fn name(&self) -> &str {
        "block_status_update"
    }

    async fn handle(
        &self,
        request: &mut GatewayRequest,
        context: &mut RequestContext,
    ) -> GatewayResult<HandlerOutcome> {
        let bytes = take_body(request, self.max_body_size).await?;
        let updates: Vec<BlockStatus> = serde_json::from_slice(&bytes).map_err(|e| {
            GatewayError::invalid_input(format!("invalid block status payload: {}", e))
        })?;

        for update in &updates {
            self.service
                .get_user(&update.uid)
                .await
                .map_err(|e| GatewayError::not_found(e.to_string()))?;
        }

        for update in &updates {
            if let Err(e) = self.service.set_block_status(&update.uid, update.blocked).await {
                error!(
                    request_id = %context.request_id,
                    uid = %update.uid,
                    error = %e,
                    "Failed to update block status"
                );
                return Err(GatewayError::internal(format!(
                    "failed to update block status of {}: {}",
                    update.uid, e
                )));
            }
            debug!(
                request_id = %context.request_id,
                uid = %update.uid,
                blocked = update.blocked,
                "Block status updated"
            );
        }

        replace_body(request, bytes, false);
        Ok(HandlerOutcome::Next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::service::stub::StubAuthService;
    use axum::http::{Request, StatusCode};

    fn request(body: &str) -> GatewayRequest {
        Request::builder()
            .method("POST")
            .uri("/users")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(request: GatewayRequest) -> String {
        let bytes = axum::body::to_bytes(request.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_account_create_substitutes_record() {
        let handler = AccountCreate::new(Arc::new(StubAuthService::default()), 1024);
        let mut context = RequestContext::new("/users", None);
        let mut request = request(r#"{"email":"abc@xyz.com","username":"abc","password":"123"}"#);

        handler.handle(&mut request, &mut context).await.unwrap();

        let expected = r#"{"uid":"123","username":"abc","email":"abc@xyz.com"}"#;
        assert_eq!(
            request.headers().get(CONTENT_LENGTH).unwrap(),
            &expected.len().to_string()
        );
        assert_eq!(body_string(request).await, expected);
    }

    #[tokio::test]
    async fn test_account_create_conflict_passes_message() {
        let handler = AccountCreate::new(Arc::new(StubAuthService::default()), 1024);
        let mut context = RequestContext::new("/users", None);
        let mut request = request(r#"{"email":"abc@xyz.com","username":"abc","password":"12"}"#);

        let err = handler.handle(&mut request, &mut context).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.client_message(), Some("too short"));
    }

    #[tokio::test]
    async fn test_account_create_rejects_bad_payloads() {
        let handler = AccountCreate::new(Arc::new(StubAuthService::default()), 1024);

        for body in ["not json", r#"{"email":"abc@xyz.com"}"#, r#"{"is_federated":true}"#] {
            let mut context = RequestContext::new("/users", None);
            let err = handler
                .handle(&mut request(body), &mut context)
                .await
                .unwrap_err();
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST, "body: {}", body);
        }
    }

    #[tokio::test]
    async fn test_federated_signup_looks_up_account() {
        let handler = AccountCreate::new(Arc::new(StubAuthService::default()), 1024);
        let mut context = RequestContext::new("/users", None);

        let mut found = request(r#"{"is_federated":true,"uid":"fed-1"}"#);
        handler.handle(&mut found, &mut context).await.unwrap();
        assert!(body_string(found).await.contains(r#""uid":"fed-1""#));

        let mut missing = request(r#"{"is_federated":true,"uid":"z"}"#);
        let err = handler.handle(&mut missing, &mut context).await.unwrap_err();
        assert_eq!(err.client_message(), Some("user doesn't exist"));
    }

    #[tokio::test]
    async fn test_admin_create_ignores_federation() {
        let handler = AdminCreate::new(Arc::new(StubAuthService::default()), 1024);
        let mut context = RequestContext::new("/admins", None);
        let mut request = request(
            r#"{"email":"abc@xyz.com","username":"abc","password":"123","is_federated":true}"#,
        );

        handler.handle(&mut request, &mut context).await.unwrap();
        assert!(body_string(request).await.contains(r#""uid":"123""#));
    }

    #[tokio::test]
    async fn test_block_status_update() {
        let service = Arc::new(StubAuthService::default());
        let handler = BlockStatusUpdate::new(service.clone(), 1024);
        let mut context = RequestContext::new("/admins/users", None);
        let body = r#"[{"uid":"1","blocked":true},{"uid":"2","blocked":false}]"#;
        let mut request = request(body);

        handler.handle(&mut request, &mut context).await.unwrap();

        assert_eq!(
            *service.blocked.lock().unwrap(),
            vec![("1".to_string(), true), ("2".to_string(), false)]
        );
        assert_eq!(body_string(request).await, body);
    }

    #[tokio::test]
    async fn test_block_status_unknown_user_changes_nothing() {
        let service = Arc::new(StubAuthService::default());
        let handler = BlockStatusUpdate::new(service.clone(), 1024);
        let mut context = RequestContext::new("/admins/users", None);
        let mut request = request(r#"[{"uid":"1","blocked":true},{"uid":"z","blocked":true}]"#);

        let err = handler.handle(&mut request, &mut context).await.unwrap_err();

        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(service.blocked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_block_status_malformed_body() {
        let handler = BlockStatusUpdate::new(Arc::new(StubAuthService::default()), 1024);
        let mut context = RequestContext::new("/admins/users", None);

        let err = handler
            .handle(&mut request(r#"{"uid":"1"}"#), &mut context)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
