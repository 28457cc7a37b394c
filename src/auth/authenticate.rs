//! # Token Authentication
//!
//! Verifies the raw `Authorization` header value through the identity provider and
//! records the outcome in the request context.
//!
//! Two modes exist because routes need both policies:
//! - [`AuthMode::Require`] aborts with 401 when the token is missing or invalid.
//! - [`AuthMode::Probe`] records the failure and lets the chain continue, so a later
//!   branch can serve a public view to anonymous callers.

use async_trait::async_trait;
use axum::http::header::{HeaderMap, AUTHORIZATION};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::auth::service::AuthService;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{GatewayRequest, RequestContext};
use crate::middleware::pipeline::{Handler, HandlerOutcome};

/// What to do when verification fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Probe,
    Require,
}

pub struct TokenAuthenticator {
    service: Arc<dyn AuthService>,
    mode: AuthMode,
}

impl TokenAuthenticator {
    pub fn new(service: Arc<dyn AuthService>, mode: AuthMode) -> Self {
        Self { service, mode }
    }

    /// Record the outcome and continue either way
    pub fn probe(service: Arc<dyn AuthService>) -> Self {
        Self::new(service, AuthMode::Probe)
    }

    /// Abort with 401 unless the token verifies
    pub fn require(service: Arc<dyn AuthService>) -> Self {
        Self::new(service, AuthMode::Require)
    }

    async fn verify(&self, headers: &HeaderMap) -> Result<String, String> {
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| "missing authorization token".to_string())?;

        self.service
            .verify_token(token)
            .await
            .map_err(|e| e.to_string())
    }
}

impl fmt::Debug for TokenAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthenticator")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Handler for TokenAuthenticator {
    fn name(&self) -> &str {
        match self.mode {
            AuthMode::Probe => "token_probe",
            AuthMode::Require => "token_require",
        }
    }

    async fn handle(
        &self,
        request: &mut GatewayRequest,
        context: &mut RequestContext,
    ) -> GatewayResult<HandlerOutcome> {
        match self.verify(request.headers()).await {
            Ok(uid) => {
                debug!(request_id = %context.request_id, uid = %uid, "Token verified");
                context.authorize(uid);
                Ok(HandlerOutcome::Next)
            }
            Err(reason) => {
                context.deny();
                match self.mode {
                    AuthMode::Probe => {
                        debug!(
                            request_id = %context.request_id,
                            "Continuing unauthenticated: {}", reason
                        );
                        Ok(HandlerOutcome::Next)
                    }
                    AuthMode::Require => Err(GatewayError::auth(reason)),
                }
            }
        }
    }
}
