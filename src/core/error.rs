//! # Error Handling Module
//!
//! Every failure a pipeline handler can produce is a [`GatewayError`]. A handler that
//! returns `Err` aborts its chain, and the executor turns the error into the client
//! response through the [`IntoResponse`] impl below.
//!
//! ## Client-visible bodies
//! - 400/401/404/409 carry `{"error": "<message>"}` so callers (and upstream
//!   identity-provider messages) get a reason.
//! - 500/502 are sent with an empty body. Internal wiring bugs and backend
//!   addresses stay in the server-side logs.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Main result type used throughout the gateway
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error taxonomy of the gateway
///
/// The `#[error("...")]` text is what ends up in logs. Only the variants that map to
/// a 4xx expose their message to the client.
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    /// Malformed or incomplete request body
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Missing or invalid credentials
    #[error("Authentication failed: {reason}")]
    Authentication { reason: String },

    /// Valid identity, insufficient privilege
    #[error("Authorization failed: {reason}")]
    Authorization { reason: String },

    /// A resource referenced by the request does not exist upstream
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// The backend or identity provider refused to create/modify a resource
    #[error("Upstream conflict: {message}")]
    UpstreamConflict { message: String },

    /// A backend could not be reached (refused, timed out, DNS failure)
    #[error("Service unavailable: {service} - {reason}")]
    UpstreamUnavailable { service: String, reason: String },

    /// Pipeline invariant violated, e.g. a handler that needs a uid ran before authentication
    #[error("Internal server error: {message}")]
    Internal { message: String },

    /// Invalid configuration detected at startup
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// JSON serialization errors on gateway-produced payloads
    #[error("JSON error: {message}")]
    Json { message: String },
}

impl GatewayError {
    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn auth<S: Into<String>>(reason: S) -> Self {
        Self::Authentication {
            reason: reason.into(),
        }
    }

    /// Create an authorization error
    pub fn authz<S: Into<String>>(reason: S) -> Self {
        Self::Authorization {
            reason: reason.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create an upstream conflict error; the message reaches the client verbatim
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::UpstreamConflict {
            message: message.into(),
        }
    }

    /// Create an upstream unavailable error
    pub fn upstream_unavailable<S: Into<String>, R: Into<String>>(
        service: S,
        reason: R,
    ) -> Self {
        Self::UpstreamUnavailable {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Get the HTTP status code sent to the client for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            Self::Authentication { .. } => StatusCode::UNAUTHORIZED,
            Self::Authorization { .. } => StatusCode::UNAUTHORIZED,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::UpstreamConflict { .. } => StatusCode::CONFLICT,
            Self::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Json { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client, if this error exposes one
    pub fn client_message(&self) -> Option<&str> {
        match self {
            Self::InvalidInput { message } => Some(message),
            Self::Authentication { reason } => Some(reason),
            Self::Authorization { reason } => Some(reason),
            Self::NotFound { message } => Some(message),
            Self::UpstreamConflict { message } => Some(message),
            _ => None,
        }
    }

    /// Get a string representation of the error type for structured logs
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "client_input_error",
            Self::Authentication { .. } => "authentication_error",
            Self::Authorization { .. } => "authorization_error",
            Self::NotFound { .. } => "not_found",
            Self::UpstreamConflict { .. } => "upstream_conflict",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::Internal { .. } => "internal_invariant_violation",
            Self::Configuration { .. } => "configuration_error",
            Self::Json { .. } => "json_error",
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match self.client_message() {
            Some(message) => (status, Json(json!({ "error": message }))).into_response(),
            None => status.into_response(),
        }
    }
}
