//! # Core Types Module
//!
//! Request-scoped state shared between pipeline handlers, plus the backend target
//! descriptor shared by every request.
//!
//! A [`RequestContext`] is created when a route matches and dropped when the response
//! is finalized. It is owned by the task serving that single request and is only ever
//! lent to handlers one at a time (`&mut`), so no synchronization is involved.

use axum::body::Body;
use axum::http::Request;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;
use uuid::Uuid;

use crate::core::error::{GatewayError, GatewayResult};

/// The request object handlers inspect and rewrite in place
pub type GatewayRequest = Request<Body>;

/// What the gateway currently knows about the caller
///
/// Progresses `Unauthenticated -> Authenticated(uid) -> Admin(uid)` and never backwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Unauthenticated,
    Authenticated(String),
    Admin(String),
}

/// Per-request scratch store carrying identity facts between handlers
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique identifier for this request (for tracing and logging)
    pub request_id: String,

    /// Client's remote address, when the listener provides it
    pub client_addr: Option<SocketAddr>,

    /// Pattern of the matched route
    pub route_pattern: String,

    /// Request start time for latency measurement
    pub start_time: Instant,

    uid: Option<String>,
    authorized: Option<bool>,
    admin: bool,
}

impl RequestContext {
    /// Create a new request context with a fresh request id
    pub fn new(route_pattern: impl Into<String>, client_addr: Option<SocketAddr>) -> Self {
        Self::with_request_id(Uuid::new_v4().to_string(), route_pattern, client_addr)
    }

    /// Create a request context for a request id assigned upstream of the router
    pub fn with_request_id(
        request_id: impl Into<String>,
        route_pattern: impl Into<String>,
        client_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            client_addr,
            route_pattern: route_pattern.into(),
            start_time: Instant::now(),
            uid: None,
            authorized: None,
            admin: false,
        }
    }

    /// Get elapsed time since request started
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Record a successful token verification
    pub fn authorize(&mut self, uid: impl Into<String>) {
        self.uid = Some(uid.into());
        self.authorized = Some(true);
    }

    /// Record a failed token verification
    pub fn deny(&mut self) {
        self.uid = None;
        self.authorized = Some(false);
        self.admin = false;
    }

    /// Mark the authenticated caller as admin for the rest of the chain
    pub fn elevate(&mut self) -> GatewayResult<()> {
        if self.authorized != Some(true) {
            return Err(GatewayError::internal(
                "admin elevation attempted on an unauthenticated request",
            ));
        }
        self.admin = true;
        Ok(())
    }

    /// Caller uid, if a token was verified
    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    /// Caller uid; its absence means a handler was wired before the authenticator
    pub fn require_uid(&self) -> GatewayResult<&str> {
        self.uid()
            .ok_or_else(|| GatewayError::internal("uid missing from request context"))
    }

    /// `None` until a token authenticator has run for this request
    pub fn authorized(&self) -> Option<bool> {
        self.authorized
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    /// Current authorization state
    pub fn decision(&self) -> AuthDecision {
        match (&self.uid, self.admin) {
            (Some(uid), true) => AuthDecision::Admin(uid.clone()),
            (Some(uid), false) => AuthDecision::Authenticated(uid.clone()),
            (None, _) => AuthDecision::Unauthenticated,
        }
    }

    /// Client ip for logs, `-` when unknown
    pub fn client_ip(&self) -> String {
        self.client_addr
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "-".to_string())
    }
}

/// Base URL of one backend domain
///
/// Loaded once at startup and shared read-only by every request.
#[derive(Debug, Clone)]
pub struct BackendTarget {
    /// Domain name used in logs (`users`, `trainings`, ...)
    pub name: String,

    /// Base URL requests are forwarded to
    pub base_url: Url,
}

impl BackendTarget {
    pub fn new(name: impl Into<String>, base_url: Url) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            base_url,
        })
    }

    /// `host[:port]` of the target, used as the forwarded `Host` header
    pub fn authority(&self) -> String {
        let host = self.base_url.host_str().unwrap_or_default();
        match self.base_url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }
}

impl fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.base_url)
    }
}
