//! # Fit Gateway Library
//!
//! Authenticating API gateway in front of the accounts, trainings, metrics and goals
//! services. Every route owns an ordered chain of handlers that authenticate the
//! caller, optionally elevate them to admin, rewrite the request and finally forward
//! it to the route's backend.
//!
//! ## Module map
//! - `core`: error taxonomy, configuration, request context and backend targets
//! - `middleware`: handler trait, pipeline executor, branching, rewriters, CORS and
//!   request logging
//! - `auth`: identity-provider contract and the handlers built on it
//! - `proxy`: reverse-proxy forwarder
//! - `routing`: route table and per-domain route groups
//! - `gateway`: axum server composition
//! - `observability`: log subscriber setup

/// Core functionality including error types, configuration, and basic data structures
pub mod core;

/// Main gateway server implementation and HTTP handling
pub mod gateway;

/// Handler pipeline and the generic request handlers
pub mod middleware;

/// Authentication and authorization against the identity provider
pub mod auth;

/// Forwarding to backend services
pub mod proxy;

/// Request routing with path matching
pub mod routing;

/// Logging setup
pub mod observability;

pub use crate::core::config::GatewayConfig;
pub use crate::core::error::{GatewayError, GatewayResult};
pub use crate::core::types::{AuthDecision, BackendTarget, GatewayRequest, RequestContext};

pub use auth::service::{AuthService, AuthServiceError, RemoteAuthService, SignUp, UserRecord};
pub use gateway::server::{build_app, GatewayServer};
pub use middleware::pipeline::{Handler, HandlerOutcome, Pipeline};
pub use routing::{build_route_table, RouteDependencies, RouteTable};
