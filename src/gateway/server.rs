//! # HTTP Server Module
//!
//! Composition root of the gateway. Every request goes through the same axum fallback
//! handler, which matches it against the route table, creates the request context and
//! runs the route's pipeline.
//!
//! Layers, outermost first: request logging, `TraceLayer`, CORS. CORS answers every
//! `OPTIONS` request itself, so preflights never reach a pipeline.

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware,
    response::{IntoResponse, Response},
    Router as AxumRouter,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::auth::service::{AuthService, RemoteAuthService};
use crate::core::config::GatewayConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::RequestContext;
use crate::middleware::cors::CorsConfig;
use crate::middleware::request_logging::{request_logging, RequestId};
use crate::proxy::build_proxy_client;
use crate::routing::{build_route_table, RouteDependencies, RouteTable};

/// Connect timeout of the forwarding client
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Server state shared across all request handlers
#[derive(Clone)]
pub struct ServerState {
    pub routes: Arc<RouteTable>,
}

/// Main gateway server
pub struct GatewayServer {
    bind_addr: SocketAddr,
    app: AxumRouter,
}

impl GatewayServer {
    /// Build the server with the remote identity provider from the configuration
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        let auth = RemoteAuthService::new(config.services.auth.clone(), config.server.auth_timeout)
            .map_err(|e| GatewayError::config(e.to_string()))?;
        Self::new(config, Arc::new(auth))
    }

    /// Build the server around a given identity provider
    pub fn new(config: &GatewayConfig, auth: Arc<dyn AuthService>) -> GatewayResult<Self> {
        let client = build_proxy_client(CONNECT_TIMEOUT.min(config.server.upstream_timeout));
        let deps = RouteDependencies::from_config(config, auth, client);
        let routes = build_route_table(&deps)?;

        Ok(Self {
            bind_addr: config.bind_addr()?,
            app: build_app(routes, CorsConfig::default())?,
        })
    }

    /// Get gateway server bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// The composed axum application
    pub fn app(&self) -> AxumRouter {
        self.app.clone()
    }

    /// Bind the listener and serve until Ctrl-C or SIGTERM
    pub async fn start(self) -> GatewayResult<()> {
        let listener = TcpListener::bind(self.bind_addr).await.map_err(|e| {
            GatewayError::internal(format!(
                "Failed to bind gateway server to {}: {}",
                self.bind_addr, e
            ))
        })?;
        info!("Gateway HTTP server listening on {}", self.bind_addr);

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` completes
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> GatewayResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        axum::serve(
            listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| GatewayError::internal(format!("Gateway server error: {}", e)))?;

        info!("Gateway server stopped");
        Ok(())
    }
}

/// Compose the axum application around a route table
pub fn build_app(routes: RouteTable, cors: CorsConfig) -> GatewayResult<AxumRouter> {
    let state = ServerState {
        routes: Arc::new(routes),
    };

    Ok(AxumRouter::new()
        .fallback(handle_request)
        .with_state(state)
        .layer(cors.into_layer()?)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_logging)))
}

/// Main request handler that processes all incoming requests
async fn handle_request(State(state): State<ServerState>, request: Request) -> Response {
    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let Some(matched) = state.routes.match_route(request.method(), request.uri().path()) else {
        debug!(method = %request.method(), path = %request.uri().path(), "No route matched");
        return GatewayError::not_found("route not found").into_response();
    };

    let mut context = match request.extensions().get::<RequestId>() {
        Some(RequestId(id)) => {
            RequestContext::with_request_id(id.clone(), matched.pattern, client_addr)
        }
        None => RequestContext::new(matched.pattern, client_addr),
    };

    debug!(
        request_id = %context.request_id,
        method = %request.method(),
        route = %context.route_pattern,
        client_ip = %context.client_ip(),
        "Processing incoming request"
    );

    matched.pipeline.execute(request, &mut context).await
}

/// Resolves on Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C), initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
