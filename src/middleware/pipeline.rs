//! # Handler Pipeline System
//!
//! A matched route owns an ordered chain of [`Handler`]s. The [`Pipeline`] executor runs
//! them strictly in order against one request and its [`RequestContext`]:
//!
//! - `Ok(HandlerOutcome::Next)` passes control to the next handler.
//! - `Ok(HandlerOutcome::Respond(..))` ends the chain with that response. The
//!   forwarder answers this way with the backend response.
//! - `Err(GatewayError)` aborts the chain; the error becomes the client response.
//!
//! Chains are assembled once at startup through [`PipelineBuilder`], which rejects
//! empty chains and terminal handlers that are not last.

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{GatewayRequest, RequestContext};

/// What a handler decided after running
#[derive(Debug)]
pub enum HandlerOutcome {
    /// Continue with the next handler in the chain
    Next,
    /// Stop the chain and send this response
    Respond(Response),
}

/// Core handler trait that all pipeline steps implement
///
/// Handlers hold their dependencies (service handles, backend targets) and are shared
/// by every request hitting their route, so they must not keep per-request state.
#[async_trait]
pub trait Handler: Send + Sync + fmt::Debug {
    /// Handler name for identification and logging
    fn name(&self) -> &str;

    /// Whether this handler always produces the final response
    fn is_terminal(&self) -> bool {
        false
    }

    /// Inspect or rewrite the request, record facts in the context, or end the chain
    async fn handle(
        &self,
        request: &mut GatewayRequest,
        context: &mut RequestContext,
    ) -> GatewayResult<HandlerOutcome>;
}

/// Ordered, validated handler chain of a single route
#[derive(Debug, Clone)]
pub struct Pipeline {
    handlers: Arc<[Arc<dyn Handler>]>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Number of handlers in the chain
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Handlers in execution order
    pub fn handlers(&self) -> &[Arc<dyn Handler>] {
        &self.handlers
    }

    /// Handler names in execution order
    pub fn handler_names(&self) -> Vec<&str> {
        self.handlers.iter().map(|handler| handler.name()).collect()
    }

    /// Run the chain for one request
    ///
    /// Never fails: aborts are converted into their client response here.
    pub async fn execute(
        &self,
        mut request: GatewayRequest,
        context: &mut RequestContext,
    ) -> Response {
        let start_time = Instant::now();

        debug!(
            request_id = %context.request_id,
            route = %context.route_pattern,
            "Starting pipeline execution with {} handlers",
            self.handlers.len()
        );

        for handler in self.handlers.iter() {
            debug!(request_id = %context.request_id, "Executing handler: {}", handler.name());

            match handler.handle(&mut request, context).await {
                Ok(HandlerOutcome::Next) => continue,
                Ok(HandlerOutcome::Respond(response)) => {
                    debug!(
                        request_id = %context.request_id,
                        status = response.status().as_u16(),
                        "Pipeline completed by '{}' in {:?}",
                        handler.name(),
                        start_time.elapsed()
                    );
                    return response;
                }
                Err(err) => {
                    if err.status_code().is_server_error() {
                        error!(
                            request_id = %context.request_id,
                            error_type = err.error_type(),
                            "Handler '{}' aborted: {}",
                            handler.name(),
                            err
                        );
                    } else {
                        warn!(
                            request_id = %context.request_id,
                            error_type = err.error_type(),
                            "Handler '{}' aborted: {}",
                            handler.name(),
                            err
                        );
                    }
                    return err.into_response();
                }
            }
        }

        // Unreachable for validated chains, which always end in a terminal handler
        error!(
            request_id = %context.request_id,
            route = %context.route_pattern,
            "Pipeline exhausted without producing a response"
        );
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}

/// Builder assembling a route's handler chain at startup
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    handlers: Vec<Arc<dyn Handler>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler to the chain
    pub fn with<H: Handler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Append a handler instance shared with other chains
    pub fn with_shared(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Validate and freeze the chain
    pub fn build(self) -> GatewayResult<Pipeline> {
        if self.handlers.is_empty() {
            return Err(GatewayError::config("handler chain cannot be empty"));
        }

        let last = self.handlers.len() - 1;
        if let Some((index, handler)) = self
            .handlers
            .iter()
            .enumerate()
            .find(|(index, handler)| handler.is_terminal() && *index != last)
        {
            return Err(GatewayError::config(format!(
                "terminal handler '{}' at position {} must be last in the chain",
                handler.name(),
                index
            )));
        }

        Ok(Pipeline {
            handlers: self.handlers.into(),
        })
    }
}
