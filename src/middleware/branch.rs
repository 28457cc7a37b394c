//! Conditional branching between two handlers on the same route.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{GatewayRequest, RequestContext};
use crate::middleware::pipeline::{Handler, HandlerOutcome};

/// Predicate evaluated against the request context
pub type Guard = Arc<dyn Fn(&RequestContext) -> GatewayResult<bool> + Send + Sync>;

/// Guard that is true once a token authenticator accepted the caller
///
/// Fails with an internal error if no authenticator ran before it.
pub fn is_authorized() -> Guard {
    Arc::new(|context: &RequestContext| {
        context.authorized().ok_or_else(|| {
            GatewayError::internal("authorization state missing from request context")
        })
    })
}

/// Runs exactly one of two handlers depending on a guard
pub struct ConditionalBranch {
    name: String,
    guard: Guard,
    on_true: Arc<dyn Handler>,
    on_false: Arc<dyn Handler>,
}

impl ConditionalBranch {
    pub fn new<T, F>(guard: Guard, on_true: T, on_false: F) -> Self
    where
        T: Handler + 'static,
        F: Handler + 'static,
    {
        let name = format!("branch({}|{})", on_true.name(), on_false.name());
        Self {
            name,
            guard,
            on_true: Arc::new(on_true),
            on_false: Arc::new(on_false),
        }
    }
}

impl fmt::Debug for ConditionalBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionalBranch")
            .field("on_true", &self.on_true)
            .field("on_false", &self.on_false)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Handler for ConditionalBranch {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(
        &self,
        request: &mut GatewayRequest,
        context: &mut RequestContext,
    ) -> GatewayResult<HandlerOutcome> {
        let branch = if (self.guard)(context)? {
            &self.on_true
        } else {
            &self.on_false
        };

        debug!(request_id = %context.request_id, "Branch selected: {}", branch.name());
        branch.handle(request, context).await
    }
}
