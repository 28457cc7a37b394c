//! # Router Module
//!
//! Static route table mapping `(method, path pattern)` to a handler [`Pipeline`].
//! Path matching uses the `matchit` radix tree; each path pattern holds one pipeline
//! per HTTP method. Parameters are only matched, never extracted: handlers work on the
//! raw request path.
//!
//! The table is built once at startup and only read afterwards, so it is shared
//! between requests without locking.

use axum::http::Method;
use matchit::Router as RadixRouter;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::core::error::{GatewayError, GatewayResult};
use crate::middleware::pipeline::Pipeline;

/// Pipelines registered under one path pattern
#[derive(Debug)]
struct PatternRoutes {
    pattern: String,
    methods: HashMap<Method, Pipeline>,
}

/// A route matched for an incoming request
#[derive(Debug)]
pub struct RouteMatch<'a> {
    /// Pattern the path matched (e.g. `/users/:user_id`)
    pub pattern: &'a str,

    /// Handler chain to run
    pub pipeline: &'a Pipeline,
}

/// Immutable route table
pub struct RouteTable {
    router: RadixRouter<PatternRoutes>,
    routes: Vec<(Method, String)>,
}

impl RouteTable {
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::new()
    }

    /// Match a request to a route
    ///
    /// Returns `None` when the path is unknown or the method is not registered for it.
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        let routes = self.router.at(path).ok()?.value;
        let pipeline = routes.methods.get(method)?;

        Some(RouteMatch {
            pattern: &routes.pattern,
            pipeline,
        })
    }

    /// All registered `(method, pattern)` pairs, sorted by pattern then method
    pub fn routes(&self) -> &[(Method, String)] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.routes)
            .finish()
    }
}

/// Builder for the route table
#[derive(Debug, Default)]
pub struct RouteTableBuilder {
    patterns: BTreeMap<String, HashMap<Method, Pipeline>>,
}

impl RouteTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pipeline for a method and path pattern
    ///
    /// Registering the same method and pattern twice is an error.
    pub fn add(&mut self, method: Method, pattern: &str, pipeline: Pipeline) -> GatewayResult<()> {
        let methods = self.patterns.entry(pattern.to_string()).or_default();
        if methods.contains_key(&method) {
            return Err(GatewayError::config(format!(
                "Duplicate route: {} {}",
                method, pattern
            )));
        }
        methods.insert(method, pipeline);
        Ok(())
    }

    /// Build the route table
    pub fn build(self) -> GatewayResult<RouteTable> {
        let mut router = RadixRouter::new();
        let mut routes = Vec::new();

        for (pattern, methods) in self.patterns {
            let mut registered: Vec<(Method, String)> = methods
                .keys()
                .map(|method| (method.clone(), pattern.clone()))
                .collect();
            registered.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
            routes.extend(registered);

            router
                .insert(
                    pattern.clone(),
                    PatternRoutes {
                        pattern: pattern.clone(),
                        methods,
                    },
                )
                .map_err(|e| {
                    GatewayError::config(format!("Failed to add route {}: {}", pattern, e))
                })?;
        }

        Ok(RouteTable { router, routes })
    }
}
