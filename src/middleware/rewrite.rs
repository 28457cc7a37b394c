//! # Request Rewriters
//!
//! Handlers that reshape the outbound request before it is forwarded: appending the
//! caller uid to the path, stripping a path prefix, and injecting query parameters.

use async_trait::async_trait;
use axum::http::uri::{PathAndQuery, Uri};
use tracing::debug;

use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{GatewayRequest, RequestContext};
use crate::middleware::pipeline::{Handler, HandlerOutcome};

/// Replace the path and query of a request URI, keeping scheme and authority
pub(crate) fn set_path_and_query(
    request: &mut GatewayRequest,
    path: &str,
    query: Option<&str>,
) -> GatewayResult<()> {
    let path_and_query = match query {
        Some(query) if !query.is_empty() => format!("{}?{}", path, query),
        _ => path.to_string(),
    };

    let mut parts = request.uri().clone().into_parts();
    parts.path_and_query = Some(
        path_and_query
            .parse::<PathAndQuery>()
            .map_err(|e| GatewayError::internal(format!("rewritten path is invalid: {}", e)))?,
    );
    *request.uri_mut() = Uri::from_parts(parts)
        .map_err(|e| GatewayError::internal(format!("rewritten uri is invalid: {}", e)))?;
    Ok(())
}

/// Appends `/{uid}` to the request path
///
/// Must run after a successful token authenticator; a missing uid is a wiring bug.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathAppendUid;

#[async_trait]
impl Handler for PathAppendUid {
    fn name(&self) -> &str {
        "path_append_uid"
    }

    async fn handle(
        &self,
        request: &mut GatewayRequest,
        context: &mut RequestContext,
    ) -> GatewayResult<HandlerOutcome> {
        let uid = context.require_uid()?;
        let path = format!(
            "{}/{}",
            request.uri().path().trim_end_matches('/'),
            urlencoding::encode(uid)
        );
        let query = request.uri().query().map(str::to_string);

        set_path_and_query(request, &path, query.as_deref())?;
        debug!(request_id = %context.request_id, path = %path, "Appended uid to path");
        Ok(HandlerOutcome::Next)
    }
}

/// Removes the first occurrence of a prefix from the request path
#[derive(Debug, Clone)]
pub struct PathStripPrefix {
    prefix: String,
}

impl PathStripPrefix {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Path after stripping, or `None` when it stays unchanged
    pub fn strip(&self, path: &str) -> Option<String> {
        if self.prefix.is_empty() {
            return None;
        }

        let (_, remainder) = path.split_once(self.prefix.as_str())?;
        if remainder.is_empty() {
            return None;
        }

        if remainder.starts_with('/') {
            Some(remainder.to_string())
        } else {
            Some(format!("/{}", remainder))
        }
    }
}

#[async_trait]
impl Handler for PathStripPrefix {
    fn name(&self) -> &str {
        "path_strip_prefix"
    }

    async fn handle(
        &self,
        request: &mut GatewayRequest,
        context: &mut RequestContext,
    ) -> GatewayResult<HandlerOutcome> {
        if let Some(path) = self.strip(request.uri().path()) {
            let query = request.uri().query().map(str::to_string);
            set_path_and_query(request, &path, query.as_deref())?;
            debug!(request_id = %context.request_id, path = %path, "Stripped path prefix");
        }
        Ok(HandlerOutcome::Next)
    }
}

/// Appends `key=value` to the query string
///
/// Append-only: running it twice yields the parameter twice.
#[derive(Debug, Clone)]
pub struct QueryInject {
    key: String,
    value: String,
}

impl QueryInject {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Query string with the pair appended to the existing one
    pub fn inject(&self, query: Option<&str>) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            serializer.append_pair(&key, &value);
        }
        serializer.append_pair(&self.key, &self.value);
        serializer.finish()
    }
}

#[async_trait]
impl Handler for QueryInject {
    fn name(&self) -> &str {
        "query_inject"
    }

    async fn handle(
        &self,
        request: &mut GatewayRequest,
        context: &mut RequestContext,
    ) -> GatewayResult<HandlerOutcome> {
        let path = request.uri().path().to_string();
        let query = self.inject(request.uri().query());

        set_path_and_query(request, &path, Some(&query))?;
        debug!(request_id = %context.request_id, query = %query, "Injected query parameter");
        Ok(HandlerOutcome::Next)
    }
}
