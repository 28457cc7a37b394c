//! # Reverse-Proxy Forwarder
//!
//! Terminal handler of every chain. Sends the (possibly rewritten) request to a backend
//! and streams the backend response back unmodified.
//!
//! ## Behaviour
//! - The URI is rebuilt against the backend base URL; method, headers and body pass
//!   through, except that `Host` is set to the backend authority, hop-by-hop headers
//!   are dropped in both directions and the client ip is appended to `X-Forwarded-For`.
//! - Bodies are streamed in both directions, never buffered.
//! - Connection failures and timeouts answer 502 with an empty body. The backend
//!   address only appears in the server-side log.
//! - Dropping the handler future (client disconnect) drops the outbound call.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, HOST};
use axum::http::{Request, Uri, Version};
use axum::response::Response;
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{BackendTarget, GatewayRequest, RequestContext};
use crate::middleware::pipeline::{Handler, HandlerOutcome};

/// Shared outbound HTTP client; cloning shares the connection pool
pub type ProxyClient = Client<HttpConnector, Body>;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers that describe a single connection and must not be forwarded
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Build the client used by every forwarder
pub fn build_proxy_client(connect_timeout: Duration) -> ProxyClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(connect_timeout));
    Client::builder(TokioExecutor::new()).build(connector)
}

/// Backend response as sent to the client: streamed body, hop-by-hop headers removed
fn client_response(response: Response<Incoming>) -> Response {
    let mut response = response.map(Body::new);
    strip_hop_by_hop(response.headers_mut());
    response
}

/// Remove hop-by-hop headers, including any named by `Connection`
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

/// Join the backend base URL with the request path and query
pub fn target_uri(target: &BackendTarget, uri: &Uri) -> GatewayResult<Uri> {
    let base = &target.base_url;
    let base_path = base.path().trim_end_matches('/');
    let path = uri.path();
    let path = if path.starts_with('/') {
        format!("{}{}", base_path, path)
    } else {
        format!("{}/{}", base_path, path)
    };

    let query = match (base.query().filter(|q| !q.is_empty()), uri.query()) {
        (Some(base_query), Some(query)) => Some(format!("{}&{}", base_query, query)),
        (Some(base_query), None) => Some(base_query.to_string()),
        (None, Some(query)) => Some(query.to_string()),
        (None, None) => None,
    };

    let mut target_uri = format!("{}://{}{}", base.scheme(), target.authority(), path);
    if let Some(query) = query {
        target_uri.push('?');
        target_uri.push_str(&query);
    }

    target_uri
        .parse()
        .map_err(|e| GatewayError::internal(format!("invalid upstream uri {}: {}", target_uri, e)))
}

/// Terminal handler forwarding the request to one backend
#[derive(Debug, Clone)]
pub struct ReverseProxyForward {
    target: Arc<BackendTarget>,
    client: ProxyClient,
    timeout: Duration,
}

impl ReverseProxyForward {
    pub fn new(target: Arc<BackendTarget>, client: ProxyClient, timeout: Duration) -> Self {
        Self {
            target,
            client,
            timeout,
        }
    }

    pub fn target(&self) -> &BackendTarget {
        &self.target
    }

    fn prepare(
        &self,
        request: GatewayRequest,
        context: &RequestContext,
    ) -> GatewayResult<GatewayRequest> {
        let (mut parts, body) = request.into_parts();
        parts.uri = target_uri(&self.target, &parts.uri)?;
        // The backend client speaks HTTP/1 only, whatever the inbound version was
        parts.version = Version::HTTP_11;

        strip_hop_by_hop(&mut parts.headers);

        let authority = HeaderValue::from_str(&self.target.authority())
            .map_err(|e| GatewayError::internal(format!("invalid backend authority: {}", e)))?;
        parts.headers.insert(HOST, authority);

        if let Some(addr) = context.client_addr {
            let prior = parts.headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok());
            let forwarded_for = match prior {
                Some(prior) => format!("{}, {}", prior, addr.ip()),
                None => addr.ip().to_string(),
            };
            if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
                parts.headers.insert(X_FORWARDED_FOR, value);
            }
        }

        Ok(Request::from_parts(parts, body))
    }
}

#[async_trait]
impl Handler for ReverseProxyForward {
    fn name(&self) -> &str {
        "reverse_proxy_forward"
    }

    fn is_terminal(&self) -> bool {
        true
    }

    async fn handle(
        &self,
        request: &mut GatewayRequest,
        context: &mut RequestContext,
    ) -> GatewayResult<HandlerOutcome> {
        let request = std::mem::replace(request, Request::new(Body::empty()));
        let outbound = self.prepare(request, context)?;
        let uri = outbound.uri().to_string();

        debug!(
            request_id = %context.request_id,
            service = %self.target.name,
            method = %outbound.method(),
            uri = %uri,
            "Forwarding request"
        );

        let outcome = tokio::time::timeout(self.timeout, self.client.request(outbound)).await;
        let failure = match outcome {
            Ok(Ok(response)) => return Ok(HandlerOutcome::Respond(client_response(response))),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("no response within {:?}", self.timeout),
        };

        error!(
            request_id = %context.request_id,
            uri = %uri,
            client_ip = %context.client_ip(),
            error = %failure,
            "Upstream request failed"
        );
        Err(GatewayError::upstream_unavailable(self.target.name.clone(), failure))
    }
}
