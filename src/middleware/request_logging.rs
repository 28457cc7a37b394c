use axum::extract::{ConnectInfo, Request};
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Request id assigned at the edge and reused by the request context
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Axum middleware function logging every request once it completes
///
/// Records method, path, status, latency and client ip. Header values are never logged.
pub async fn request_logging(mut request: Request, next: Next) -> Response {
    let start_time = Instant::now();
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string());

    request.extensions_mut().insert(RequestId(request_id.clone()));

    let response = next.run(request).await;
    let status = response.status();
    let duration = start_time.elapsed();

    if status.is_server_error() {
        warn!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = duration.as_millis() as u64,
            client_ip = %client_ip,
            "Request failed"
        );
    } else {
        info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = duration.as_millis() as u64,
            client_ip = %client_ip,
            "Request processed"
        );
    }

    response
}
