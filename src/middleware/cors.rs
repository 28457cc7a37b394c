use axum::http::{HeaderName, Method};
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::core::error::{GatewayError, GatewayResult};

/// CORS policy applied in front of every route
///
/// The request `Origin` is always reflected and credentials are always allowed.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub max_age: Option<Duration>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_methods: ["POST", "GET", "PUT", "DELETE", "OPTIONS", "PATCH"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: ["Authorization", "Content-Type", "Content-Length"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            max_age: None,
        }
    }
}

impl CorsConfig {
    /// Build the tower-http layer; `OPTIONS` requests are answered by the layer itself
    pub fn into_layer(self) -> GatewayResult<CorsLayer> {
        let methods = self
            .allowed_methods
            .iter()
            .map(|m| m.parse::<Method>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| GatewayError::config(format!("Invalid CORS method: {}", e)))?;

        let headers = self
            .allowed_headers
            .iter()
            .map(|h| h.parse::<HeaderName>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| GatewayError::config(format!("Invalid CORS header: {}", e)))?;

        let mut layer = CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_credentials(true)
            .allow_methods(methods)
            .allow_headers(headers);

        if let Some(max_age) = self.max_age {
            layer = layer.max_age(max_age);
        }

        Ok(layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_builds() {
        assert!(CorsConfig::default().into_layer().is_ok());
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        let config = CorsConfig {
            allowed_headers: vec!["bad header".to_string()],
            ..CorsConfig::default()
        };
        assert!(config.into_layer().is_err());
    }
}
