//! # Configuration Module
//!
//! Startup configuration: listener settings, backend base URLs and logging.
//!
//! ## Sources
//! - Environment variables only (`GatewayConfig::from_env`), the usual deployment.
//! - A YAML file named by `GATEWAY_CONFIG_PATH`, with environment variables applied
//!   on top (`GatewayConfig::load_from_file`).
//!
//! Every loader goes through an injectable lookup function so tests never touch the
//! process environment. The result is validated once and is immutable afterwards.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::BackendTarget;
use crate::observability::config::{LogConfig, LogFormat};

/// Environment variable naming the YAML configuration file
pub const CONFIG_PATH_VAR: &str = "GATEWAY_CONFIG_PATH";

const USERS_URL: &str = "USERS_URL";
const TRAINERS_URL: &str = "TRAINERS_URL";
const METRICS_URL: &str = "METRICS_URL";
const GOALS_URL: &str = "GOALS_URL";
const AUTH_URL: &str = "AUTH_URL";

/// Main gateway configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Listener and outbound-call settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Base URLs of the backends and of the identity provider
    pub services: ServiceUrls,

    /// Log level and output format
    #[serde(default)]
    pub logging: LogConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: String,

    /// HTTP port
    pub port: u16,

    /// Maximum request body the gateway itself reads (sign-up payloads, block lists)
    pub max_body_size: usize,

    /// Deadline for a forwarded request to produce response headers
    #[serde(with = "humantime_serde")]
    pub upstream_timeout: Duration,

    /// Deadline for identity-provider and admin-check calls
    #[serde(with = "humantime_serde")]
    pub auth_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            max_body_size: 1024 * 1024,
            upstream_timeout: Duration::from_secs(30),
            auth_timeout: Duration::from_secs(10),
        }
    }
}

/// Backend base URLs, one per domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceUrls {
    /// Accounts service (users and admins)
    pub users: Url,

    /// Training plans service, also owns reviews
    pub trainings: Url,

    pub metrics: Url,

    pub goals: Url,

    /// Identity provider used for sign-up, token verification and blocking
    pub auth: Url,
}

/// Immutable backend targets handed to the route table
#[derive(Debug, Clone)]
pub struct BackendTargets {
    pub users: Arc<BackendTarget>,
    pub trainings: Arc<BackendTarget>,
    pub metrics: Arc<BackendTarget>,
    pub goals: Arc<BackendTarget>,
}

impl GatewayConfig {
    /// Load configuration from `GATEWAY_CONFIG_PATH` if set, otherwise from the environment
    pub async fn load() -> GatewayResult<Self> {
        match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) if !path.is_empty() => Self::load_from_file(path).await,
            _ => Self::from_env(),
        }
    }

    /// Load configuration from the process environment
    pub fn from_env() -> GatewayResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from a YAML file, then apply environment overrides
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        Self::load_from_file_with(path, |key| std::env::var(key).ok()).await
    }

    pub async fn load_from_file_with<P, F>(path: P, lookup: F) -> GatewayResult<Self>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let content = tokio::fs::read_to_string(path.as_ref()).await.map_err(|e| {
            GatewayError::config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let mut config: GatewayConfig = serde_yaml::from_str(&content)
            .map_err(|e| GatewayError::config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the configuration from a key lookup (the environment in production)
    pub fn from_lookup<F>(lookup: F) -> GatewayResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut errors = Vec::new();
        let users = required_url(&lookup, USERS_URL, &mut errors);
        let trainings = required_url(&lookup, TRAINERS_URL, &mut errors);
        let metrics = required_url(&lookup, METRICS_URL, &mut errors);
        let goals = required_url(&lookup, GOALS_URL, &mut errors);
        let auth = required_url(&lookup, AUTH_URL, &mut errors);

        let services = match (users, trainings, metrics, goals, auth) {
            (Some(users), Some(trainings), Some(metrics), Some(goals), Some(auth)) => ServiceUrls {
                users,
                trainings,
                metrics,
                goals,
                auth,
            },
            _ => return Err(GatewayError::config(errors.join("; "))),
        };

        let mut config = Self {
            server: ServerConfig::default(),
            services,
            logging: LogConfig::default(),
        };
        config.apply_env_overrides(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides<F>(&mut self, lookup: &F) -> GatewayResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let overrides = [
            (USERS_URL, &mut self.services.users),
            (TRAINERS_URL, &mut self.services.trainings),
            (METRICS_URL, &mut self.services.metrics),
            (GOALS_URL, &mut self.services.goals),
            (AUTH_URL, &mut self.services.auth),
        ];
        for (var, slot) in overrides {
            if let Some(raw) = lookup(var).filter(|value| !value.is_empty()) {
                *slot = Url::parse(&raw).map_err(|e| {
                    GatewayError::config(format!("Invalid url {} in {}: {}", raw, var, e))
                })?;
            }
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            // Unknown levels fall back to info instead of failing startup
            self.logging.level = match level.to_lowercase().parse::<tracing::Level>() {
                Ok(_) => level.to_lowercase(),
                Err(_) => "info".to_string(),
            };
        }

        if let Some(devlog) = lookup("DEVLOG") {
            self.logging.format = if parse_flag(&devlog) {
                LogFormat::Text
            } else {
                LogFormat::Json
            };
        }

        if let Some(addr) = lookup("GATEWAY_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }

        if let Some(port) = lookup("GATEWAY_PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_PORT: {}", e)))?;
        }

        if let Some(size) = lookup("GATEWAY_MAX_BODY_SIZE") {
            self.server.max_body_size = size.parse().map_err(|e| {
                GatewayError::config(format!("Invalid GATEWAY_MAX_BODY_SIZE: {}", e))
            })?;
        }

        if let Some(timeout) = lookup("GATEWAY_UPSTREAM_TIMEOUT") {
            self.server.upstream_timeout = humantime::parse_duration(&timeout).map_err(|e| {
                GatewayError::config(format!("Invalid GATEWAY_UPSTREAM_TIMEOUT: {}", e))
            })?;
        }

        if let Some(timeout) = lookup("GATEWAY_AUTH_TIMEOUT") {
            self.server.auth_timeout = humantime::parse_duration(&timeout)
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_AUTH_TIMEOUT: {}", e)))?;
        }

        Ok(())
    }

    /// Configuration validation collecting every problem in one error
    pub fn validate(&self) -> GatewayResult<()> {
        let mut errors = Vec::new();

        if self.server.bind_address.is_empty() {
            errors.push("bind_address cannot be empty".to_string());
        }

        if self.server.max_body_size == 0 {
            errors.push("max_body_size must be greater than 0".to_string());
        }

        if self.server.upstream_timeout.is_zero() {
            errors.push("upstream_timeout must be greater than 0".to_string());
        }

        if self.server.auth_timeout.is_zero() {
            errors.push("auth_timeout must be greater than 0".to_string());
        }

        // The forwarder speaks plain HTTP to the internal backends
        for (name, url) in [
            ("users", &self.services.users),
            ("trainings", &self.services.trainings),
            ("metrics", &self.services.metrics),
            ("goals", &self.services.goals),
        ] {
            if url.scheme() != "http" {
                errors.push(format!("Backend '{}' must use http, got {}", name, url));
            }
            if url.host_str().is_none() {
                errors.push(format!("Backend '{}' has no host: {}", name, url));
            }
        }

        if !matches!(self.services.auth.scheme(), "http" | "https") {
            errors.push(format!("Identity provider url must be http(s): {}", self.services.auth));
        }

        if self.logging.level.parse::<tracing::Level>().is_err() {
            errors.push(format!("Invalid log level: {}", self.logging.level));
        }

        if !errors.is_empty() {
            return Err(GatewayError::config(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            )));
        }

        Ok(())
    }

    /// Socket address the gateway listens on
    pub fn bind_addr(&self) -> GatewayResult<SocketAddr> {
        format!("{}:{}", self.server.bind_address, self.server.port)
            .parse()
            .map_err(|e| GatewayError::config(format!("Invalid bind address: {}", e)))
    }

    /// Backend targets shared read-only by every request
    pub fn backend_targets(&self) -> BackendTargets {
        BackendTargets {
            users: BackendTarget::new("users", self.services.users.clone()),
            trainings: BackendTarget::new("trainings", self.services.trainings.clone()),
            metrics: BackendTarget::new("metrics", self.services.metrics.clone()),
            goals: BackendTarget::new("goals", self.services.goals.clone()),
        }
    }
}

fn required_url<F>(lookup: &F, var: &str, errors: &mut Vec<String>) -> Option<Url>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var).filter(|value| !value.is_empty()) {
        None => {
            errors.push(format!("Environment variable {} not found", var));
            None
        }
        Some(raw) => match Url::parse(&raw) {
            Ok(url) => Some(url),
            Err(e) => {
                errors.push(format!("Invalid url {} in {}: {}", raw, var, e));
                None
            }
        },
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "t" | "true")
}
