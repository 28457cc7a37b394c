//! # Structured Logging
//!
//! Installs the global `tracing` subscriber. Production emits JSON lines; `DEVLOG`
//! switches to the human-readable formatter.

use tracing::{info, warn, Level, Subscriber};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::observability::config::{LogConfig, LogFormat};

/// Resolve a configured level name, falling back to `info`
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Subscriber for the configured level and format
pub fn build_subscriber(config: &LogConfig) -> Box<dyn Subscriber + Send + Sync> {
    let level = parse_level(&config.level);
    let env_filter = EnvFilter::from_default_env().add_directive(level.into());

    match config.format {
        LogFormat::Json => Box::new(
            Registry::default().with(env_filter).with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true),
            ),
        ),
        LogFormat::Text => Box::new(
            Registry::default()
                .with(env_filter)
                .with(fmt::layer().with_target(true)),
        ),
    }
}

/// Initialize the global tracing subscriber
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_logging(config: &LogConfig) {
    if build_subscriber(config).try_init().is_err() {
        warn!("Tracing subscriber already initialized, skipping initialization");
        return;
    }

    info!(
        level = %parse_level(&config.level),
        format = ?config.format,
        "Structured logging initialized"
    );
}
