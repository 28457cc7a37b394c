// Log level and format settings
pub mod config;

// Subscriber installation
pub mod logging;

pub use config::{LogConfig, LogFormat};
pub use logging::{build_subscriber, init_logging};
