//! Process-wide logging setup.
//!
//! Library code logs through both `log` and `tracing`; `LogTracer` forwards
//! the former into the subscriber installed here.

use std::io;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{Pdf2TxtError, Result};

/// Builds the env filter, letting `RUST_LOG` override the configured level.
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Installs the global subscriber. Call once, from the binary.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    tracing_log::LogTracer::init().map_err(|e| Pdf2TxtError::Logging(e.to_string()))?;

    let filter = build_filter(config);
    let registry = Registry::default().with(filter);

    let outcome = match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_writer(io::stderr)),
        ),
        LogFormat::Text => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_target(true).with_writer(io::stderr)),
        ),
    };

    outcome.map_err(|e| Pdf2TxtError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_filter_uses_configured_level_without_rust_log() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "pdf2txt=debug".to_string(),
            format: LogFormat::Text,
        };
        assert_eq!(build_filter(&config).to_string(), "pdf2txt=debug");
    }

    #[test]
    #[serial]
    fn test_rust_log_overrides_config() {
        std::env::set_var("RUST_LOG", "warn");
        let filter = build_filter(&LoggingConfig::default());
        std::env::remove_var("RUST_LOG");
        assert_eq!(filter.to_string(), "warn");
    }
}
