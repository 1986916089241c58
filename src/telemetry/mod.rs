//! Tracing subscriber setup
//!
//! ```text
//! Registry
//!   ├── EnvFilter (RUST_LOG, else the configured level)
//!   └── Fmt Layer (plain or JSON console output)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use plf_uploadr::config::LoggingConfig;
//! use plf_uploadr::telemetry::init_subscriber;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! init_subscriber(&LoggingConfig::default())?;
//! tracing::info!("ready");
//! # Ok(())
//! # }
//! ```

use crate::config::LoggingConfig;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Errors that can occur during subscriber initialization
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter '{0}': {1}")]
    InvalidFilter(String, String),

    #[error("Failed to set global subscriber (may already be initialized): {0}")]
    AlreadyInitialized(String),
}

/// Build the filter: RUST_LOG wins, the configured level is the fallback
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(&config.level)
        .map_err(|e| TelemetryError::InvalidFilter(config.level.clone(), e.to_string()))
}

/// Install the global subscriber
pub fn init_subscriber(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let env_filter = env_filter(config)?;

    let result = if config.json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true);

        tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(env_filter).with(fmt_layer),
        )
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_line_number(true);

        tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(env_filter).with(fmt_layer),
        )
    };

    result.map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn test_env_filter_rejects_garbage_level() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "plf_uploadr=loud".into(),
            json: false,
        };
        assert!(matches!(
            env_filter(&config),
            Err(TelemetryError::InvalidFilter(_, _))
        ));
    }

    #[test]
    #[serial_test::serial]
    fn test_second_init_reports_already_initialized() {
        let config = LoggingConfig::default();
        // The first call may fail if another test installed a subscriber
        let _ = init_subscriber(&config);
        assert!(matches!(
            init_subscriber(&config),
            Err(TelemetryError::AlreadyInitialized(_))
        ));
    }
}
