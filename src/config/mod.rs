//! Configuration module for PLF Uploadr
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation.

use crate::engine::Product;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// Variable names must start with a letter or underscore and contain only
/// uppercase letters, digits, and underscores.
fn expand_env_vars(s: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}") {
        Ok(re) => re,
        Err(_) => return s.to_string(),
    };
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        // Append the text before the match
        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);

    result
}

/// Custom deserializer for strings with environment variable expansion.
fn deserialize_with_env<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(expand_env_vars(&s))
}

/// Same as [`deserialize_with_env`], for paths.
fn deserialize_path_with_env<'de, D>(deserializer: D) -> Result<PathBuf, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    deserialize_with_env(deserializer).map(PathBuf::from)
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub uploader: UploaderConfig,
    pub transport: TransportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.uploader.root_folder.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "uploader.root_folder must not be empty".into(),
            ));
        }

        if self.transport.address.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "transport.address must not be empty".into(),
            ));
        }

        if self.transport.port == 0 {
            return Err(ConfigError::ValidationError(
                "transport.port must be non-zero".into(),
            ));
        }

        let level = self.logging.level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level '{}': must be one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }
}

/// Uploader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploaderConfig {
    /// Folder the engine looks for PLF files in. Supports ${VAR} expansion.
    #[serde(deserialize_with = "deserialize_path_with_env")]
    pub root_folder: PathBuf,
    /// Product whose firmware is uploaded
    pub product: Product,
}

/// FTP transport to the device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Device address. Supports ${VAR} and ${VAR:-default} expansion.
    #[serde(deserialize_with = "deserialize_with_env")]
    pub address: String,
    #[serde(default = "default_ftp_port")]
    pub port: u16,
    #[serde(
        default = "default_ftp_username",
        deserialize_with = "deserialize_with_env"
    )]
    pub username: String,
    /// Supports ${VAR} expansion so it can stay out of the file.
    #[serde(default, deserialize_with = "deserialize_with_env")]
    pub password: String,
}

fn default_ftp_port() -> u16 {
    21
}

fn default_ftp_username() -> String {
    "anonymous".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Print collected metrics when the upload ends
    #[serde(default)]
    pub enabled: bool,
}
