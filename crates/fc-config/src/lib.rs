//! FlowCatalyst Configuration System
//!
//! TOML-based configuration with environment variable override support.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub mongodb: MongoConfig,
    pub dispatch: DispatchConfig,
    pub auth: DispatchAuthConfig,
    pub logging: LoggingConfig,

    /// Development mode: in-memory job store, no MongoDB connection
    pub dev_mode: bool,
}

impl AppConfig {
    /// Parse configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dispatch.validate()?;
        if !self.dev_mode && self.auth.app_key.is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.app_key is required outside dev mode".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub host: String,
    pub metrics_port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            metrics_port: 9090,
        }
    }
}

/// MongoDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017/?replicaSet=rs0&directConnection=true".to_string(),
            database: "flowcatalyst".to_string(),
        }
    }
}

/// Dispatch processing defaults and limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Per-attempt HTTP deadline used when a job has `timeoutSeconds = 0`
    pub default_timeout_seconds: u32,
    /// Attempt budget used when a job has `maxRetries = 0`
    pub default_max_retries: u32,
    /// Content type used when a job does not carry one
    pub default_content_type: String,
    /// Ceiling for every redelivery delay handed to the router
    pub max_delay_seconds: u32,
    /// Backoff multiplier: delay = 2^attempt * base
    pub backoff_base_seconds: u32,
    /// Maximum number of response body bytes kept on an attempt
    pub max_response_body_bytes: usize,
    /// TCP connect timeout for webhook calls
    pub connect_timeout_seconds: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_timeout_seconds: 30,
            default_max_retries: 3,
            default_content_type: "application/json".to_string(),
            max_delay_seconds: fc_common::MAX_DELAY_SECONDS,
            backoff_base_seconds: 5,
            max_response_body_bytes: 64 * 1024,
            connect_timeout_seconds: 10,
        }
    }
}

impl DispatchConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "dispatch.default_timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.default_max_retries == 0 {
            return Err(ConfigError::ValidationError(
                "dispatch.default_max_retries must be greater than 0".to_string(),
            ));
        }
        if self.max_delay_seconds == 0 || self.max_delay_seconds > fc_common::MAX_DELAY_SECONDS {
            return Err(ConfigError::ValidationError(format!(
                "dispatch.max_delay_seconds must be within 1..={}",
                fc_common::MAX_DELAY_SECONDS
            )));
        }
        Ok(())
    }
}

/// Dispatch auth token configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchAuthConfig {
    /// App key for HMAC auth token generation and validation
    pub app_key: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by RUST_LOG
    pub level: String,
    /// Emit JSON lines instead of the human-readable format
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.dispatch.default_timeout_seconds, 30);
        assert_eq!(config.dispatch.default_max_retries, 3);
        assert_eq!(config.dispatch.default_content_type, "application/json");
        assert_eq!(config.dispatch.max_response_body_bytes, 65536);
        assert!(!config.dev_mode);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            dev_mode = true

            [dispatch]
            max_delay_seconds = 900

            [logging]
            json = true
            "#,
        )
        .unwrap();

        assert!(config.dev_mode);
        assert_eq!(config.dispatch.max_delay_seconds, 900);
        assert_eq!(config.dispatch.backoff_base_seconds, 5);
        assert!(config.logging.json);
        assert_eq!(config.mongodb.database, "flowcatalyst");
    }

    #[test]
    fn test_validate_requires_app_key_outside_dev_mode() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_err());

        config.auth.app_key = "secret".to_string();
        assert!(config.validate().is_ok());

        config.auth.app_key.clear();
        config.dev_mode = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_delay() {
        let mut config = DispatchConfig::default();
        config.max_delay_seconds = 0;
        assert!(config.validate().is_err());

        config.max_delay_seconds = fc_common::MAX_DELAY_SECONDS + 1;
        assert!(config.validate().is_err());
    }
}
