//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "flowcatalyst.toml",
    "./config/config.toml",
    "/etc/flowcatalyst/config.toml",
];

/// Configuration loader
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        self.load_with(|key| env::var(key).ok())
    }

    /// Config file `load` would read, if any
    pub fn resolve_config_file(&self) -> Option<PathBuf> {
        self.find_config_file(&|key: &str| env::var(key).ok())
    }

    /// Load using a custom variable lookup instead of the process environment
    pub fn load_with<F>(&self, lookup: F) -> Result<AppConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match self.find_config_file(&lookup) {
            Some(path) => {
                info!(?path, "Loading configuration from file");
                AppConfig::from_file(&path)?
            }
            None => AppConfig::default(),
        };

        apply_overrides(&mut config, &lookup);
        config.validate()?;
        Ok(config)
    }

    fn find_config_file<F>(&self, lookup: &F) -> Option<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Some(path) = lookup("FLOWCATALYST_CONFIG").map(PathBuf::from) {
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

fn parse_into<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) {
    if let Some(value) = lookup(key).and_then(|v| v.parse().ok()) {
        *target = value;
    }
}

fn apply_overrides<F>(config: &mut AppConfig, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    // HTTP
    parse_into(lookup, "FLOWCATALYST_HTTP_PORT", &mut config.http.port);
    parse_into(lookup, "FLOWCATALYST_METRICS_PORT", &mut config.http.metrics_port);
    if let Some(val) = lookup("FLOWCATALYST_HTTP_HOST") {
        config.http.host = val;
    }

    // MongoDB
    if let Some(val) = lookup("FLOWCATALYST_MONGODB_URI") {
        config.mongodb.uri = val;
    }
    if let Some(val) = lookup("FLOWCATALYST_MONGODB_DATABASE") {
        config.mongodb.database = val;
    }

    // Dispatch
    parse_into(lookup, "FLOWCATALYST_DISPATCH_TIMEOUT_SECONDS", &mut config.dispatch.default_timeout_seconds);
    parse_into(lookup, "FLOWCATALYST_DISPATCH_MAX_RETRIES", &mut config.dispatch.default_max_retries);
    parse_into(lookup, "FLOWCATALYST_DISPATCH_MAX_DELAY_SECONDS", &mut config.dispatch.max_delay_seconds);

    // Auth
    if let Some(val) = lookup("FLOWCATALYST_APP_KEY") {
        config.auth.app_key = val;
    }

    // Logging
    if let Some(val) = lookup("FLOWCATALYST_LOG_JSON") {
        config.logging.json = val == "true" || val == "1";
    }

    if let Some(val) = lookup("FLOWCATALYST_DEV_MODE") {
        config.dev_mode = val == "true" || val == "1";
    }
}
