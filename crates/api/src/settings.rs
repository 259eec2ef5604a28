//! Layered server settings
//!
//! Built-in defaults, then an optional TOML file (`proctor.toml`, or the
//! path in `PROCTOR_CONFIG`), then `PROCTOR__SECTION__KEY` environment
//! variables.

use config::{Config, ConfigError, Environment, File};
use proctor::DetectorConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::str::FromStr;
use thiserror::Error;
use tracing::Level;

/// Default settings file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "proctor.toml";

/// Settings errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] ConfigError),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Listen address, e.g. `0.0.0.0:8080`
    pub bind_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Maximum level: trace, debug, info, warn or error
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Plain,
        }
    }
}

impl LoggingSettings {
    pub fn max_level(&self) -> Result<Level, SettingsError> {
        Level::from_str(&self.level)
            .map_err(|_| SettingsError::Invalid(format!("unknown log level '{}'", self.level)))
    }
}

/// Complete server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    /// Defaults for sessions created on first frame
    pub detector: DetectorConfig,
}

impl Settings {
    /// Load from the default file location and the environment
    pub fn load() -> Result<Self, SettingsError> {
        let path = std::env::var("PROCTOR_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path)
    }

    /// Load with `path` as the (optional) settings file
    pub fn load_from(path: &str) -> Result<Self, SettingsError> {
        let settings: Settings = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("PROCTOR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the server cannot start with
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.bind_addr()?;
        self.logging.max_level()?;
        self.detector
            .validate()
            .map_err(|e| SettingsError::Invalid(e.to_string()))
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, SettingsError> {
        self.server.bind_addr.parse().map_err(|_| {
            SettingsError::Invalid(format!("bad bind address '{}'", self.server.bind_addr))
        })
    }
}
