//! Configuration file
//!
//! One JSON document; every section and field has a default, so `{}` is a
//! valid configuration serving no models.
//!
//! ```json
//! {
//!   "server": {"port": 54321, "rpc_path": "/rpc"},
//!   "logging": {"level": "info"},
//!   "models": [{"name": "Item", "fields": [{"name": "name", "type": "string"}]}]
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::http_server::routes::HEALTH_PATH;
use crate::http_server::HttpServerConfig;
use crate::logging::LoggingConfig;
use crate::schema::ModelSchema;

/// Configuration load errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: HttpServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Models bound at startup, in order
    #[serde(default)]
    pub models: Vec<ModelSchema>,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate a configuration document
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: AppConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        if !self.server.rpc_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "server.rpc_path must start with '/': '{}'",
                self.server.rpc_path
            )));
        }
        if self.server.rpc_path == HEALTH_PATH {
            return Err(ConfigError::Invalid(
                "server.rpc_path collides with /health".to_string(),
            ));
        }
        self.logging
            .env_filter()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }
}
