//! Logging setup
//!
//! A `tracing-subscriber` fmt subscriber filtered by [`EnvFilter`]. The
//! `OPKERNEL_LOG` environment variable, when set, replaces the configured
//! level with a full filter directive such as `opkernel=debug,tower_http=info`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the configured filter
pub const LOG_ENV: &str = "OPKERNEL_LOG";

/// Logging setup errors
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level '{level}': {source}")]
    InvalidFilter {
        level: String,
        #[source]
        source: ParseError,
    },

    #[error("failed to install log subscriber: {0}")]
    Install(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Logging result type
pub type LoggingResult<T> = Result<T, LoggingError>;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive (default: "info")
    #[serde(default = "default_level")]
    pub level: String,

    /// Emit JSON lines instead of text (default: false)
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Filter from `OPKERNEL_LOG`, falling back to the configured level
    pub fn env_filter(&self) -> LoggingResult<EnvFilter> {
        match EnvFilter::try_from_env(LOG_ENV) {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.level).map_err(|source| {
                LoggingError::InvalidFilter {
                    level: self.level.clone(),
                    source,
                }
            }),
        }
    }
}

/// Install the global subscriber
///
/// Fails if the filter is invalid or a subscriber is already installed.
pub fn init(config: &LoggingConfig) -> LoggingResult<()> {
    let filter = config.env_filter()?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(LoggingError::Install)
}
