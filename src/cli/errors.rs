//! CLI-specific error types
//!
//! Every CLI error is fatal: `main` prints it and exits non-zero.

use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::core::RegistryError;
use crate::logging::LoggingError;

/// CLI error
#[derive(Debug, Error)]
pub enum CliError {
    #[error("OPKERNEL_CLI_CONFIG_ERROR: {0}")]
    Config(#[from] ConfigError),

    #[error("OPKERNEL_CLI_BIND_ERROR: {0}")]
    Bind(#[from] RegistryError),

    #[error("OPKERNEL_CLI_LOGGING_ERROR: {0}")]
    Logging(#[from] LoggingError),

    #[error("OPKERNEL_CLI_IO_ERROR: {0}")]
    Io(#[from] io::Error),

    #[error("OPKERNEL_CLI_BOOT_FAILED: {0}")]
    BootFailed(String),
}

impl CliError {
    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        match self {
            Self::Config(_) => "OPKERNEL_CLI_CONFIG_ERROR",
            Self::Bind(_) => "OPKERNEL_CLI_BIND_ERROR",
            Self::Logging(_) => "OPKERNEL_CLI_LOGGING_ERROR",
            Self::Io(_) => "OPKERNEL_CLI_IO_ERROR",
            Self::BootFailed(_) => "OPKERNEL_CLI_BOOT_FAILED",
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
