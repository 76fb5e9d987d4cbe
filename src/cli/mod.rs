//! CLI module for opkernel
//!
//! Provides command-line interface for:
//! - serve: Bind the configured models and start the HTTP server
//! - ops: Print the RPC methods and REST routes
//! - check: Validate configuration and bindings

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{build_api, check, ops, run, run_command, serve};
pub use errors::{CliError, CliResult};
