//! CLI argument definitions using clap
//!
//! Commands:
//! - opkernel serve --config <path>
//! - opkernel ops --config <path>
//! - opkernel check --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// opkernel - one operation lifecycle behind REST, nested REST and RPC
#[derive(Parser, Debug)]
#[command(name = "opkernel")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./opkernel.json")]
        config: PathBuf,

        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print the RPC methods and REST routes of the configured models
    Ops {
        /// Path to configuration file
        #[arg(long, default_value = "./opkernel.json")]
        config: PathBuf,
    },

    /// Validate the configuration and model bindings, then exit
    Check {
        /// Path to configuration file
        #[arg(long, default_value = "./opkernel.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
