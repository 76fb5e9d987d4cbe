//! CLI command implementations
//!
//! Each command loads the configuration file, binds its models on an
//! in-memory database and then either serves, prints or exits.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use super::args::Command;
use super::errors::{CliError, CliResult};
use crate::api::{Api, ApiBuilder};
use crate::config::AppConfig;
use crate::core::OperationRegistry;
use crate::http_server::{routes, HttpServer};
use crate::logging;
use crate::storage::InMemoryDatabase;

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config, port } => serve(&config, port),
        Command::Ops { config } => ops(&config, &mut io::stdout().lock()),
        Command::Check { config } => check(&config, &mut io::stdout().lock()),
    }
}

/// Bind every configured model and check its routes mount cleanly
pub fn build_api(config: &AppConfig) -> CliResult<Api> {
    let builder = ApiBuilder::from_models(
        Arc::new(InMemoryDatabase::new()),
        config.models.iter().cloned(),
    )?;

    routes::check_routes(builder.operations(), &config.server.rpc_path)?;
    Ok(builder.build())
}

/// Start the HTTP server
pub fn serve(config_path: &Path, port: Option<u16>) -> CliResult<()> {
    let mut config = AppConfig::load(config_path)?;
    if let Some(port) = port {
        config.server.port = port;
    }
    logging::init(&config.logging)?;

    let api = build_api(&config)?;
    info!(
        models = api.operations().models().len(),
        operations = api.operations().operations().len(),
        "models bound"
    );
    let server = HttpServer::with_config(&api, config.server.clone());

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::BootFailed(format!("Failed to create tokio runtime: {e}")))?;

    rt.block_on(async {
        server
            .start()
            .await
            .map_err(|e| CliError::BootFailed(format!("HTTP server failed: {e}")))
    })
}

/// Print the RPC and REST operation tables
pub fn ops(config_path: &Path, out: &mut impl Write) -> CliResult<()> {
    let config = AppConfig::load(config_path)?;
    let api = build_api(&config)?;
    write_operations(api.operations(), &config.server.rpc_path, out)?;
    Ok(())
}

/// Validate configuration and bindings
pub fn check(config_path: &Path, out: &mut impl Write) -> CliResult<()> {
    let config = AppConfig::load(config_path)?;
    let api = build_api(&config)?;
    writeln!(
        out,
        "ok: {} models, {} operations, {} routes",
        api.operations().models().len(),
        api.operations().operations().len(),
        api.operations().rest_routes().len()
    )?;
    Ok(())
}

fn write_operations(
    ops: &OperationRegistry,
    rpc_path: &str,
    out: &mut impl Write,
) -> io::Result<()> {
    writeln!(out, "RPC (POST {rpc_path})")?;
    for method in ops.rpc_methods() {
        writeln!(out, "  {method}")?;
    }

    writeln!(out)?;
    writeln!(out, "REST")?;
    for route in ops.rest_routes() {
        writeln!(
            out,
            "  {:<7} {:<40} {}",
            route.method,
            route.path,
            route.spec.rpc_method()
        )?;
    }
    Ok(())
}
