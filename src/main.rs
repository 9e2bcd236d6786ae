//! JSON gateway binary.
//!
//! Loads configuration (defaults, optional TOML file, environment), installs
//! logging and the uncaught-failure policy, then serves until a termination
//! signal has been handled.
//!
//! Exit codes: `0` after a clean drain, `1` on startup failure, an expired
//! grace period, or an uncaught failure in production.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use json_gateway::config;
use json_gateway::lifecycle::{self, install_panic_hook, StartupError, UncaughtPolicy};
use json_gateway::observability::init_logging;

#[derive(Parser, Debug)]
#[command(name = "json-gateway", version)]
#[command(about = "Request-lifecycle gateway for large JSON payloads", long_about = None)]
struct Cli {
    /// TOML configuration file; environment variables override its values.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration, print the effective values and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("json-gateway: {error}");
            return ExitCode::FAILURE;
        }
    };

    if cli.check {
        return match toml::to_string_pretty(&config) {
            Ok(rendered) => {
                println!("{rendered}");
                ExitCode::SUCCESS
            }
            Err(error) => {
                eprintln!("json-gateway: failed to render configuration: {error}");
                ExitCode::FAILURE
            }
        };
    }

    if let Err(error) = init_logging(&config) {
        eprintln!("json-gateway: failed to initialise logging: {error}");
        return ExitCode::FAILURE;
    }
    install_panic_hook(UncaughtPolicy::from_config(&config));

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "json-gateway starting");

    match lifecycle::run(config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(StartupError::Shutdown(error)) => {
            tracing::error!(%error, "Forced shutdown");
            ExitCode::FAILURE
        }
        Err(error) => {
            tracing::error!(%error, "Gateway failed");
            ExitCode::FAILURE
        }
    }
}
