//! CLI for http2broker
//!
//! Subcommands:
//! - `server`: run the HTTP gateway (default)
//! - `backends`: list the configured backends and exit

use std::sync::Arc;

use clap::Parser;
use http2broker::config::{Settings, load_config_from};
use http2broker::controller::Gateway;
use http2broker::transport::start_http_server;
use http2broker::utils::logging;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "http2broker")]
struct Cli {
    /// Base name of the configuration file (extension optional)
    #[arg(long, default_value = "config/default")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Start the HTTP gateway
    Server,
    /// Print the configured backends
    Backends,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let settings = match load_config_from(&cli.config) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    logging::init(&settings.server.log_level);

    match cli.command.unwrap_or(Command::Server) {
        Command::Server => {
            if let Err(e) = run_server(settings).await {
                error!("Server failed: {}", e);
                std::process::exit(1);
            }
        }
        Command::Backends => list_backends(&settings),
    }
}

async fn run_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let gateway = Arc::new(Gateway::from_settings(&settings));
    if gateway.backends().next().is_none() {
        info!("no backends configured; every request will be answered with 404");
    }

    tokio::select! {
        result = start_http_server(&settings, gateway) => {
            result?;
            error!("HTTP server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}

fn list_backends(settings: &Settings) {
    for (name, backend) in &settings.backends {
        println!("{}\t{}", name, backend.kind);
    }
}
