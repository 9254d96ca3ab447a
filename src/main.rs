//! `expressive` demo server.
//!
//! ```text
//! expressive serve [--config FILE]   compile the demo tree and serve it
//! expressive routes                  print the flattened route table as JSON
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use expressive::config::{load_config, AppConfig};
use expressive::demo::{self, UserStore};
use expressive::lifecycle::{signals, Shutdown};
use expressive::observability::{logging, metrics};
use expressive::HttpServer;

#[derive(Parser)]
#[command(name = "expressive")]
#[command(about = "Declarative route trees served with axum", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the demo application
    Serve {
        /// TOML configuration file; defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the demo route table
    Routes,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            let config = match config {
                Some(path) => load_config(&path)?,
                None => AppConfig::default(),
            };
            serve(config).await
        }
        Commands::Routes => {
            let routes = demo::tree(UserStore::default()).routes_info();
            println!("{}", serde_json::to_string_pretty(&routes)?);
            Ok(())
        }
    }
}

async fn serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "expressive starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let bind_address = config.listener.bind_address.clone();
    let server = HttpServer::new(config, demo::tree(UserStore::default()), demo::options())?;

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(&shutdown);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
