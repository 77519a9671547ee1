//! Standalone index server binary

use anyhow::Result;
use clap::{Parser, Subcommand};
use registry_index::{run_server, Config};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "index-server")]
#[command(about = "Standalone v1 registry index with search and mirroring")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file; built-in defaults are used when it is missing
    #[arg(long, default_value = "index.json", global = true)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the index server
    Start {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for the local storage backend
        #[arg(long)]
        data: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Start { host, port, data } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(data) = data {
                config.storage.data_dir = data;
            }
            run_server(config).await
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
