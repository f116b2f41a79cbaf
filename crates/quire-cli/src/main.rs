// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use quire_cli::commands::{self, ServeArgs};
use quire_cli::config::{AdapterKind, Config, CONFIG_FILE};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quire")]
#[command(author = "Maravilla Labs")]
#[command(version)]
#[command(about = "Build-and-serve with on-demand pages and live reload", long_about = None)]
struct Cli {
    /// Log level: error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Path to the configuration file
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start development server with live reload
    Dev {
        /// Port to run the dev server on (default: server.port)
        #[arg(short, long)]
        port: Option<u16>,
        /// Host to bind to (default: server.host)
        #[arg(long)]
        host: Option<String>,
        /// HTTP engine: native, axum
        #[arg(short, long)]
        adapter: Option<AdapterKind>,
    },
    /// Serve pages in production mode (no live reload)
    Serve {
        /// Port to run the server on (default: server.port)
        #[arg(short, long)]
        port: Option<u16>,
        /// Host to bind to (default: server.host)
        #[arg(long)]
        host: Option<String>,
        /// HTTP engine: native, axum
        #[arg(short, long)]
        adapter: Option<AdapterKind>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with the specified log level
    let filter = EnvFilter::try_new(&cli.log_level)
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    let config = Config::load_from(&cli.config)?;

    match cli.command {
        Commands::Dev { port, host, adapter } => {
            commands::dev::run(config, ServeArgs { host, port, adapter }).await
        }
        Commands::Serve { port, host, adapter } => {
            commands::serve::run(config, ServeArgs { host, port, adapter }).await
        }
    }
}
