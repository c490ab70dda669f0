//! Bergelmir - Gemini capsule server
//!
//! Serves a directory of gemtext over Gemini with a self-signed TLS
//! certificate, optionally published as a Tor onion service and mirrored
//! over HTTP.
//!
//! # Usage
//!
//! ```bash
//! # Scaffold a project in the current directory
//! bergelmir init --tor --domain example.org --http
//!
//! # Serve it
//! bergelmir run
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use bergelmir::cli::{self, Cli, Commands};
use bergelmir::{config, logging, scheduler};
use clap::Parser;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match &cli.command {
        Some(Commands::Init(args)) => {
            cli::run_init(&cli.config, args)?;
        },
        Some(Commands::Run) | None => {
            run_server(&cli).await?;
        },
    }

    Ok(())
}

/// Load configuration and serve until interrupted
async fn run_server(cli: &Cli) -> Result<()> {
    info!("Bergelmir v{} starting", bergelmir::VERSION);

    let config = config::load_from_path(&cli.config)?;
    scheduler::run(config).await
}
