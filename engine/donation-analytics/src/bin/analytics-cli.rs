//! # Analytics CLI Binary
//!
//! Command-line interface for computing donation dashboard payloads.

use anyhow::Result;
use clap::Parser;
use donation_analytics::cli::{Cli, CliHandler};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout carries the JSON payload, so logs go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let handler = CliHandler::new(cli.config.as_ref())?;
    handler.handle_command(cli.command).await?;

    Ok(())
}
