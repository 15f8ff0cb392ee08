//! genesis-cache - command-line access to the agent cache
//!
//! Reads the same environment variables as the library and lets flags
//! override them for a single invocation.

mod cli;
mod error;

use crate::cli::{Cli, Outcome};
use crate::error::Result;
use clap::Parser;
use genesis_cache::Cache;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(Outcome::Done) => ExitCode::SUCCESS,
        Ok(Outcome::Miss) => {
            eprintln!("Key not found");
            ExitCode::from(1)
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<Outcome> {
    init_logging()?;

    let config = cli.config()?;
    debug!(?config, "Resolved cache configuration");

    let cache = Cache::open(&config).await?;
    cli.command.execute(&cache, &mut std::io::stdout().lock()).await
}

fn init_logging() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    let env_filter = EnvFilter::from_default_env().add_directive("genesis_cache=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}
