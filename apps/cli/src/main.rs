//! aulabot CLI: ask questions about school records in Spanish.
//!
//! Answers come from the school administration REST API or from a local
//! SQL database, depending on the configured backend.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
