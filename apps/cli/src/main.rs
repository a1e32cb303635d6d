//! RanoPress CLI — web novel to EPUB converter.
//!
//! Downloads a book chapter by chapter into a local record, then packages
//! it as a single EPUB with cover, title page and per-volume sections.

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
