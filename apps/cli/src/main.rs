//! fetch-canvas-staff: build-time Canvas staff sync.
//!
//! Pulls the course roster, writes instructors, TAs, and tutors to the site's
//! staff document, and appends newly seen instructors to the bio store.

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
