//! ProfileSynth CLI: student-profile Q&A synthesis and store export.
//!
//! Turns profile documents held in a local document store into generated
//! question/answer training data, and dumps the store for inspection.

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
