//! Payslip assistant CLI.
//!
//! Indexes structured payslips into a local store and answers questions,
//! comparisons and lookups over them.

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
