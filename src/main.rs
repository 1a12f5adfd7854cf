//! # Forge Sync CLI
//!
//! Binary entry point for the `forge-sync` command-line tool. Parses the
//! arguments with `clap` and dispatches; all engine logic lives in the
//! library crate.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
