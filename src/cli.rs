//! # CLI Argument Parsing and Command Dispatch
//!
//! Defines the command-line interface for the `forge-sync` tool using
//! `clap`: the top-level structure with global `--color` and logging flags,
//! the subcommands, and dispatch into their implementations under
//! `src/commands/`.

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use log::LevelFilter;

use crate::commands;

/// Forge Sync - Synchronize GitHub repositories with a local workspace
#[derive(Parser, Debug)]
#[command(name = "forge-sync")]
#[command(
    version,
    about,
    long_about = "Forge Sync - Pull repository subtrees into a local workspace and \
                  contribute local changes back through forks and pull requests"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    /// Increase output verbosity (can be repeated)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Suppress output except errors
    #[arg(long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest repositories declared in a workflow file into the workspace
    Ingest(commands::ingest::IngestArgs),

    /// Contribute local changes back to the source repositories via forks
    Contribute(commands::contribute::ContributeArgs),

    /// Interactively pick which tasks of a workflow file to run
    ChooseWorkflow(commands::choose_workflow::ChooseWorkflowArgs),
}

impl Cli {
    /// Execute the parsed CLI command
    pub fn execute(self) -> Result<()> {
        self.init_logger()?;
        let output = forge_sync::output::OutputConfig::from_env_and_flag(&self.color);

        match self.command {
            Commands::Ingest(args) => commands::ingest::execute(args, &output),
            Commands::Contribute(args) => commands::contribute::execute(args, &output),
            Commands::ChooseWorkflow(args) => commands::choose_workflow::execute(args, &output),
        }
    }

    fn init_logger(&self) -> Result<()> {
        let log_level = self.parse_log_level()?;

        env_logger::Builder::from_default_env()
            .filter_level(log_level)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

        Ok(())
    }

    /// Resolve the log level: --quiet wins, then --verbose, then --log-level.
    fn parse_log_level(&self) -> Result<LevelFilter> {
        if self.quiet {
            return Ok(LevelFilter::Error);
        }

        if self.verbose > 0 {
            return Ok(match self.verbose {
                1 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            });
        }

        match self.log_level.to_lowercase().as_str() {
            "error" => Ok(LevelFilter::Error),
            "warn" => Ok(LevelFilter::Warn),
            "info" => Ok(LevelFilter::Info),
            "debug" => Ok(LevelFilter::Debug),
            "trace" => Ok(LevelFilter::Trace),
            "off" => Ok(LevelFilter::Off),
            _ => Err(anyhow::anyhow!(
                "Invalid log level: '{}'. Valid options are: error, warn, info, debug, trace, off",
                self.log_level
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn cli_with(log_level: &str, verbose: u8, quiet: bool) -> Cli {
        Cli {
            command: Commands::Ingest(commands::ingest::IngestArgs {
                workflow: PathBuf::from("workflow.json"),
                workspace: None,
            }),
            color: "auto".to_string(),
            log_level: log_level.to_string(),
            verbose,
            quiet,
        }
    }

    #[test]
    fn test_parse_log_level_default() {
        assert_eq!(
            cli_with("warn", 0, false).parse_log_level().unwrap(),
            LevelFilter::Warn
        );
    }

    #[test]
    fn test_verbose_overrides_log_level() {
        assert_eq!(
            cli_with("info", 1, false).parse_log_level().unwrap(),
            LevelFilter::Debug
        );
        assert_eq!(
            cli_with("info", 2, false).parse_log_level().unwrap(),
            LevelFilter::Trace
        );
    }

    #[test]
    fn test_quiet_overrides_everything() {
        assert_eq!(
            cli_with("trace", 0, true).parse_log_level().unwrap(),
            LevelFilter::Error
        );
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        assert!(cli_with("loud", 0, false).parse_log_level().is_err());
    }
}
