//! Contribute command implementation
//!
//! Checks the prerequisites up front (a tracker in the workspace, an
//! installed and authenticated GitHub CLI), then drives the contribute
//! executor over every tracked repo that declares a fork. In dry-run mode
//! the would-be operations are printed and nothing is committed, pushed,
//! or opened on the forge.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Args;

use forge_sync::contribute::ContributeExecutor;
use forge_sync::forge::{ForgeClient, GhClient};
use forge_sync::output::{emoji, OutputConfig};
use forge_sync::tracker;

/// Arguments for the contribute command
#[derive(Args, Debug)]
pub struct ContributeArgs {
    /// Show what would be contributed without pushing or opening PRs
    #[arg(long)]
    pub dry_run: bool,

    /// Workspace root (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,
}

/// Execute the contribute command
pub fn execute(args: ContributeArgs, output: &OutputConfig) -> Result<()> {
    let start_time = Instant::now();
    let workspace = match args.workspace {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    if !tracker::exists(&workspace) {
        anyhow::bail!(
            "No tracker found at {}. Run an ingest first; contribute needs the \
             ledger to know which files belong to which repository.",
            tracker::tracker_path(&workspace).display()
        );
    }

    let forge = GhClient {
        dry_run: args.dry_run,
    };
    forge.ensure_ready().map_err(|e| anyhow::anyhow!("{}", e))?;

    println!("{} Forge Sync Contribute", emoji(output, "🚀", "[PUSH]"));
    if args.dry_run {
        println!(
            "{} DRY RUN MODE - No changes will be made",
            emoji(output, "🔎", "[DRY]")
        );
    }
    println!();

    let executor = ContributeExecutor::new(&workspace, &forge, args.dry_run);
    let outcomes = executor.run()?;

    println!();
    for outcome in &outcomes {
        let icon = if outcome.error.is_some() {
            emoji(output, "❌", "[FAIL]")
        } else {
            emoji(output, "✅", "[OK]")
        };
        println!("{} {}", icon, outcome);
    }

    let failures = outcomes.iter().filter(|o| o.error.is_some()).count();
    let duration = start_time.elapsed();
    println!();
    if failures == 0 {
        println!(
            "{} Contributed {} repo(s) in {:.2}s",
            emoji(output, "✅", "[OK]"),
            outcomes.len(),
            duration.as_secs_f64()
        );
        Ok(())
    } else {
        anyhow::bail!("{} of {} repo(s) failed to contribute", failures, outcomes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_without_tracker() {
        let temp = tempfile::TempDir::new().unwrap();
        let args = ContributeArgs {
            dry_run: true,
            workspace: Some(temp.path().to_path_buf()),
        };

        let result = execute(args, &OutputConfig::from_env_and_flag("never"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("No tracker found"));
    }
}
