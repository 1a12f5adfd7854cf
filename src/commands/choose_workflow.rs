//! Choose-workflow command implementation
//!
//! Interactive variant of `ingest`: parses the workflow file, lets the
//! operator pick a subset of its sync tasks with a multi-select prompt,
//! then runs the chosen tasks exactly as `ingest` would. Non-interactive
//! runs fall back to all tasks.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Args;
use dialoguer::{theme::ColorfulTheme, MultiSelect};

use forge_sync::deletion::InteractivePrompt;
use forge_sync::fetch::GitFetcher;
use forge_sync::ingest::IngestExecutor;
use forge_sync::oracle::{self, MergeOracle};
use forge_sync::output::{emoji, OutputConfig};
use forge_sync::workflow::{self, SyncTask};

/// Arguments for the choose-workflow command
#[derive(Args, Debug)]
pub struct ChooseWorkflowArgs {
    /// Path to the workflow file
    #[arg(value_name = "WORKFLOW")]
    pub workflow: PathBuf,

    /// Workspace root (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,
}

/// Execute the choose-workflow command
pub fn execute(args: ChooseWorkflowArgs, output: &OutputConfig) -> Result<()> {
    let start_time = Instant::now();

    if !args.workflow.exists() {
        anyhow::bail!("Workflow file not found: {}", args.workflow.display());
    }
    let workspace = match args.workspace {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    let flow = workflow::from_file(&args.workflow)?;
    if flow.tasks.is_empty() {
        anyhow::bail!("No sync tasks found in {}", args.workflow.display());
    }

    let chosen = select_tasks(&flow.tasks)?;
    if chosen.is_empty() {
        println!("{} Nothing selected; exiting", emoji(output, "✨", "[SKIP]"));
        return Ok(());
    }

    println!("{} Forge Sync Ingest", emoji(output, "🔄", "[SYNC]"));
    println!();

    let mut failed = 0usize;
    let mut total = 0usize;
    for (index, task) in chosen {
        let settings = oracle::resolve_settings(task.merge.as_ref());
        let oracle_impl = oracle::from_settings(&settings);
        let oracle_ref: Option<&dyn MergeOracle> =
            oracle_impl.as_ref().map(|o| o as &dyn MergeOracle);

        let fetcher = GitFetcher;
        let prompt = InteractivePrompt;
        let executor = IngestExecutor::new(&workspace, &fetcher, oracle_ref, &prompt);

        println!("{} {}", emoji(output, "📦", "[TASK]"), task.label(index));
        for summary in executor.run_task(task)? {
            total += 1;
            if summary.error.is_some() || summary.failed > 0 {
                failed += 1;
                println!(
                    "  {} {}: {}",
                    emoji(output, "❌", "[FAIL]"),
                    summary.repo,
                    summary.error.clone().unwrap_or_else(|| summary.to_string())
                );
            } else {
                println!(
                    "  {} {}: {}",
                    emoji(output, "✅", "[OK]"),
                    summary.repo,
                    summary
                );
            }
        }
    }

    println!();
    if failed == 0 {
        println!(
            "{} Ingested {} repo(s) in {:.2}s",
            emoji(output, "✅", "[OK]"),
            total,
            start_time.elapsed().as_secs_f64()
        );
        Ok(())
    } else {
        anyhow::bail!("{} of {} repo(s) had failures", failed, total)
    }
}

/// Let the operator pick tasks; every task runs when no terminal is
/// attending.
fn select_tasks(tasks: &[SyncTask]) -> Result<Vec<(usize, &SyncTask)>> {
    if !console::Term::stdout().features().is_attended() {
        return Ok(tasks.iter().enumerate().collect());
    }

    let labels: Vec<String> = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| t.label(i))
        .collect();
    let picked = MultiSelect::with_theme(&ColorfulTheme::default())
        .with_prompt("Select tasks to run")
        .items(&labels)
        .interact()?;

    Ok(picked
        .into_iter()
        .filter_map(|i| tasks.get(i).map(|t| (i, t)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_missing_workflow() {
        let args = ChooseWorkflowArgs {
            workflow: PathBuf::from("/nonexistent/workflow.json"),
            workspace: None,
        };

        let result = execute(args, &OutputConfig::from_env_and_flag("never"));
        assert!(result.is_err());
    }
}
