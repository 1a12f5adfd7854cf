//! Ingest command implementation
//!
//! Parses the workflow file, then drives the ingest executor over every
//! sync task in it: resolve remote tips, stage snapshots, reconcile files
//! through the decision engine, confirm upstream deletions, and persist the
//! tracker. Repo failures are reported and do not stop the run; the command
//! exits non-zero when any repo failed.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Args;

use forge_sync::deletion::InteractivePrompt;
use forge_sync::fetch::GitFetcher;
use forge_sync::ingest::{IngestExecutor, RepoSummary};
use forge_sync::oracle::{self, MergeOracle};
use forge_sync::output::{emoji, OutputConfig};
use forge_sync::workflow;

/// Arguments for the ingest command
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Path to the workflow file
    #[arg(value_name = "WORKFLOW")]
    pub workflow: PathBuf,

    /// Workspace root (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,
}

/// Execute the ingest command
pub fn execute(args: IngestArgs, output: &OutputConfig) -> Result<()> {
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
        anyhow::bail!(
            "No sync tasks found in {}",
            args.workflow.display()
        );
    }

    println!("{} Forge Sync Ingest", emoji(output, "🔄", "[SYNC]"));
    println!();

    let mut all_summaries = Vec::new();
    for (index, task) in flow.tasks.iter().enumerate() {
        let settings = oracle::resolve_settings(task.merge.as_ref());
        let oracle_impl = oracle::from_settings(&settings);
        let oracle_ref: Option<&dyn MergeOracle> =
            oracle_impl.as_ref().map(|o| o as &dyn MergeOracle);

        let fetcher = GitFetcher;
        let prompt = InteractivePrompt;
        let executor = IngestExecutor::new(&workspace, &fetcher, oracle_ref, &prompt);

        println!("{} {}", emoji(output, "📦", "[TASK]"), task.label(index));
        let summaries = executor.run_task(task)?;
        for summary in &summaries {
            print_summary(summary, output);
        }
        all_summaries.extend(summaries);
    }

    let failed_repos: Vec<&RepoSummary> = all_summaries
        .iter()
        .filter(|s| s.error.is_some() || s.failed > 0)
        .collect();
    let duration = start_time.elapsed();

    println!();
    if failed_repos.is_empty() {
        println!(
            "{} Ingested {} repo(s) in {:.2}s",
            emoji(output, "✅", "[OK]"),
            all_summaries.len(),
            duration.as_secs_f64()
        );
        Ok(())
    } else {
        println!(
            "{} {} of {} repo(s) had failures",
            emoji(output, "❌", "[FAIL]"),
            failed_repos.len(),
            all_summaries.len()
        );
        anyhow::bail!("ingest completed with failures")
    }
}

fn print_summary(summary: &RepoSummary, output: &OutputConfig) {
    match &summary.error {
        Some(error) => {
            println!(
                "  {} {}: {}",
                emoji(output, "❌", "[FAIL]"),
                summary.repo,
                error
            );
        }
        None if summary.up_to_date => {
            println!(
                "  {} {}: up to date ({})",
                emoji(output, "✨", "[SKIP]"),
                summary.repo,
                summary
            );
        }
        None => {
            println!(
                "  {} {}: {}",
                emoji(output, "✅", "[OK]"),
                summary.repo,
                summary
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_missing_workflow() {
        let args = IngestArgs {
            workflow: PathBuf::from("/nonexistent/workflow.json"),
            workspace: None,
        };

        let result = execute(args, &OutputConfig::from_env_and_flag("never"));
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Workflow file not found"));
    }

    #[test]
    fn test_execute_workflow_without_sync_tasks() {
        let temp = tempfile::TempDir::new().unwrap();
        let workflow_path = temp.path().join("workflow.json");
        std::fs::write(
            &workflow_path,
            r#"{"tasks": [ {"type": "shell", "command": "true"} ]}"#,
        )
        .unwrap();

        let args = IngestArgs {
            workflow: workflow_path,
            workspace: Some(temp.path().to_path_buf()),
        };

        let result = execute(args, &OutputConfig::from_env_and_flag("never"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("No sync tasks"));
    }
}
