//! # Fork Plumbing and PR Lifecycle
//!
//! The contribute side pushes through a fork: clone the fork into a
//! disposable directory, refresh it from the source repository, apply the
//! local changes on a dedicated branch, push, and open (or update) a pull
//! request on the source repo via the GitHub CLI.
//!
//! Two seams live here. [`ForkClone`] wraps the git plumbing on the cloned
//! fork; its temp directory is removed on drop from any exit path.
//! [`ForgeClient`] wraps the `gh` invocations (auth check, PR status, PR
//! creation) as a trait so the contribute executor can run against a mock.
//!
//! Every mutating operation honors dry-run by logging the intended action
//! and doing nothing.

use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Deserialize;
use tempfile::TempDir;

use crate::error::{Error, Result};
use crate::fetch::remote_url;
use crate::tracker::{PullRequestState, PullRequestStatus};

/// Branch name for a fresh contribution, datestamped for operator
/// recognizability.
pub fn datestamped_branch(now: DateTime<Utc>) -> String {
    format!("sync/contribute-{}", now.format("%Y%m%d-%H%M%S"))
}

/// Head ref for a PR: plain branch when contributing from the source repo
/// itself, `owner:branch` when contributing from a fork.
pub fn head_ref(source_repo: &str, fork_repo: &str, branch: &str) -> String {
    if source_repo == fork_repo {
        return branch.to_string();
    }
    match fork_repo.split('/').next() {
        Some(owner) => format!("{}:{}", owner, branch),
        None => branch.to_string(),
    }
}

fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    debug!("git {} (in {})", args.join(" "), dir.display());
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| Error::GitCommand {
            context: dir.display().to_string(),
            command: args.join(" "),
            stderr: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(Error::GitCommand {
            context: dir.display().to_string(),
            command: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// A working clone of the fork repository in a disposable directory.
pub struct ForkClone {
    root: PathBuf,
    fork_repo: String,
    dry_run: bool,
    _cleanup: TempDir,
}

impl ForkClone {
    /// Clone `fork_repo` into a fresh temp directory. The clone itself is
    /// read-only with respect to the remotes, so it also runs in dry-run
    /// mode (contribute needs it to enumerate fork-side deletions).
    pub fn create(fork_repo: &str, dry_run: bool) -> Result<Self> {
        let dir = TempDir::new()?;
        let url = remote_url(fork_repo);

        info!("cloning fork {} for contribution", fork_repo);
        let output = Command::new("git")
            .args(["clone", &url])
            .arg(dir.path())
            .output()
            .map_err(|e| Error::GitClone {
                repo: fork_repo.to_string(),
                branch: String::new(),
                message: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(Error::GitClone {
                repo: fork_repo.to_string(),
                branch: String::new(),
                message: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        Ok(Self {
            root: dir.path().to_path_buf(),
            fork_repo: fork_repo.to_string(),
            dry_run,
            _cleanup: dir,
        })
    }

    /// Root of the working tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Default branch of the fork, from the origin HEAD symref.
    pub fn default_branch(&self) -> Result<String> {
        let symref = run_git(
            &self.root,
            &["symbolic-ref", "--short", "refs/remotes/origin/HEAD"],
        )?;
        Ok(symref
            .strip_prefix("origin/")
            .unwrap_or(symref.as_str())
            .to_string())
    }

    /// Bring the fork's default branch up to date with the source repo:
    /// fetch the source as an auxiliary remote, merge its default branch,
    /// push the refreshed default back to the fork.
    ///
    /// Callers treat a failure here as a warning; contributing on top of a
    /// slightly stale fork still produces a usable PR.
    pub fn sync_with_source(&self, source_repo: &str) -> Result<()> {
        let default = self.default_branch()?;
        let url = remote_url(source_repo);

        // The remote may survive from an earlier attempt in this clone.
        let _ = run_git(&self.root, &["remote", "remove", "upstream"]);
        run_git(&self.root, &["remote", "add", "upstream", &url])?;
        run_git(&self.root, &["fetch", "upstream"])?;
        run_git(&self.root, &["checkout", &default])?;
        run_git(&self.root, &["merge", &format!("upstream/{}", default)])?;

        if self.dry_run {
            info!("[dry-run] would push refreshed {} to {}", default, self.fork_repo);
            return Ok(());
        }
        run_git(&self.root, &["push", "origin", &default])?;
        Ok(())
    }

    /// Check out the working branch. When `reuse` is set the branch carries
    /// an open PR: it is checked out (locally or from the remote) and the
    /// default branch is merged in so the update builds on the latest base.
    /// Otherwise a fresh branch is created from the default.
    pub fn ensure_branch(&self, branch: &str, reuse: bool) -> Result<()> {
        let default = self.default_branch()?;

        if reuse {
            if run_git(&self.root, &["checkout", branch]).is_err() {
                run_git(
                    &self.root,
                    &["checkout", "-b", branch, &format!("origin/{}", branch)],
                )?;
            }
            if let Err(e) = run_git(&self.root, &["merge", &default]) {
                warn!("merging {} into {} failed: {}", default, branch, e);
            }
            return Ok(());
        }

        run_git(&self.root, &["checkout", &default])?;
        run_git(&self.root, &["checkout", "-b", branch])?;
        Ok(())
    }

    /// Stage everything (including deletions) and commit. Returns false
    /// without committing when the working tree is clean.
    pub fn commit_all(&self, message: &str) -> Result<bool> {
        if self.dry_run {
            info!("[dry-run] would commit staged changes: {}", message);
            return Ok(true);
        }

        run_git(&self.root, &["add", "-A"])?;
        let status = run_git(&self.root, &["status", "--porcelain"])?;
        if status.is_empty() {
            return Ok(false);
        }
        run_git(&self.root, &["commit", "-m", message])?;
        Ok(true)
    }

    /// Push the branch to the fork. Updates of an existing PR force-push;
    /// a failed regular push is retried once as a force push.
    pub fn push(&self, branch: &str, force: bool) -> Result<()> {
        if self.dry_run {
            info!(
                "[dry-run] would push {} to {}{}",
                branch,
                self.fork_repo,
                if force { " (force)" } else { "" }
            );
            return Ok(());
        }

        if force {
            run_git(&self.root, &["push", "--force", "origin", branch])?;
            return Ok(());
        }

        if let Err(first) = run_git(&self.root, &["push", "origin", branch]) {
            warn!("push of {} rejected ({}); retrying with force", branch, first);
            run_git(&self.root, &["push", "--force", "origin", branch])?;
        }
        Ok(())
    }
}

/// Forge-side operations the contribute executor needs.
pub trait ForgeClient {
    /// Verify the forge CLI is installed and authenticated.
    fn ensure_ready(&self) -> Result<()>;

    /// Current state of a PR on `source_repo`, or `None` when it cannot be
    /// found.
    fn pr_status(&self, source_repo: &str, number: u64) -> Result<Option<PullRequestState>>;

    /// Open a PR; returns (number, url). When a PR for the same head is
    /// already open, returns that one instead of failing.
    fn create_pr(
        &self,
        source_repo: &str,
        head: &str,
        title: &str,
        body: &str,
    ) -> Result<(u64, String)>;
}

/// `gh`-backed forge client.
pub struct GhClient {
    pub dry_run: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhPrView {
    number: u64,
    state: String,
    head_ref_name: String,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GhPrListEntry {
    number: u64,
    url: String,
}

fn run_gh(args: &[&str]) -> Result<String> {
    debug!("gh {}", args.join(" "));
    let output = Command::new("gh")
        .args(args)
        .output()
        .map_err(|e| Error::Forge {
            message: format!("failed to run gh: {}", e),
        })?;

    if !output.status.success() {
        return Err(Error::Forge {
            message: format!(
                "gh {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

impl GhClient {
    fn find_open_pr_by_head(&self, source_repo: &str, head: &str) -> Result<Option<(u64, String)>> {
        let raw = run_gh(&[
            "pr",
            "list",
            "--repo",
            source_repo,
            "--head",
            head,
            "--state",
            "open",
            "--json",
            "number,url",
        ])?;
        let entries: Vec<GhPrListEntry> = serde_json::from_str(&raw)?;
        Ok(entries.into_iter().next().map(|e| (e.number, e.url)))
    }
}

impl ForgeClient for GhClient {
    fn ensure_ready(&self) -> Result<()> {
        if Command::new("gh").arg("--version").output().is_err() {
            return Err(Error::Forge {
                message: "GitHub CLI (gh) not found on PATH; install it from \
                          https://cli.github.com/"
                    .to_string(),
            });
        }

        let status = Command::new("gh")
            .args(["auth", "status"])
            .output()
            .map_err(|e| Error::Forge {
                message: format!("failed to run gh auth status: {}", e),
            })?;
        if !status.status.success() {
            return Err(Error::Forge {
                message: "GitHub CLI is not authenticated; run 'gh auth login' first".to_string(),
            });
        }
        Ok(())
    }

    fn pr_status(&self, source_repo: &str, number: u64) -> Result<Option<PullRequestState>> {
        let raw = match run_gh(&[
            "pr",
            "view",
            &number.to_string(),
            "--repo",
            source_repo,
            "--json",
            "number,state,headRefName,updatedAt",
        ]) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("pr {} on {} not retrievable: {}", number, source_repo, e);
                return Ok(None);
            }
        };

        let view: GhPrView = serde_json::from_str(&raw)?;
        let status = match view.state.to_uppercase().as_str() {
            "OPEN" => PullRequestStatus::Open,
            "MERGED" => PullRequestStatus::Merged,
            _ => PullRequestStatus::Closed,
        };

        Ok(Some(PullRequestState {
            pr_number: view.number,
            branch_name: view.head_ref_name,
            status,
            last_updated: view.updated_at.unwrap_or_else(Utc::now),
        }))
    }

    fn create_pr(
        &self,
        source_repo: &str,
        head: &str,
        title: &str,
        body: &str,
    ) -> Result<(u64, String)> {
        if self.dry_run {
            info!(
                "[dry-run] would open PR on {} from {}: {}",
                source_repo, head, title
            );
            return Ok((0, String::new()));
        }

        let created = run_gh(&[
            "pr",
            "create",
            "--repo",
            source_repo,
            "--head",
            head,
            "--title",
            title,
            "--body",
            body,
        ]);

        match created {
            Ok(stdout) => {
                // gh prints the PR URL; the trailing segment is the number.
                let url = stdout
                    .lines()
                    .rev()
                    .find(|line| line.contains("/pull/"))
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                let number = url
                    .rsplit('/')
                    .next()
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(0);
                Ok((number, url))
            }
            Err(create_err) => {
                // A PR for this head may already exist; reuse it.
                if let Some(existing) = self.find_open_pr_by_head(source_repo, head)? {
                    info!(
                        "PR already open for {} on {} (#{})",
                        head, source_repo, existing.0
                    );
                    return Ok(existing);
                }
                Err(create_err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_datestamped_branch_format() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(datestamped_branch(now), "sync/contribute-20260102-030405");
    }

    #[test]
    fn test_head_ref_fork_vs_same_repo() {
        assert_eq!(
            head_ref("octo/repo1", "me/repo1-fork", "sync/x"),
            "me:sync/x"
        );
        assert_eq!(head_ref("octo/repo1", "octo/repo1", "sync/x"), "sync/x");
    }

    #[test]
    fn test_pr_view_parsing() {
        let raw = r#"{
            "number": 42,
            "state": "OPEN",
            "headRefName": "sync/contribute-20260101-000000",
            "updatedAt": "2026-01-01T10:00:00Z"
        }"#;
        let view: GhPrView = serde_json::from_str(raw).unwrap();
        assert_eq!(view.number, 42);
        assert_eq!(view.state, "OPEN");
        assert_eq!(view.head_ref_name, "sync/contribute-20260101-000000");
        assert!(view.updated_at.is_some());
    }
}
