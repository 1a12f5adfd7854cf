//! # Remote Repository Fetching and Staging
//!
//! Ingest never works against a live clone: it resolves the remote tip with
//! `git ls-remote` and, when a pass is warranted, materializes a shallow
//! snapshot of the branch into a disposable staging directory. The staging
//! directory is owned by a [`StagedRepo`] whose drop removes it on every
//! exit path, and the `.git` metadata is stripped so it can never leak into
//! content comparisons.
//!
//! [`RepoFetcher`] is a trait so the executors can be driven in tests by a
//! fetcher that stages from fixtures instead of the network.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;
use tempfile::TempDir;

use crate::error::{Error, Result};

/// A snapshot of one repository branch at a specific commit.
///
/// Owns its staging directory: dropping the value deletes the snapshot.
pub struct StagedRepo {
    root: PathBuf,
    /// Commit the snapshot was taken at.
    pub commit: String,
    _cleanup: Option<TempDir>,
}

impl StagedRepo {
    /// Snapshot backed by a temp directory that is removed on drop.
    pub fn owned(dir: TempDir, commit: String) -> Self {
        Self {
            root: dir.path().to_path_buf(),
            commit,
            _cleanup: Some(dir),
        }
    }

    /// Snapshot backed by a caller-managed directory (used by test
    /// fetchers staging from fixtures).
    pub fn external(root: PathBuf, commit: String) -> Self {
        Self {
            root,
            commit,
            _cleanup: None,
        }
    }

    /// Root of the snapshot; `root().join(source_path)` is the content of
    /// `source_path` at `commit`.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Resolves remote tips and materializes snapshots.
pub trait RepoFetcher {
    /// Tip commit of `branch` on `repo`, without cloning.
    fn tip_commit(&self, repo: &str, branch: &str) -> Result<String>;

    /// Materialize the current tip of `branch` into a staging directory.
    fn stage(&self, repo: &str, branch: &str) -> Result<StagedRepo>;
}

/// Default fetcher shelling out to `git` against the GitHub remote.
pub struct GitFetcher;

/// HTTPS remote URL for an `owner/repo` full name.
pub fn remote_url(repo: &str) -> String {
    format!("https://github.com/{}.git", repo)
}

impl RepoFetcher for GitFetcher {
    fn tip_commit(&self, repo: &str, branch: &str) -> Result<String> {
        let url = remote_url(repo);
        let output = Command::new("git")
            .args(["ls-remote", &url, &format!("refs/heads/{}", branch)])
            .output()
            .map_err(|e| Error::GitCommand {
                context: repo.to_string(),
                command: "ls-remote".to_string(),
                stderr: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(Error::GitCommand {
                context: repo.to_string(),
                command: "ls-remote".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        // Output format: "<hash>\t<ref>", one line per matching ref.
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .find_map(|line| line.split('\t').next())
            .filter(|hash| !hash.is_empty())
            .map(|hash| hash.to_string())
            .ok_or_else(|| Error::RefNotFound {
                repo: repo.to_string(),
                branch: branch.to_string(),
            })
    }

    fn stage(&self, repo: &str, branch: &str) -> Result<StagedRepo> {
        let url = remote_url(repo);
        let dir = TempDir::new()?;

        debug!("staging {}@{} into {}", repo, branch, dir.path().display());
        let output = Command::new("git")
            .args(["clone", "--depth=1", "--branch", branch, &url])
            .arg(dir.path())
            .output()
            .map_err(|e| Error::GitClone {
                repo: repo.to_string(),
                branch: branch.to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(Error::GitClone {
                repo: repo.to_string(),
                branch: branch.to_string(),
                message: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let commit = head_commit(dir.path(), repo)?;

        // Strip version-control metadata so it cannot show up in walks or
        // hash comparisons.
        let git_dir = dir.path().join(".git");
        if git_dir.exists() {
            fs::remove_dir_all(&git_dir)?;
        }

        Ok(StagedRepo::owned(dir, commit))
    }
}

fn head_commit(clone_dir: &Path, repo: &str) -> Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(clone_dir)
        .output()
        .map_err(|e| Error::GitCommand {
            context: repo.to_string(),
            command: "rev-parse HEAD".to_string(),
            stderr: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(Error::GitCommand {
            context: repo.to_string(),
            command: "rev-parse HEAD".to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
