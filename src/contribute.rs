//! # Contribute Executor
//!
//! The inverse of ingest: for every repo the tracker records a fork for,
//! enumerate the local files under each declared mapping, mirror them into
//! a working clone of the fork on a dedicated branch, and open or update a
//! pull request against the source repository.
//!
//! Deletions are mirrored too, but only within the tracker's blast radius:
//! a file in the fork is deleted only when its corresponding local path is
//! both gone *and* recorded in the tracker. Engine artifacts (the tracker
//! file itself, merge backups) never leave the workspace.
//!
//! Dry-run prints the would-be operations as relative path pairs and stops
//! before any commit, push, or PR call. All failures are repo-scoped; other
//! repos proceed.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::forge::{datestamped_branch, head_ref, ForgeClient, ForkClone};
use crate::tracker::{
    self, PullRequestState, PullRequestStatus, RepoState, TRACKER_FILE,
};
use crate::walker::{relative_string, OpKind, SyncOp};

/// Commit message used for every contribution commit.
pub const COMMIT_MESSAGE: &str = "feat: contribute changes from local to source";

/// Result of contributing one repo.
#[derive(Debug, Default, Clone)]
pub struct ContributeOutcome {
    pub repo: String,
    pub copied: usize,
    pub deleted: usize,
    /// URL of the PR created or updated.
    pub pr_url: Option<String>,
    /// Why nothing was pushed, when nothing was.
    pub skipped: Option<String>,
    pub error: Option<String>,
}

impl fmt::Display for ContributeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(error) = &self.error {
            return write!(f, "{}: failed: {}", self.repo, error);
        }
        if let Some(reason) = &self.skipped {
            return write!(f, "{}: {}", self.repo, reason);
        }
        write!(
            f,
            "{}: {} copied, {} deleted{}",
            self.repo,
            self.copied,
            self.deleted,
            match &self.pr_url {
                Some(url) => format!(" -> {}", url),
                None => String::new(),
            }
        )
    }
}

/// Enumerate the operations that would mirror the workspace into the fork
/// clone for one repo: a copy per local file under each mapping, and a
/// delete per fork file whose tracked local counterpart is gone.
pub fn enumerate_contribution(
    workspace: &Path,
    clone_root: &Path,
    repo: &str,
    state: &RepoState,
) -> Result<Vec<SyncOp>> {
    let mut ops = Vec::new();

    for mapping in &state.file_paths {
        let local_abs = workspace.join(&mapping.local);
        let source_abs = if mapping.source_is_root() {
            clone_root.to_path_buf()
        } else {
            clone_root.join(&mapping.source)
        };

        if local_abs.is_dir() || source_abs.is_dir() {
            // Directory mapping. The local side may be entirely gone; its
            // tracked files then surface as fork-side deletions below.
            if local_abs.is_dir() {
                for entry in WalkDir::new(&local_abs)
                    .follow_links(false)
                    .into_iter()
                    .filter_entry(|e| e.file_name() != ".git")
                {
                    let entry = entry.map_err(|e| Error::Filesystem {
                        message: format!("walk failed under {}: {}", local_abs.display(), e),
                    })?;
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    if is_engine_artifact(entry.path()) {
                        continue;
                    }

                    let rel = entry
                        .path()
                        .strip_prefix(&local_abs)
                        .expect("walk entries stay under their root");
                    let absolute_source = source_abs.join(rel);

                    ops.push(SyncOp {
                        relative_local: relative_string(workspace, entry.path())?,
                        relative_source: relative_string(clone_root, &absolute_source)?,
                        absolute_local: entry.path().to_path_buf(),
                        absolute_source,
                        repo: repo.to_string(),
                        kind: OpKind::Copy,
                    });
                }
            }

            ops.extend(fork_side_deletions(
                workspace, clone_root, repo, state, &local_abs, &source_abs,
            )?);
        } else if local_abs.is_file() {
            ops.push(SyncOp {
                relative_local: relative_string(workspace, &local_abs)?,
                relative_source: relative_string(clone_root, &source_abs)?,
                absolute_local: local_abs.clone(),
                absolute_source: source_abs.clone(),
                repo: repo.to_string(),
                kind: OpKind::Copy,
            });
        } else if state.files.contains_key(&mapping.local) && source_abs.is_file() {
            // Tracked single-file mapping deleted locally, still in the fork.
            ops.push(SyncOp {
                relative_local: mapping.local.clone(),
                relative_source: relative_string(clone_root, &source_abs)?,
                absolute_local: local_abs,
                absolute_source: source_abs,
                repo: repo.to_string(),
                kind: OpKind::Delete,
            });
        }
    }

    Ok(ops)
}

fn fork_side_deletions(
    workspace: &Path,
    clone_root: &Path,
    repo: &str,
    state: &RepoState,
    local_root: &Path,
    source_root: &Path,
) -> Result<Vec<SyncOp>> {
    if !source_root.is_dir() {
        return Ok(Vec::new());
    }

    let mut ops = Vec::new();
    for entry in WalkDir::new(source_root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
    {
        let entry = entry.map_err(|e| Error::Filesystem {
            message: format!("walk failed under {}: {}", source_root.display(), e),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(source_root)
            .expect("walk entries stay under their root");
        let local_path = local_root.join(rel);
        if local_path.exists() {
            continue;
        }

        // Only delete what the tracker claims to manage; anything else in
        // the fork is outside this engine's authority.
        let relative_local = relative_string(workspace, &local_path)?;
        if !state.files.contains_key(&relative_local) {
            continue;
        }

        ops.push(SyncOp {
            relative_local,
            relative_source: relative_string(clone_root, entry.path())?,
            absolute_local: local_path,
            absolute_source: entry.path().to_path_buf(),
            repo: repo.to_string(),
            kind: OpKind::Delete,
        });
    }

    Ok(ops)
}

fn is_engine_artifact(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name == TRACKER_FILE || name.ends_with(".bak")
}

/// Contribute driver.
pub struct ContributeExecutor<'a> {
    workspace: PathBuf,
    forge: &'a dyn ForgeClient,
    dry_run: bool,
}

impl<'a> ContributeExecutor<'a> {
    pub fn new(workspace: &Path, forge: &'a dyn ForgeClient, dry_run: bool) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            forge,
            dry_run,
        }
    }

    /// Contribute every repo that records a fork. Failures are repo-scoped;
    /// the tracker is persisted after each repo so PR records survive later
    /// failures.
    pub fn run(&self) -> Result<Vec<ContributeOutcome>> {
        let mut root = tracker::read(&self.workspace);
        let repo_names: Vec<String> = root
            .repos
            .iter()
            .filter(|(_, state)| state.fork_repo.is_some())
            .map(|(name, _)| name.clone())
            .collect();

        if repo_names.is_empty() {
            info!("no tracked repo declares a fork; nothing to contribute");
        }

        let mut outcomes = Vec::new();
        for name in repo_names {
            let state = root.repos.get_mut(&name).expect("name came from the map");
            let outcome = match self.contribute_repo(&name, state) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("{}: contribute failed: {}", name, e);
                    ContributeOutcome {
                        repo: name.clone(),
                        error: Some(e.to_string()),
                        ..ContributeOutcome::default()
                    }
                }
            };

            if !self.dry_run {
                tracker::write(&self.workspace, &root)?;
            }
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    fn contribute_repo(&self, repo: &str, state: &mut RepoState) -> Result<ContributeOutcome> {
        let fork = state
            .fork_repo
            .clone()
            .expect("caller filtered on fork_repo");
        let mut outcome = ContributeOutcome {
            repo: repo.to_string(),
            ..ContributeOutcome::default()
        };

        // A recorded open PR means update-in-place on its branch; anything
        // else gets a fresh datestamped branch and later a fresh PR.
        let refreshed = match &state.pull_request {
            Some(recorded) => self.forge.pr_status(repo, recorded.pr_number)?,
            None => None,
        };
        let (updating, branch) =
            plan_branch(state.pull_request.as_ref(), refreshed.as_ref(), Utc::now());
        if updating {
            let recorded = state.pull_request.as_mut().expect("updating implies a record");
            if let Some(current) = &refreshed {
                recorded.status = current.status;
                recorded.last_updated = current.last_updated;
            }
        } else if let Some(current) = &refreshed {
            info!(
                "{}: recorded PR #{} is no longer open ({:?}); starting a new one",
                repo, current.pr_number, current.status
            );
        }

        let clone = ForkClone::create(&fork, self.dry_run)?;

        if let Err(e) = clone.sync_with_source(repo) {
            warn!(
                "{}: could not refresh fork from source ({}); continuing with fork as-is",
                repo, e
            );
        }

        clone.ensure_branch(&branch, updating)?;

        let ops = enumerate_contribution(&self.workspace, clone.root(), repo, state)?;
        if ops.is_empty() {
            outcome.skipped = Some("no local changes to contribute".to_string());
            return Ok(outcome);
        }

        if self.dry_run {
            for op in &ops {
                match op.kind {
                    OpKind::Copy => {
                        println!("copy {} -> {}", op.relative_local, op.relative_source)
                    }
                    OpKind::Delete => println!("delete {}", op.relative_source),
                }
            }
            outcome.copied = ops.iter().filter(|op| op.kind == OpKind::Copy).count();
            outcome.deleted = ops.iter().filter(|op| op.kind == OpKind::Delete).count();
            outcome.skipped = Some("dry run".to_string());
            return Ok(outcome);
        }

        for op in &ops {
            match op.kind {
                OpKind::Copy => {
                    if let Some(parent) = op.absolute_source.parent() {
                        fs::create_dir_all(parent).map_err(|e| Error::Filesystem {
                            message: format!(
                                "failed to create directory '{}': {}",
                                parent.display(),
                                e
                            ),
                        })?;
                    }
                    fs::copy(&op.absolute_local, &op.absolute_source).map_err(|e| {
                        Error::Filesystem {
                            message: format!(
                                "failed to copy '{}' into fork: {}",
                                op.relative_local, e
                            ),
                        }
                    })?;
                    outcome.copied += 1;
                }
                OpKind::Delete => {
                    fs::remove_file(&op.absolute_source).map_err(|e| Error::Filesystem {
                        message: format!(
                            "failed to delete '{}' from fork: {}",
                            op.relative_source, e
                        ),
                    })?;
                    outcome.deleted += 1;
                }
            }
        }

        if !clone.commit_all(COMMIT_MESSAGE)? {
            outcome.skipped = Some("working tree clean; nothing to contribute".to_string());
            return Ok(outcome);
        }

        clone.push(&branch, updating)?;

        if updating {
            let recorded = state.pull_request.as_mut().expect("updating implies a record");
            recorded.last_updated = Utc::now();
            outcome.pr_url = Some(format!(
                "https://github.com/{}/pull/{}",
                repo, recorded.pr_number
            ));
            return Ok(outcome);
        }

        let title = format!("Sync contribution into {}", repo);
        let body = pr_body(repo, &ops);
        let (number, url) =
            self.forge
                .create_pr(repo, &head_ref(repo, &fork, &branch), &title, &body)?;

        state.pull_request = Some(PullRequestState {
            pr_number: number,
            branch_name: branch,
            status: PullRequestStatus::Open,
            last_updated: Utc::now(),
        });
        outcome.pr_url = Some(url);
        Ok(outcome)
    }
}

/// Decide whether this contribution updates an existing PR branch or
/// starts a fresh one. A recorded PR that the forge still reports open is
/// reused under its recorded branch name — the recorded name is
/// authoritative, even if the forge's view of the head drifted. Everything
/// else (no record, PR gone, PR closed or merged) gets a datestamped
/// branch.
fn plan_branch(
    recorded: Option<&PullRequestState>,
    refreshed: Option<&PullRequestState>,
    now: chrono::DateTime<Utc>,
) -> (bool, String) {
    match (recorded, refreshed) {
        (Some(recorded), Some(current)) if current.status == PullRequestStatus::Open => {
            (true, recorded.branch_name.clone())
        }
        _ => (false, datestamped_branch(now)),
    }
}

fn pr_body(repo: &str, ops: &[SyncOp]) -> String {
    let mut body = format!(
        "Automated contribution of local changes.\n\n## {}\n\n",
        repo
    );
    for op in ops {
        match op.kind {
            OpKind::Copy => {
                body.push_str(&format!(
                    "- copy `{}` -> `{}`\n",
                    op.relative_local, op.relative_source
                ));
            }
            OpKind::Delete => {
                body.push_str(&format!("- delete `{}`\n", op.relative_source));
            }
        }
    }
    body
}
