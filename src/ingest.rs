//! # Ingest Executor
//!
//! Drives one pull pass: resolve the remote tip, stage a snapshot, walk the
//! declared mappings, run the decision engine per file, perform the chosen
//! actions, detect upstream deletions, and persist the tracker.
//!
//! Error scoping follows three levels. File-level problems (an unreadable
//! source, a failed merge) are counted in the summary and never stop the
//! pass. Repo-level problems (tip lookup, staging, walking) abort that repo
//! but the tracker still receives whatever file records were already
//! updated, because those hashes match the bytes on disk regardless.
//! Tracker write failures are fatal to the command.
//!
//! The repo's `lastCommitHash` only advances when every file operation in
//! the pass succeeded; a withheld commit hash makes the next run re-stage
//! and retry the failures.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{info, warn};

use crate::decision::{decide, Decision, DecisionInput};
use crate::deletion::{self, DeletionChoice, DeletionPrompt};
use crate::digest::{content_digest, file_digest};
use crate::error::{Error, Result};
use crate::fetch::RepoFetcher;
use crate::oracle::MergeOracle;
use crate::tracker::{self, FileState, RepoState, SyncAction};
use crate::walker::{self, SyncOp};
use crate::workflow::{RepoGroup, SyncTask};

/// Outcome counts for one repo's ingest pass.
#[derive(Debug, Default, Clone)]
pub struct RepoSummary {
    pub repo: String,
    pub copied: usize,
    pub merged: usize,
    pub tracker_updates: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub failed: usize,
    /// The pass was short-circuited because the tracked commit already
    /// matched the remote tip.
    pub up_to_date: bool,
    /// Repo-level failure, if any. File-level failures only bump `failed`.
    pub error: Option<String>,
}

impl RepoSummary {
    fn new(repo: &str) -> Self {
        Self {
            repo: repo.to_string(),
            ..Self::default()
        }
    }
}

impl fmt::Display for RepoSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} copied, {} merged, {} tracker updates, {} unchanged, {} deleted, {} failed",
            self.copied, self.merged, self.tracker_updates, self.unchanged, self.deleted,
            self.failed
        )
    }
}

/// Ingest driver; collaborators are injected so tests can run it without a
/// network, an oracle endpoint, or a terminal.
pub struct IngestExecutor<'a> {
    workspace: PathBuf,
    fetcher: &'a dyn RepoFetcher,
    oracle: Option<&'a dyn MergeOracle>,
    prompt: &'a dyn DeletionPrompt,
}

/// Per-mapping enumeration result, kept so the deletion pass knows which
/// files the snapshot still provides for each directory mapping.
struct MappingOps {
    local_root: PathBuf,
    source_is_dir: bool,
    ops: Vec<SyncOp>,
}

impl<'a> IngestExecutor<'a> {
    pub fn new(
        workspace: &Path,
        fetcher: &'a dyn RepoFetcher,
        oracle: Option<&'a dyn MergeOracle>,
        prompt: &'a dyn DeletionPrompt,
    ) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            fetcher,
            oracle,
            prompt,
        }
    }

    /// Run every repo group of a sync task sequentially. Repo failures are
    /// recorded in their summary; only tracker-write failures propagate.
    pub fn run_task(&self, task: &SyncTask) -> Result<Vec<RepoSummary>> {
        let mut summaries = Vec::new();

        for group in &task.repos {
            match self.ingest_repo(group) {
                Ok(summary) => summaries.push(summary),
                Err(Error::Tracker { path, message }) => {
                    return Err(Error::Tracker { path, message });
                }
                Err(e) => {
                    warn!("{}: ingest failed: {}", group.repo, e);
                    let mut summary = RepoSummary::new(&group.repo);
                    summary.error = Some(e.to_string());
                    summaries.push(summary);
                }
            }
        }

        Ok(summaries)
    }

    /// Ingest a single repo group: the per-repo algorithm.
    pub fn ingest_repo(&self, group: &RepoGroup) -> Result<RepoSummary> {
        let mut summary = RepoSummary::new(&group.repo);
        let mut root = tracker::read(&self.workspace);

        let tip = self.fetcher.tip_commit(&group.repo, &group.branch)?;
        let previous_commit = tracker::last_commit(&root, &group.repo, &group.branch);

        // sync=false means "always fetch": no short-circuit on commit match.
        let up_to_date =
            !group.force && group.sync && previous_commit.as_deref() == Some(tip.as_str());
        if up_to_date {
            summary.up_to_date = true;
            summary.unchanged = root
                .repos
                .get(&group.repo)
                .map(|state| state.files.len())
                .unwrap_or(0);
            info!("{}@{} already at {}", group.repo, group.branch, tip);
            return Ok(summary);
        }

        let staged = self.fetcher.stage(&group.repo, &group.branch)?;

        let mappings = match self.enumerate(group, staged.root()) {
            Ok(mappings) => mappings,
            Err(e) => {
                // Nothing was applied yet; report the repo as failed without
                // touching its record.
                summary.error = Some(e.to_string());
                return Ok(summary);
            }
        };

        {
            let state = root
                .repos
                .entry(group.repo.clone())
                .or_insert_with(|| RepoState::new(&group.branch));

            for mapping_ops in &mappings {
                for op in &mapping_ops.ops {
                    self.apply_op(
                        op,
                        group,
                        state,
                        previous_commit.as_deref(),
                        &staged.commit,
                        &mut summary,
                    );
                }
            }

            self.deletion_pass(group, &mappings, state, &mut summary)?;

            state.branch = group.branch.clone();
            state.file_paths = group.files.clone();
            if group.fork_repo.is_some() {
                state.fork_repo = group.fork_repo.clone();
            }
            state.synced_at = Utc::now();
            if summary.failed == 0 {
                state.last_commit_hash = staged.commit.clone();
            } else {
                warn!(
                    "{}: {} operation(s) failed; keeping previous commit so the next run retries",
                    group.repo, summary.failed
                );
            }
        }

        tracker::write(&self.workspace, &root)?;
        Ok(summary)
    }

    fn enumerate(&self, group: &RepoGroup, staging: &Path) -> Result<Vec<MappingOps>> {
        let mut mappings = Vec::new();

        for mapping in &group.files {
            let source_abs = if mapping.source_is_root() {
                staging.to_path_buf()
            } else {
                staging.join(&mapping.source)
            };
            let local_abs = self.workspace.join(&mapping.local);

            if source_abs.is_dir() {
                let ops = walker::enumerate_source_tree(
                    &group.repo,
                    &source_abs,
                    &local_abs,
                    staging,
                    &self.workspace,
                )?;
                mappings.push(MappingOps {
                    local_root: local_abs,
                    source_is_dir: true,
                    ops,
                });
            } else if source_abs.is_file() {
                let op = walker::single_file_op(
                    &group.repo,
                    &source_abs,
                    &local_abs,
                    staging,
                    &self.workspace,
                )?;
                mappings.push(MappingOps {
                    local_root: local_abs,
                    source_is_dir: false,
                    ops: vec![op],
                });
            } else {
                warn!(
                    "{}: mapping source '{}' not present in the snapshot; skipping",
                    group.repo, mapping.source
                );
            }
        }

        Ok(mappings)
    }

    fn apply_op(
        &self,
        op: &SyncOp,
        group: &RepoGroup,
        state: &mut RepoState,
        previous_commit: Option<&str>,
        current_commit: &str,
        summary: &mut RepoSummary,
    ) {
        let source_hash = file_digest(&op.absolute_source);
        if source_hash.is_empty() {
            warn!("{}: unreadable source {}", group.repo, op.relative_source);
            summary.failed += 1;
            return;
        }
        let local_hash = file_digest(&op.absolute_local);
        let record = state.files.get(&op.relative_local);

        let decision = decide(&DecisionInput {
            source_hash: &source_hash,
            local_hash: &local_hash,
            tracked_hash: record.map(|r| r.hash.as_str()),
            tracked_action: record.map(|r| r.action),
            last_commit: previous_commit,
            current_commit,
            force: group.force,
        });

        match decision {
            Decision::Copy => match self.copy_file(op) {
                Ok(()) => {
                    state.files.insert(
                        op.relative_local.clone(),
                        FileState {
                            hash: source_hash,
                            synced_at: Utc::now(),
                            action: SyncAction::Copy,
                            relative_source_path: op.relative_source.clone(),
                        },
                    );
                    summary.copied += 1;
                }
                Err(e) => {
                    warn!("{}: copy to {} failed: {}", group.repo, op.relative_local, e);
                    summary.failed += 1;
                }
            },
            Decision::Merge => match self.merge_file(op) {
                Ok(merged_hash) => {
                    state.files.insert(
                        op.relative_local.clone(),
                        FileState {
                            hash: merged_hash,
                            synced_at: Utc::now(),
                            action: SyncAction::Merge,
                            relative_source_path: op.relative_source.clone(),
                        },
                    );
                    summary.merged += 1;
                }
                Err(e) => {
                    warn!("{}: {}", group.repo, e);
                    summary.failed += 1;
                }
            },
            Decision::UpdateTracker => {
                state.files.insert(
                    op.relative_local.clone(),
                    FileState {
                        hash: local_hash,
                        synced_at: Utc::now(),
                        action: SyncAction::UpdateTracker,
                        relative_source_path: op.relative_source.clone(),
                    },
                );
                summary.tracker_updates += 1;
            }
            Decision::Skip => {
                summary.unchanged += 1;
            }
        }
    }

    fn copy_file(&self, op: &SyncOp) -> Result<()> {
        if let Some(parent) = op.absolute_local.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Filesystem {
                message: format!("failed to create directory '{}': {}", parent.display(), e),
            })?;
        }
        fs::copy(&op.absolute_source, &op.absolute_local).map_err(|e| Error::Filesystem {
            message: format!(
                "failed to copy '{}' to '{}': {}",
                op.absolute_source.display(),
                op.absolute_local.display(),
                e
            ),
        })?;
        Ok(())
    }

    /// Run the merge oracle for one file. On success the merged bytes are on
    /// disk and the sidecar backup is gone; on failure the local file and
    /// the backup are both left in place.
    fn merge_file(&self, op: &SyncOp) -> Result<String> {
        let oracle = self.oracle.ok_or_else(|| Error::Merge {
            path: op.absolute_local.clone(),
            message: "no merge oracle configured (set OPENROUTER_API_KEY or add merge \
                      settings to the sync task)"
                .to_string(),
        })?;

        let local_content =
            fs::read_to_string(&op.absolute_local).map_err(|e| Error::Merge {
                path: op.absolute_local.clone(),
                message: format!("local file is not mergeable text: {}", e),
            })?;
        let source_content =
            fs::read_to_string(&op.absolute_source).map_err(|e| Error::Merge {
                path: op.absolute_local.clone(),
                message: format!("source file is not mergeable text: {}", e),
            })?;

        let backup = backup_path(&op.absolute_local);
        fs::write(&backup, &local_content).map_err(|e| Error::Merge {
            path: op.absolute_local.clone(),
            message: format!("could not write backup {}: {}", backup.display(), e),
        })?;

        match oracle.merge(&local_content, &source_content) {
            Ok(merged) => {
                fs::write(&op.absolute_local, &merged).map_err(|e| Error::Merge {
                    path: op.absolute_local.clone(),
                    message: format!("could not write merged content: {}", e),
                })?;
                let _ = fs::remove_file(&backup);
                Ok(content_digest(merged.as_bytes()))
            }
            Err(e) => Err(Error::Merge {
                path: op.absolute_local.clone(),
                message: format!("oracle failed ({}); backup retained at {}", e, backup.display()),
            }),
        }
    }

    fn deletion_pass(
        &self,
        group: &RepoGroup,
        mappings: &[MappingOps],
        state: &mut RepoState,
        summary: &mut RepoSummary,
    ) -> Result<()> {
        for mapping_ops in mappings {
            if !mapping_ops.source_is_dir {
                continue;
            }

            let present: BTreeSet<String> = mapping_ops
                .ops
                .iter()
                .map(|op| op.relative_local.clone())
                .collect();
            let candidates = deletion::candidates(
                &self.workspace,
                &mapping_ops.local_root,
                &present,
                state,
            )?;
            if candidates.is_empty() {
                continue;
            }

            let chosen = match self.prompt.choose(&group.repo, &candidates)? {
                DeletionChoice::KeepAll => continue,
                DeletionChoice::DeleteAll => candidates,
                DeletionChoice::Subset(indices) => indices
                    .into_iter()
                    .filter_map(|i| candidates.get(i).cloned())
                    .collect(),
            };

            summary.deleted +=
                deletion::apply(&self.workspace, &mapping_ops.local_root, &chosen, state)?;
        }

        Ok(())
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".bak");
    path.with_file_name(name)
}
