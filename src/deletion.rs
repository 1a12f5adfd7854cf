//! # Ingest-Side Deletion Detection
//!
//! After a repo's ingest pass, files that exist under a directory mapping's
//! local target but have vanished from the source subtree are candidates
//! for removal. The candidate set is narrowed to files the tracker knows
//! about: anything the engine never synced is outside its blast radius and
//! is left alone no matter how orphaned it looks.
//!
//! Removal always goes through an explicit confirmation. The operator may
//! delete everything, pick a subset, or keep everything; non-interactive
//! runs keep everything.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use dialoguer::{theme::ColorfulTheme, MultiSelect, Select};
use log::{info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::tracker::RepoState;
use crate::walker::relative_string;

/// What the operator chose to do with the deletion candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionChoice {
    DeleteAll,
    /// Indices into the candidate list.
    Subset(Vec<usize>),
    KeepAll,
}

/// Confirmation seam; tests substitute scripted implementations.
pub trait DeletionPrompt {
    /// Ask what to do with `candidates` (relative local paths). Only called
    /// when the list is non-empty.
    fn choose(&self, repo: &str, candidates: &[String]) -> Result<DeletionChoice>;
}

/// Interactive confirmation via the terminal; keeps everything when no
/// operator is attending.
pub struct InteractivePrompt;

impl DeletionPrompt for InteractivePrompt {
    fn choose(&self, repo: &str, candidates: &[String]) -> Result<DeletionChoice> {
        if !console::Term::stdout().features().is_attended() {
            info!(
                "{}: {} file(s) disappeared upstream; keeping all (non-interactive run)",
                repo,
                candidates.len()
            );
            return Ok(DeletionChoice::KeepAll);
        }

        println!(
            "{} file(s) tracked for {} no longer exist in the source:",
            candidates.len(),
            repo
        );
        for path in candidates {
            println!("  {}", path);
        }

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Remove them locally?")
            .items(&["Delete all", "Choose which files to delete", "Keep all"])
            .default(2)
            .interact()
            .map_err(|e| Error::Prompt {
                message: e.to_string(),
            })?;

        match selection {
            0 => Ok(DeletionChoice::DeleteAll),
            1 => {
                let picked = MultiSelect::with_theme(&ColorfulTheme::default())
                    .with_prompt("Select files to delete")
                    .items(candidates)
                    .interact()
                    .map_err(|e| Error::Prompt {
                        message: e.to_string(),
                    })?;
                Ok(DeletionChoice::Subset(picked))
            }
            _ => Ok(DeletionChoice::KeepAll),
        }
    }
}

/// Compute deletion candidates for one directory mapping.
///
/// `present_in_source` holds the relative local paths the snapshot still
/// provides. Candidates are local files under `local_root` that are absent
/// from that set *and* recorded in the tracker for this repo.
pub fn candidates(
    workspace: &Path,
    local_root: &Path,
    present_in_source: &BTreeSet<String>,
    state: &RepoState,
) -> Result<Vec<String>> {
    if !local_root.is_dir() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(local_root).follow_links(false) {
        let entry = entry.map_err(|e| Error::Filesystem {
            message: format!("walk failed under {}: {}", local_root.display(), e),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = relative_string(workspace, entry.path())?;
        if !present_in_source.contains(&rel) && state.files.contains_key(&rel) {
            found.push(rel);
        }
    }

    found.sort();
    Ok(found)
}

/// Remove the chosen files, drop their tracker records, and prune any
/// directories left empty, walking up to (but not past) the mapping root.
pub fn apply(
    workspace: &Path,
    local_root: &Path,
    chosen: &[String],
    state: &mut RepoState,
) -> Result<usize> {
    let mut removed = 0;

    for rel in chosen {
        let path = workspace.join(rel);
        match fs::remove_file(&path) {
            Ok(()) => {
                state.files.remove(rel);
                removed += 1;
                prune_empty_dirs(path.parent(), local_root);
            }
            Err(e) => {
                warn!("could not remove {}: {}", path.display(), e);
            }
        }
    }

    Ok(removed)
}

fn prune_empty_dirs(start: Option<&Path>, stop: &Path) {
    let mut current = start;
    while let Some(dir) = current {
        if dir == stop || !dir.starts_with(stop) {
            break;
        }
        // remove_dir refuses non-empty directories, which ends the climb.
        if fs::remove_dir(dir).is_err() {
            break;
        }
        current = dir.parent();
    }
}
