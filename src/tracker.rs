//! # Sync Tracker Persistence
//!
//! The tracker is the engine's only durable state: one JSON document,
//! `.forge-sync.json`, in the workspace root. It remembers, per repository,
//! which commit was last ingested and, per file, the hash the file had after
//! its last successful sync action. The decision engine reads these values to
//! tell "upstream changed" apart from "local changed" on the next run.
//!
//! Reads are lenient: a missing or malformed tracker yields an empty root (a
//! warning is logged on parse failure) so a corrupted ledger degrades to a
//! first-run ingest instead of bricking the workspace. Writes are atomic
//! (temp file + rename) and fatal on failure.
//!
//! The tracker assumes a single process; there is no file locking.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fixed tracker filename inside the workspace root.
pub const TRACKER_FILE: &str = ".forge-sync.json";

/// The action recorded for a file after its last successful sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Copy,
    Merge,
    UpdateTracker,
}

/// A user-declared pairing of a path inside the source repository with a
/// path inside the workspace. Either side may be a file or a directory;
/// `""` or `"/"` on the source side means the repository root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMapping {
    /// Path inside the remote repository, relative to its tree root.
    pub source: String,
    /// Path inside the workspace, relative to the workspace root.
    pub local: String,
}

impl PathMapping {
    /// Whether the source side denotes the repository root.
    pub fn source_is_root(&self) -> bool {
        self.source.is_empty() || self.source == "/"
    }
}

/// Per-file record: the state the file was last known to be in.
///
/// `hash` matches the bytes of the local file as of the last successful sync
/// action; `relative_source_path` lets the contribute side reverse the
/// mapping back into the repository tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileState {
    pub hash: String,
    pub synced_at: DateTime<Utc>,
    pub action: SyncAction,
    pub relative_source_path: String,
}

/// The tracker's memory of a pull request opened on behalf of a repo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestState {
    pub pr_number: u64,
    pub branch_name: String,
    pub status: PullRequestStatus,
    pub last_updated: DateTime<Utc>,
}

/// Forge-side status of a recorded pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestStatus {
    Open,
    Closed,
    Merged,
}

/// Per-repository record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoState {
    /// Branch the repo is ingested from.
    pub branch: String,
    /// Remote tip observed at the last successful ingest; empty before the
    /// first completed pass.
    #[serde(default)]
    pub last_commit_hash: String,
    pub synced_at: DateTime<Utc>,
    /// Fork used on the contribute side, `owner/repo`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fork_repo: Option<String>,
    /// Declared mappings; authoritative over `files`.
    #[serde(default)]
    pub file_paths: Vec<PathMapping>,
    /// Relative local path → file record.
    #[serde(default)]
    pub files: BTreeMap<String, FileState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestState>,
}

impl RepoState {
    /// Fresh record for a repo seen for the first time.
    pub fn new(branch: &str) -> Self {
        Self {
            branch: branch.to_string(),
            last_commit_hash: String::new(),
            synced_at: Utc::now(),
            fork_repo: None,
            file_paths: Vec::new(),
            files: BTreeMap::new(),
            pull_request: None,
        }
    }
}

/// Root of the tracker document: repo full name (`owner/repo`) → record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerRoot {
    #[serde(default)]
    pub repos: BTreeMap<String, RepoState>,
}

/// Absolute path of the tracker file inside a workspace.
pub fn tracker_path(workspace: &Path) -> PathBuf {
    workspace.join(TRACKER_FILE)
}

/// Whether a tracker file exists in the workspace.
pub fn exists(workspace: &Path) -> bool {
    tracker_path(workspace).is_file()
}

/// Load the tracker, tolerating absence and corruption.
///
/// A missing file is a normal first run. A malformed file logs a warning and
/// yields an empty root: every tracked file then looks "never synced", which
/// re-copies cleanly rather than failing the run.
pub fn read(workspace: &Path) -> TrackerRoot {
    let path = tracker_path(workspace);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(_) => return TrackerRoot::default(),
    };

    match serde_json::from_str(&raw) {
        Ok(root) => root,
        Err(e) => {
            warn!(
                "tracker {} is malformed ({}); starting from an empty ledger",
                path.display(),
                e
            );
            TrackerRoot::default()
        }
    }
}

/// Persist the tracker atomically: serialize to a temp file in the workspace
/// root, then rename over the previous document.
pub fn write(workspace: &Path, root: &TrackerRoot) -> Result<()> {
    let path = tracker_path(workspace);
    let json = serde_json::to_string_pretty(root)?;

    let mut tmp = tempfile::NamedTempFile::new_in(workspace).map_err(|e| Error::Tracker {
        path: path.clone(),
        message: format!("failed to create temp file: {}", e),
    })?;
    tmp.write_all(json.as_bytes()).map_err(|e| Error::Tracker {
        path: path.clone(),
        message: format!("failed to write: {}", e),
    })?;
    tmp.write_all(b"\n").map_err(|e| Error::Tracker {
        path: path.clone(),
        message: format!("failed to write: {}", e),
    })?;
    tmp.persist(&path).map_err(|e| Error::Tracker {
        path: path.clone(),
        message: format!("failed to persist: {}", e),
    })?;

    Ok(())
}

/// The commit recorded for `repo`, or `None` when the repo is unknown or was
/// last ingested from a different branch.
pub fn last_commit(root: &TrackerRoot, repo: &str, branch: &str) -> Option<String> {
    let state = root.repos.get(repo)?;
    if state.branch != branch || state.last_commit_hash.is_empty() {
        return None;
    }
    Some(state.last_commit_hash.clone())
}

/// The hash recorded for a file, or `None` when it was never synced.
pub fn last_file_hash(root: &TrackerRoot, repo: &str, relative_local: &str) -> Option<String> {
    root.repos
        .get(repo)?
        .files
        .get(relative_local)
        .map(|f| f.hash.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_root() -> TrackerRoot {
        let mut root = TrackerRoot::default();
        let mut state = RepoState::new("main");
        state.last_commit_hash = "abc123".to_string();
        state.file_paths.push(PathMapping {
            source: "docs".to_string(),
            local: "out".to_string(),
        });
        state.files.insert(
            "out/readme.md".to_string(),
            FileState {
                hash: "deadbeef".to_string(),
                synced_at: Utc::now(),
                action: SyncAction::Copy,
                relative_source_path: "docs/readme.md".to_string(),
            },
        );
        root.repos.insert("octo/repo1".to_string(), state);
        root
    }

    #[test]
    fn test_read_missing_tracker_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(!exists(temp.path()));
        let root = read(temp.path());
        assert!(root.repos.is_empty());
    }

    #[test]
    fn test_read_malformed_tracker_is_empty() {
        let temp = TempDir::new().unwrap();
        fs::write(tracker_path(temp.path()), "{not json").unwrap();
        let root = read(temp.path());
        assert!(root.repos.is_empty());
    }

    #[test]
    fn test_round_trip_preserves_state() {
        let temp = TempDir::new().unwrap();
        let root = sample_root();
        write(temp.path(), &root).unwrap();
        assert!(exists(temp.path()));

        let reread = read(temp.path());
        assert_eq!(
            last_commit(&reread, "octo/repo1", "main"),
            Some("abc123".to_string())
        );
        assert_eq!(
            last_file_hash(&reread, "octo/repo1", "out/readme.md"),
            Some("deadbeef".to_string())
        );
        let state = &reread.repos["octo/repo1"];
        assert_eq!(state.files["out/readme.md"].action, SyncAction::Copy);
        assert_eq!(
            state.files["out/readme.md"].relative_source_path,
            "docs/readme.md"
        );
    }

    #[test]
    fn test_last_commit_branch_mismatch_is_none() {
        let root = sample_root();
        assert_eq!(last_commit(&root, "octo/repo1", "develop"), None);
        assert_eq!(last_commit(&root, "octo/unknown", "main"), None);
    }

    #[test]
    fn test_disk_format_field_names() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), &sample_root()).unwrap();
        let raw = fs::read_to_string(tracker_path(temp.path())).unwrap();

        // The on-disk format is camelCase with snake_case action values.
        assert!(raw.contains("\"lastCommitHash\""));
        assert!(raw.contains("\"filePaths\""));
        assert!(raw.contains("\"relativeSourcePath\""));
        assert!(raw.contains("\"copy\""));
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let temp = TempDir::new().unwrap();
        let raw = r#"{
            "repos": {
                "octo/repo1": {
                    "branch": "main",
                    "lastCommitHash": "abc123",
                    "syncedAt": "2026-01-01T00:00:00Z",
                    "futureField": {"nested": true},
                    "files": {}
                }
            },
            "schemaHint": 2
        }"#;
        fs::write(tracker_path(temp.path()), raw).unwrap();

        let root = read(temp.path());
        assert_eq!(
            last_commit(&root, "octo/repo1", "main"),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn test_pull_request_status_round_trip() {
        let temp = TempDir::new().unwrap();
        let mut root = sample_root();
        root.repos.get_mut("octo/repo1").unwrap().pull_request = Some(PullRequestState {
            pr_number: 42,
            branch_name: "sync/contribute-20260101-120000".to_string(),
            status: PullRequestStatus::Open,
            last_updated: Utc::now(),
        });
        write(temp.path(), &root).unwrap();

        let reread = read(temp.path());
        let pr = reread.repos["octo/repo1"].pull_request.as_ref().unwrap();
        assert_eq!(pr.pr_number, 42);
        assert_eq!(pr.status, PullRequestStatus::Open);
    }
}
