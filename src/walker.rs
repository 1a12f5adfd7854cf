//! # Directory Walking and Sync Operations
//!
//! Turns a (source subtree, local subtree) pair into a flat list of
//! per-file [`SyncOp`]s. Only regular files are enumerated; symlinks,
//! devices, and version-control metadata directories are ignored.
//!
//! Relative paths are always stored with forward slashes: the relative
//! local path doubles as the tracker's file key, and the relative source
//! path is what contribute uses to re-root a file inside the fork.

use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};

/// What a sync operation does with its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Copy,
    Delete,
}

/// One per-file unit of work, with both endpoints resolved.
#[derive(Debug, Clone)]
pub struct SyncOp {
    /// Absolute path in the workspace.
    pub absolute_local: PathBuf,
    /// Absolute path in the staged snapshot (ingest) or fork clone
    /// (contribute).
    pub absolute_source: PathBuf,
    /// Path relative to the workspace root; tracker key.
    pub relative_local: String,
    /// Path relative to the repository tree root.
    pub relative_source: String,
    /// Repository full name this operation belongs to.
    pub repo: String,
    pub kind: OpKind,
}

/// Render a path relative to `base` as a forward-slash string.
pub fn relative_string(base: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(base).map_err(|_| Error::Filesystem {
        message: format!(
            "{} is not under {}",
            path.display(),
            base.display()
        ),
    })?;

    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Ok(parts.join("/"))
}

/// Enumerate one copy-intent operation per regular file beneath
/// `source_root`.
///
/// `anchor` is the root the relative source path is computed against (the
/// staging directory for ingest, the fork clone for contribute);
/// `workspace` anchors the relative local path.
pub fn enumerate_source_tree(
    repo: &str,
    source_root: &Path,
    local_root: &Path,
    anchor: &Path,
    workspace: &Path,
) -> Result<Vec<SyncOp>> {
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
        let absolute_local = local_root.join(rel);

        ops.push(SyncOp {
            relative_local: relative_string(workspace, &absolute_local)?,
            relative_source: relative_string(anchor, entry.path())?,
            absolute_local,
            absolute_source: entry.path().to_path_buf(),
            repo: repo.to_string(),
            kind: OpKind::Copy,
        });
    }

    Ok(ops)
}

/// The single-file counterpart of [`enumerate_source_tree`].
pub fn single_file_op(
    repo: &str,
    source_file: &Path,
    local_file: &Path,
    anchor: &Path,
    workspace: &Path,
) -> Result<SyncOp> {
    Ok(SyncOp {
        relative_local: relative_string(workspace, local_file)?,
        relative_source: relative_string(anchor, source_file)?,
        absolute_local: local_file.to_path_buf(),
        absolute_source: source_file.to_path_buf(),
        repo: repo.to_string(),
        kind: OpKind::Copy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_enumerates_nested_files() {
        let staging = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();

        let source_root = staging.path().join("docs");
        touch(&source_root.join("readme.md"), "v1");
        touch(&source_root.join("guide/intro.md"), "v1");

        let mut ops = enumerate_source_tree(
            "octo/repo1",
            &source_root,
            &workspace.path().join("out"),
            staging.path(),
            workspace.path(),
        )
        .unwrap();
        ops.sort_by(|a, b| a.relative_local.cmp(&b.relative_local));

        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].relative_local, "out/guide/intro.md");
        assert_eq!(ops[0].relative_source, "docs/guide/intro.md");
        assert_eq!(ops[1].relative_local, "out/readme.md");
        assert_eq!(ops[1].relative_source, "docs/readme.md");
        assert!(ops.iter().all(|op| op.kind == OpKind::Copy));
        assert!(ops.iter().all(|op| op.repo == "octo/repo1"));
    }

    #[test]
    fn test_git_metadata_not_traversed() {
        let staging = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();

        touch(&staging.path().join("a.txt"), "x");
        touch(&staging.path().join(".git/HEAD"), "ref: main");
        touch(&staging.path().join("sub/.git/config"), "[core]");

        let ops = enumerate_source_tree(
            "octo/repo1",
            staging.path(),
            workspace.path(),
            staging.path(),
            workspace.path(),
        )
        .unwrap();

        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].relative_source, "a.txt");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_ignored() {
        let staging = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();

        touch(&staging.path().join("real.txt"), "x");
        std::os::unix::fs::symlink(
            staging.path().join("real.txt"),
            staging.path().join("link.txt"),
        )
        .unwrap();

        let ops = enumerate_source_tree(
            "octo/repo1",
            staging.path(),
            workspace.path(),
            staging.path(),
            workspace.path(),
        )
        .unwrap();

        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].relative_source, "real.txt");
    }

    #[test]
    fn test_single_file_op_paths() {
        let staging = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();
        let source = staging.path().join("conf/settings.json");
        touch(&source, "{}");

        let op = single_file_op(
            "octo/repo1",
            &source,
            &workspace.path().join("settings.json"),
            staging.path(),
            workspace.path(),
        )
        .unwrap();

        assert_eq!(op.relative_source, "conf/settings.json");
        assert_eq!(op.relative_local, "settings.json");
    }

    #[test]
    fn test_relative_string_outside_base_errors() {
        let base = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        assert!(relative_string(base.path(), &other.path().join("x")).is_err());
    }
}
