//! Content digests for tracked files.
//!
//! Every sync decision compares three digests: the staged source file, the
//! local file, and the hash the tracker recorded at the last sync. All three
//! come from here so they are always comparable.

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hex digest of a file's full byte contents.
///
/// Returns the empty string when the file is absent or unreadable. The empty
/// string acts as an "absent" sentinel in comparisons; a real digest is
/// always 64 hex characters, so the sentinel can never collide with one.
pub fn file_digest(path: &Path) -> String {
    match fs::read(path) {
        Ok(bytes) => content_digest(&bytes),
        Err(_) => String::new(),
    }
}

/// Compute the SHA-256 hex digest of in-memory content.
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
