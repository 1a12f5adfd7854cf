//! Error handling types for the forge-sync engine

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for forge-sync operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Workflow file error: {}: {}", path.display(), message)]
    Workflow { path: PathBuf, message: String },

    #[error("Git clone error for {repo}@{branch}: {message}")]
    GitClone {
        repo: String,
        branch: String,
        message: String,
    },

    #[error("Git command failed in {context}: git {command}: {stderr}")]
    GitCommand {
        context: String,
        command: String,
        stderr: String,
    },

    #[error("Remote ref '{branch}' not found for {repo}")]
    RefNotFound { repo: String, branch: String },

    #[error("Forge CLI error: {message}")]
    Forge { message: String },

    #[error("Tracker error at {}: {}", path.display(), message)]
    Tracker { path: PathBuf, message: String },

    #[error("Merge failed for {}: {}", path.display(), message)]
    Merge { path: PathBuf, message: String },

    #[error("Filesystem operation error: {message}")]
    Filesystem { message: String },

    #[error("Prompt error: {message}")]
    Prompt { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Generic(String),
}

/// Result type alias for forge-sync operations
pub type Result<T> = std::result::Result<T, Error>;
