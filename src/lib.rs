//! # Forge Sync Library
//!
//! This library implements a bidirectional synchronization engine between
//! remote GitHub repositories and a local workspace. It backs the
//! `forge-sync` command-line tool but can be embedded by other applications
//! that need declarative repo-to-workspace mirroring.
//!
//! ## Core Concepts
//!
//! - **Tracker (`tracker`)**: the persistent JSON ledger in the workspace
//!   root recording, per repo and per file, what state was last synced.
//! - **Decision Engine (`decision`)**: a pure function choosing, per file,
//!   between copying upstream bytes, keeping local edits, reconciling
//!   through the merge oracle, or refreshing bookkeeping only.
//! - **Ingest (`ingest`, `fetch`, `walker`, `deletion`)**: materializes
//!   declared subtrees of remote repositories into the workspace and keeps
//!   them current, staging each repo into a disposable snapshot directory.
//! - **Contribute (`contribute`, `forge`)**: mirrors local edits back into
//!   a fork of each source repository and opens or updates a pull request.
//! - **Workflow (`workflow`)**: the JSON task file declaring which repos,
//!   branches, and path mappings to synchronize.
//!
//! ## Execution Flow
//!
//! An ingest pass per repo: resolve the remote tip, short-circuit when the
//! tracker already matches it, otherwise stage a shallow snapshot, walk the
//! declared mappings, decide per file, apply, confirm upstream deletions,
//! and persist the tracker. A contribute pass inverts the mappings through
//! a fork clone and finishes on the forge.

pub mod contribute;
pub mod decision;
pub mod deletion;
pub mod digest;
pub mod error;
pub mod fetch;
pub mod forge;
pub mod ingest;
pub mod oracle;
pub mod output;
pub mod tracker;
pub mod walker;
pub mod workflow;
