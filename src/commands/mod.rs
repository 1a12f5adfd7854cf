//! Command implementations for the forge-sync CLI.
//!
//! Each subcommand lives in its own module with an `Args` struct (clap
//! derive) and an `execute` function.

pub mod choose_workflow;
pub mod contribute;
pub mod ingest;
