//! Recast CLI - command-line driver for the recast rewriting engine
//!
//! Parses arguments, loads configuration, runs the batch runner and reports a
//! summary of changed, unchanged and failed files.

pub mod cli;

pub use cli::{command, run, CliOptions};
