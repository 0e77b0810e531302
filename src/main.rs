//! # repo-file-sync CLI
//!
//! This is the binary entry point for the `repo-file-sync` command-line tool.
//!
//! Its primary responsibilities are:
//! - Parsing command-line arguments and their environment fallbacks with `clap`.
//! - Building the run settings and collaborators the library needs.
//! - Reporting fatal errors with a non-zero exit status.
//!
//! The engine itself lives in the `repo_file_sync` library crate, so the
//! binary stays a thin wrapper around it.

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
