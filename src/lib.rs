//! # repo-file-sync
//!
//! This library keeps files in a destination repository in step with one or
//! more source repositories. It copies the files selected by a declarative
//! configuration, optionally rewrites their content, and reconciles the result
//! into a single branch and pull request that is refreshed on every run.
//!
//! It backs the `repo-file-sync` command-line tool but can be embedded in any
//! application that supplies its own [`fetcher::SourceFetcher`] and
//! [`hosting::CodeHost`].
//!
//! ## Quick Example
//!
//! ```
//! use repo_file_sync::changes::{render_pr_body, ChangeSet};
//! use repo_file_sync::config;
//!
//! let config = config::parse(r#"
//! sources:
//!   - repo: octo/templates
//!     ref: main
//!     files:
//!       - "docs/*.md"
//! "#).unwrap();
//! assert_eq!(config.sources[0].selectors.len(), 1);
//!
//! let mut changes = ChangeSet::new();
//! changes.record("octo/templates", "docs/guide.md");
//! assert!(render_pr_body(&changes, None).contains("- `docs/guide.md`"));
//! ```
//!
//! ## Core Concepts
//!
//! - **Configuration (`config`)**: the accepted YAML shapes, normalized into
//!   one [`config::SyncConfig`] and structurally validated.
//! - **Run settings (`settings`)**: branch, pull request and workspace
//!   settings, built once by the caller. The library never reads the
//!   environment.
//! - **Pattern resolution (`resolver`)**: glob patterns expanded against a
//!   source tree into a deterministic list of files and directories.
//! - **Transformation (`transform`)**: literal vars, then ordered regex
//!   replacement rules, applied to file content.
//! - **Fetching (`fetcher`, `git`)**: source repositories materialized into
//!   temporary trees.
//! - **Synchronization (`sync`, `changes`)**: matched entries copied into the
//!   workspace and recorded per source.
//! - **Reconciliation (`reconcile`, `hosting`)**: the state machine that
//!   maps changes onto exactly one branch and one pull request.
//!
//! ## Execution Flow
//!
//! [`pipeline::run`] ties the pieces together:
//!
//! 1.  **Load**: read and validate the configuration; a missing file ends
//!     the run with no changes.
//! 2.  **Fetch**: materialize every source in parallel.
//! 3.  **Sync**: copy and transform each source's matches, in order.
//! 4.  **Reconcile**: detect changes, recreate the branch, push, and create
//!     or update the pull request.
//! 5.  **Report**: produce the run outputs.

pub mod changes;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod git;
pub mod hosting;
pub mod outputs;
pub mod pipeline;
pub mod reconcile;
pub mod resolver;
pub mod settings;
pub mod sync;
pub mod transform;

mod sync_proptest;
