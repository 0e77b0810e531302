//! # Error Handling
//!
//! This module defines the centralized error type for `repo-file-sync`. It
//! uses `thiserror` to derive a single `Error` enum covering every failure the
//! engine can surface, each carrying the repository, pattern, branch or pull
//! request it concerns.
//!
//! Only two classes of error abort a run:
//!
//! - configuration errors (`ConfigParse`, YAML errors), raised before any
//!   remote mutation, and
//! - terminal remote-mutation errors (`Push`, `PrCreate`, `PrUpdate`).
//!
//! Everything else is recovered where it happens. `SourceFetch` errors skip
//! one source, and unmatched patterns, invalid replacement rules and failed
//! branch deletions are logged as warnings rather than returned at all.

use thiserror::Error;

/// Main error type for repo-file-sync operations
#[derive(Error, Debug)]
pub enum Error {
    /// The sync configuration is missing a required piece or is malformed.
    ///
    /// The message names the first violated constraint; the optional hint
    /// suggests a fix.
    #[error("Configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// A source repository could not be materialized at the requested ref.
    #[error("Failed to fetch {repo}@{r#ref}: {message}")]
    SourceFetch {
        repo: String,
        r#ref: String,
        message: String,
    },

    /// A local `git` invocation failed.
    #[error("Git command failed: {command} - {stderr}")]
    GitCommand { command: String, stderr: String },

    /// A code-hosting CLI invocation failed.
    #[error("Hosting command failed: {command} - {stderr}")]
    HostCommand { command: String, stderr: String },

    /// Pushing the sync branch failed after changes were committed locally.
    #[error("Failed to push branch {branch}: {message}")]
    Push { branch: String, message: String },

    /// Opening the pull request failed.
    #[error("Failed to create pull request for branch {branch}: {message}")]
    PrCreate { branch: String, message: String },

    /// Editing an existing pull request failed.
    #[error("Failed to update pull request #{number}: {message}")]
    PrUpdate { number: String, message: String },

    /// A replacement rule declares flags that cannot be honoured.
    #[error("Invalid regex flags '{flags}': {message}")]
    RuleFlags { flags: String, message: String },

    /// A workspace filesystem operation failed.
    #[error("Filesystem operation error: {message}")]
    Filesystem { message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON parsing error, wrapped from `serde_json::Error`.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl Error {
    /// Shorthand for a `ConfigParse` error without a hint.
    pub fn config(message: impl Into<String>) -> Self {
        Error::ConfigParse {
            message: message.into(),
            hint: None,
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
