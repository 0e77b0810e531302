//! Run settings.
//!
//! Everything the engine needs beyond the sync configuration itself is
//! collected once by the caller into a [`RunSettings`] and passed down. The
//! library never reads environment variables; the CLI maps flags and their
//! `env` fallbacks onto these structs.

use std::path::{Path, PathBuf};

/// Default location of the sync configuration, relative to the workspace.
pub const DEFAULT_CONFIG_PATH: &str = ".github/repo-file-sync.yaml";

/// Default name of the sync branch.
pub const DEFAULT_BRANCH: &str = "repo-file-sync";

/// Default commit message and pull request title.
pub const DEFAULT_COMMIT_MESSAGE: &str = "chore: sync files from source repositories";

/// Default comma-separated pull request labels.
pub const DEFAULT_LABELS: &str = "automated";

/// Settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// Root of the destination git working tree.
    pub workspace: PathBuf,
    /// Path to the sync configuration; relative paths are resolved against
    /// the workspace.
    pub config_path: PathBuf,
    /// Sync and detect changes, but never touch branches or pull requests.
    pub dry_run: bool,
    pub reconcile: ReconcileSettings,
}

impl RunSettings {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            dry_run: false,
            reconcile: ReconcileSettings::default(),
        }
    }

    /// The configuration file location.
    pub fn config_file(&self) -> PathBuf {
        resolve_in(&self.workspace, &self.config_path)
    }
}

/// Branch and pull request metadata used by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSettings {
    pub branch: String,
    /// Base the sync branch is created from and the pull request targets.
    /// `None` means the current checkout and the repository default branch.
    pub base: Option<String>,
    pub commit_message: String,
    pub pr_title: String,
    pub labels: Vec<String>,
    /// Destination `owner/name`, used for the pull request footer link.
    pub repository: Option<String>,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            branch: DEFAULT_BRANCH.to_string(),
            base: None,
            commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
            pr_title: DEFAULT_COMMIT_MESSAGE.to_string(),
            labels: parse_labels(DEFAULT_LABELS),
            repository: None,
        }
    }
}

/// Splits a comma-separated label list, dropping blanks.
pub fn parse_labels(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(String::from)
        .collect()
}

fn resolve_in(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
