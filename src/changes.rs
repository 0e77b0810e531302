//! Aggregation of synchronized files into a change set and the pull request
//! body rendered from it.
//!
//! A [`ChangeSet`] groups destination paths by the source repository that
//! wrote them, in order of first appearance. A path belongs to exactly one
//! bucket: when a later source overwrites it, the record moves to the later
//! source.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Heading at the top of every generated pull request body.
pub const PR_BODY_HEADING: &str = "## Synchronized Files";

/// Synchronized paths grouped by source repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    buckets: Vec<(String, Vec<PathBuf>)>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `repo` wrote `path`.
    ///
    /// Returns the repository that previously owned the path, if it was a
    /// different one. Re-recording a path under the same repository moves it
    /// to the end of that bucket.
    pub fn record(&mut self, repo: &str, path: impl Into<PathBuf>) -> Option<String> {
        let path = path.into();
        let previous = self.remove(&path);

        match self.buckets.iter_mut().find(|(r, _)| r == repo) {
            Some((_, paths)) => paths.push(path),
            None => self.buckets.push((repo.to_string(), vec![path])),
        }

        previous.filter(|owner| owner != repo)
    }

    fn remove(&mut self, path: &Path) -> Option<String> {
        let index = self
            .buckets
            .iter()
            .position(|(_, paths)| paths.iter().any(|p| p == path))?;
        let (repo, paths) = &mut self.buckets[index];
        let repo = repo.clone();
        paths.retain(|p| p != path);
        if paths.is_empty() {
            self.buckets.remove(index);
        }
        Some(repo)
    }

    /// Number of recorded paths across all sources.
    pub fn total(&self) -> usize {
        self.buckets.iter().map(|(_, paths)| paths.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Paths recorded for `repo`, if any.
    pub fn files_for(&self, repo: &str) -> Option<&[PathBuf]> {
        self.buckets
            .iter()
            .find(|(r, _)| r == repo)
            .map(|(_, paths)| paths.as_slice())
    }

    /// Buckets in order of first appearance.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[PathBuf])> {
        self.buckets
            .iter()
            .map(|(repo, paths)| (repo.as_str(), paths.as_slice()))
    }
}

/// Renders the pull request body for `changes`.
///
/// `repository` is the destination `owner/name` used in the attribution
/// footer link; without it the footer is plain text.
pub fn render_pr_body(changes: &ChangeSet, repository: Option<&str>) -> String {
    let mut body = format!("{}\n\n", PR_BODY_HEADING);

    for (repo, paths) in changes.iter() {
        let _ = writeln!(body, "### From `{}`\n", repo);
        for path in paths {
            let _ = writeln!(body, "- `{}`", display_path(path));
        }
        body.push('\n');
    }

    body.push_str("---\n\n");
    match repository {
        Some(repository) => {
            let _ = write!(
                body,
                "*Automated by [repo-file-sync](https://github.com/{})*",
                repository
            );
        }
        None => body.push_str("*Automated by repo-file-sync*"),
    }
    body
}

fn display_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
