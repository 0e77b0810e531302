//! Run outputs exposed to the invoking environment.
//!
//! Outputs are `key=value` pairs. In GitHub Actions they are appended to the
//! file named by `GITHUB_OUTPUT`; the CLI also prints them.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::hosting::PullRequest;

/// Values reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutputs {
    pub changes_detected: bool,
    pub files_synced: usize,
    /// Set when a pull request was created or updated. Fields the host could
    /// not report are left out of the outputs.
    pub pr: Option<PullRequest>,
}

impl RunOutputs {
    /// Outputs for a run that synced nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Output pairs in a stable order.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("changes-detected", self.changes_detected.to_string()),
            ("files-synced", self.files_synced.to_string()),
        ];
        if let Some(pr) = &self.pr {
            if !pr.number.is_empty() {
                pairs.push(("pr-number", pr.number.clone()));
            }
            if !pr.url.is_empty() {
                pairs.push(("pr-url", pr.url.clone()));
            }
        }
        pairs
    }

    /// Appends the outputs to `path` as `key=value` lines, creating the file
    /// if needed.
    pub fn append_to(&self, path: &Path) -> Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        for (key, value) in self.pairs() {
            writeln!(file, "{}={}", key, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_pairs_without_pr() {
        let outputs = RunOutputs {
            changes_detected: true,
            files_synced: 2,
            pr: None,
        };
        assert_eq!(
            outputs.pairs(),
            vec![
                ("changes-detected", "true".to_string()),
                ("files-synced", "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_pairs_with_pr() {
        let outputs = RunOutputs {
            changes_detected: true,
            files_synced: 1,
            pr: Some(PullRequest {
                number: "9".to_string(),
                url: "https://github.com/octo/app/pull/9".to_string(),
            }),
        };
        let keys: Vec<&str> = outputs.pairs().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["changes-detected", "files-synced", "pr-number", "pr-url"]);
    }

    #[test]
    fn test_unreported_pr_fields_are_omitted() {
        let outputs = RunOutputs {
            changes_detected: true,
            files_synced: 1,
            pr: Some(PullRequest {
                number: String::new(),
                url: String::new(),
            }),
        };
        let keys: Vec<&str> = outputs.pairs().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["changes-detected", "files-synced"]);
    }

    #[test]
    fn test_append_to_keeps_existing_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("github_output");
        fs::write(&path, "earlier=1\n").unwrap();

        RunOutputs::empty().append_to(&path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "earlier=1\nchanges-detected=false\nfiles-synced=0\n"
        );
    }
}
