//! Shared test utilities for integration and E2E tests.
//!
//! Provides a [`TestFixture`] holding a destination workspace, a local
//! source mirror (`<sources>/<owner>/<name>`, read by `--source-dir`) and,
//! when requested, a bare git remote the workspace pushes to.
//!
//! ## Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new()
//!         .with_source_file("octo/templates", "docs/a.md", "TODO")
//!         .with_config(configs::DOCS);
//!     fixture.command().arg("sync").arg("--dry-run").assert().success();
//! }
//! ```

use assert_fs::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::configs;
    #[allow(unused_imports)]
    pub use super::{git, git_available};
    pub use super::TestFixture;
}

/// Environment variables the binary reads as option fallbacks. They are
/// cleared for every command so a CI runner's own values cannot leak in.
pub const ENV_FALLBACKS: &[&str] = &[
    "INPUT_CONFIG_PATH",
    "INPUT_TOKEN",
    "GITHUB_TOKEN",
    "INPUT_BRANCH_NAME",
    "INPUT_BRANCH_PREFIX",
    "INPUT_COMMIT_MESSAGE",
    "INPUT_PR_TITLE",
    "INPUT_PR_LABELS",
    "GITHUB_WORKSPACE",
    "GITHUB_REPOSITORY",
    "GITHUB_OUTPUT",
    "GITHUB_ACTIONS",
    "TEST_MODE",
    "RUST_LOG",
];

/// Common configuration YAML snippets for testing.
#[allow(dead_code)]
pub mod configs {
    /// One source, two markdown docs, TODO rewritten to DONE.
    pub const DOCS: &str = r#"
sources:
  - repo: octo/templates
    ref: main
    files:
      - pattern: "docs/*.md"
        replacements:
          - pattern: TODO
            replacement: DONE
            flags: g
"#;

    /// The `repos:` map form with a default ref.
    pub const REPOS_MAP: &str = r#"
repos:
  octo/templates:
    files:
      - LICENSE
      - "docs/*.md"
"#;

    /// A pattern that matches nothing next to one that matches.
    pub const UNMATCHED: &str = r#"
sources:
  - repo: octo/templates
    ref: main
    files: ["*.nothing", "docs/a.md"]
"#;

    /// Invalid YAML for error testing.
    pub const INVALID_YAML: &str = "sources: [unclosed";

    /// Structurally invalid: no selectors.
    pub const NO_FILES: &str = r#"
sources:
  - repo: octo/templates
    ref: main
    files: []
"#;
}

/// Whether a usable `git` binary is on the PATH.
#[allow(dead_code)]
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Runs git in `dir` with a fixed identity, panicking on failure.
#[allow(dead_code)]
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=Test User",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A destination workspace plus a local mirror of source repositories.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

#[allow(dead_code)]
impl TestFixture {
    /// Create a fixture with empty `workspace/` and `sources/` directories.
    pub fn new() -> Self {
        let temp_dir = assert_fs::TempDir::new().expect("Failed to create temp directory");
        temp_dir
            .child("workspace")
            .create_dir_all()
            .expect("Failed to create workspace");
        temp_dir
            .child("sources")
            .create_dir_all()
            .expect("Failed to create sources");
        Self { temp_dir }
    }

    /// Turn the workspace into a git repository on `main` with one commit,
    /// pushed to a bare remote configured as `origin`.
    pub fn with_git(self) -> Self {
        let remote = self.temp_dir.path().join("remote.git");
        fs::create_dir_all(&remote).expect("Failed to create remote");
        git(&remote, &["init", "--quiet", "--bare"]);

        let workspace = self.workspace();
        fs::write(workspace.join("README.md"), "# app\n").expect("Failed to write README");
        git(&workspace, &["init", "--quiet"]);
        git(&workspace, &["checkout", "--quiet", "-B", "main"]);
        git(&workspace, &["add", "-A"]);
        git(&workspace, &["commit", "--quiet", "-m", "initial"]);
        git(
            &workspace,
            &["remote", "add", "origin", remote.to_str().expect("utf-8 path")],
        );
        git(&workspace, &["push", "--quiet", "origin", "main"]);
        self
    }

    /// Write the sync configuration at its default workspace location.
    pub fn with_config(self, content: &str) -> Self {
        self.temp_dir
            .child("workspace/.github/repo-file-sync.yaml")
            .write_str(content)
            .expect("Failed to write config file");
        self
    }

    /// Add a file to the mirrored source repository `repo`.
    pub fn with_source_file(self, repo: &str, path: &str, content: &str) -> Self {
        self.temp_dir
            .child("sources")
            .child(repo)
            .child(path)
            .write_str(content)
            .expect("Failed to write source file");
        self
    }

    /// Commit every workspace change on the current branch.
    pub fn commit_all(&self, message: &str) {
        git(&self.workspace(), &["add", "-A"]);
        git(&self.workspace(), &["commit", "--quiet", "-m", message]);
    }

    pub fn workspace(&self) -> PathBuf {
        self.temp_dir.path().join("workspace")
    }

    pub fn sources(&self) -> PathBuf {
        self.temp_dir.path().join("sources")
    }

    pub fn remote(&self) -> PathBuf {
        self.temp_dir.path().join("remote.git")
    }

    /// Path of the file run outputs are appended to.
    pub fn outputs_path(&self) -> PathBuf {
        self.temp_dir.path().join("github_output")
    }

    /// Contents of the outputs file, empty if it was never written.
    pub fn outputs(&self) -> String {
        fs::read_to_string(self.outputs_path()).unwrap_or_default()
    }

    pub fn read(&self, path: &str) -> String {
        fs::read_to_string(self.workspace().join(path)).expect("Failed to read workspace file")
    }

    /// A command for the binary, run from the workspace with a clean
    /// environment.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("repo-file-sync");
        for var in ENV_FALLBACKS {
            cmd.env_remove(var);
        }
        cmd.env("NO_COLOR", "1");
        cmd.current_dir(self.workspace());
        cmd
    }

    /// A `sync` command reading sources from the local mirror and writing
    /// outputs to [`TestFixture::outputs_path`].
    pub fn sync_command(&self) -> assert_cmd::Command {
        let mut cmd = self.command();
        cmd.arg("sync")
            .arg("--source-dir")
            .arg(self.sources())
            .arg("--output-file")
            .arg(self.outputs_path());
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_layout() {
        let fixture = TestFixture::new()
            .with_config(configs::DOCS)
            .with_source_file("octo/templates", "docs/a.md", "TODO");
        assert!(fixture.workspace().join(".github/repo-file-sync.yaml").exists());
        assert!(fixture.sources().join("octo/templates/docs/a.md").exists());
    }

    #[test]
    fn test_configs_are_valid_yaml() {
        for config in [configs::DOCS, configs::REPOS_MAP, configs::UNMATCHED, configs::NO_FILES] {
            serde_yaml::from_str::<serde_yaml::Value>(config).expect("Config should be valid YAML");
        }
    }

    #[test]
    fn test_invalid_yaml_is_actually_invalid() {
        let result = serde_yaml::from_str::<serde_yaml::Value>(configs::INVALID_YAML);
        assert!(result.is_err(), "INVALID_YAML should not parse");
    }
}
