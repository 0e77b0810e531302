//! # Sync Orchestrator
//!
//! Copies the entries selected by every [`SourceSpec`] into the destination
//! workspace and records what was written in a [`ChangeSet`].
//!
//! ## Execution
//!
//! 1. **Fetch**: every distinct `(repo, ref)` pair is materialized in
//!    parallel. Trees are read-only, so fetching has no ordering concerns.
//! 2. **Copy**: sources are then processed strictly in declared order, since
//!    they all write to the same workspace. For each selector, the resolver's
//!    matches are copied (directories recursively, symbolic links as links),
//!    and regular files are transformed in place by the source's vars and
//!    the selector's rules. A link's target is never read.
//!
//! A source that fails to fetch is skipped. A selector that matches nothing,
//! a file that fails to copy, and a rule that fails to compile are warnings.
//! None of these stop the run.
//!
//! When two selectors write the same destination path the later write wins,
//! and the path is credited to the later source only.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::changes::ChangeSet;
use crate::config::{FileSelector, ReplacementRule, SourceSpec, SyncConfig, TemplateVar};
use crate::error::{Error, Result};
use crate::fetcher::{MaterializedSource, SourceFetcher};
use crate::resolver::{self, Match};
use crate::transform;

/// A source that could not be materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSource {
    pub repo: String,
    pub r#ref: String,
    pub reason: String,
}

/// The outcome of copying every source into the workspace.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub changes: ChangeSet,
    pub skipped: Vec<SkippedSource>,
    /// Non-fatal problems, already logged.
    pub warnings: Vec<String>,
}

impl SyncReport {
    /// Number of distinct entries written. A directory counts once.
    pub fn files_synced(&self) -> usize {
        self.changes.total()
    }
}

/// Copies configured sources into a workspace.
pub struct Synchronizer<'a> {
    fetcher: &'a dyn SourceFetcher,
    workspace: PathBuf,
}

type FetchKey<'c> = (&'c str, &'c str);

impl<'a> Synchronizer<'a> {
    pub fn new(fetcher: &'a dyn SourceFetcher, workspace: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            workspace: workspace.into(),
        }
    }

    /// Runs every source of `config` against the workspace.
    pub fn run(&self, config: &SyncConfig) -> SyncReport {
        let mut trees = self.fetch_all(config);
        let mut report = SyncReport::default();

        for source in &config.sources {
            let key = (source.repo.as_str(), source.r#ref.as_str());
            match trees.get(&key) {
                Some(Ok(tree)) => {
                    info!("Processing repository: {}@{}", source.repo, source.r#ref);
                    self.sync_source(source, tree, &mut report);
                }
                Some(Err(reason)) => {
                    warn!(
                        "Skipping {}@{}: {}",
                        source.repo, source.r#ref, reason
                    );
                    report.skipped.push(SkippedSource {
                        repo: source.repo.clone(),
                        r#ref: source.r#ref.clone(),
                        reason: reason.clone(),
                    });
                }
                None => {}
            }
        }

        // Temporary trees are removed here, after the last copy.
        trees.clear();
        report
    }

    fn fetch_all<'c>(
        &self,
        config: &'c SyncConfig,
    ) -> HashMap<FetchKey<'c>, std::result::Result<MaterializedSource, String>> {
        let mut keys: Vec<FetchKey<'c>> = Vec::new();
        for source in &config.sources {
            let key = (source.repo.as_str(), source.r#ref.as_str());
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        let fetched: Vec<_> = keys
            .par_iter()
            .map(|(repo, r#ref)| {
                debug!("Fetching {}@{}", repo, r#ref);
                self.fetcher
                    .materialize(repo, r#ref)
                    .map_err(|e| e.to_string())
            })
            .collect();

        keys.into_iter().zip(fetched).collect()
    }

    fn sync_source(&self, source: &SourceSpec, tree: &MaterializedSource, report: &mut SyncReport) {
        for selector in &source.selectors {
            let matches = match resolver::resolve(tree.root(), &selector.pattern) {
                Ok(matches) => matches,
                Err(e) => {
                    report_warning(
                        report,
                        format!("Pattern '{}' in {}: {}", selector.pattern, source.repo, e),
                    );
                    continue;
                }
            };

            if matches.is_empty() {
                report_warning(
                    report,
                    format!(
                        "Pattern '{}' matched nothing in {}@{}",
                        selector.pattern, source.repo, source.r#ref
                    ),
                );
                continue;
            }

            let single = matches.len() == 1;
            for entry in &matches {
                let relative = destination(&entry.path, selector.dest.as_deref(), single);
                if let Err(e) = self.sync_entry(source, selector, tree, entry, &relative, report) {
                    report_warning(
                        report,
                        format!(
                            "Failed to sync {} from {}: {}",
                            entry.path.display(),
                            source.repo,
                            e
                        ),
                    );
                    continue;
                }

                debug!("Synced {} -> {}", entry.path.display(), relative.display());
                if let Some(previous) = report.changes.record(&source.repo, relative.clone()) {
                    report_warning(
                        report,
                        format!(
                            "{} from {} overwrites the copy from {}",
                            relative.display(),
                            source.repo,
                            previous
                        ),
                    );
                }
            }
        }
    }

    fn sync_entry(
        &self,
        source: &SourceSpec,
        selector: &FileSelector,
        tree: &MaterializedSource,
        entry: &Match,
        relative: &Path,
        report: &mut SyncReport,
    ) -> Result<()> {
        let from = tree.root().join(&entry.path);
        let to = self.workspace.join(relative);

        if entry.is_dir() {
            return copy_dir(&from, &to);
        }
        if entry.is_symlink() {
            return copy_symlink(&from, &to);
        }

        copy_file(&from, &to)?;
        if !source.vars.is_empty() || !selector.replacements.is_empty() {
            for warning in transform_file(&to, &source.vars, &selector.replacements)? {
                report_warning(report, format!("{}: {}", relative.display(), warning));
            }
        }
        Ok(())
    }
}

fn report_warning(report: &mut SyncReport, message: String) {
    warn!("{}", message);
    report.warnings.push(message);
}

/// Destination of `matched`, relative to the workspace.
///
/// Without an override the source-relative path is kept. An override names
/// the exact target when the selector matched a single entry and the
/// override does not end in `/`; otherwise it is a directory the matched
/// paths are placed under.
pub fn destination(matched: &Path, dest: Option<&str>, single: bool) -> PathBuf {
    match dest {
        None => matched.to_path_buf(),
        Some(dest) if single && !dest.ends_with('/') => PathBuf::from(dest),
        Some(dest) => Path::new(dest.trim_end_matches('/')).join(matched),
    }
}

/// Clears whatever sits at `to` unless it is already a real directory and
/// `keep_dir` is set. Links are removed, never written through.
fn clear_target(to: &Path, keep_dir: bool) -> Result<()> {
    let Ok(metadata) = fs::symlink_metadata(to) else {
        return Ok(());
    };
    if metadata.is_dir() {
        if !keep_dir {
            fs::remove_dir_all(to)?;
        }
    } else {
        fs::remove_file(to)?;
    }
    Ok(())
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    clear_target(to, false)?;
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(from, to)?;
    Ok(())
}

/// Recreates the link at `from` as a link at `to`. The target is never read.
#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    let target = fs::read_link(from)?;
    clear_target(to, false)?;
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    std::os::unix::fs::symlink(target, to)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, _to: &Path) -> Result<()> {
    Err(Error::Filesystem {
        message: format!("symbolic link {} is not supported here", from.display()),
    })
}

/// Copies the tree at `from` into `to`, merging with what is already there.
fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    clear_target(to, true)?;
    fs::create_dir_all(to)?;

    let walker = WalkDir::new(from)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");
    for entry in walker {
        let entry = entry.map_err(|e| Error::Filesystem {
            message: e.to_string(),
        })?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| Error::Filesystem {
                message: e.to_string(),
            })?;
        let target = to.join(relative);
        if entry.path_is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else if entry.file_type().is_dir() {
            clear_target(&target, true)?;
            fs::create_dir_all(&target)?;
        } else {
            copy_file(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Applies vars and rules to the file at `path` in place.
///
/// Returns one message per skipped rule. Files that are not UTF-8 are left
/// untouched.
fn transform_file(
    path: &Path,
    vars: &[TemplateVar],
    rules: &[ReplacementRule],
) -> Result<Vec<String>> {
    let content = match String::from_utf8(fs::read(path)?) {
        Ok(content) => content,
        Err(_) if rules.is_empty() => return Ok(Vec::new()),
        Err(_) => {
            return Ok(vec![
                "not valid UTF-8; copied without replacements".to_string()
            ])
        }
    };

    let result = transform::transform(&content, vars, rules);
    if result.changed_from(&content) {
        fs::write(path, &result.content)?;
    }
    Ok(result.warnings.iter().map(ToString::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{self, FileSelector};
    use crate::fetcher::DirectoryFetcher;
    use tempfile::TempDir;

    /// Lays out `<root>/<repo>/<path>` for each `(repo, path, content)`.
    fn sources(files: &[(&str, &str, &str)]) -> TempDir {
        let root = TempDir::new().unwrap();
        for (repo, path, content) in files {
            let full = root.path().join(repo).join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        root
    }

    fn run(config: &SyncConfig, root: &Path, workspace: &Path) -> SyncReport {
        let fetcher = DirectoryFetcher::new(root);
        Synchronizer::new(&fetcher, workspace).run(config)
    }

    fn read(workspace: &Path, path: &str) -> String {
        fs::read_to_string(workspace.join(path)).unwrap()
    }

    #[test]
    fn test_docs_with_replacement_rule() {
        let root = sources(&[
            ("octo/templates", "docs/a.md", "TODO: write TODO"),
            ("octo/templates", "docs/b.md", "nothing TODO"),
            ("octo/templates", "docs/skip.txt", "TODO"),
        ]);
        let workspace = TempDir::new().unwrap();
        let config = config::parse(
            r#"
sources:
  - repo: octo/templates
    ref: main
    files:
      - pattern: "docs/*.md"
        replacements:
          - pattern: TODO
            replacement: DONE
            flags: g
"#,
        )
        .unwrap();

        let report = run(&config, root.path(), workspace.path());

        assert_eq!(read(workspace.path(), "docs/a.md"), "DONE: write DONE");
        assert_eq!(read(workspace.path(), "docs/b.md"), "nothing DONE");
        assert!(!workspace.path().join("docs/skip.txt").exists());
        assert_eq!(
            report.changes.files_for("octo/templates").unwrap(),
            &[PathBuf::from("docs/a.md"), PathBuf::from("docs/b.md")]
        );
        assert_eq!(report.files_synced(), 2);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_failed_source_is_skipped() {
        let root = sources(&[("octo/good", "a.txt", "a")]);
        let workspace = TempDir::new().unwrap();
        let config = config::parse(
            r#"
sources:
  - repo: octo/missing
    ref: main
    files: ["a.txt"]
  - repo: octo/good
    ref: main
    files: ["a.txt"]
"#,
        )
        .unwrap();

        let report = run(&config, root.path(), workspace.path());

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].repo, "octo/missing");
        assert!(report.changes.files_for("octo/missing").is_none());
        assert_eq!(report.changes.files_for("octo/good").unwrap().len(), 1);
        assert_eq!(read(workspace.path(), "a.txt"), "a");
    }

    #[test]
    fn test_directory_is_copied_recursively_and_not_transformed() {
        let root = sources(&[
            ("octo/ci", ".github/workflows/ci.yml", "TODO"),
            ("octo/ci", ".github/workflows/nested/lint.yml", "TODO"),
        ]);
        let workspace = TempDir::new().unwrap();
        let mut config = config::parse(
            "sources:\n  - repo: octo/ci\n    ref: main\n    files: [\".github/workflows\"]\n",
        )
        .unwrap();
        config.sources[0].selectors[0].replacements = vec![ReplacementRule {
            pattern: "TODO".to_string(),
            replacement: "DONE".to_string(),
            flags: "g".to_string(),
        }];

        let report = run(&config, root.path(), workspace.path());

        assert_eq!(read(workspace.path(), ".github/workflows/ci.yml"), "TODO");
        assert_eq!(
            read(workspace.path(), ".github/workflows/nested/lint.yml"),
            "TODO"
        );
        assert_eq!(report.files_synced(), 1);
    }

    #[test]
    fn test_zero_matches_is_a_warning() {
        let root = sources(&[("octo/a", "a.txt", "a")]);
        let workspace = TempDir::new().unwrap();
        let config = config::parse(
            "sources:\n  - repo: octo/a\n    ref: main\n    files: [\"*.md\", \"a.txt\"]\n",
        )
        .unwrap();

        testing_logger::setup();
        let report = run(&config, root.path(), workspace.path());

        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("'*.md' matched nothing"));
        assert_eq!(report.files_synced(), 1);
        testing_logger::validate(|logs| {
            assert!(logs
                .iter()
                .any(|l| l.level == log::Level::Warn && l.body.contains("matched nothing")));
        });
    }

    #[test]
    fn test_later_source_wins_same_destination() {
        let root = sources(&[
            ("octo/a", "shared.txt", "from a"),
            ("octo/b", "shared.txt", "from b"),
        ]);
        let workspace = TempDir::new().unwrap();
        let config = config::parse(
            r#"
sources:
  - repo: octo/a
    ref: main
    files: ["shared.txt"]
  - repo: octo/b
    ref: main
    files: ["shared.txt"]
"#,
        )
        .unwrap();

        let report = run(&config, root.path(), workspace.path());

        assert_eq!(read(workspace.path(), "shared.txt"), "from b");
        assert!(report.changes.files_for("octo/a").is_none());
        assert_eq!(report.files_synced(), 1);
        assert!(report.warnings[0].contains("overwrites the copy from octo/a"));
    }

    #[test]
    fn test_dest_override() {
        let root = sources(&[
            ("octo/a", "templates/README.md", "readme"),
            ("octo/a", "lint/a.toml", "a"),
            ("octo/a", "lint/b.toml", "b"),
        ]);
        let workspace = TempDir::new().unwrap();
        let source = SourceSpec {
            repo: "octo/a".to_string(),
            r#ref: "main".to_string(),
            selectors: vec![
                FileSelector {
                    dest: Some("README.md".to_string()),
                    ..FileSelector::new("templates/README.md")
                },
                FileSelector {
                    dest: Some("config/".to_string()),
                    ..FileSelector::new("lint/*.toml")
                },
            ],
            vars: Vec::new(),
        };
        let config = SyncConfig {
            sources: vec![source],
        };

        let report = run(&config, root.path(), workspace.path());

        assert_eq!(read(workspace.path(), "README.md"), "readme");
        assert_eq!(read(workspace.path(), "config/lint/a.toml"), "a");
        assert_eq!(read(workspace.path(), "config/lint/b.toml"), "b");
        assert_eq!(
            report.changes.files_for("octo/a").unwrap()[0],
            PathBuf::from("README.md")
        );
    }

    #[test]
    fn test_vars_then_rules_and_invalid_rule_isolation() {
        let root = sources(&[("octo/a", "app.cfg", "name={{NAME}} env=dev")]);
        let workspace = TempDir::new().unwrap();
        let config = config::parse(
            r#"
sources:
  - repo: octo/a
    ref: main
    vars:
      "{{NAME}}": widget
    files:
      app.cfg:
        replacements:
          - pattern: "widget"
            replacement: "gadget"
          - pattern: "("
            replacement: "x"
          - pattern: "env=(\\w+)"
            replacement: "env=$1-prod"
"#,
        )
        .unwrap();

        let report = run(&config, root.path(), workspace.path());

        assert_eq!(read(workspace.path(), "app.cfg"), "name=gadget env=dev-prod");
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].starts_with("app.cfg: skipped replacement rule #2"));
    }

    #[test]
    fn test_binary_file_is_copied_untouched() {
        let root = TempDir::new().unwrap();
        let bytes = [0xffu8, 0xfe, b'T', b'O', b'D', b'O'];
        fs::create_dir_all(root.path().join("octo/a")).unwrap();
        fs::write(root.path().join("octo/a/logo.bin"), bytes).unwrap();
        let workspace = TempDir::new().unwrap();
        let config = config::parse(
            r#"
sources:
  - repo: octo/a
    ref: main
    files:
      - pattern: logo.bin
        replacements:
          - pattern: TODO
            replacement: DONE
"#,
        )
        .unwrap();

        let report = run(&config, root.path(), workspace.path());

        assert_eq!(fs::read(workspace.path().join("logo.bin")).unwrap(), bytes);
        assert_eq!(report.files_synced(), 1);
        assert!(report.warnings[0].contains("not valid UTF-8"));
    }

    #[test]
    fn test_file_replaces_directory() {
        let root = sources(&[("octo/a", "docs", "now a file")]);
        let workspace = TempDir::new().unwrap();
        fs::create_dir_all(workspace.path().join("docs/old")).unwrap();
        let config =
            config::parse("sources:\n  - repo: octo/a\n    ref: main\n    files: [docs]\n")
                .unwrap();

        run(&config, root.path(), workspace.path());
        assert_eq!(read(workspace.path(), "docs"), "now a file");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_recreated_not_dereferenced() {
        use std::os::unix::fs::symlink;

        let secret = TempDir::new().unwrap();
        let secret_file = secret.path().join("credentials");
        fs::write(&secret_file, "RUNNER SECRET").unwrap();
        let root = sources(&[
            ("octo/a", "docs/a.md", "TODO"),
            ("octo/a", "tree/real.txt", "real"),
        ]);
        let repo = root.path().join("octo/a");
        symlink(&secret_file, repo.join("leak.md")).unwrap();
        symlink(&secret_file, repo.join("tree/leak.txt")).unwrap();

        let workspace = TempDir::new().unwrap();
        let config = config::parse(
            r#"
sources:
  - repo: octo/a
    ref: main
    files:
      - pattern: "*.md"
        replacements:
          - pattern: SECRET
            replacement: REDACTED
      - tree
"#,
        )
        .unwrap();

        let report = run(&config, root.path(), workspace.path());

        for path in ["leak.md", "tree/leak.txt"] {
            let copied = workspace.path().join(path);
            assert!(fs::symlink_metadata(&copied).unwrap().file_type().is_symlink());
            assert_eq!(fs::read_link(&copied).unwrap(), secret_file);
        }
        assert_eq!(read(workspace.path(), "tree/real.txt"), "real");
        // The replacement rule never wrote through the link.
        assert_eq!(fs::read_to_string(&secret_file).unwrap(), "RUNNER SECRET");
        assert_eq!(report.files_synced(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_workspace_link_is_replaced_not_written_through() {
        use std::os::unix::fs::symlink;

        let outside = TempDir::new().unwrap();
        let victim = outside.path().join("victim.txt");
        fs::write(&victim, "untouched").unwrap();
        let root = sources(&[("octo/a", "a.txt", "from source")]);
        let workspace = TempDir::new().unwrap();
        symlink(&victim, workspace.path().join("a.txt")).unwrap();

        let config =
            config::parse("sources:\n  - repo: octo/a\n    ref: main\n    files: [a.txt]\n")
                .unwrap();
        run(&config, root.path(), workspace.path());

        assert_eq!(read(workspace.path(), "a.txt"), "from source");
        assert!(!fs::symlink_metadata(workspace.path().join("a.txt"))
            .unwrap()
            .file_type()
            .is_symlink());
        assert_eq!(fs::read_to_string(&victim).unwrap(), "untouched");
    }

    #[test]
    fn test_repeated_repo_entries_share_a_bucket() {
        let root = sources(&[("octo/a", "one.txt", "1"), ("octo/a", "two.txt", "2")]);
        let workspace = TempDir::new().unwrap();
        let config = config::parse(
            r#"
sources:
  - repo: octo/a
    ref: main
    files: ["one.txt"]
  - repo: octo/a
    ref: main
    files: ["two.txt"]
"#,
        )
        .unwrap();

        let report = run(&config, root.path(), workspace.path());
        assert_eq!(report.changes.iter().count(), 1);
        assert_eq!(report.files_synced(), 2);
    }

    #[test]
    fn test_destination() {
        let matched = Path::new("lint/a.toml");
        assert_eq!(destination(matched, None, true), matched);
        assert_eq!(
            destination(matched, Some("ruff.toml"), true),
            PathBuf::from("ruff.toml")
        );
        assert_eq!(
            destination(matched, Some("ruff.toml"), false),
            PathBuf::from("ruff.toml/lint/a.toml")
        );
        assert_eq!(
            destination(matched, Some("config/"), true),
            PathBuf::from("config/lint/a.toml")
        );
    }
}
