//! # Pattern Resolution
//!
//! Expands a glob pattern against a materialized source tree into the ordered
//! list of entries it selects.
//!
//! Patterns support `*`, `?`, `**`, bracket classes (`[abc]`, `[!abc]`) and
//! brace alternatives (`{a,b}`, nested). Matching is case-sensitive and
//! anchored at the tree root; `*` never crosses a `/`, and hidden entries
//! are only matched by patterns that spell out the leading dot. `.git`
//! directories are never visited.
//!
//! Both files and directories can match. Results are returned in lexical
//! order of their `/`-separated relative path, deduplicated across brace
//! alternatives, so repeated runs over an unchanged tree yield identical
//! output.

use crate::error::{Error, Result};
use glob::{MatchOptions, Pattern};
use log::warn;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Kind of a matched tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    /// A symbolic link, never followed.
    Symlink,
}

/// A single entry selected by a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Path relative to the tree root.
    pub path: PathBuf,
    pub kind: EntryKind,
}

impl Match {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == EntryKind::Symlink
    }
}

/// Options shared by every pattern match.
pub fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    }
}

/// Expands `{a,b}` alternatives into plain glob patterns.
///
/// Groups without a top-level comma are kept literally, and braces inside a
/// bracket class are not treated as groups.
///
/// # Examples
///
/// ```
/// use repo_file_sync::resolver::expand_braces;
///
/// assert_eq!(
///     expand_braces("src/{lib,main}.rs"),
///     vec!["src/lib.rs".to_string(), "src/main.rs".to_string()]
/// );
/// ```
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some((open, close, alternatives)) = find_brace_group(pattern) else {
        return vec![pattern.to_string()];
    };

    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];
    let mut expanded = Vec::new();
    for alternative in alternatives {
        for candidate in expand_braces(&format!("{}{}{}", prefix, alternative, suffix)) {
            if !expanded.contains(&candidate) {
                expanded.push(candidate);
            }
        }
    }
    expanded
}

fn find_brace_group(pattern: &str) -> Option<(usize, usize, Vec<&str>)> {
    let mut in_class = false;
    for (index, byte) in pattern.bytes().enumerate() {
        match byte {
            b'[' if !in_class => in_class = true,
            b']' if in_class => in_class = false,
            b'{' if !in_class => {
                if let Some(group) = scan_group(pattern, index) {
                    return Some(group);
                }
            }
            _ => {}
        }
    }
    None
}

fn scan_group(pattern: &str, open: usize) -> Option<(usize, usize, Vec<&str>)> {
    let mut depth = 0usize;
    let mut parts = Vec::new();
    let mut start = open + 1;

    for (offset, byte) in pattern.as_bytes()[open..].iter().enumerate() {
        let index = open + offset;
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    parts.push(&pattern[start..index]);
                    return (parts.len() > 1).then_some((open, index, parts));
                }
            }
            b',' if depth == 1 => {
                parts.push(&pattern[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    None
}

fn normalize(pattern: &str) -> &str {
    let mut pattern = pattern.trim();
    while let Some(stripped) = pattern.strip_prefix("./") {
        pattern = stripped;
    }
    pattern.trim_start_matches('/').trim_end_matches('/')
}

/// Compiles every brace alternative of `pattern`.
pub fn compile(pattern: &str) -> Result<Vec<Pattern>> {
    expand_braces(normalize(pattern))
        .iter()
        .map(|p| Pattern::new(p).map_err(Error::Glob))
        .collect()
}

fn is_literal(segment: &str) -> bool {
    !segment.contains(['*', '?', '['])
}

/// Splits off the leading path segments that contain no glob syntax.
///
/// Returns the literal prefix and whether the whole pattern was literal.
fn literal_prefix(pattern: &str) -> (PathBuf, bool) {
    let mut prefix = PathBuf::new();
    for segment in pattern.split('/') {
        if segment.is_empty() {
            continue;
        }
        if !is_literal(segment) {
            return (prefix, false);
        }
        prefix.push(segment);
    }
    (prefix, true)
}

/// Whether reaching `prefix` under `root` passes through a symlinked
/// directory. The last component is not checked.
fn crosses_symlink(root: &Path, prefix: &Path) -> bool {
    let components: Vec<_> = prefix.components().collect();
    let mut current = root.to_path_buf();
    for component in components.iter().take(components.len().saturating_sub(1)) {
        current.push(component);
        if fs::symlink_metadata(&current).is_ok_and(|m| m.file_type().is_symlink()) {
            return true;
        }
    }
    false
}

fn stays_inside(relative: &Path) -> bool {
    relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
}

fn to_slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolves `pattern` against the tree rooted at `root`.
///
/// An empty result is not an error; callers decide how to report it.
pub fn resolve(root: &Path, pattern: &str) -> Result<Vec<Match>> {
    let options = match_options();
    let mut found: BTreeMap<String, Match> = BTreeMap::new();

    for alternative in expand_braces(normalize(pattern)) {
        let compiled = Pattern::new(&alternative).map_err(Error::Glob)?;
        let (prefix, fully_literal) = literal_prefix(&alternative);
        if !stays_inside(&prefix) {
            warn!("Ignoring '{}': it leaves the source tree", alternative);
            continue;
        }
        let base = root.join(&prefix);
        if fs::symlink_metadata(&base).is_err() || crosses_symlink(root, &prefix) {
            continue;
        }

        let mut walker = WalkDir::new(&base)
            .follow_root_links(false)
            .sort_by_file_name();
        if fully_literal {
            walker = walker.max_depth(0);
        }

        let entries = walker
            .into_iter()
            .filter_entry(|entry| entry.file_name() != ".git");
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry while matching '{}': {}", pattern, e);
                    continue;
                }
            };
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            if relative.as_os_str().is_empty() {
                continue;
            }

            let key = to_slash_path(relative);
            if found.contains_key(&key) || !compiled.matches_with(&key, options) {
                continue;
            }
            let kind = if entry.path_is_symlink() {
                EntryKind::Symlink
            } else if entry.file_type().is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            found.insert(
                key,
                Match {
                    path: relative.to_path_buf(),
                    kind,
                },
            );
        }
    }

    Ok(found.into_values().collect())
}
