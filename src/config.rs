//! # Configuration Schema and Parsing
//!
//! This module defines the normalized sync configuration and the adapter that
//! turns any accepted surface syntax into it. The engine only ever sees
//! [`SyncConfig`]; nothing downstream branches on the shape of the file.
//!
//! ## Accepted Formats
//!
//! A list of sources:
//!
//! ```yaml
//! sources:
//!   - repo: octo/templates
//!     ref: main
//!     files:
//!       - LICENSE
//!       - "docs/*.md":
//!           replacements:
//!             - { pattern: "TODO", replacement: "DONE", flags: "g" }
//!     vars:
//!       - { key: "{{PROJECT}}", value: "widgets" }
//! ```
//!
//! or a map keyed by repository, where `ref` may be omitted to track the
//! remote's default branch:
//!
//! ```yaml
//! repos:
//!   octo/templates:
//!     files:
//!       "docs/*.md": { replacements: [...] }
//!       ".github/workflows/ci.yml": { dest: ".github/workflows/upstream-ci.yml" }
//! ```
//!
//! `files` may be a list of patterns, a list mixing patterns and single-key
//! `{pattern: options}` maps, a list of explicit `{pattern, replacements,
//! dest}` objects, or a `{pattern: options}` map. Map order is preserved.
//!
//! Validation fails fast on the first violated constraint.

use crate::error::{Error, Result};
use crate::resolver;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::path::{Component, Path};

/// Ref used for sources that do not pin one: the remote's default branch.
pub const DEFAULT_REF: &str = "HEAD";

/// A regex substitution applied to the content of a copied file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplacementRule {
    /// Regular expression source.
    pub pattern: String,
    /// Substitution template; may reference capture groups (`$1`, `$<name>`).
    pub replacement: String,
    /// Regex flags such as `g` or `gi`. Without `g` only the first match is
    /// replaced.
    #[serde(default)]
    pub flags: String,
}

/// A literal substring substitution applied to every occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateVar {
    pub key: String,
    pub value: String,
}

/// A glob pattern plus the rules applied to the files it selects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSelector {
    /// Glob pattern, relative to the source tree root.
    pub pattern: String,
    /// Rules applied in declared order, each to the output of the previous.
    #[serde(default)]
    pub replacements: Vec<ReplacementRule>,
    /// Optional destination override, relative to the workspace root.
    #[serde(default)]
    pub dest: Option<String>,
}

impl FileSelector {
    /// A selector with no replacement rules and no destination override.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacements: Vec::new(),
            dest: None,
        }
    }
}

/// One source repository to pull from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSpec {
    /// `owner/name` identifier.
    pub repo: String,
    /// Branch, tag or commit to materialize.
    pub r#ref: String,
    /// Selectors, processed in declared order.
    pub selectors: Vec<FileSelector>,
    /// Literal substitutions applied to every file this source copies,
    /// before any regex rule.
    pub vars: Vec<TemplateVar>,
}

/// The normalized sync configuration.
///
/// Sources are processed in the order they appear here, which is also the
/// order used in logs and in the pull request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncConfig {
    pub sources: Vec<SourceSpec>,
}

impl SyncConfig {
    /// Total number of selectors across all sources.
    pub fn selector_count(&self) -> usize {
        self.sources.iter().map(|s| s.selectors.len()).sum()
    }
}

/// Options attached to a pattern in the `{pattern: options}` forms.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SelectorOptions {
    #[serde(default)]
    replacements: Vec<ReplacementRule>,
    #[serde(default)]
    dest: Option<String>,
}

/// Parses a YAML (or JSON) document into a validated [`SyncConfig`].
pub fn parse(content: &str) -> Result<SyncConfig> {
    let value: Value = serde_yaml::from_str(content)?;

    let root = match value {
        Value::Mapping(map) => map,
        Value::Null => return Err(Error::config("configuration is empty")),
        _ => return Err(Error::config("configuration must be a mapping")),
    };

    let sources = if let Some(sources) = root.get("sources") {
        parse_sources_list(sources)?
    } else if let Some(repos) = root.get("repos") {
        parse_repos_map(repos)?
    } else {
        return Err(Error::ConfigParse {
            message: "neither 'sources' nor 'repos' is present".to_string(),
            hint: Some("Declare a 'sources:' list or a 'repos:' map".to_string()),
        });
    };

    let config = SyncConfig { sources };
    validate(&config)?;
    Ok(config)
}

/// Reads and parses a configuration file.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<SyncConfig> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}

/// Reads a configuration file, returning `None` when it does not exist.
pub fn load_optional<P: AsRef<Path>>(path: P) -> Result<Option<SyncConfig>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    from_file(path).map(Some)
}

fn parse_sources_list(value: &Value) -> Result<Vec<SourceSpec>> {
    let entries = value
        .as_sequence()
        .ok_or_else(|| Error::config("'sources' must be a list"))?;

    let mut sources = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let label = format!("source #{}", index + 1);
        let map = entry
            .as_mapping()
            .ok_or_else(|| Error::config(format!("{} must be a mapping", label)))?;
        reject_unknown_keys(map, &["repo", "ref", "files", "vars"], &label)?;

        let repo = required_string(map, "repo", &label)?;
        let label = format!("source '{}'", repo);
        let r#ref = required_string(map, "ref", &label)?;
        sources.push(build_source(repo, r#ref, map, &label)?);
    }
    Ok(sources)
}

fn parse_repos_map(value: &Value) -> Result<Vec<SourceSpec>> {
    let repos = value
        .as_mapping()
        .ok_or_else(|| Error::config("'repos' must be a map of repository to settings"))?;

    let mut sources = Vec::with_capacity(repos.len());
    for (key, settings) in repos {
        let repo = key
            .as_str()
            .ok_or_else(|| Error::config("'repos' keys must be strings"))?
            .to_string();
        let label = format!("source '{}'", repo);
        let map = settings
            .as_mapping()
            .ok_or_else(|| Error::config(format!("{} must be a mapping", label)))?;
        reject_unknown_keys(map, &["ref", "files", "vars"], &label)?;

        let r#ref = match map.get("ref") {
            None | Some(Value::Null) => DEFAULT_REF.to_string(),
            Some(_) => required_string(map, "ref", &label)?,
        };
        sources.push(build_source(repo, r#ref, map, &label)?);
    }
    Ok(sources)
}

fn build_source(repo: String, r#ref: String, map: &Mapping, label: &str) -> Result<SourceSpec> {
    let files = map.get("files").ok_or_else(|| Error::ConfigParse {
        message: format!("{} is missing 'files'", label),
        hint: Some("List at least one glob pattern under 'files:'".to_string()),
    })?;
    let selectors = parse_selectors(files, label)?;
    let vars = match map.get("vars") {
        None | Some(Value::Null) => Vec::new(),
        Some(vars) => parse_vars(vars, label)?,
    };

    Ok(SourceSpec {
        repo,
        r#ref,
        selectors,
        vars,
    })
}

fn parse_selectors(value: &Value, label: &str) -> Result<Vec<FileSelector>> {
    match value {
        Value::Sequence(items) => {
            let mut selectors = Vec::new();
            for item in items {
                match item {
                    Value::String(pattern) => selectors.push(FileSelector::new(pattern.clone())),
                    Value::Mapping(map) if map.contains_key("pattern") => {
                        let selector: FileSelector = serde_yaml::from_value(item.clone())
                            .map_err(|e| Error::config(format!("{}: {}", label, e)))?;
                        selectors.push(selector);
                    }
                    Value::Mapping(map) => {
                        for (pattern, options) in map {
                            selectors.push(selector_with_options(pattern, options, label)?);
                        }
                    }
                    _ => {
                        return Err(Error::config(format!(
                            "{}: each 'files' entry must be a pattern string or a mapping",
                            label
                        )))
                    }
                }
            }
            Ok(selectors)
        }
        Value::Mapping(map) => map
            .iter()
            .map(|(pattern, options)| selector_with_options(pattern, options, label))
            .collect(),
        _ => Err(Error::config(format!(
            "{}: 'files' must be a list or a map",
            label
        ))),
    }
}

fn selector_with_options(pattern: &Value, options: &Value, label: &str) -> Result<FileSelector> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| Error::config(format!("{}: file patterns must be strings", label)))?
        .to_string();

    let options = match options {
        Value::Null => SelectorOptions::default(),
        other => serde_yaml::from_value(other.clone())
            .map_err(|e| Error::config(format!("{}, pattern '{}': {}", label, pattern, e)))?,
    };

    Ok(FileSelector {
        pattern,
        replacements: options.replacements,
        dest: options.dest,
    })
}

fn parse_vars(value: &Value, label: &str) -> Result<Vec<TemplateVar>> {
    match value {
        Value::Sequence(_) => serde_yaml::from_value(value.clone())
            .map_err(|e| Error::config(format!("{}: invalid 'vars': {}", label, e))),
        Value::Mapping(map) => map
            .iter()
            .map(|(key, value)| match (key.as_str(), value.as_str()) {
                (Some(key), Some(value)) => Ok(TemplateVar {
                    key: key.to_string(),
                    value: value.to_string(),
                }),
                _ => Err(Error::config(format!(
                    "{}: 'vars' keys and values must be strings",
                    label
                ))),
            })
            .collect(),
        _ => Err(Error::config(format!(
            "{}: 'vars' must be a list of {{key, value}} or a map",
            label
        ))),
    }
}

fn required_string(map: &Mapping, key: &str, label: &str) -> Result<String> {
    match map.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(Error::config(format!("{}: '{}' is empty", label, key))),
        Some(_) => Err(Error::config(format!("{}: '{}' must be a string", label, key))),
        None => Err(Error::config(format!("{} is missing '{}'", label, key))),
    }
}

fn reject_unknown_keys(map: &Mapping, known: &[&str], label: &str) -> Result<()> {
    for key in map.keys() {
        let name = key.as_str().unwrap_or("<non-string>");
        if !known.contains(&name) {
            return Err(Error::ConfigParse {
                message: format!("{}: unknown key '{}'", label, name),
                hint: Some(format!("Expected one of: {}", known.join(", "))),
            });
        }
    }
    Ok(())
}

/// Checks the structural invariants of a normalized configuration.
pub fn validate(config: &SyncConfig) -> Result<()> {
    if config.sources.is_empty() {
        return Err(Error::config("sources must not be empty"));
    }

    for source in &config.sources {
        let label = format!("source '{}'", source.repo);
        validate_repo(&source.repo)?;
        if source.r#ref.trim().is_empty() {
            return Err(Error::config(format!("{}: 'ref' is empty", label)));
        }
        if source.selectors.is_empty() {
            return Err(Error::config(format!("{}: 'files' is empty", label)));
        }

        for selector in &source.selectors {
            if selector.pattern.trim().is_empty() {
                return Err(Error::config(format!("{}: empty file pattern", label)));
            }
            resolver::compile(&selector.pattern).map_err(|e| {
                Error::config(format!(
                    "{}: invalid pattern '{}': {}",
                    label, selector.pattern, e
                ))
            })?;
            let escapes = resolver::expand_braces(selector.pattern.trim())
                .iter()
                .any(|alternative| alternative.split('/').any(|segment| segment == ".."));
            if escapes {
                return Err(Error::ConfigParse {
                    message: format!(
                        "{}: pattern '{}' must stay inside the source repository",
                        label, selector.pattern
                    ),
                    hint: Some("Remove '..' segments from the pattern".to_string()),
                });
            }
            if let Some(dest) = &selector.dest {
                validate_dest(dest).map_err(|message| {
                    Error::config(format!(
                        "{}, pattern '{}': {}",
                        label, selector.pattern, message
                    ))
                })?;
            }
        }

        if source.vars.iter().any(|var| var.key.is_empty()) {
            return Err(Error::config(format!("{}: 'vars' key is empty", label)));
        }
    }

    Ok(())
}

fn validate_repo(repo: &str) -> Result<()> {
    let well_formed = !repo.chars().any(char::is_whitespace)
        && repo.contains('/')
        && repo
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if well_formed {
        Ok(())
    } else {
        Err(Error::ConfigParse {
            message: format!("invalid repository identifier '{}'", repo),
            hint: Some("Use the 'owner/name' form, e.g. 'octo/templates'".to_string()),
        })
    }
}

fn validate_dest(dest: &str) -> std::result::Result<(), String> {
    let path = Path::new(dest);
    if dest.trim().is_empty() {
        return Err("'dest' is empty".to_string());
    }
    if path.is_absolute() {
        return Err(format!("'dest' must be relative, got '{}'", dest));
    }
    let mut components = path.components().peekable();
    if matches!(components.peek(), Some(Component::Normal(first)) if *first == ".git") {
        return Err("'dest' must not point into .git".to_string());
    }
    if components.any(|c| matches!(c, Component::ParentDir | Component::Prefix(_))) {
        return Err(format!("'dest' must stay inside the workspace, got '{}'", dest));
    }
    Ok(())
}
