//! # Content Transformation
//!
//! Pure text rewriting for copied files. Two independent passes run in a
//! fixed order:
//!
//! 1. **Template variables**: literal `key -> value` substring substitution,
//!    every occurrence, vars applied in declared order.
//! 2. **Replacement rules**: regex substitutions, each rule applied to the
//!    output of the previous one.
//!
//! Keeping the passes separate means a var key is never interpreted as regex
//! syntax. A rule whose pattern or flags do not compile is skipped and
//! reported as a [`RuleWarning`]; the remaining rules still apply.
//!
//! ## Flags
//!
//! | Flag | Effect                                   |
//! |------|------------------------------------------|
//! | `g`  | replace every match (default: first only) |
//! | `i`  | case-insensitive                          |
//! | `m`  | `^`/`$` match at line boundaries          |
//! | `s`  | `.` matches newlines                      |
//! | `u`  | Unicode (always on)                       |
//! | `x`  | ignore whitespace in the pattern          |
//!
//! ## Replacement Templates
//!
//! `$1`..`$99` insert a numbered group, `$<name>` a named group, `$&` the
//! whole match, `` $` `` / `$'` the text before / after the match, and `$$`
//! a literal dollar. Anything else is copied verbatim.

use crate::config::{ReplacementRule, TemplateVar};
use crate::error::{Error, Result};
use regex::{Captures, Regex, RegexBuilder};
use std::fmt;

/// A rule that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleWarning {
    /// Position of the rule in its selector, starting at 0.
    pub index: usize,
    pub pattern: String,
    pub flags: String,
    pub message: String,
}

impl fmt::Display for RuleWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "skipped replacement rule #{} '{}' (flags: '{}'): {}",
            self.index + 1,
            self.pattern,
            self.flags,
            self.message
        )
    }
}

/// The result of transforming one file's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformed {
    pub content: String,
    /// Number of rules that compiled and ran (whether or not they matched).
    pub applied: usize,
    pub warnings: Vec<RuleWarning>,
}

impl Transformed {
    pub fn changed_from(&self, original: &str) -> bool {
        self.content != original
    }
}

/// A replacement rule ready to run.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    regex: Regex,
    global: bool,
    template: String,
}

impl CompiledRule {
    /// Compiles `rule`, validating its flags.
    pub fn new(rule: &ReplacementRule) -> Result<Self> {
        let mut builder = RegexBuilder::new(&rule.pattern);
        let mut global = false;
        let mut seen = String::new();

        for flag in rule.flags.chars() {
            if seen.contains(flag) {
                return Err(Error::RuleFlags {
                    flags: rule.flags.clone(),
                    message: format!("duplicate flag '{}'", flag),
                });
            }
            seen.push(flag);
            match flag {
                'g' => global = true,
                'i' => {
                    builder.case_insensitive(true);
                }
                'm' => {
                    builder.multi_line(true);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                'u' => {
                    builder.unicode(true);
                }
                'x' => {
                    builder.ignore_whitespace(true);
                }
                other => {
                    return Err(Error::RuleFlags {
                        flags: rule.flags.clone(),
                        message: format!("unsupported flag '{}'", other),
                    })
                }
            }
        }

        let regex = builder.build()?;
        Ok(Self {
            regex,
            global,
            template: rule.replacement.clone(),
        })
    }

    /// Applies the rule to `content`.
    pub fn apply(&self, content: &str) -> String {
        let has_names = self.regex.capture_names().any(|name| name.is_some());
        let replacer = |caps: &Captures<'_>| {
            let mut out = String::new();
            expand_template(&self.template, caps, content, has_names, &mut out);
            out
        };
        if self.global {
            self.regex.replace_all(content, replacer).into_owned()
        } else {
            self.regex.replace(content, replacer).into_owned()
        }
    }
}

/// Expands a replacement template for one match into `out`.
fn expand_template(
    template: &str,
    caps: &Captures<'_>,
    haystack: &str,
    has_names: bool,
    out: &mut String,
) {
    let bytes = template.as_bytes();
    let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'$' || i + 1 >= bytes.len() {
            i += 1;
            continue;
        }
        out.push_str(&template[literal_start..i]);

        let consumed = match bytes[i + 1] {
            b'$' => {
                out.push('$');
                2
            }
            b'&' => {
                out.push_str(&haystack[whole.0..whole.1]);
                2
            }
            b'`' => {
                out.push_str(&haystack[..whole.0]);
                2
            }
            b'\'' => {
                out.push_str(&haystack[whole.1..]);
                2
            }
            b'0'..=b'9' => group_reference(bytes, i, caps, out),
            b'<' if has_names => match template[i + 2..].find('>') {
                Some(end) => {
                    let name = &template[i + 2..i + 2 + end];
                    if let Some(m) = caps.name(name) {
                        out.push_str(m.as_str());
                    }
                    end + 3
                }
                None => {
                    out.push('$');
                    1
                }
            },
            _ => {
                out.push('$');
                1
            }
        };

        i += consumed;
        literal_start = i;
    }
    out.push_str(&template[literal_start..]);
}

/// Handles `$n` / `$nn` at `bytes[at]`, returning the bytes consumed.
///
/// Two digits are preferred when they name an existing group, mirroring the
/// usual regex-replacement convention; `$0` and out-of-range groups are kept
/// literally.
fn group_reference(bytes: &[u8], at: usize, caps: &Captures<'_>, out: &mut String) -> usize {
    let groups = caps.len();
    let first = (bytes[at + 1] - b'0') as usize;

    if let Some(second) = bytes.get(at + 2).filter(|b| b.is_ascii_digit()) {
        let two = first * 10 + (*second - b'0') as usize;
        if two >= 1 && two < groups {
            if let Some(m) = caps.get(two) {
                out.push_str(m.as_str());
            }
            return 3;
        }
    }

    if first >= 1 && first < groups {
        if let Some(m) = caps.get(first) {
            out.push_str(m.as_str());
        }
        return 2;
    }

    out.push('$');
    1
}

/// Applies literal substitutions for every var, in declared order.
pub fn apply_vars(content: &str, vars: &[TemplateVar]) -> String {
    let mut content = content.to_string();
    for var in vars.iter().filter(|v| !v.key.is_empty()) {
        if content.contains(&var.key) {
            content = content.replace(&var.key, &var.value);
        }
    }
    content
}

/// Applies `rules` sequentially, skipping any that fail to compile.
pub fn apply_rules(content: &str, rules: &[ReplacementRule]) -> Transformed {
    let mut current = content.to_string();
    let mut applied = 0;
    let mut warnings = Vec::new();

    for (index, rule) in rules.iter().enumerate() {
        match CompiledRule::new(rule) {
            Ok(compiled) => {
                current = compiled.apply(&current);
                applied += 1;
            }
            Err(e) => warnings.push(RuleWarning {
                index,
                pattern: rule.pattern.clone(),
                flags: rule.flags.clone(),
                message: e.to_string(),
            }),
        }
    }

    Transformed {
        content: current,
        applied,
        warnings,
    }
}

/// Runs the var pass, then the rule pass.
pub fn transform(content: &str, vars: &[TemplateVar], rules: &[ReplacementRule]) -> Transformed {
    let substituted = apply_vars(content, vars);
    apply_rules(&substituted, rules)
}
