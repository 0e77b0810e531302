//! # Output Configuration
//!
//! Controls how the CLI presents itself: colors and emoji in the run
//! summary, and GitHub workflow-command annotations in the log stream.
//!
//! ## Respecting User Preferences
//!
//! Color follows the `--color` flag and, in `auto` mode, the environment:
//! - `NO_COLOR` - Disables colors when set (per https://no-color.org/)
//! - `CLICOLOR=0` - Disables colors
//! - `CLICOLOR_FORCE=1` - Forces colors even in non-TTY
//! - `TERM=dumb` - Disables colors for dumb terminals
//!
//! ## Annotations
//!
//! With annotations on, warning and error log lines are emitted as
//! `::warning::` / `::error::` workflow commands so they surface on the run
//! page. Other lines are printed unchanged.

use clap::ValueEnum;
use log::Level;
use std::env;

/// Value of the `--color` flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    /// Detect from the terminal and environment
    #[default]
    Auto,
    /// Always use colors and emoji
    Always,
    /// Never use colors and emoji
    Never,
}

/// Presentation settings for one invocation.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Whether colors and emojis should be used in output.
    pub use_color: bool,
    /// Whether warnings and errors are logged as workflow commands.
    pub annotations: bool,
}

impl OutputConfig {
    /// Resolves the color choice against the environment.
    pub fn new(color: ColorChoice, annotations: bool) -> Self {
        let use_color = match color {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => Self::detect_color_support(),
        };
        Self {
            use_color,
            annotations,
        }
    }

    fn detect_color_support() -> bool {
        // The presence of NO_COLOR, even empty, disables colors
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }

        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }

        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }

        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }

        console::Term::stdout().features().colors_supported()
    }

    /// The emoji when colors are on, otherwise the plain marker.
    pub fn emoji<'a>(&self, emoji: &'a str, plain: &'a str) -> &'a str {
        if self.use_color {
            emoji
        } else {
            plain
        }
    }

    /// Styles `text` green when colors are on.
    pub fn success(&self, text: &str) -> String {
        if self.use_color {
            console::style(text).green().to_string()
        } else {
            text.to_string()
        }
    }

    /// Styles `text` yellow when colors are on.
    pub fn warning(&self, text: &str) -> String {
        if self.use_color {
            console::style(text).yellow().to_string()
        } else {
            text.to_string()
        }
    }

    #[cfg(test)]
    pub fn plain() -> Self {
        Self {
            use_color: false,
            annotations: false,
        }
    }
}

/// Formats a log line as a workflow command when its level has one.
pub fn annotation(level: Level, message: &str) -> Option<String> {
    let command = match level {
        Level::Error => "error",
        Level::Warn => "warning",
        _ => return None,
    };
    Some(format!("::{}::{}", command, escape_annotation(message)))
}

/// Escapes the characters workflow commands reserve in their message.
fn escape_annotation(message: &str) -> String {
    message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}
