//! CLI argument parsing, logger setup and command dispatch

use std::io::Write;

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;

use crate::commands;
use crate::output::{self, ColorChoice, OutputConfig};

/// repo-file-sync - Keep files in sync across repositories through pull requests
#[derive(Parser, Debug)]
#[command(name = "repo-file-sync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output
    #[arg(long, global = true, value_name = "WHEN", value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    /// Set log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(
        long,
        global = true,
        value_name = "LEVEL",
        default_value = "info",
        value_parser = ["off", "error", "warn", "info", "debug", "trace"]
    )]
    log_level: String,

    /// Emit warnings and errors as GitHub workflow annotations
    #[arg(long, global = true, env = "GITHUB_ACTIONS")]
    annotations: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync files from the configured sources and reconcile the pull request
    Sync(commands::sync::SyncArgs),

    /// Validate a sync configuration without fetching anything
    Validate(commands::validate::ValidateArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        let out = OutputConfig::new(self.color, self.annotations);
        init_logging(&self.log_level, out.annotations);

        match self.command {
            Commands::Sync(args) => commands::sync::execute(args, &out),
            Commands::Validate(args) => commands::validate::execute(args, &out),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}

fn init_logging(level: &str, annotations: bool) {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or(level));
    if annotations {
        builder.format(|buf, record| {
            let message = record.args().to_string();
            match output::annotation(record.level(), &message) {
                Some(line) => writeln!(buf, "{}", line),
                None => writeln!(buf, "{}", message),
            }
        });
    } else {
        builder.format_timestamp(None).format_target(false);
    }
    // A logger may already be installed when embedded in tests.
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "repo-file-sync",
            "validate",
            "--color",
            "never",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.color, ColorChoice::Never);
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        assert!(Cli::try_parse_from(["repo-file-sync", "--log-level", "loud", "validate"]).is_err());
    }
}
