//! # Validate Command Implementation
//!
//! Parses and validates a sync configuration, then prints what each source
//! would contribute. Nothing is fetched and no file is modified.

use anyhow::Result;
use clap::Args;
use std::path::{Path, PathBuf};

use repo_file_sync::config::{self, SyncConfig};
use repo_file_sync::settings::DEFAULT_CONFIG_PATH;

use crate::output::OutputConfig;

/// Validate a sync configuration file
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the sync configuration, relative to the workspace
    #[arg(short, long, value_name = "FILE", env = "INPUT_CONFIG_PATH", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Directory relative config paths are resolved against
    #[arg(short, long, value_name = "DIR", env = "GITHUB_WORKSPACE")]
    pub workspace: Option<PathBuf>,
}

impl ValidateArgs {
    /// Empty values, as passed for unset action inputs, fall back to the
    /// defaults.
    fn config_path(&self) -> PathBuf {
        let config = if self.config.as_os_str().is_empty() {
            Path::new(DEFAULT_CONFIG_PATH)
        } else {
            self.config.as_path()
        };
        let workspace = self
            .workspace
            .as_ref()
            .filter(|w| !w.as_os_str().is_empty());
        match workspace {
            Some(workspace) if config.is_relative() => workspace.join(config),
            _ => config.to_path_buf(),
        }
    }
}

/// Execute the `validate` command.
pub fn execute(args: ValidateArgs, out: &OutputConfig) -> Result<()> {
    let path = args.config_path();
    println!(
        "{} Validating configuration: {}",
        out.emoji("🔍", "[SCAN]"),
        path.display()
    );

    if !path.exists() {
        anyhow::bail!("Configuration file not found: {}", path.display());
    }

    let config = match config::from_file(&path) {
        Ok(config) => config,
        Err(e) => {
            println!("{} {}", out.emoji("❌", "[ERR]"), e);
            return Err(anyhow::anyhow!("Configuration is invalid: {}", e));
        }
    };

    print_summary(out, &config);
    println!(
        "\n{} {}",
        out.emoji("✅", "[OK]"),
        out.success("Configuration is valid")
    );
    Ok(())
}

fn print_summary(out: &OutputConfig, config: &SyncConfig) {
    println!("\n{} Configuration Summary:", out.emoji("📊", "[INFO]"));
    println!("   Sources: {}", config.sources.len());
    println!("   Selectors: {}", config.selector_count());

    for source in &config.sources {
        println!();
        println!("   {}@{}", source.repo, source.r#ref);
        if !source.vars.is_empty() {
            println!("     vars: {}", source.vars.len());
        }
        for selector in &source.selectors {
            let mut line = format!("     - {}", selector.pattern);
            if let Some(dest) = &selector.dest {
                line.push_str(&format!(" -> {}", dest));
            }
            if !selector.replacements.is_empty() {
                line.push_str(&format!(
                    " ({} replacement rule(s))",
                    selector.replacements.len()
                ));
            }
            println!("{}", line);
        }
    }
}
