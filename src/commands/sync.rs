//! # Sync Command Implementation
//!
//! Runs the full pipeline against a destination working tree: fetch the
//! configured sources, copy and transform their files, and reconcile the
//! result into the sync branch and its pull request.
//!
//! Every option can also be supplied through the environment variables a
//! GitHub Actions step exposes (`INPUT_*`, `GITHUB_*`), so the binary runs
//! unchanged as an action entrypoint. Actions passes unset inputs as empty
//! strings, so an empty value always means "use the default". Outputs are
//! appended to `GITHUB_OUTPUT` when it is set.

use anyhow::{Context, Result};
use clap::builder::FalseyValueParser;
use clap::Args;
use log::warn;
use std::ffi::OsStr;
use std::path::PathBuf;

use repo_file_sync::fetcher::{DirectoryFetcher, GitFetcher, SourceFetcher, DEFAULT_BASE_URL};
use repo_file_sync::hosting::{Committer, GitHubCli};
use repo_file_sync::pipeline::{self, RunReport};
use repo_file_sync::reconcile::ReconcileState;
use repo_file_sync::settings::{
    parse_labels, ReconcileSettings, RunSettings, DEFAULT_BRANCH, DEFAULT_COMMIT_MESSAGE,
    DEFAULT_CONFIG_PATH, DEFAULT_LABELS,
};

use crate::output::OutputConfig;

/// Sync files from source repositories into this one
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Path to the sync configuration, relative to the workspace
    /// [default: .github/repo-file-sync.yaml]
    #[arg(short, long, value_name = "PATH", env = "INPUT_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Destination git working tree (defaults to the current directory)
    #[arg(short, long, value_name = "DIR", env = "GITHUB_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Token used to clone sources, push, and call the GitHub CLI
    #[arg(long, env = "INPUT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Fallback token when --token is not given
    #[arg(long, env = "GITHUB_TOKEN", hide = true, hide_env_values = true)]
    pub github_token: Option<String>,

    /// Name of the sync branch
    #[arg(long = "branch", value_name = "NAME", env = "INPUT_BRANCH_NAME")]
    pub branch_name: Option<String>,

    /// Deprecated alias for --branch
    #[arg(long, value_name = "NAME", env = "INPUT_BRANCH_PREFIX", hide = true)]
    pub branch_prefix: Option<String>,

    /// Ref the sync branch is created from and the pull request targets
    /// (defaults to the current checkout and the repository default branch)
    #[arg(long, value_name = "REF")]
    pub base: Option<String>,

    /// Commit message for the sync commit
    /// [default: chore: sync files from source repositories]
    #[arg(long, value_name = "MESSAGE", env = "INPUT_COMMIT_MESSAGE")]
    pub commit_message: Option<String>,

    /// Pull request title [default: the commit message default]
    #[arg(long, value_name = "TITLE", env = "INPUT_PR_TITLE")]
    pub pr_title: Option<String>,

    /// Comma-separated labels to add to the pull request [default: automated]
    #[arg(long, value_name = "LABELS", env = "INPUT_PR_LABELS")]
    pub pr_labels: Option<String>,

    /// Destination repository as owner/name
    #[arg(long, value_name = "OWNER/NAME", env = "GITHUB_REPOSITORY")]
    pub repository: Option<String>,

    /// File to append run outputs to as key=value lines
    #[arg(long, value_name = "FILE", env = "GITHUB_OUTPUT")]
    pub output_file: Option<PathBuf>,

    /// Sync and detect changes without creating branches or pull requests
    #[arg(short = 'n', long, env = "TEST_MODE", value_parser = FalseyValueParser::new())]
    pub dry_run: bool,

    /// Read sources from <DIR>/<owner>/<name> instead of cloning them
    #[arg(long, value_name = "DIR")]
    pub source_dir: Option<PathBuf>,

    /// Base URL source repositories are cloned from
    #[arg(long, value_name = "URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Author name for sync commits
    #[arg(long, value_name = "NAME", default_value = "github-actions[bot]")]
    pub committer_name: String,

    /// Author email for sync commits
    #[arg(
        long,
        value_name = "EMAIL",
        default_value = "41898282+github-actions[bot]@users.noreply.github.com"
    )]
    pub committer_email: String,

    /// Suppress the summary; only log output is printed
    #[arg(short, long)]
    pub quiet: bool,
}

/// The value, unless it is absent or empty.
fn present<T: AsRef<OsStr>>(value: &Option<T>) -> Option<&T> {
    value.as_ref().filter(|v| !v.as_ref().is_empty())
}

fn or_default(value: &Option<String>, default: &str) -> String {
    present(value).map_or_else(|| default.to_string(), Clone::clone)
}

impl SyncArgs {
    fn token(&self) -> Option<String> {
        present(&self.token)
            .or_else(|| present(&self.github_token))
            .cloned()
    }

    fn branch(&self) -> String {
        if let Some(name) = present(&self.branch_name) {
            return name.clone();
        }
        if let Some(prefix) = present(&self.branch_prefix) {
            warn!("INPUT_BRANCH_PREFIX is deprecated; use INPUT_BRANCH_NAME (--branch) instead");
            return prefix.clone();
        }
        DEFAULT_BRANCH.to_string()
    }

    fn workspace(&self) -> Option<&PathBuf> {
        present(&self.workspace)
    }

    fn output_file(&self) -> Option<&PathBuf> {
        present(&self.output_file)
    }

    /// Builds the engine settings from the parsed arguments.
    pub fn run_settings(&self, workspace: PathBuf) -> RunSettings {
        RunSettings {
            workspace,
            config_path: present(&self.config)
                .cloned()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
            dry_run: self.dry_run,
            reconcile: ReconcileSettings {
                branch: self.branch(),
                base: present(&self.base).cloned(),
                commit_message: or_default(&self.commit_message, DEFAULT_COMMIT_MESSAGE),
                pr_title: or_default(&self.pr_title, DEFAULT_COMMIT_MESSAGE),
                labels: parse_labels(&or_default(&self.pr_labels, DEFAULT_LABELS)),
                repository: present(&self.repository).cloned(),
            },
        }
    }

    fn push_host(&self) -> String {
        url::Url::parse(&self.base_url)
            .ok()
            .and_then(|url| url.host_str().map(String::from))
            .unwrap_or_else(|| "github.com".to_string())
    }
}

/// Execute the `sync` command.
pub fn execute(args: SyncArgs, out: &OutputConfig) -> Result<()> {
    let workspace = match args.workspace() {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to determine the current directory")?,
    };
    let settings = args.run_settings(workspace);
    let token = args.token();

    let fetcher: Box<dyn SourceFetcher> = match &args.source_dir {
        Some(dir) => Box::new(DirectoryFetcher::new(dir)),
        None => Box::new(
            GitFetcher::new(&args.base_url)
                .with_context(|| format!("Invalid base URL: {}", args.base_url))?
                .with_token(token.clone()),
        ),
    };
    let host = GitHubCli::new(&settings.workspace)
        .with_repository(settings.reconcile.repository.clone())
        .with_token(token)
        .with_host(args.push_host())
        .with_committer(Committer {
            name: args.committer_name.clone(),
            email: args.committer_email.clone(),
        });

    if !args.quiet {
        println!("{} repo-file-sync", out.emoji("🚀", "[SYNC]"));
        if settings.dry_run {
            println!(
                "{} Dry run: no branch or pull request will be touched",
                out.emoji("🧪", "[DRY RUN]")
            );
        }
        println!();
    }

    let report = pipeline::run(&settings, fetcher.as_ref(), &host)?;

    if let Some(path) = args.output_file() {
        report
            .outputs
            .append_to(path)
            .with_context(|| format!("Failed to write outputs to {}", path.display()))?;
    }

    if !args.quiet {
        print_summary(out, &report);
    }
    Ok(())
}

fn print_summary(out: &OutputConfig, report: &RunReport) {
    let Some(sync) = &report.sync else {
        println!(
            "{} No configuration found; nothing to sync",
            out.emoji("ℹ️ ", "[INFO]")
        );
        return;
    };

    for (repo, paths) in sync.changes.iter() {
        println!("{} {}", out.emoji("📦", "[REPO]"), repo);
        for path in paths {
            println!("   {}", path.display());
        }
    }
    for skipped in &sync.skipped {
        println!(
            "{} {}",
            out.emoji("⚠️ ", "[WARN]"),
            out.warning(&format!(
                "Skipped {}@{}: {}",
                skipped.repo, skipped.r#ref, skipped.reason
            ))
        );
    }

    if let Some(reconciliation) = &report.reconciliation {
        let line = match &reconciliation.state {
            ReconcileState::NoChanges => "No changes detected".to_string(),
            ReconcileState::ChangesPendingBranch => format!(
                "{} file(s) would be synced (dry run)",
                report.outputs.files_synced
            ),
            ReconcileState::PrCreated(pr) => format!("Pull request created: {}", pr.url),
            ReconcileState::PrUpdated(pr) => format!("Pull request updated: {}", pr.url),
            other => format!("Stopped in state {:?}", other),
        };
        println!();
        println!("{} {}", out.emoji("✅", "[OK]"), out.success(&line));
    }

    let warnings = report.warning_count();
    if warnings > 0 {
        println!("   {} warning(s), see log", warnings);
    }

    println!();
    for (key, value) in report.outputs.pairs() {
        println!("   {}={}", key, value);
    }
}
