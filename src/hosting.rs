//! # Code-Hosting Collaborator
//!
//! The reconciler talks to version control and the hosting service only
//! through the [`CodeHost`] trait, so the state machine can be driven by an
//! in-memory fake in tests.
//!
//! [`GitHubCli`] is the production implementation: local operations shell
//! out to `git` in the destination workspace, pull request operations to the
//! GitHub CLI (`gh`). When a token is configured it is passed to `gh` as
//! `GH_TOKEN` and embedded in the push URL, and redacted from every error.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use log::debug;
use regex::Regex;
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::git::{self, redact};

/// An open pull request on the hosting service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    /// Pull request number as reported by the host. Empty when the host
    /// confirmed creation but its output could not be parsed.
    pub number: String,
    pub url: String,
}

/// Identity used for sync commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committer {
    pub name: String,
    pub email: String,
}

impl Default for Committer {
    fn default() -> Self {
        Self {
            name: "github-actions[bot]".to_string(),
            email: "41898282+github-actions[bot]@users.noreply.github.com".to_string(),
        }
    }
}

/// Operations the reconciler needs from version control and the hosting
/// service.
pub trait CodeHost {
    /// Whether the workspace differs from its last commit.
    fn has_local_changes(&self) -> Result<bool>;

    /// Whether `branch` exists on the remote.
    fn branch_exists(&self, branch: &str) -> Result<bool>;

    /// Deletes `branch` both on the remote and locally.
    fn delete_branch(&self, branch: &str) -> Result<()>;

    /// Creates and checks out `branch` from `base`, or from the current
    /// commit when `base` is `None`. Uncommitted changes are carried over.
    fn create_branch(&self, branch: &str, base: Option<&str>) -> Result<()>;

    /// Commits every workspace change and pushes `branch`.
    fn commit_and_push(&self, message: &str, branch: &str, force: bool) -> Result<()>;

    /// The open pull request whose head is `branch`, if any.
    fn find_open_pr(&self, branch: &str) -> Result<Option<PullRequest>>;

    /// Replaces the title and body of an existing pull request.
    fn update_pr(&self, number: &str, title: &str, body: &str) -> Result<()>;

    /// Attaches labels to a pull request.
    fn add_labels(&self, number: &str, labels: &[String]) -> Result<()>;

    /// Opens a pull request from `branch` into `base` (the repository
    /// default when `None`).
    fn create_pr(&self, title: &str, body: &str, branch: &str, base: Option<&str>)
        -> Result<PullRequest>;
}

/// [`CodeHost`] backed by the `git` and `gh` command-line tools.
#[derive(Debug, Clone)]
pub struct GitHubCli {
    workdir: PathBuf,
    repository: Option<String>,
    token: Option<String>,
    host: String,
    committer: Committer,
}

impl GitHubCli {
    /// Operates on the git working tree at `workdir`.
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            repository: None,
            token: None,
            host: "github.com".to_string(),
            committer: Committer::default(),
        }
    }

    /// The destination `owner/name`, passed to `gh --repo` and used for the
    /// authenticated push URL.
    pub fn with_repository(mut self, repository: Option<String>) -> Self {
        self.repository = repository.filter(|r| !r.is_empty());
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_committer(mut self, committer: Committer) -> Self {
        self.committer = committer;
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Where branches are pushed: an authenticated URL when both a token and
    /// the repository are known, otherwise `origin`.
    pub fn push_target(&self) -> Result<String> {
        match (&self.token, &self.repository) {
            (Some(token), Some(repository)) => {
                let mut url = Url::parse(&format!("https://{}/", self.host))?;
                url = url.join(&format!("{}.git", repository))?;
                let _ = url.set_username("x-access-token");
                let _ = url.set_password(Some(token));
                Ok(url.to_string())
            }
            _ => Ok("origin".to_string()),
        }
    }

    fn secret(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        git::run(&self.workdir, args, self.secret())
    }

    fn gh(&self, args: &[&str]) -> Result<Output> {
        let mut command = Command::new("gh");
        command.args(args).current_dir(&self.workdir);
        if let Some(repository) = &self.repository {
            command.args(["--repo", repository.as_str()]);
        }
        if let Some(token) = &self.token {
            command.env("GH_TOKEN", token);
        }
        debug!("Running gh {}", args.join(" "));
        command.output().map_err(|e| Error::HostCommand {
            command: format!("gh {}", args.join(" ")),
            stderr: e.to_string(),
        })
    }

    fn gh_checked(&self, args: &[&str]) -> Result<String> {
        let out = self.gh(args)?;
        if !out.status.success() {
            return Err(Error::HostCommand {
                command: format!("gh {}", args.first().copied().unwrap_or_default()),
                stderr: redact(String::from_utf8_lossy(&out.stderr).trim(), self.secret()),
            });
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }
}

impl CodeHost for GitHubCli {
    fn has_local_changes(&self) -> Result<bool> {
        Ok(!self.git(&["status", "--porcelain"])?.is_empty())
    }

    fn branch_exists(&self, branch: &str) -> Result<bool> {
        let remote = self.push_target()?;
        let out = git::output(
            &self.workdir,
            ["ls-remote", "--exit-code", "--heads", remote.as_str(), branch],
        )?;
        match out.status.code() {
            Some(0) => Ok(true),
            // --exit-code reports "no matching refs" as 2
            Some(2) => Ok(false),
            _ => Err(Error::GitCommand {
                command: format!("git ls-remote --heads {}", branch),
                stderr: redact(String::from_utf8_lossy(&out.stderr).trim(), self.secret()),
            }),
        }
    }

    fn delete_branch(&self, branch: &str) -> Result<()> {
        let remote = self.push_target()?;
        let remote_result = self.git(&["push", "--quiet", &remote, "--delete", branch]);
        let local_result = if self.git(&["rev-parse", "--verify", "--quiet", branch]).is_ok() {
            self.git(&["branch", "-D", branch]).map(|_| ())
        } else {
            Ok(())
        };
        remote_result.map(|_| ())?;
        local_result
    }

    fn create_branch(&self, branch: &str, base: Option<&str>) -> Result<()> {
        let mut args = vec!["checkout", "--quiet", "-b", branch];
        if let Some(base) = base {
            args.push(base);
        }
        self.git(&args).map(|_| ())
    }

    fn commit_and_push(&self, message: &str, branch: &str, force: bool) -> Result<()> {
        self.git(&["add", "-A"])?;
        let name = format!("user.name={}", self.committer.name);
        let email = format!("user.email={}", self.committer.email);
        self.git(&["-c", &name, "-c", &email, "commit", "--quiet", "-m", message])?;

        let remote = self.push_target()?;
        let mode = if force { "--force" } else { "--set-upstream" };
        self.git(&["push", "--quiet", mode, &remote, branch])
            .map(|_| ())
            .map_err(|e| Error::Push {
                branch: branch.to_string(),
                message: e.to_string(),
            })
    }

    fn find_open_pr(&self, branch: &str) -> Result<Option<PullRequest>> {
        let stdout = self.gh_checked(&[
            "pr", "list", "--head", branch, "--state", "open", "--json", "number,url",
        ])?;
        parse_pr_list(&stdout)
    }

    fn update_pr(&self, number: &str, title: &str, body: &str) -> Result<()> {
        self.gh_checked(&["pr", "edit", number, "--title", title, "--body", body])
            .map(|_| ())
            .map_err(|e| Error::PrUpdate {
                number: number.to_string(),
                message: e.to_string(),
            })
    }

    fn add_labels(&self, number: &str, labels: &[String]) -> Result<()> {
        let mut args = vec!["pr", "edit", number];
        for label in labels {
            args.push("--add-label");
            args.push(label);
        }
        self.gh_checked(&args).map(|_| ())
    }

    fn create_pr(
        &self,
        title: &str,
        body: &str,
        branch: &str,
        base: Option<&str>,
    ) -> Result<PullRequest> {
        let mut args = vec!["pr", "create", "--title", title, "--body", body, "--head", branch];
        if let Some(base) = base {
            args.extend(["--base", base]);
        }
        let pr_error = |message: String| Error::PrCreate {
            branch: branch.to_string(),
            message,
        };

        let out = self.gh(&args).map_err(|e| pr_error(e.to_string()))?;
        let stdout = String::from_utf8_lossy(&out.stdout);
        let stderr = String::from_utf8_lossy(&out.stderr);
        if !out.status.success() {
            return Err(pr_error(redact(stderr.trim(), self.secret())));
        }

        let combined = format!("{}{}", stdout, stderr);
        Ok(parse_created_pr(&combined).unwrap_or(PullRequest {
            number: String::new(),
            url: String::new(),
        }))
    }
}

#[derive(Deserialize)]
struct PrListEntry {
    number: u64,
    url: String,
}

/// Parses `gh pr list --json number,url` output, returning the first entry.
pub fn parse_pr_list(json: &str) -> Result<Option<PullRequest>> {
    if json.trim().is_empty() {
        return Ok(None);
    }
    let entries: Vec<PrListEntry> = serde_json::from_str(json)?;
    Ok(entries.into_iter().next().map(|entry| PullRequest {
        number: entry.number.to_string(),
        url: entry.url,
    }))
}

/// Extracts the pull request URL and number from `gh pr create` output.
pub fn parse_created_pr(output: &str) -> Option<PullRequest> {
    let re = Regex::new(r"https?://\S+/pull/(\d+)").ok()?;
    let captures = re.captures(output)?;
    Some(PullRequest {
        number: captures[1].to_string(),
        url: captures[0].to_string(),
    })
}
