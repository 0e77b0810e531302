//! Thin wrappers around the system `git` command.
//!
//! Using the system binary means SSH keys, credential helpers and any
//! authentication configured in `~/.gitconfig` work unchanged. Every error
//! message passes through [`redact`] so tokens embedded in URLs never reach
//! logs.

use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use crate::error::{Error, Result};

/// Replaces every occurrence of `secret` in `text` with `***`.
pub fn redact(text: &str, secret: Option<&str>) -> String {
    match secret {
        Some(secret) if !secret.is_empty() => text.replace(secret, "***"),
        _ => text.to_string(),
    }
}

/// Whether `r#ref` is a full 40-character commit SHA.
///
/// `git clone --branch` accepts branches and tags but not commits, so those
/// are fetched explicitly.
pub fn is_commit_sha(r#ref: &str) -> bool {
    r#ref.len() == 40 && r#ref.bytes().all(|b| b.is_ascii_hexdigit())
}

fn describe<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    args.into_iter()
        .map(|a| a.as_ref().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs `git <args>` in `dir` and returns the raw output, whatever the exit
/// status.
pub fn output<I, S>(dir: &Path, args: I) -> Result<Output>
where
    I: IntoIterator<Item = S> + Clone,
    S: AsRef<OsStr>,
{
    Command::new("git")
        .args(args.clone())
        .current_dir(dir)
        .output()
        .map_err(|e| Error::GitCommand {
            command: format!("git {}", describe(args)),
            stderr: e.to_string(),
        })
}

/// Runs `git <args>` in `dir`, failing on a non-zero exit status.
///
/// Returns trimmed stdout.
pub fn run<I, S>(dir: &Path, args: I, secret: Option<&str>) -> Result<String>
where
    I: IntoIterator<Item = S> + Clone,
    S: AsRef<OsStr>,
{
    let out = output(dir, args.clone())?;
    if !out.status.success() {
        return Err(Error::GitCommand {
            command: redact(&format!("git {}", describe(args)), secret),
            stderr: redact(String::from_utf8_lossy(&out.stderr).trim(), secret),
        });
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

/// Shallow-clones `url` at `ref_name` into `target_dir`.
///
/// `HEAD` clones the remote's default branch. Commit SHAs are fetched with
/// `git fetch --depth 1 <sha>` since `--branch` only accepts named refs.
pub fn clone_shallow(
    url: &str,
    ref_name: &str,
    target_dir: &Path,
    secret: Option<&str>,
) -> std::result::Result<(), String> {
    if let Some(parent) = target_dir.parent() {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }

    if is_commit_sha(ref_name) {
        fs::create_dir_all(target_dir).map_err(|e| e.to_string())?;
        let steps: [&[&str]; 4] = [
            &["init", "--quiet"],
            &["remote", "add", "origin", url],
            &["fetch", "--quiet", "--depth", "1", "origin", ref_name],
            &["checkout", "--quiet", "FETCH_HEAD"],
        ];
        for step in steps {
            run(target_dir, step.iter(), secret).map_err(|e| clone_message(&e.to_string()))?;
        }
        return Ok(());
    }

    let mut args = vec!["clone", "--quiet", "--depth", "1"];
    if ref_name != crate::config::DEFAULT_REF {
        args.extend(["--branch", ref_name]);
    }
    args.push(url);

    let out = Command::new("git")
        .args(&args)
        .arg(target_dir)
        .output()
        .map_err(|e| e.to_string())?;

    if !out.status.success() {
        let stderr = redact(String::from_utf8_lossy(&out.stderr).trim(), secret);
        return Err(clone_message(&stderr));
    }
    Ok(())
}

// Adds a pointer for the common authentication failures.
fn clone_message(stderr: &str) -> String {
    if stderr.contains("Authentication failed")
        || stderr.contains("Permission denied")
        || stderr.contains("Could not read from remote repository")
    {
        format!(
            "authentication failed; check that the token can read this repository ({})",
            stderr
        )
    } else {
        stderr.to_string()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers for tests that need real repositories.

    use super::*;

    pub fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Runs git with a fixed identity, panicking on failure.
    pub fn git(dir: &Path, args: &[&str]) -> String {
        let mut full = vec![
            "-c",
            "user.name=Test User",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
        ];
        full.extend_from_slice(args);
        run(dir, &full, None).unwrap()
    }

    /// Creates a repository at `dir` with the given files committed.
    pub fn init_repo(dir: &Path, files: &[(&str, &str)]) {
        fs::create_dir_all(dir).unwrap();
        git(dir, &["init", "--quiet"]);
        for (path, content) in files {
            let full = dir.join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        git(dir, &["add", "-A"]);
        git(dir, &["commit", "--quiet", "--allow-empty", "-m", "initial"]);
    }
}
