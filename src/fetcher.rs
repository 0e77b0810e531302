//! # Source Materialization
//!
//! A [`SourceFetcher`] turns a `(repo, ref)` pair into a local, read-only
//! tree. The orchestrator treats a failure as affecting that one source only.
//!
//! Two implementations ship with the crate:
//!
//! - [`GitFetcher`] shallow-clones from a hosting base URL (GitHub by
//!   default) into a temporary directory, authenticating with a token when
//!   one is configured.
//! - [`DirectoryFetcher`] reads `<root>/<owner>/<name>` from a local mirror,
//!   ignoring the ref. It is used for offline runs and tests.
//!
//! Temporary trees are owned by the returned [`MaterializedSource`] and
//! removed when it is dropped, whichever way the run ends.

use crate::error::{Error, Result};
use crate::git;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use url::Url;

/// Default base URL for repository identifiers.
pub const DEFAULT_BASE_URL: &str = "https://github.com/";

/// A source tree available on the local filesystem.
#[derive(Debug)]
pub struct MaterializedSource {
    root: PathBuf,
    _guard: Option<TempDir>,
}

impl MaterializedSource {
    /// A tree living in a temporary directory, deleted on drop.
    pub fn owned(dir: TempDir) -> Self {
        Self {
            root: dir.path().to_path_buf(),
            _guard: Some(dir),
        }
    }

    /// A tree owned by someone else; dropping this leaves it in place.
    pub fn borrowed(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            _guard: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Materializes source repositories. Implementations must be shareable
/// across threads since sources are fetched concurrently.
pub trait SourceFetcher: Send + Sync {
    fn materialize(&self, repo: &str, r#ref: &str) -> Result<MaterializedSource>;
}

/// Fetches sources with a shallow `git clone`.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    base_url: Url,
    token: Option<String>,
}

impl GitFetcher {
    /// Creates a fetcher resolving `owner/name` against `base_url`.
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            token: None,
        })
    }

    /// Authenticates HTTP(S) clones as `x-access-token:<token>`.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    /// The clone URL for `repo`, credentials included.
    pub fn clone_url(&self, repo: &str) -> Result<Url> {
        let mut url = self.base_url.join(&format!("{}.git", repo))?;
        if let Some(token) = &self.token {
            if url.scheme().starts_with("http") {
                // Both setters only fail for URLs that cannot carry credentials.
                let _ = url.set_username("x-access-token");
                let _ = url.set_password(Some(token));
            }
        }
        Ok(url)
    }
}

impl SourceFetcher for GitFetcher {
    fn materialize(&self, repo: &str, r#ref: &str) -> Result<MaterializedSource> {
        let fetch_error = |message: String| Error::SourceFetch {
            repo: repo.to_string(),
            r#ref: r#ref.to_string(),
            message,
        };

        let url = self.clone_url(repo)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("repo-file-sync-{}-", repo.replace('/', "-")))
            .tempdir()
            .map_err(|e| fetch_error(e.to_string()))?;

        let target = dir.path().join("tree");
        git::clone_shallow(url.as_str(), r#ref, &target, self.token.as_deref())
            .map_err(fetch_error)?;

        Ok(MaterializedSource {
            root: target,
            _guard: Some(dir),
        })
    }
}

/// Reads sources from a local directory laid out as `<root>/<owner>/<name>`.
#[derive(Debug, Clone)]
pub struct DirectoryFetcher {
    root: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SourceFetcher for DirectoryFetcher {
    fn materialize(&self, repo: &str, r#ref: &str) -> Result<MaterializedSource> {
        let path = self.root.join(repo);
        if !path.is_dir() {
            return Err(Error::SourceFetch {
                repo: repo.to_string(),
                r#ref: r#ref.to_string(),
                message: format!("{} is not a directory", path.display()),
            });
        }
        Ok(MaterializedSource::borrowed(path))
    }
}
