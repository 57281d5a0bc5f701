//! Module fetching.
//!
//! The resolver and installer talk to module sources through the
//! `ModuleFetcher` trait: a lightweight metadata read during resolution and
//! a full fetch during installation. `GitFetcher` is the production
//! implementation, wrapping `git` subprocess calls with timeout handling via
//! `tokio::process::Command`. Tests substitute in-memory fakes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

use crate::error::{ModmanError, Result};
use crate::module::ModuleDescriptor;
use crate::source::ModuleSource;

/// Default timeout for a single git operation.
const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Access to module sources.
///
/// `read_metadata` must be cheap enough to call once per module during a
/// resolution pass; `fetch` materializes the full module contents at `dest`.
#[async_trait]
pub trait ModuleFetcher: Send + Sync {
    /// Fetch just enough of a module to parse its descriptor.
    async fn read_metadata(&self, source: &ModuleSource) -> Result<ModuleDescriptor>;

    /// Fetch the full module contents into `dest`. `dest` must not exist.
    async fn fetch(&self, source: &ModuleSource, dest: &Path) -> Result<()>;
}

/// Fetcher backed by the `git` binary.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    /// Path to the git binary.
    git_path: String,
    /// Timeout per git operation.
    timeout: Duration,
    /// Optional parent directory for metadata-read scratch clones.
    scratch_root: Option<PathBuf>,
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self {
            git_path: "git".into(),
            timeout: DEFAULT_GIT_TIMEOUT,
            scratch_root: None,
        }
    }
}

impl GitFetcher {
    /// Create a fetcher whose scratch clones live under `scratch_root`.
    pub fn with_scratch_root(scratch_root: PathBuf) -> Self {
        Self {
            scratch_root: Some(scratch_root),
            ..Default::default()
        }
    }

    /// Run a git command, mapping every failure mode onto `CloneFailure`
    /// for the named module.
    async fn run_git(&self, module: &str, args: &[&str]) -> Result<String> {
        debug!(git = %self.git_path, ?args, "Running git command");

        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.git_path).args(args).output(),
        )
        .await
        .map_err(|_| ModmanError::CloneFailure {
            module: module.to_string(),
            reason: format!("git timed out after {}s", self.timeout.as_secs()),
        })?
        .map_err(|e| ModmanError::CloneFailure {
            module: module.to_string(),
            reason: format!("Failed to run git: {}", e),
        })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(ModmanError::CloneFailure {
                module: module.to_string(),
                reason: stderr.trim().to_string(),
            })
        }
    }

    fn scratch_dir(&self) -> Result<TempDir> {
        match &self.scratch_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                Ok(TempDir::new_in(root)?)
            }
            None => Ok(TempDir::new()?),
        }
    }
}

#[async_trait]
impl ModuleFetcher for GitFetcher {
    async fn read_metadata(&self, source: &ModuleSource) -> Result<ModuleDescriptor> {
        // Scratch clone is dropped (deleted) on every exit path.
        let scratch = self.scratch_dir()?;
        let checkout = scratch.path().join(source.name());
        self.fetch(source, &checkout).await?;
        ModuleDescriptor::load(&checkout, source.clone())
    }

    async fn fetch(&self, source: &ModuleSource, dest: &Path) -> Result<()> {
        let name = source.name();
        let dest_str = dest.to_string_lossy().to_string();

        match source.revision() {
            // Unpinned: a shallow clone of the default branch is enough.
            None => {
                self.run_git(name, &["clone", "--depth", "1", source.url(), &dest_str])
                    .await?;
            }
            // Pinned: full clone, then check out the revision so tags,
            // branches, and bare commits all work.
            Some(revision) => {
                self.run_git(name, &["clone", source.url(), &dest_str])
                    .await?;
                self.run_git(name, &["-C", &dest_str, "checkout", "--detach", revision])
                    .await?;
            }
        }

        Ok(())
    }
}
