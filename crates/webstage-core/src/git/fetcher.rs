//! Shallow repository fetches.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use super::Remote;
use crate::command::{CommandError, CommandOutput, CommandRunner, CommandSpec};
use crate::config::DeploySettings;
use crate::context::RepositoryEntry;
use crate::error::{DeployError, Result};
use crate::runlog::RunLog;

#[derive(Debug, Error)]
pub enum CloneFailure {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("git clone failed: {}", .0.diagnostics())]
    Exit(CommandOutput),
}

/// Subdirectory of the workspace holding every checkout.
pub const REPOS_DIR: &str = "repos";

pub fn checkout_dir(workspace_root: &Path, repo_name: &str) -> PathBuf {
    workspace_root.join(REPOS_DIR).join(repo_name)
}

/// Clones repositories at a single revision of a fixed branch.
pub struct GitFetcher<'a> {
    runner: &'a dyn CommandRunner,
    program: String,
    branch: String,
    timeout: Option<Duration>,
}

impl<'a> GitFetcher<'a> {
    pub fn new(runner: &'a dyn CommandRunner, settings: &DeploySettings) -> Self {
        Self {
            runner,
            program: settings.tools.git.clone(),
            branch: settings.branch.clone(),
            timeout: settings.command_timeout(),
        }
    }

    /// `git clone --depth 1 --single-branch --branch <branch> <url> <dest>`
    pub fn clone_spec(&self, remote: &Remote, dest: &Path) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.program)
            .args(["clone", "--depth", "1", "--single-branch", "--branch"])
            .arg(&self.branch)
            .arg(remote.as_str())
            .arg(dest.to_string_lossy())
            .timeout(self.timeout);
        for secret in remote.secrets() {
            spec = spec.redact(secret.clone());
        }
        spec
    }

    /// Clone `remote` into `dest`, which must not exist yet.
    pub fn shallow_clone(
        &self,
        remote: &Remote,
        dest: &Path,
        log: &RunLog,
    ) -> std::result::Result<(), CloneFailure> {
        let spec = self.clone_spec(remote, dest);
        log.info(format!("Cloning {} into {}", remote, dest.display()));
        let output = self.runner.run(&spec)?;
        log.command(&spec, &output);
        if !output.success() {
            return Err(CloneFailure::Exit(output));
        }
        Ok(())
    }

    /// Fetch `repo_name` into `<workspace_root>/repos/<repo_name>`.
    ///
    /// Checkouts live in their own subtree so no repository name can
    /// collide with the staging root or the files the run writes at the
    /// workspace root. A leftover directory from an earlier attempt is
    /// removed first.
    pub fn fetch(
        &self,
        workspace_root: &Path,
        repo_name: &str,
        remote: &Remote,
        log: &RunLog,
    ) -> Result<RepositoryEntry> {
        let dest = checkout_dir(workspace_root, repo_name);
        if dest.exists() {
            log.info(format!("Removing stale checkout at {}", dest.display()));
            std::fs::remove_dir_all(&dest).map_err(|e| DeployError::Fetch {
                repo: repo_name.to_string(),
                detail: format!("failed to remove stale checkout {}: {}", dest.display(), e),
            })?;
        }

        self.shallow_clone(remote, &dest, log).map_err(|e| {
            let detail = e.to_string();
            log.error(format!("Fetch of '{}' failed: {}", repo_name, detail));
            DeployError::Fetch {
                repo: repo_name.to_string(),
                detail,
            }
        })?;

        log.info(format!("Repository '{}' fetched", repo_name));
        Ok(RepositoryEntry::fetched(repo_name, dest))
    }
}
