//! Immutable per-run record and per-repository state.

use std::path::{Path, PathBuf};

/// Everything a run was started with, fixed once the credential exists.
#[derive(Debug, Clone)]
pub struct RunContext {
    request_id: String,
    site_id: String,
    project_name: String,
    repo_names: Vec<String>,
    credential_path: PathBuf,
    workspace_root: PathBuf,
}

impl RunContext {
    pub fn new(
        request_id: String,
        site_id: String,
        project_name: String,
        repo_names: Vec<String>,
        credential_path: PathBuf,
        workspace_root: PathBuf,
    ) -> Self {
        Self {
            request_id,
            site_id,
            project_name,
            repo_names,
            credential_path,
            workspace_root,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    /// Target name and site id are the same value by construction.
    pub fn target_name(&self) -> &str {
        &self.site_id
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn repo_names(&self) -> &[String] {
        &self.repo_names
    }

    pub fn credential_path(&self) -> &Path {
        &self.credential_path
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }
}

/// One fetched repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryEntry {
    pub name: String,
    pub local_path: PathBuf,
    /// Set by the build runner once the build reports success.
    pub build_output: Option<PathBuf>,
}

impl RepositoryEntry {
    pub fn fetched(name: impl Into<String>, local_path: PathBuf) -> Self {
        Self {
            name: name.into(),
            local_path,
            build_output: None,
        }
    }
}
