//! Error taxonomy for a deployment run.
//!
//! Every variant is fatal to the run. The one tolerated outcome, a hosting
//! site that already exists, is not an error and surfaces as
//! [`crate::hosting::SiteStatus::AlreadyExists`] instead.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::command::CommandError;

pub type Result<T> = std::result::Result<T, DeployError>;

#[derive(Debug, Error)]
pub enum DeployError {
    /// Missing or invalid input, raised before any side effect.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The workspace (or a directory inside it) could not be created.
    #[error("failed to allocate {}: {source}", path.display())]
    Resource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("credential error: {0}")]
    Credential(String),

    #[error("failed to write hosting config {}: {source}", path.display())]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to fetch repository '{repo}': {detail}")]
    Fetch { repo: String, detail: String },

    #[error("repository '{repo}' cannot be built: missing {}", missing.display())]
    BuildPrecondition { repo: String, missing: PathBuf },

    #[error("build step '{step}' failed for repository '{repo}': {output}")]
    Build {
        repo: String,
        step: String,
        output: String,
    },

    /// The build reported success but left no output directory behind.
    #[error("build output for repository '{repo}' not found at {}", path.display())]
    Stage { repo: String, path: PathBuf },

    #[error("failed to copy build output for repository '{repo}': {detail}")]
    StageCopy { repo: String, detail: String },

    #[error("failed to create hosting site '{site_id}': {output}")]
    SiteProvision { site_id: String, output: String },

    #[error("failed to bind target '{target}' to site '{site_id}': {output}")]
    Bind {
        target: String,
        site_id: String,
        output: String,
    },

    #[error("failed to publish target '{target}': {output}")]
    Publish { target: String, output: String },

    #[error("failed to persist run log: {0}")]
    LogPersist(String),

    #[error(transparent)]
    Command(#[from] CommandError),
}

impl DeployError {
    /// Stable short name of the failure class, used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            DeployError::Configuration(_) => "configuration",
            DeployError::Resource { .. } => "resource",
            DeployError::Credential(_) => "credential",
            DeployError::ConfigWrite { .. } => "config_write",
            DeployError::Fetch { .. } => "fetch",
            DeployError::BuildPrecondition { .. } => "build_precondition",
            DeployError::Build { .. } => "build",
            DeployError::Stage { .. } => "stage",
            DeployError::StageCopy { .. } => "stage_copy",
            DeployError::SiteProvision { .. } => "site_provision",
            DeployError::Bind { .. } => "bind",
            DeployError::Publish { .. } => "publish",
            DeployError::LogPersist(_) => "log_persist",
            DeployError::Command(_) => "command",
        }
    }
}

/// Render an error and its source chain on one line each.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str("\n  caused by: ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
