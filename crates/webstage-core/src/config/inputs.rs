//! Per-run inputs and their pre-flight validation.

use std::fmt;

use uuid::Uuid;

use crate::error::{DeployError, Result};

pub const ENV_REQUEST_ID: &str = "REQUEST_ID";
pub const ENV_PROJECT_NAME: &str = "AZURE_PROJECT_NAME";
pub const ENV_REPO_NAMES: &str = "AZURE_REPO_NAMES";
pub const ENV_ACCESS_TOKEN: &str = "AZURE_PAT";
pub const ENV_BUCKET: &str = "GCS_BUCKET_NAME";

/// Inputs as received, before validation.
#[derive(Clone, Default)]
pub struct RawInputs {
    pub request_id: Option<String>,
    pub project_name: Option<String>,
    /// JSON array of repository names.
    pub repo_names: Option<String>,
    pub access_token: Option<String>,
    pub bucket: Option<String>,
}

impl RawInputs {
    /// Read every input from its environment variable.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok();
        Self {
            request_id: var(ENV_REQUEST_ID),
            project_name: var(ENV_PROJECT_NAME),
            repo_names: var(ENV_REPO_NAMES),
            access_token: var(ENV_ACCESS_TOKEN),
            bucket: var(ENV_BUCKET),
        }
    }

    /// Check every required value and produce a [`DeployRequest`].
    ///
    /// A missing request id is replaced by a fresh v4 UUID. All other
    /// values are required and must be non-blank.
    pub fn validate(self) -> Result<DeployRequest> {
        let request_id = non_blank(self.request_id).unwrap_or_else(|| Uuid::new_v4().to_string());
        ensure_request_id(&request_id)?;
        let project_name = require(self.project_name, ENV_PROJECT_NAME)?;
        let access_token = require(self.access_token, ENV_ACCESS_TOKEN)?;
        let bucket = require(self.bucket, ENV_BUCKET)?;
        let repo_json = require(self.repo_names, ENV_REPO_NAMES)?;
        let repo_names = parse_repo_names(&repo_json)?;

        Ok(DeployRequest {
            request_id,
            project_name,
            repo_names,
            access_token,
            bucket,
        })
    }
}

impl fmt::Debug for RawInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawInputs")
            .field("request_id", &self.request_id)
            .field("project_name", &self.project_name)
            .field("repo_names", &self.repo_names)
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// Validated inputs of one run.
#[derive(Clone)]
pub struct DeployRequest {
    pub request_id: String,
    pub project_name: String,
    /// Repositories in build order. Duplicates are kept.
    pub repo_names: Vec<String>,
    pub access_token: String,
    pub bucket: String,
}

impl fmt::Debug for DeployRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployRequest")
            .field("request_id", &self.request_id)
            .field("project_name", &self.project_name)
            .field("repo_names", &self.repo_names)
            .field("access_token", &"***")
            .field("bucket", &self.bucket)
            .finish()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn require(value: Option<String>, name: &str) -> Result<String> {
    non_blank(value).ok_or_else(|| DeployError::Configuration(format!("{} is required", name)))
}

/// Parse the repository list. Names become workspace directory names and
/// URL path segments, so they must be plain single path components.
pub fn parse_repo_names(json: &str) -> Result<Vec<String>> {
    let names: Vec<String> = serde_json::from_str(json).map_err(|e| {
        DeployError::Configuration(format!(
            "{} must be a JSON array of strings: {}",
            ENV_REPO_NAMES, e
        ))
    })?;
    if names.is_empty() {
        return Err(DeployError::Configuration(format!(
            "{} must name at least one repository",
            ENV_REPO_NAMES
        )));
    }
    for name in &names {
        ensure_plain_name(name)?;
    }
    Ok(names)
}

/// The request id names files and the site, so it must be a single path
/// component.
pub fn ensure_request_id(request_id: &str) -> Result<()> {
    if !is_plain_component(request_id) {
        return Err(DeployError::Configuration(format!(
            "{} must not contain path separators or be '.' or '..': '{}'",
            ENV_REQUEST_ID, request_id
        )));
    }
    Ok(())
}

/// A single path component: non-blank, no separators, not `.` or `..`.
fn is_plain_component(value: &str) -> bool {
    !(value.trim().is_empty()
        || value == "."
        || value == ".."
        || value.contains('/')
        || value.contains('\\'))
}

fn ensure_plain_name(name: &str) -> Result<()> {
    if !is_plain_component(name) {
        return Err(DeployError::Configuration(format!(
            "invalid repository name '{}'",
            name
        )));
    }
    Ok(())
}
