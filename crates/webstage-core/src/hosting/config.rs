//! Declarative files read by the hosting CLI.
//!
//! - `.firebaserc`: binds the workspace to a hosting project
//! - `firebase.json`: one hosting block per target, one rewrite per repository

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DeployError, Result};

pub const PROJECT_BINDING_FILE: &str = ".firebaserc";
pub const ROUTING_CONFIG_FILE: &str = "firebase.json";

/// Directory under the workspace holding one staging root per site.
pub const STAGING_DIR: &str = "deploy_staging";

const IGNORE_PATTERNS: [&str; 3] = ["firebase.json", "**/.*", "**/node_modules/**"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectBinding {
    pub projects: BTreeMap<String, String>,
}

impl ProjectBinding {
    pub fn new(project_id: &str) -> Self {
        let mut projects = BTreeMap::new();
        projects.insert("default".to_string(), project_id.to_string());
        Self { projects }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub hosting: Vec<HostingBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostingBlock {
    pub target: String,
    pub public: String,
    pub ignore: Vec<String>,
    pub rewrites: Vec<RewriteRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteRule {
    pub source: String,
    pub destination: String,
}

impl RewriteRule {
    /// `/<repo>` and everything below it serve `/<repo>/index.html`.
    pub fn for_repo(repo: &str) -> Self {
        Self {
            source: format!("/{}{{,/**}}", repo),
            destination: format!("/{}/index.html", repo),
        }
    }
}

/// A named binding between a hosting block and a concrete site.
///
/// The target name always equals the site id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostingTarget {
    pub target_name: String,
    pub site_id: String,
    pub project_id: String,
    pub routes: Vec<RewriteRule>,
}

impl HostingTarget {
    /// One route per repository, in input order. Duplicates are kept.
    pub fn for_site(site_id: &str, project_id: &str, repo_names: &[String]) -> Self {
        Self {
            target_name: site_id.to_string(),
            site_id: site_id.to_string(),
            project_id: project_id.to_string(),
            routes: repo_names.iter().map(|r| RewriteRule::for_repo(r)).collect(),
        }
    }

    pub fn routing_config(&self) -> RoutingConfig {
        RoutingConfig {
            hosting: vec![HostingBlock {
                target: self.target_name.clone(),
                public: public_dir(&self.site_id),
                ignore: IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect(),
                rewrites: self.routes.clone(),
            }],
        }
    }
}

/// Public root of a site, relative to the workspace.
pub fn public_dir(site_id: &str) -> String {
    format!("{}/{}", STAGING_DIR, site_id)
}

/// Write `.firebaserc` into the workspace.
pub fn emit_project_binding(workspace_root: &Path, project_id: &str) -> Result<PathBuf> {
    let path = workspace_root.join(PROJECT_BINDING_FILE);
    write_json(&path, &ProjectBinding::new(project_id))?;
    Ok(path)
}

/// Write `firebase.json` into the workspace.
pub fn emit_routing_config(
    workspace_root: &Path,
    site_id: &str,
    repo_names: &[String],
) -> Result<PathBuf> {
    // The project id does not appear in firebase.json.
    let target = HostingTarget::for_site(site_id, "", repo_names);
    let path = workspace_root.join(ROUTING_CONFIG_FILE);
    write_json(&path, &target.routing_config())?;
    Ok(path)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let to_error = |source: std::io::Error| DeployError::ConfigWrite {
        path: path.to_path_buf(),
        source,
    };
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| to_error(e.into()))?;
    std::fs::write(path, bytes).map_err(to_error)
}
