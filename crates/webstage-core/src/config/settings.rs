//! Deployment-wide settings (`webstage.toml`).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables shared by every run.
///
/// Every field has a default, so an empty or absent file yields the
/// production configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySettings {
    /// Parent of every per-run workspace; also holds the artifact log.
    pub work_base_dir: PathBuf,

    /// Hosting project that owns every preview site.
    pub hosting_project_id: String,

    /// Source-control organization URL, e.g. `https://dev.azure.com/org`.
    pub scm_base_url: String,

    /// Project and repository holding the service credential document.
    pub secrets_project: String,
    pub secrets_repo: String,
    pub credential_file: String,

    /// Branch fetched from every repository.
    pub branch: String,

    /// Name of the run log, locally and in the blob store.
    pub log_file_name: String,

    /// File under `work_base_dir` that receives a copy of every run log.
    pub artifact_log_file: String,

    /// Per-command timeout; `0` disables it.
    pub command_timeout_secs: u64,

    /// Blob store upload endpoint.
    pub storage_endpoint: String,

    pub tools: ToolSettings,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            work_base_dir: PathBuf::from("/tmp/workspaces"),
            hosting_project_id: "preview-stack".to_string(),
            scm_base_url: "https://dev.azure.com/zpqv".to_string(),
            secrets_project: "zpqv-ai".to_string(),
            secrets_repo: "service-accounts".to_string(),
            credential_file: "preview-stack-service-account.json".to_string(),
            branch: "master".to_string(),
            log_file_name: "web_deploy.txt".to_string(),
            artifact_log_file: "artifact_logs.log".to_string(),
            command_timeout_secs: 1800,
            storage_endpoint: "https://storage.googleapis.com".to_string(),
            tools: ToolSettings::default(),
        }
    }
}

impl DeploySettings {
    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_secs > 0).then(|| Duration::from_secs(self.command_timeout_secs))
    }

    pub fn artifact_log_path(&self) -> PathBuf {
        self.work_base_dir.join(&self.artifact_log_file)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let required = [
            ("hosting_project_id", &self.hosting_project_id),
            ("scm_base_url", &self.scm_base_url),
            ("secrets_project", &self.secrets_project),
            ("secrets_repo", &self.secrets_repo),
            ("credential_file", &self.credential_file),
            ("branch", &self.branch),
            ("log_file_name", &self.log_file_name),
            ("artifact_log_file", &self.artifact_log_file),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                anyhow::bail!("Setting '{}' must not be empty", name);
            }
        }
        for (name, value) in [
            ("scm_base_url", &self.scm_base_url),
            ("storage_endpoint", &self.storage_endpoint),
        ] {
            url::Url::parse(value)
                .map_err(|e| anyhow::anyhow!("Setting '{}' is not a valid URL: {}", name, e))?;
        }
        if self.credential_file.contains('/') {
            anyhow::bail!("Setting 'credential_file' must be a bare file name");
        }
        Ok(())
    }
}

/// Program names of the external tools, resolved through PATH.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub git: String,
    pub flutter: String,
    pub firebase: String,
    pub gcloud: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            git: "git".to_string(),
            flutter: "flutter".to_string(),
            firebase: "firebase".to_string(),
            gcloud: "gcloud".to_string(),
        }
    }
}
