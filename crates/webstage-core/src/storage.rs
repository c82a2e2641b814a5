//! Durable persistence of the run log.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use crate::command::{CommandRunner, CommandSpec};
use crate::config::DeploySettings;
use crate::credentials::ServiceCredential;
use crate::error::{DeployError, Result};
use crate::runlog::RunLog;

/// An object store that accepts whole-file uploads.
pub trait BlobStore {
    fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        project_id: &str,
        credential: &ServiceCredential,
    ) -> anyhow::Result<()>;
}

/// Object key of a run's log, `<request_id>/<file_name>`.
pub fn log_object_key(request_id: &str, file_name: &str) -> String {
    format!("{}/{}", request_id, file_name)
}

/// Upload the flushed log and return the object key.
pub fn persist_log(
    store: &dyn BlobStore,
    log_path: &Path,
    bucket: &str,
    key: &str,
    project_id: &str,
    credential: &ServiceCredential,
) -> Result<String> {
    store
        .upload(log_path, bucket, key, project_id, credential)
        .map_err(|e| DeployError::LogPersist(format!("gs://{}/{}: {:#}", bucket, key, e)))?;
    Ok(key.to_string())
}

/// Copy the flushed log to the cross-run artifact path.
pub fn write_artifact_copy(log_path: &Path, artifact_path: &Path) -> anyhow::Result<PathBuf> {
    if let Some(parent) = artifact_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::copy(log_path, artifact_path).with_context(|| {
        format!(
            "Failed to copy {} to {}",
            log_path.display(),
            artifact_path.display()
        )
    })?;
    Ok(artifact_path.to_path_buf())
}

/// Google Cloud Storage through its JSON upload API.
///
/// The bearer token is minted by gcloud under the run's credential.
pub struct GcsBlobStore<'a> {
    runner: &'a dyn CommandRunner,
    gcloud: String,
    endpoint: String,
    timeout: Option<Duration>,
}

impl<'a> GcsBlobStore<'a> {
    pub fn new(runner: &'a dyn CommandRunner, settings: &DeploySettings) -> Self {
        Self {
            runner,
            gcloud: settings.tools.gcloud.clone(),
            endpoint: settings.storage_endpoint.clone(),
            timeout: settings.command_timeout(),
        }
    }

    pub fn upload_url(&self, bucket: &str, key: &str) -> anyhow::Result<url::Url> {
        let mut url = url::Url::parse(&self.endpoint)
            .with_context(|| format!("Invalid storage endpoint: {}", self.endpoint))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Storage endpoint cannot be a base: {}", self.endpoint))?
            .pop_if_empty()
            .extend(["upload", "storage", "v1", "b", bucket, "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", key);
        Ok(url)
    }

    fn access_token(&self, credential: &ServiceCredential) -> anyhow::Result<String> {
        let spec = CommandSpec::new(&self.gcloud)
            .args(["auth", "print-access-token"])
            .envs(credential.env())
            .timeout(self.timeout);
        let output = self.runner.run(&spec)?;
        if !output.success() {
            anyhow::bail!("`{}` failed: {}", spec.display(), output.diagnostics());
        }
        let token = output.stdout.trim().to_string();
        if token.is_empty() {
            anyhow::bail!("`{}` printed no token", spec.display());
        }
        Ok(token)
    }
}

impl BlobStore for GcsBlobStore<'_> {
    fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        project_id: &str,
        credential: &ServiceCredential,
    ) -> anyhow::Result<()> {
        let body = std::fs::read(local_path)
            .with_context(|| format!("Failed to read {}", local_path.display()))?;
        let token = self.access_token(credential)?;
        let url = self.upload_url(bucket, key)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start HTTP runtime")?;
        runtime.block_on(async {
            let mut builder = reqwest::Client::builder().user_agent("webstage/0.1.0");
            if let Some(timeout) = self.timeout {
                builder = builder.timeout(timeout);
            }
            let client = builder.build().context("Failed to build HTTP client")?;

            let response = client
                .post(url.clone())
                .bearer_auth(&token)
                .header("x-goog-user-project", project_id)
                .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(body)
                .send()
                .await
                .with_context(|| format!("Failed to upload to {}", url))?;

            if !response.status().is_success() {
                let status = response.status();
                let detail = response.text().await.unwrap_or_default();
                anyhow::bail!("Upload failed: HTTP {} from {}: {}", status, url, detail.trim());
            }
            Ok::<(), anyhow::Error>(())
        })
    }
}

/// Flush the log to `log_path` and copy it to the artifact path.
///
/// If the flush fails the artifact is written straight from memory, so the
/// artifact copy exists whenever its directory is writable. Failures are
/// recorded in the log and reported, never raised. Returns whether both
/// files were written.
pub fn flush_with_artifact(log: &RunLog, log_path: &Path, artifact_path: &Path) -> bool {
    let copied = match log.flush_to(log_path) {
        Ok(()) => write_artifact_copy(log_path, artifact_path).map(|_| true),
        Err(e) => {
            log.error(format!("Failed to flush log to {}: {}", log_path.display(), e));
            write_artifact_from_memory(log, artifact_path).map(|_| false)
        }
    };
    match copied {
        Ok(flushed) => {
            tracing::debug!(artifact = %artifact_path.display(), "artifact log written");
            flushed
        }
        Err(e) => {
            log.error(format!("{:#}", e));
            false
        }
    }
}

fn write_artifact_from_memory(log: &RunLog, artifact_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = artifact_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    log.flush_to(artifact_path)
        .with_context(|| format!("Failed to write {}", artifact_path.display()))
}
