//! The one-shot deployment pipeline.
//!
//! Steps run strictly in order and the first failure aborts the run. Three
//! things happen on every exit path once a workspace exists: the run log is
//! flushed inside the workspace, copied to the artifact path, and the
//! workspace is released. Log upload is attempted whenever a credential was
//! established; on the failure path its outcome never replaces the original
//! error.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::builder::BuildRunner;
use crate::command::CommandRunner;
use crate::config::inputs::ensure_request_id;
use crate::config::{DeployRequest, DeploySettings};
use crate::context::{RepositoryEntry, RunContext};
use crate::credentials::{CredentialProvisioner, ServiceCredential};
use crate::error::{DeployError, Result, error_chain};
use crate::git::{GitFetcher, Remote};
use crate::hosting::{
    HostingCli, SiteStatus, bind_target, emit_project_binding, emit_routing_config, ensure_site,
    publish,
};
use crate::identity::resolve_site_id;
use crate::runlog::RunLog;
use crate::stage::StagingTree;
use crate::storage::{BlobStore, flush_with_artifact, log_object_key, persist_log};
use crate::workspace::Workspace;

/// Summary of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub request_id: String,
    pub site_id: String,
    pub site_status: SiteStatus,
    /// Staged repositories and the digest of each staged tree.
    pub staged: BTreeMap<String, String>,
    pub log_object: String,
    /// Workspace the run used. It no longer exists when the report is returned.
    pub workspace: PathBuf,
}

struct Published {
    site_status: SiteStatus,
    staged: BTreeMap<String, String>,
}

pub struct DeployPipeline<'a> {
    settings: &'a DeploySettings,
    runner: &'a dyn CommandRunner,
    blob_store: &'a dyn BlobStore,
}

impl<'a> DeployPipeline<'a> {
    pub fn new(
        settings: &'a DeploySettings,
        runner: &'a dyn CommandRunner,
        blob_store: &'a dyn BlobStore,
    ) -> Self {
        Self {
            settings,
            runner,
            blob_store,
        }
    }

    pub fn run(&self, request: &DeployRequest) -> Result<DeployReport> {
        self.settings
            .validate()
            .map_err(|e| DeployError::Configuration(format!("{:#}", e)))?;
        ensure_request_id(&request.request_id)?;

        let site_id = resolve_site_id(&request.request_id);
        let log = RunLog::new(&request.request_id);
        log.info(format!(
            "Starting deployment of {} repositories from project '{}' to site {}",
            request.repo_names.len(),
            request.project_name,
            site_id
        ));

        let workspace = match Workspace::acquire(&self.settings.work_base_dir) {
            Ok(workspace) => workspace,
            Err(err) => {
                log.error(format!("Deployment failed ({}): {}", err.kind(), error_chain(&err)));
                // No workspace to flush into; keep at least the artifact copy.
                if let Err(e) = log.flush_to(&self.settings.artifact_log_path()) {
                    tracing::error!(error = %e, "failed to write artifact log");
                }
                return Err(err);
            }
        };
        log.info(format!("Workspace: {}", workspace.root().display()));

        let mut credential = None;
        let outcome = self.execute(request, &site_id, workspace.root(), &log, &mut credential);

        // The workspace is per run, so the local log name needs no request id.
        let log_path = workspace.join(&self.settings.log_file_name);
        let key = log_object_key(log.request_id(), &self.settings.log_file_name);

        let result = match outcome {
            Ok(published) => {
                log.info(format!("Deployment to site {} complete", site_id));
                flush_with_artifact(&log, &log_path, &self.settings.artifact_log_path());
                self.upload(&log_path, &request.bucket, &key, credential.as_ref())
                    .map(|log_object| DeployReport {
                        request_id: request.request_id.clone(),
                        site_id: site_id.clone(),
                        site_status: published.site_status,
                        staged: published.staged,
                        log_object,
                        workspace: workspace.root().to_path_buf(),
                    })
            }
            Err(err) => {
                log.error(format!("Deployment failed ({}): {}", err.kind(), error_chain(&err)));
                flush_with_artifact(&log, &log_path, &self.settings.artifact_log_path());
                if credential.is_some()
                    && let Err(upload_err) =
                        self.upload(&log_path, &request.bucket, &key, credential.as_ref())
                {
                    log.error(format!("Log upload after failure also failed: {}", upload_err));
                }
                Err(err)
            }
        };

        match workspace.release() {
            Ok(root) => log.info(format!("Workspace {} removed", root.display())),
            Err(e) => log.error(format!("Failed to remove workspace: {}", e)),
        }
        result
    }

    fn execute(
        &self,
        request: &DeployRequest,
        site_id: &str,
        workspace_root: &Path,
        log: &RunLog,
        credential_slot: &mut Option<ServiceCredential>,
    ) -> Result<Published> {
        let settings = self.settings;
        let project_id = settings.hosting_project_id.as_str();

        let provisioner = CredentialProvisioner::new(self.runner, settings, log);
        let credential = provisioner.provision(workspace_root, &request.access_token)?;
        *credential_slot = Some(credential.clone());
        provisioner.activate(&credential, project_id)?;

        let ctx = RunContext::new(
            request.request_id.clone(),
            site_id.to_string(),
            request.project_name.clone(),
            request.repo_names.clone(),
            credential.path().to_path_buf(),
            workspace_root.to_path_buf(),
        );

        log.info(format!(
            "Run {} authenticated with {}",
            ctx.request_id(),
            ctx.credential_path().display()
        ));

        let binding = emit_project_binding(ctx.workspace_root(), project_id)?;
        echo_file(log, &binding);
        let routing = emit_routing_config(ctx.workspace_root(), ctx.site_id(), ctx.repo_names())?;
        echo_file(log, &routing);

        // Created once; every repository stages into it.
        let mut staging = StagingTree::create(ctx.workspace_root(), ctx.site_id())?;

        let mut entries = self.fetch_all(&ctx, &request.access_token, log)?;
        BuildRunner::new(self.runner, settings, log).build_all(&mut entries)?;
        staging.stage_all(&entries, log)?;

        let cli = HostingCli::new(self.runner, settings, &credential, log);
        let site_status = ensure_site(&cli, ctx.workspace_root(), ctx.site_id(), project_id)?;
        log.info(format!("Site {} status: {}", ctx.site_id(), site_status.as_str()));
        bind_target(
            &cli,
            ctx.workspace_root(),
            ctx.target_name(),
            ctx.site_id(),
            project_id,
        )?;
        publish(&cli, ctx.workspace_root(), ctx.target_name(), project_id)?;

        Ok(Published {
            site_status,
            staged: staging.staged().clone(),
        })
    }

    fn fetch_all(
        &self,
        ctx: &RunContext,
        access_token: &str,
        log: &RunLog,
    ) -> Result<Vec<RepositoryEntry>> {
        let fetcher = GitFetcher::new(self.runner, self.settings);
        let mut entries = Vec::with_capacity(ctx.repo_names().len());
        for name in ctx.repo_names() {
            let remote = Remote::repository(
                &self.settings.scm_base_url,
                ctx.project_name(),
                name,
                access_token,
            )
            .map_err(|e| DeployError::Fetch {
                repo: name.clone(),
                detail: e.to_string(),
            })?;
            entries.push(fetcher.fetch(ctx.workspace_root(), name, &remote, log)?);
        }
        Ok(entries)
    }

    fn upload(
        &self,
        log_path: &Path,
        bucket: &str,
        key: &str,
        credential: Option<&ServiceCredential>,
    ) -> Result<String> {
        let credential = credential.ok_or_else(|| {
            DeployError::LogPersist("no credential available for upload".to_string())
        })?;
        persist_log(
            self.blob_store,
            log_path,
            bucket,
            key,
            &self.settings.hosting_project_id,
            credential,
        )
    }
}

fn echo_file(log: &RunLog, path: &Path) {
    match std::fs::read_to_string(path) {
        Ok(content) => log.info(format!("{}:\n{}", path.display(), content)),
        Err(e) => log.error(format!("Failed to read back {}: {}", path.display(), e)),
    }
}
