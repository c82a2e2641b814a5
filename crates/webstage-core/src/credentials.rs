//! Service credential provisioning and control-plane identity activation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::command::{CommandRunner, CommandSpec};
use crate::config::DeploySettings;
use crate::error::{DeployError, Result};
use crate::git::{GitFetcher, Remote};
use crate::runlog::RunLog;

/// Environment binding consumed by the hosting CLI and gcloud.
pub const CREDENTIAL_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

const SCRATCH_DIR: &str = "service-account-repo";

/// The active identity for control-plane calls.
///
/// Commands that talk to the control plane take one of these and pass
/// [`ServiceCredential::env`] to the child, so no process-wide environment
/// is mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCredential {
    path: PathBuf,
}

impl ServiceCredential {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn env(&self) -> Vec<(String, String)> {
        vec![(
            CREDENTIAL_ENV.to_string(),
            self.path.to_string_lossy().into_owned(),
        )]
    }
}

/// Fetches the credential document and makes it the active identity.
pub struct CredentialProvisioner<'a> {
    runner: &'a dyn CommandRunner,
    settings: &'a DeploySettings,
    log: &'a RunLog,
}

impl<'a> CredentialProvisioner<'a> {
    pub fn new(runner: &'a dyn CommandRunner, settings: &'a DeploySettings, log: &'a RunLog) -> Self {
        Self {
            runner,
            settings,
            log,
        }
    }

    /// Clone the secrets repository into a scratch directory, copy the
    /// credential document to the workspace root, and drop the scratch copy.
    pub fn provision(&self, workspace_root: &Path, access_token: &str) -> Result<ServiceCredential> {
        self.log.info("Provisioning service credential");
        let scratch = workspace_root.join(SCRATCH_DIR);
        if scratch.exists() {
            self.remove_scratch(&scratch);
        }

        let remote = Remote::repository(
            &self.settings.scm_base_url,
            &self.settings.secrets_project,
            &self.settings.secrets_repo,
            access_token,
        )
        .map_err(|e| DeployError::Credential(e.to_string()))?;

        GitFetcher::new(self.runner, self.settings)
            .shallow_clone(&remote, &scratch, self.log)
            .map_err(|e| {
                self.log.error(format!("Secrets repository clone failed: {}", e));
                DeployError::Credential(format!("failed to fetch secrets repository: {}", e))
            })?;

        let file_name = &self.settings.credential_file;
        let source = scratch.join(file_name);
        if !source.is_file() {
            self.remove_scratch(&scratch);
            return Err(DeployError::Credential(format!(
                "{} not found in the secrets repository",
                file_name
            )));
        }

        let target = workspace_root.join(file_name);
        std::fs::copy(&source, &target).map_err(|e| {
            DeployError::Credential(format!(
                "failed to copy {} to {}: {}",
                file_name,
                target.display(),
                e
            ))
        })?;
        self.log.info(format!("Service credential copied to {}", target.display()));

        self.remove_scratch(&scratch);
        Ok(ServiceCredential::new(target))
    }

    fn remove_scratch(&self, scratch: &Path) {
        if let Err(e) = std::fs::remove_dir_all(scratch) {
            self.log.error(format!(
                "Failed to remove {}: {}",
                scratch.display(),
                e
            ));
        }
    }

    /// Activate the credential for gcloud and select the hosting project.
    pub fn activate(&self, credential: &ServiceCredential, project_id: &str) -> Result<()> {
        let key_file = credential.path().to_string_lossy().into_owned();
        self.gcloud(
            credential,
            &["auth", "activate-service-account", "--key-file", &key_file, "--quiet"],
        )?;
        self.log.info("gcloud service account activated");

        self.gcloud(credential, &["config", "set", "project", project_id, "--quiet"])?;
        self.log.info(format!("gcloud project set to {}", project_id));
        Ok(())
    }

    fn gcloud(&self, credential: &ServiceCredential, args: &[&str]) -> Result<()> {
        let spec = CommandSpec::new(&self.settings.tools.gcloud)
            .args(args.iter().copied())
            .envs(credential.env())
            .timeout(self.timeout());
        let output = self
            .runner
            .run(&spec)
            .map_err(|e| DeployError::Credential(e.to_string()))?;
        self.log.command(&spec, &output);
        if !output.success() {
            return Err(DeployError::Credential(format!(
                "`{}` failed: {}",
                spec.display(),
                output.diagnostics()
            )));
        }
        Ok(())
    }

    fn timeout(&self) -> Option<Duration> {
        self.settings.command_timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;
    use crate::fakes::{ScriptedRunner, write_files};
    use tempfile::TempDir;

    const KEY: &str = "preview-stack-service-account.json";

    fn secrets_clone_with(files: &'static [(&'static str, &'static str)]) -> ScriptedRunner {
        ScriptedRunner::new().on("git", "clone", move |spec| {
            let dest = PathBuf::from(spec.args.last().unwrap());
            write_files(&dest, files).unwrap();
            Ok(CommandOutput::ok(""))
        })
    }

    #[test]
    fn provision_copies_document_and_drops_scratch() {
        let ws = TempDir::new().unwrap();
        let runner = secrets_clone_with(&[(KEY, "{\"type\":\"service_account\"}")]);
        let settings = DeploySettings::default();
        let log = RunLog::new("req");

        let credential = CredentialProvisioner::new(&runner, &settings, &log)
            .provision(ws.path(), "tok")
            .unwrap();

        assert_eq!(credential.path(), ws.path().join(KEY));
        assert!(credential.path().is_file());
        assert!(!ws.path().join(SCRATCH_DIR).exists());
        assert_eq!(
            credential.env(),
            vec![(
                CREDENTIAL_ENV.to_string(),
                ws.path().join(KEY).to_string_lossy().into_owned()
            )]
        );

        let clone = &runner.calls()[0];
        assert!(
            clone
                .args
                .contains(&"https://tok@dev.azure.com/zpqv/zpqv-ai/_git/service-accounts".to_string())
        );
    }

    #[test]
    fn missing_document_is_a_credential_error() {
        let ws = TempDir::new().unwrap();
        let runner = secrets_clone_with(&[("README.md", "nothing here")]);
        let settings = DeploySettings::default();
        let log = RunLog::new("req");

        let err = CredentialProvisioner::new(&runner, &settings, &log)
            .provision(ws.path(), "tok")
            .unwrap_err();
        assert!(matches!(err, DeployError::Credential(ref msg) if msg.contains(KEY)));
        assert!(!ws.path().join(SCRATCH_DIR).exists());
    }

    #[test]
    fn failed_clone_is_a_credential_error() {
        let ws = TempDir::new().unwrap();
        let runner = ScriptedRunner::new()
            .on("git", "clone", |_| Ok(CommandOutput::failed(128, "auth failed")));
        let settings = DeploySettings::default();
        let log = RunLog::new("req");

        let err = CredentialProvisioner::new(&runner, &settings, &log)
            .provision(ws.path(), "tok")
            .unwrap_err();
        assert!(matches!(err, DeployError::Credential(ref msg) if msg.contains("auth failed")));
    }

    #[test]
    fn scratch_removal_failure_is_logged() {
        let ws = TempDir::new().unwrap();
        // A file where the scratch directory goes cannot be removed as a tree.
        std::fs::write(ws.path().join(SCRATCH_DIR), "not a directory").unwrap();
        let runner = ScriptedRunner::new()
            .on("git", "clone", |_| Ok(CommandOutput::failed(128, "destination exists")));
        let settings = DeploySettings::default();
        let log = RunLog::new("req");

        let err = CredentialProvisioner::new(&runner, &settings, &log)
            .provision(ws.path(), "tok")
            .unwrap_err();

        assert!(matches!(err, DeployError::Credential(_)));
        assert!(
            log.lines()
                .iter()
                .any(|line| line.contains("Failed to remove") && line.contains(SCRATCH_DIR))
        );
    }

    #[test]
    fn activate_runs_gcloud_with_credential_env() {
        let runner = ScriptedRunner::new();
        let settings = DeploySettings::default();
        let log = RunLog::new("req");
        let credential = ServiceCredential::new(PathBuf::from("/ws/key.json"));

        CredentialProvisioner::new(&runner, &settings, &log)
            .activate(&credential, "preview-stack")
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0].args,
            vec!["auth", "activate-service-account", "--key-file", "/ws/key.json", "--quiet"]
        );
        assert_eq!(
            calls[1].args,
            vec!["config", "set", "project", "preview-stack", "--quiet"]
        );
        assert!(calls.iter().all(|c| c.env == credential.env()));
    }

    #[test]
    fn activation_failure_stops_before_project_selection() {
        let runner = ScriptedRunner::new()
            .on("gcloud", "auth", |_| Ok(CommandOutput::failed(1, "invalid key")));
        let settings = DeploySettings::default();
        let log = RunLog::new("req");
        let credential = ServiceCredential::new(PathBuf::from("/ws/key.json"));

        let err = CredentialProvisioner::new(&runner, &settings, &log)
            .activate(&credential, "preview-stack")
            .unwrap_err();
        assert!(matches!(err, DeployError::Credential(_)));
        assert_eq!(runner.calls().len(), 1);
    }
}
