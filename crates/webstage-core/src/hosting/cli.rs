//! Invocation of the hosting control-plane CLI.

use std::path::Path;
use std::time::Duration;

use crate::command::{CommandError, CommandOutput, CommandRunner, CommandSpec};
use crate::config::DeploySettings;
use crate::credentials::ServiceCredential;
use crate::runlog::RunLog;

/// The hosting CLI bound to one credential.
pub struct HostingCli<'a> {
    runner: &'a dyn CommandRunner,
    program: String,
    timeout: Option<Duration>,
    credential: &'a ServiceCredential,
    log: &'a RunLog,
}

impl<'a> HostingCli<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        settings: &DeploySettings,
        credential: &'a ServiceCredential,
        log: &'a RunLog,
    ) -> Self {
        Self {
            runner,
            program: settings.tools.firebase.clone(),
            timeout: settings.command_timeout(),
            credential,
            log,
        }
    }

    pub fn log(&self) -> &RunLog {
        self.log
    }

    pub fn spec(&self, args: &[String], cwd: &Path) -> CommandSpec {
        CommandSpec::new(&self.program)
            .args(args.iter().cloned())
            .current_dir(cwd)
            .envs(self.credential.env())
            .timeout(self.timeout)
    }

    /// Run the CLI from `cwd` and record the outcome in the run log.
    pub fn run(&self, args: &[String], cwd: &Path) -> Result<CommandOutput, CommandError> {
        let spec = self.spec(args, cwd);
        self.log.info(format!("Running `{}` from {}", spec.display(), cwd.display()));
        let output = self.runner.run(&spec)?;
        self.log.command(&spec, &output);
        Ok(output)
    }
}
