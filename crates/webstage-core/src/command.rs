//! External command execution.
//!
//! Every external tool call (git, the build toolchain, the hosting CLI,
//! gcloud) goes through [`CommandRunner`], so timeouts and output capture
//! live in one place.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;

const REDACTED: &str = "***";

/// A fully described external invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute (resolved through PATH).
    pub program: String,

    /// Arguments passed verbatim.
    pub args: Vec<String>,

    /// Working directory, inherited when unset.
    pub cwd: Option<PathBuf>,

    /// Extra environment bindings layered over the inherited environment.
    pub env: Vec<(String, String)>,

    /// Upper bound on wall-clock time; unbounded when unset.
    pub timeout: Option<Duration>,

    /// Substrings masked whenever the command line is rendered.
    pub secrets: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn envs<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.env.extend(vars);
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn redact(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.secrets.push(secret);
        }
        self
    }

    /// The first argument, which for every tool we drive is the subcommand.
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// Command line suitable for logs, with secrets masked.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        self.mask(&line)
    }

    /// Mask every registered secret in `text`.
    pub fn mask(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret, REDACTED))
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `-1` when the process was terminated by a signal.
    pub status_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status_code: 0,
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    pub fn failed(status_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status_code,
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        self.status_code == 0
    }

    /// Both captured streams, trimmed, for error messages.
    pub fn diagnostics(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();
        match (stdout.is_empty(), stderr.is_empty()) {
            (true, true) => format!("exit code {}", self.status_code),
            (false, true) => format!("exit code {}: {}", self.status_code, stdout),
            (true, false) => format!("exit code {}: {}", self.status_code, stderr),
            (false, false) => format!("exit code {}: {}\n{}", self.status_code, stdout, stderr),
        }
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed waiting for `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` timed out after {}s", timeout.as_secs())]
    TimedOut { command: String, timeout: Duration },

    #[error("failed to start command runtime: {0}")]
    Runtime(#[source] io::Error),
}

/// Runs external commands to completion.
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError>;
}

/// Runs commands as real child processes.
///
/// Each call blocks the caller; a private current-thread runtime provides
/// the timeout and kills the child if it is exceeded.
#[derive(Debug)]
pub struct SystemRunner {
    runtime: tokio::runtime::Runtime,
}

impl SystemRunner {
    pub fn new() -> Result<Self, CommandError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(CommandError::Runtime)?;
        Ok(Self { runtime })
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        tracing::debug!(command = %spec.display(), cwd = ?spec.cwd, "running external command");
        self.runtime.block_on(run_child(spec))
    }
}

async fn run_child(spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
    let start = Instant::now();

    let mut cmd = tokio::process::Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.cwd {
        cmd.current_dir(dir);
    }
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    let child = cmd.spawn().map_err(|source| CommandError::Spawn {
        program: spec.program.clone(),
        source,
    })?;

    let waited = match spec.timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| CommandError::TimedOut {
                command: spec.display(),
                timeout: limit,
            })?,
        None => child.wait_with_output().await,
    };
    let output = waited.map_err(|source| CommandError::Wait {
        command: spec.display(),
        source,
    })?;

    Ok(CommandOutput {
        status_code: output.status.code().unwrap_or(-1),
        stdout: spec.mask(&String::from_utf8_lossy(&output.stdout)),
        stderr: spec.mask(&String::from_utf8_lossy(&output.stderr)),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_masks_secrets() {
        let spec = CommandSpec::new("git")
            .args(["clone", "https://s3cr3t@dev.example.com/org/_git/repo"])
            .redact("s3cr3t");
        assert_eq!(
            spec.display(),
            "git clone https://***@dev.example.com/org/_git/repo"
        );
    }

    #[test]
    fn empty_secret_is_ignored() {
        let spec = CommandSpec::new("echo").arg("hello").redact("");
        assert!(spec.secrets.is_empty());
        assert_eq!(spec.display(), "echo hello");
    }

    #[test]
    fn diagnostics_combines_streams() {
        let output = CommandOutput {
            status_code: 2,
            stdout: "out\n".to_string(),
            stderr: "err\n".to_string(),
            duration_ms: 0,
        };
        assert_eq!(output.diagnostics(), "exit code 2: out\nerr");
        assert_eq!(CommandOutput::failed(1, "").diagnostics(), "exit code 1");
    }

    #[test]
    fn system_runner_captures_stdout() {
        let runner = SystemRunner::new().expect("runtime");
        let output = runner
            .run(&CommandSpec::new("echo").arg("hello"))
            .expect("echo runs");
        assert!(output.success());
        assert!(output.stdout.contains("hello"));
    }

    #[test]
    fn system_runner_reports_non_zero_exit() {
        let runner = SystemRunner::new().expect("runtime");
        let output = runner.run(&CommandSpec::new("false")).expect("false runs");
        assert!(!output.success());
        assert_ne!(output.status_code, 0);
    }

    #[test]
    fn system_runner_honours_cwd() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let runner = SystemRunner::new().expect("runtime");
        let output = runner
            .run(&CommandSpec::new("ls").current_dir(dir.path()))
            .expect("ls runs");
        assert!(output.stdout.contains("marker.txt"));
    }

    #[test]
    fn system_runner_times_out() {
        let runner = SystemRunner::new().expect("runtime");
        let spec = CommandSpec::new("sleep")
            .arg("5")
            .timeout(Some(Duration::from_millis(100)));
        let err = runner.run(&spec).expect_err("sleep exceeds timeout");
        assert!(matches!(err, CommandError::TimedOut { .. }));
    }

    #[test]
    fn system_runner_reports_missing_program() {
        let runner = SystemRunner::new().expect("runtime");
        let err = runner
            .run(&CommandSpec::new("webstage-definitely-not-a-program"))
            .expect_err("spawn fails");
        assert!(matches!(err, CommandError::Spawn { .. }));
    }
}
