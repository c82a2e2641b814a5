//! In-memory stand-ins for the external collaborators.
//!
//! Used by this crate's tests and by downstream integration tests; nothing
//! here touches real tools or the network.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use crate::command::{CommandError, CommandOutput, CommandRunner, CommandSpec};
use crate::credentials::ServiceCredential;
use crate::storage::BlobStore;

type Matcher = Box<dyn Fn(&CommandSpec) -> bool + Send + Sync>;
type Handler = Box<dyn Fn(&CommandSpec) -> Result<CommandOutput, CommandError> + Send + Sync>;

/// A [`CommandRunner`] that answers from a script and records every call.
///
/// Rules are consulted in registration order; the first match answers.
/// Unmatched commands succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<(Matcher, Handler)>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands accepted by `matcher` with `handler`.
    pub fn when<M, H>(mut self, matcher: M, handler: H) -> Self
    where
        M: Fn(&CommandSpec) -> bool + Send + Sync + 'static,
        H: Fn(&CommandSpec) -> Result<CommandOutput, CommandError> + Send + Sync + 'static,
    {
        self.rules.push((Box::new(matcher), Box::new(handler)));
        self
    }

    /// Answer `<program> <subcommand> ...` with `handler`.
    pub fn on<H>(self, program: &str, subcommand: &str, handler: H) -> Self
    where
        H: Fn(&CommandSpec) -> Result<CommandOutput, CommandError> + Send + Sync + 'static,
    {
        let program = program.to_string();
        let subcommand = subcommand.to_string();
        self.when(
            move |spec| spec.program == program && spec.subcommand() == Some(subcommand.as_str()),
            handler,
        )
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `program subcommand` of every call, in order.
    pub fn call_summary(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|spec| match spec.subcommand() {
                Some(sub) => format!("{} {}", spec.program, sub),
                None => spec.program.clone(),
            })
            .collect()
    }

    pub fn was_called(&self, program: &str, subcommand: &str) -> bool {
        self.calls()
            .iter()
            .any(|spec| spec.program == program && spec.subcommand() == Some(subcommand))
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(spec.clone());
        for (matcher, handler) in &self.rules {
            if matcher(spec) {
                return handler(spec);
            }
        }
        Ok(CommandOutput::ok(""))
    }
}

/// Write `files` (relative path, content) under `root`, creating parents.
pub fn write_files(root: &Path, files: &[(&str, &str)]) -> std::io::Result<()> {
    for (relative, content) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
    }
    Ok(())
}

/// One object received by [`MemoryBlobStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bucket: String,
    pub key: String,
    pub project_id: String,
    pub content: Vec<u8>,
}

/// A [`BlobStore`] that keeps uploads in memory, optionally failing.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<Vec<StoredObject>>,
    fail_with: Option<String>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every upload fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            objects: Mutex::new(Vec::new()),
            fail_with: Some(message.into()),
        }
    }

    pub fn objects(&self) -> Vec<StoredObject> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl BlobStore for MemoryBlobStore {
    fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        project_id: &str,
        _credential: &ServiceCredential,
    ) -> anyhow::Result<()> {
        if let Some(message) = &self.fail_with {
            anyhow::bail!("{}", message);
        }
        let content = std::fs::read(local_path)?;
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(StoredObject {
                bucket: bucket.to_string(),
                key: key.to_string(),
                project_id: project_id.to_string(),
                content,
            });
        Ok(())
    }
}
