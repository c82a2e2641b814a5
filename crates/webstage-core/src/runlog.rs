//! Request-scoped, append-only run log.
//!
//! One [`RunLog`] exists per run. Components receive `&RunLog` and append to
//! it; every line is mirrored to `tracing` so process output and the
//! persisted log stay identical.

use std::io;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{SecondsFormat, Utc};

use crate::command::{CommandOutput, CommandSpec};

#[derive(Debug)]
pub struct RunLog {
    request_id: String,
    lines: Mutex<Vec<String>>,
}

impl RunLog {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            lines: Mutex::new(Vec::new()),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn info(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!(request_id = %self.request_id, "{}", message);
        self.append(message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::error!(request_id = %self.request_id, "{}", message);
        self.append(message);
    }

    /// Record the outcome of an external command, including both streams.
    pub fn command(&self, spec: &CommandSpec, output: &CommandOutput) {
        let line = format!(
            "`{}` exited with {} after {}ms",
            spec.display(),
            output.status_code,
            output.duration_ms
        );
        if output.success() {
            self.info(line);
        } else {
            self.error(line);
        }
        if !output.stdout.trim().is_empty() {
            self.info(format!("stdout:\n{}", output.stdout.trim_end()));
        }
        if !output.stderr.trim().is_empty() {
            self.info(format!("stderr:\n{}", output.stderr.trim_end()));
        }
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// Snapshot of every line appended so far, in order.
    pub fn lines(&self) -> Vec<String> {
        self.guard().clone()
    }

    /// Write the whole log to `path`, replacing any previous flush.
    pub fn flush_to(&self, path: &Path) -> io::Result<()> {
        let content = self.guard().join("\n");
        std::fs::write(path, content)
    }

    fn append(&self, message: &str) {
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let line = format!("{} [{}] {}", stamp, self.request_id, message);
        self.guard().push(line);
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
