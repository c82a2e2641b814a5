//! Web builds of fetched repositories.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::command::{CommandRunner, CommandSpec};
use crate::config::DeploySettings;
use crate::context::RepositoryEntry;
use crate::error::{DeployError, Result};
use crate::runlog::RunLog;

/// Build-tool manifest that marks a buildable project.
pub const MANIFEST_FILE: &str = "pubspec.yaml";

/// Web entry point relative to the project root.
pub fn web_entry(project: &Path) -> PathBuf {
    project.join("web").join("index.html")
}

/// Conventional build output relative to the project root.
pub fn build_output_dir(project: &Path) -> PathBuf {
    project.join("build").join("web")
}

/// Asset base path for a repository staged at `/<repo>/`.
pub fn base_href(repo_name: &str) -> String {
    format!("/{}/", repo_name)
}

/// Runs the two-stage build for each repository, one at a time.
///
/// The toolchain shares global caches between invocations, so builds are
/// never run concurrently.
pub struct BuildRunner<'a> {
    runner: &'a dyn CommandRunner,
    program: String,
    timeout: Option<Duration>,
    log: &'a RunLog,
}

impl<'a> BuildRunner<'a> {
    pub fn new(runner: &'a dyn CommandRunner, settings: &DeploySettings, log: &'a RunLog) -> Self {
        Self {
            runner,
            program: settings.tools.flutter.clone(),
            timeout: settings.command_timeout(),
            log,
        }
    }

    /// Build every entry in order, stopping at the first failure.
    pub fn build_all(&self, entries: &mut [RepositoryEntry]) -> Result<()> {
        for entry in entries.iter_mut() {
            self.build(entry)?;
        }
        Ok(())
    }

    pub fn build(&self, entry: &mut RepositoryEntry) -> Result<()> {
        self.log.info(format!("Building web app for '{}'", entry.name));
        self.check_preconditions(entry)?;

        let resolve = vec!["pub".to_string(), "get".to_string()];
        self.run_step(entry, "pub get", resolve)?;

        let compile = vec![
            "build".to_string(),
            "web".to_string(),
            "--release".to_string(),
            "--no-tree-shake-icons".to_string(),
            format!("--base-href={}", base_href(&entry.name)),
        ];
        self.run_step(entry, "build web", compile)?;

        let output = build_output_dir(&entry.local_path);
        self.log.info(format!(
            "Build of '{}' finished, output expected at {}",
            entry.name,
            output.display()
        ));
        entry.build_output = Some(output);
        Ok(())
    }

    fn check_preconditions(&self, entry: &RepositoryEntry) -> Result<()> {
        let manifest = entry.local_path.join(MANIFEST_FILE);
        let web_index = web_entry(&entry.local_path);
        for required in [manifest, web_index] {
            let present = required.is_file();
            self.log.info(format!(
                "Checking {} (exists: {})",
                required.display(),
                present
            ));
            if !present {
                self.log.error(format!(
                    "'{}' cannot be built: {} is missing",
                    entry.name,
                    required.display()
                ));
                return Err(DeployError::BuildPrecondition {
                    repo: entry.name.clone(),
                    missing: required,
                });
            }
        }
        Ok(())
    }

    fn run_step(&self, entry: &RepositoryEntry, step: &str, args: Vec<String>) -> Result<()> {
        let spec = CommandSpec::new(&self.program)
            .args(args)
            .current_dir(&entry.local_path)
            .timeout(self.timeout);
        self.log.info(format!("Running `{}` for '{}'", spec.display(), entry.name));
        let output = self.runner.run(&spec)?;
        self.log.command(&spec, &output);

        if !output.success() {
            return Err(DeployError::Build {
                repo: entry.name.clone(),
                step: step.to_string(),
                output: output.diagnostics(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;
    use crate::fakes::{ScriptedRunner, write_files};
    use tempfile::TempDir;

    fn project(root: &Path, name: &str, files: &[(&str, &str)]) -> RepositoryEntry {
        let path = root.join(name);
        std::fs::create_dir_all(&path).unwrap();
        write_files(&path, files).unwrap();
        RepositoryEntry::fetched(name, path)
    }

    fn buildable(root: &Path, name: &str) -> RepositoryEntry {
        project(
            root,
            name,
            &[("pubspec.yaml", "name: app\n"), ("web/index.html", "<html>")],
        )
    }

    #[test]
    fn two_stage_build_with_base_href() {
        let ws = TempDir::new().unwrap();
        let runner = ScriptedRunner::new();
        let settings = DeploySettings::default();
        let log = RunLog::new("req");
        let mut entry = buildable(ws.path(), "mobile-app");

        BuildRunner::new(&runner, &settings, &log)
            .build(&mut entry)
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args, vec!["pub", "get"]);
        assert_eq!(
            calls[1].args,
            vec![
                "build",
                "web",
                "--release",
                "--no-tree-shake-icons",
                "--base-href=/mobile-app/"
            ]
        );
        assert!(calls.iter().all(|c| c.cwd.as_deref() == Some(entry.local_path.as_path())));
        assert_eq!(
            entry.build_output,
            Some(ws.path().join("mobile-app").join("build").join("web"))
        );
    }

    #[test]
    fn missing_manifest_is_a_precondition_error() {
        let ws = TempDir::new().unwrap();
        let runner = ScriptedRunner::new();
        let settings = DeploySettings::default();
        let log = RunLog::new("req");
        let mut entry = project(ws.path(), "app", &[("web/index.html", "<html>")]);

        let err = BuildRunner::new(&runner, &settings, &log)
            .build(&mut entry)
            .unwrap_err();
        match err {
            DeployError::BuildPrecondition { repo, missing } => {
                assert_eq!(repo, "app");
                assert!(missing.ends_with(MANIFEST_FILE));
            }
            other => panic!("expected precondition error, got {other:?}"),
        }
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn missing_web_entry_is_a_distinct_precondition() {
        let ws = TempDir::new().unwrap();
        let runner = ScriptedRunner::new();
        let settings = DeploySettings::default();
        let log = RunLog::new("req");
        let mut entry = project(ws.path(), "app", &[("pubspec.yaml", "name: app\n")]);

        let err = BuildRunner::new(&runner, &settings, &log)
            .build(&mut entry)
            .unwrap_err();
        match err {
            DeployError::BuildPrecondition { missing, .. } => {
                assert!(missing.ends_with("web/index.html"));
            }
            other => panic!("expected precondition error, got {other:?}"),
        }
    }

    #[test]
    fn failed_dependency_stage_skips_compilation() {
        let ws = TempDir::new().unwrap();
        let runner = ScriptedRunner::new()
            .on("flutter", "pub", |_| Ok(CommandOutput::failed(66, "version solving failed")));
        let settings = DeploySettings::default();
        let log = RunLog::new("req");
        let mut entry = buildable(ws.path(), "app");

        let err = BuildRunner::new(&runner, &settings, &log)
            .build(&mut entry)
            .unwrap_err();
        match err {
            DeployError::Build { step, output, .. } => {
                assert_eq!(step, "pub get");
                assert!(output.contains("version solving failed"));
            }
            other => panic!("expected build error, got {other:?}"),
        }
        assert_eq!(runner.calls().len(), 1);
        assert_eq!(entry.build_output, None);
    }

    #[test]
    fn build_all_is_sequential_and_stops_at_first_failure() {
        let ws = TempDir::new().unwrap();
        let runner = ScriptedRunner::new().when(
            |spec| {
                spec.subcommand() == Some("build")
                    && spec.cwd.as_deref().is_some_and(|d| d.ends_with("second"))
            },
            |_| Ok(CommandOutput::failed(1, "compile error")),
        );
        let settings = DeploySettings::default();
        let log = RunLog::new("req");
        let mut entries = vec![
            buildable(ws.path(), "first"),
            buildable(ws.path(), "second"),
            buildable(ws.path(), "third"),
        ];

        let err = BuildRunner::new(&runner, &settings, &log)
            .build_all(&mut entries)
            .unwrap_err();
        assert!(matches!(err, DeployError::Build { ref repo, .. } if repo == "second"));
        assert!(entries[0].build_output.is_some());
        assert!(entries[1].build_output.is_none());
        assert!(entries[2].build_output.is_none());
        // first: pub get + build, second: pub get + build, third never starts
        assert_eq!(runner.calls().len(), 4);
    }
}
