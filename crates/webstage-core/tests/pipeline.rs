//! End-to-end runs of the deployment pipeline against scripted tools.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

use tempfile::TempDir;

use webstage_core::command::{CommandOutput, CommandSpec};
use webstage_core::config::{DeployRequest, DeploySettings};
use webstage_core::credentials::ServiceCredential;
use webstage_core::error::DeployError;
use webstage_core::fakes::{MemoryBlobStore, ScriptedRunner, write_files};
use webstage_core::hosting::SiteStatus;
use webstage_core::pipeline::DeployPipeline;
use webstage_core::storage::BlobStore;

const REQUEST_ID: &str = "b3b5e3a0-1234-4abc-9def-abcdef123456_preview";
const SITE_ID: &str = "b3b5e3a012344abc9def";
const KEY_FILE: &str = "preview-stack-service-account.json";

fn settings(base: &Path) -> DeploySettings {
    DeploySettings {
        work_base_dir: base.to_path_buf(),
        ..DeploySettings::default()
    }
}

fn request(repos: &[&str]) -> DeployRequest {
    DeployRequest {
        request_id: REQUEST_ID.to_string(),
        project_name: "apps".to_string(),
        repo_names: repos.iter().map(|r| r.to_string()).collect(),
        access_token: "pat-token".to_string(),
        bucket: "deploy-logs".to_string(),
    }
}

fn clone_dest(spec: &CommandSpec) -> PathBuf {
    PathBuf::from(spec.args.last().expect("clone destination"))
}

/// Append tools whose clones produce buildable projects and whose builds
/// write `build/web/index.html`. Rules already on `runner` take precedence.
fn with_working_tools(runner: ScriptedRunner) -> ScriptedRunner {
    runner
        .on("git", "clone", |spec| {
            let dest = clone_dest(spec);
            if spec.args.iter().any(|a| a.contains("service-accounts")) {
                write_files(&dest, &[(KEY_FILE, "{\"type\":\"service_account\"}")]).unwrap();
            } else {
                write_files(
                    &dest,
                    &[("pubspec.yaml", "name: app\n"), ("web/index.html", "<html>")],
                )
                .unwrap();
            }
            Ok(CommandOutput::ok(""))
        })
        .on("flutter", "build", |spec| {
            let project = spec.cwd.clone().expect("build cwd");
            write_files(&project, &[("build/web/index.html", "<built>")]).unwrap();
            Ok(CommandOutput::ok("Compiling lib/main.dart for the Web..."))
        })
}

fn working_tools() -> ScriptedRunner {
    with_working_tools(ScriptedRunner::new())
}

fn uploaded_log(store: &MemoryBlobStore) -> String {
    let objects = store.objects();
    assert_eq!(objects.len(), 1, "expected exactly one uploaded log");
    String::from_utf8(objects[0].content.clone()).unwrap()
}

fn leftover_workspaces(base: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(base)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.is_dir())
        .collect()
}

#[test]
fn single_repository_deploys_end_to_end() {
    let base = TempDir::new().unwrap();
    let settings = settings(base.path());
    let staged_index_seen = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&staged_index_seen);
    let runner = with_working_tools(ScriptedRunner::new().on("firebase", "deploy", move |spec| {
        let ws = spec.cwd.clone().expect("deploy cwd");
        let staged = ws
            .join("deploy_staging")
            .join(SITE_ID)
            .join("mobile-app")
            .join("index.html");
        seen.store(staged.is_file(), Ordering::SeqCst);
        Ok(CommandOutput::ok("Deploy complete!"))
    }));
    let store = MemoryBlobStore::new();

    let report = DeployPipeline::new(&settings, &runner, &store)
        .run(&request(&["mobile-app"]))
        .unwrap();

    assert_eq!(report.site_id, SITE_ID);
    assert_eq!(report.site_id.len(), 20);
    assert_eq!(report.site_status, SiteStatus::Created);
    assert!(report.staged.contains_key("mobile-app"));
    assert!(staged_index_seen.load(Ordering::SeqCst));

    let deploy = runner
        .calls()
        .into_iter()
        .find(|c| c.program == "firebase" && c.subcommand() == Some("deploy"))
        .unwrap();
    assert!(deploy.args.contains(&format!("--only=hosting:{}", SITE_ID)));
    assert!(deploy.args.contains(&"--force".to_string()));

    let objects = store.objects();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].key, format!("{}/web_deploy.txt", REQUEST_ID));
    assert_eq!(objects[0].bucket, "deploy-logs");
    assert_eq!(report.log_object, objects[0].key);
    let uploaded = String::from_utf8(objects[0].content.clone()).unwrap();
    assert!(uploaded.contains("/mobile-app{,/**}"));

    assert!(!report.workspace.exists());
    assert!(leftover_workspaces(base.path()).is_empty());
    assert!(base.path().join("artifact_logs.log").is_file());
}

#[test]
fn steps_run_in_pipeline_order() {
    let base = TempDir::new().unwrap();
    let settings = settings(base.path());
    let runner = working_tools();
    let store = MemoryBlobStore::new();

    DeployPipeline::new(&settings, &runner, &store)
        .run(&request(&["app1", "app2"]))
        .unwrap();

    assert_eq!(
        runner.call_summary(),
        vec![
            "git clone",
            "gcloud auth",
            "gcloud config",
            "git clone",
            "git clone",
            "flutter pub",
            "flutter build",
            "flutter pub",
            "flutter build",
            "firebase hosting:sites:create",
            "firebase target:apply",
            "firebase deploy",
        ]
    );
}

#[test]
fn build_failure_aborts_before_the_control_plane() {
    let base = TempDir::new().unwrap();
    let settings = settings(base.path());
    let runner = with_working_tools(
        ScriptedRunner::new()
            .on("flutter", "build", |_| Ok(CommandOutput::failed(1, "Error: compile failed"))),
    );
    let store = MemoryBlobStore::new();

    let err = DeployPipeline::new(&settings, &runner, &store)
        .run(&request(&["app"]))
        .unwrap_err();

    match err {
        DeployError::Build { repo, step, output } => {
            assert_eq!(repo, "app");
            assert_eq!(step, "build web");
            assert!(output.contains("compile failed"));
        }
        other => panic!("expected build error, got {other:?}"),
    }
    assert!(!runner.calls().iter().any(|c| c.program == "firebase"));
    assert!(leftover_workspaces(base.path()).is_empty());

    // The log survives the failure, both uploaded and as the artifact copy.
    let log = uploaded_log(&store);
    assert!(log.contains("Deployment failed (build)"));
    let artifact = std::fs::read_to_string(base.path().join("artifact_logs.log")).unwrap();
    assert!(artifact.contains("compile failed"));
}

#[test]
fn missing_build_output_is_a_stage_error() {
    let base = TempDir::new().unwrap();
    let settings = settings(base.path());
    // Build reports success but writes nothing.
    let runner = with_working_tools(
        ScriptedRunner::new().on("flutter", "build", |_| Ok(CommandOutput::ok(""))),
    );
    let store = MemoryBlobStore::new();

    let err = DeployPipeline::new(&settings, &runner, &store)
        .run(&request(&["app"]))
        .unwrap_err();

    match err {
        DeployError::Stage { repo, path } => {
            assert_eq!(repo, "app");
            assert!(path.ends_with("app/build/web"));
        }
        other => panic!("expected stage error, got {other:?}"),
    }
    assert!(!runner.was_called("firebase", "hosting:sites:create"));
}

#[test]
fn existing_site_is_reused() {
    let base = TempDir::new().unwrap();
    let settings = settings(base.path());
    let runner = with_working_tools(ScriptedRunner::new().on(
        "firebase",
        "hosting:sites:create",
        |_| {
            Ok(CommandOutput::failed(
                1,
                "Error: Request to https://firebasehosting.googleapis.com had HTTP Error: 409, Site already exists",
            ))
        },
    ));
    let store = MemoryBlobStore::new();

    let report = DeployPipeline::new(&settings, &runner, &store)
        .run(&request(&["app"]))
        .unwrap();

    assert_eq!(report.site_status, SiteStatus::AlreadyExists);
    assert!(runner.was_called("firebase", "target:apply"));
    assert!(runner.was_called("firebase", "deploy"));
}

#[test]
fn other_site_creation_failures_are_fatal() {
    let base = TempDir::new().unwrap();
    let settings = settings(base.path());
    let runner = with_working_tools(ScriptedRunner::new().on(
        "firebase",
        "hosting:sites:create",
        |_| Ok(CommandOutput::failed(1, "Error: HTTP Error: 403, permission denied")),
    ));
    let store = MemoryBlobStore::new();

    let err = DeployPipeline::new(&settings, &runner, &store)
        .run(&request(&["app"]))
        .unwrap_err();

    assert!(matches!(err, DeployError::SiteProvision { ref site_id, .. } if site_id == SITE_ID));
    assert!(!runner.was_called("firebase", "target:apply"));
    assert!(!runner.was_called("firebase", "deploy"));
}

#[test]
fn bind_failure_stops_before_publish() {
    let base = TempDir::new().unwrap();
    let settings = settings(base.path());
    let runner = with_working_tools(
        ScriptedRunner::new()
            .on("firebase", "target:apply", |_| Ok(CommandOutput::failed(1, "invalid target"))),
    );
    let store = MemoryBlobStore::new();

    let err = DeployPipeline::new(&settings, &runner, &store)
        .run(&request(&["app"]))
        .unwrap_err();

    assert!(matches!(err, DeployError::Bind { .. }));
    assert!(!runner.was_called("firebase", "deploy"));
}

#[test]
fn publish_failure_is_reported() {
    let base = TempDir::new().unwrap();
    let settings = settings(base.path());
    let runner = with_working_tools(
        ScriptedRunner::new()
            .on("firebase", "deploy", |_| Ok(CommandOutput::failed(2, "upload interrupted"))),
    );
    let store = MemoryBlobStore::new();

    let err = DeployPipeline::new(&settings, &runner, &store)
        .run(&request(&["app"]))
        .unwrap_err();

    assert!(matches!(err, DeployError::Publish { ref target, .. } if target == SITE_ID));
    assert!(uploaded_log(&store).contains("upload interrupted"));
}

#[test]
fn log_upload_failure_after_publish_is_log_persist() {
    let base = TempDir::new().unwrap();
    let settings = settings(base.path());
    let runner = working_tools();
    let store = MemoryBlobStore::failing("bucket not found");

    let err = DeployPipeline::new(&settings, &runner, &store)
        .run(&request(&["app"]))
        .unwrap_err();

    assert!(matches!(err, DeployError::LogPersist(ref msg) if msg.contains("bucket not found")));
    assert!(runner.was_called("firebase", "deploy"));
    assert!(leftover_workspaces(base.path()).is_empty());
    assert!(base.path().join("artifact_logs.log").is_file());
}

#[test]
fn upload_failure_never_masks_the_original_error() {
    let base = TempDir::new().unwrap();
    let settings = settings(base.path());
    let runner = with_working_tools(
        ScriptedRunner::new()
            .on("flutter", "pub", |_| Ok(CommandOutput::failed(69, "pub get failed"))),
    );
    let store = MemoryBlobStore::failing("bucket not found");

    let err = DeployPipeline::new(&settings, &runner, &store)
        .run(&request(&["app"]))
        .unwrap_err();

    assert!(matches!(err, DeployError::Build { ref step, .. } if step == "pub get"));
    let artifact = std::fs::read_to_string(base.path().join("artifact_logs.log")).unwrap();
    assert!(artifact.contains("Deployment failed (build)"));
}

#[test]
fn missing_credential_document_skips_upload() {
    let base = TempDir::new().unwrap();
    let settings = settings(base.path());
    let runner = with_working_tools(ScriptedRunner::new().when(
        |spec| spec.args.iter().any(|a| a.contains("service-accounts")),
        |spec| {
            write_files(&clone_dest(spec), &[("README.md", "empty")]).unwrap();
            Ok(CommandOutput::ok(""))
        },
    ));
    let store = MemoryBlobStore::new();

    let err = DeployPipeline::new(&settings, &runner, &store)
        .run(&request(&["app"]))
        .unwrap_err();

    assert!(matches!(err, DeployError::Credential(_)));
    assert!(store.objects().is_empty());
    assert!(!runner.was_called("gcloud", "auth"));
    assert!(leftover_workspaces(base.path()).is_empty());
    let artifact = std::fs::read_to_string(base.path().join("artifact_logs.log")).unwrap();
    assert!(artifact.contains("Deployment failed (credential)"));
}

#[test]
fn fetch_failure_names_the_repository() {
    let base = TempDir::new().unwrap();
    let settings = settings(base.path());
    let runner = with_working_tools(ScriptedRunner::new().when(
        |spec| spec.args.iter().any(|a| a.ends_with("/_git/missing-repo")),
        |_| Ok(CommandOutput::failed(128, "fatal: repository not found")),
    ));
    let store = MemoryBlobStore::new();

    let err = DeployPipeline::new(&settings, &runner, &store)
        .run(&request(&["app", "missing-repo"]))
        .unwrap_err();

    match err {
        DeployError::Fetch { repo, detail } => {
            assert_eq!(repo, "missing-repo");
            assert!(detail.contains("repository not found"));
        }
        other => panic!("expected fetch error, got {other:?}"),
    }
    assert!(!runner.was_called("flutter", "pub"));
    let log = uploaded_log(&store);
    assert!(!log.contains("pat-token"));
}

#[test]
fn duplicate_repositories_are_deployed_twice() {
    let base = TempDir::new().unwrap();
    let settings = settings(base.path());
    let runner = working_tools();
    let store = MemoryBlobStore::new();

    let report = DeployPipeline::new(&settings, &runner, &store)
        .run(&request(&["app", "app"]))
        .unwrap();

    assert_eq!(report.staged.len(), 1);
    let builds = runner
        .calls()
        .iter()
        .filter(|c| c.program == "flutter" && c.subcommand() == Some("build"))
        .count();
    assert_eq!(builds, 2);
    assert_eq!(uploaded_log(&store).matches("\"source\": \"/app{,/**}\"").count(), 2);
}

#[test]
fn invalid_settings_fail_before_any_command() {
    let base = TempDir::new().unwrap();
    let settings = DeploySettings {
        scm_base_url: "not a url".to_string(),
        ..settings(base.path())
    };
    let runner = working_tools();
    let store = MemoryBlobStore::new();

    let err = DeployPipeline::new(&settings, &runner, &store)
        .run(&request(&["app"]))
        .unwrap_err();

    assert!(matches!(err, DeployError::Configuration(_)));
    assert!(runner.calls().is_empty());
    assert!(leftover_workspaces(base.path()).is_empty());
}

#[test]
fn request_id_cannot_escape_the_workspace() {
    let base = TempDir::new().unwrap();
    let work = base.path().join("work");
    let settings = settings(&work);
    let runner = working_tools();
    let store = MemoryBlobStore::new();
    let mut request = request(&["app"]);
    request.request_id = "../escaped".to_string();

    let err = DeployPipeline::new(&settings, &runner, &store)
        .run(&request)
        .unwrap_err();

    assert!(matches!(err, DeployError::Configuration(_)));
    assert!(runner.calls().is_empty());
    assert!(!base.path().join("escaped_web_deploy.txt").exists());
    assert!(!base.path().join("escaped").exists());
}

/// Remembers which local file each upload read.
#[derive(Default)]
struct RecordingStore {
    uploaded_from: Mutex<Vec<PathBuf>>,
}

impl BlobStore for RecordingStore {
    fn upload(
        &self,
        local_path: &Path,
        _bucket: &str,
        _key: &str,
        _project_id: &str,
        _credential: &ServiceCredential,
    ) -> anyhow::Result<()> {
        assert!(local_path.is_file(), "log not flushed before upload");
        self.uploaded_from.lock().unwrap().push(local_path.to_path_buf());
        Ok(())
    }
}

#[test]
fn run_log_is_flushed_under_a_fixed_name_inside_the_workspace() {
    let base = TempDir::new().unwrap();
    let settings = settings(base.path());
    let runner = working_tools();
    let store = RecordingStore::default();

    let report = DeployPipeline::new(&settings, &runner, &store)
        .run(&request(&["app"]))
        .unwrap();

    assert_eq!(
        *store.uploaded_from.lock().unwrap(),
        vec![report.workspace.join("web_deploy.txt")]
    );
    let names: Vec<String> = std::fs::read_dir(base.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["artifact_logs.log"]);
}

#[test]
fn repository_named_like_the_staging_root_keeps_staging_intact() {
    let base = TempDir::new().unwrap();
    let settings = settings(base.path());
    let layout_ok = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&layout_ok);
    let runner = with_working_tools(ScriptedRunner::new().on("firebase", "deploy", move |spec| {
        let ws = spec.cwd.clone().expect("deploy cwd");
        let staging = ws.join("deploy_staging");
        let staged = staging.join(SITE_ID).join("deploy_staging").join("index.html");
        seen.store(
            staged.is_file() && !staging.join("pubspec.yaml").exists(),
            Ordering::SeqCst,
        );
        Ok(CommandOutput::ok("Deploy complete!"))
    }));
    let store = MemoryBlobStore::new();

    let report = DeployPipeline::new(&settings, &runner, &store)
        .run(&request(&["deploy_staging"]))
        .unwrap();

    assert!(layout_ok.load(Ordering::SeqCst));
    assert!(report.staged.contains_key("deploy_staging"));
}
