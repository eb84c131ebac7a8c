//! End-to-end pipeline runs with a stand-in compiler.

use deskship::config::ReleaseConfig;
use deskship::pipeline::{Orchestrator, RunLock, RunMonitor, RunStatus, Stage, StageOutcome};
use deskship::platform::PlatformTarget;
use deskship::test_utils::{StubCompiler, init_test_logging, release_json};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(root: &Path) -> ReleaseConfig {
    let mut config = ReleaseConfig::new("Widget", "1.0.5");
    config.output_root = root.to_path_buf();
    config.platforms.insert(PlatformTarget::Windows);
    config.platforms.insert(PlatformTarget::Linux);
    config
}

fn with_publish(mut config: ReleaseConfig, server: &MockServer) -> ReleaseConfig {
    config.publish.enabled = true;
    config.publish.repository = "https://github.com/acme/widget".into();
    config.publish.token = "ghp_test".into();
    config.publish.api_base = server.uri();
    config
}

fn uploaded_asset(name: &str) -> serde_json::Value {
    serde_json::json!({
        "id": 1,
        "name": name,
        "browser_download_url": format!("https://example.com/{name}"),
        "size": 10,
    })
}

#[tokio::test]
async fn test_full_run_publishes_every_release_file() {
    init_test_logging(None);
    let temp = TempDir::new().unwrap();
    let server = MockServer::start().await;

    let mut created = release_json(42, "v1.0.6", false, &[]);
    let upload_url =
        format!("{}/uploads/repos/acme/widget/releases/42/assets{{?name,label}}", server.uri());
    created["upload_url"] = upload_url.into();

    Mock::given(method("GET"))
        .and(path("/repos/acme/widget/releases/tags/v1.0.6"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/widget/releases"))
        .respond_with(ResponseTemplate::new(201).set_body_json(&created))
        .expect(1)
        .mount(&server)
        .await;
    for name in ["Widget-Windows.zip", "Widget-Linux.zip"] {
        Mock::given(method("POST"))
            .and(path("/uploads/repos/acme/widget/releases/42/assets"))
            .and(query_param("name", name))
            .respond_with(ResponseTemplate::new(201).set_body_json(uploaded_asset(name)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let compiler = Arc::new(StubCompiler::default());
    let orchestrator = Orchestrator::new(compiler.clone()).unwrap();
    let outcome = orchestrator.run(&with_publish(config(temp.path()), &server)).await;

    assert!(outcome.succeeded(), "{}", outcome.message);
    assert_eq!(outcome.version.as_deref(), Some("1.0.6"));
    assert_eq!(outcome.stage(Stage::Publish), Some(&StageOutcome::Succeeded));
    assert_eq!(outcome.release_url.as_deref(), Some("https://example.com/releases/v1.0.6"));
    assert_eq!(compiler.built(), vec![PlatformTarget::Windows, PlatformTarget::Linux]);
}

#[tokio::test]
async fn test_publish_failure_keeps_release_folder() {
    let temp = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget/releases/tags/v1.0.6"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Resource not accessible"))
        .mount(&server)
        .await;

    let orchestrator = Orchestrator::new(Arc::new(StubCompiler::default())).unwrap();
    let outcome = orchestrator.run(&with_publish(config(temp.path()), &server)).await;

    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(matches!(outcome.stage(Stage::Publish), Some(StageOutcome::Failed(_))));
    assert_eq!(outcome.stage(Stage::Package), Some(&StageOutcome::Succeeded));
    assert!(temp.path().join("Releases/v1.0.6/Widget-Linux.zip").is_file());
    assert!(orchestrator.monitor().is_error());
    assert!(!orchestrator.monitor().is_processing());
}

#[tokio::test]
async fn test_cancel_between_platforms() {
    let temp = TempDir::new().unwrap();
    let slot: Arc<Mutex<Option<RunMonitor>>> = Arc::new(Mutex::new(None));

    let hook_slot = Arc::clone(&slot);
    let compiler = Arc::new(StubCompiler::default().with_hook(move |_| {
        if let Some(monitor) = hook_slot.lock().unwrap().as_ref() {
            monitor.request_cancel();
        }
    }));
    let orchestrator = Orchestrator::new(compiler.clone()).unwrap();
    *slot.lock().unwrap() = Some(orchestrator.monitor());

    let outcome = orchestrator.run(&config(temp.path())).await;

    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert_eq!(compiler.built(), vec![PlatformTarget::Windows]);
    assert!(outcome.stage(Stage::Package).is_none());
    assert!(!temp.path().join("Releases").exists());
    assert!(temp.path().join("Builds/Widget-Windows/Widget.exe").is_file());
    assert!(!orchestrator.monitor().is_processing());
}

#[tokio::test]
async fn test_second_process_is_locked_out() {
    let temp = TempDir::new().unwrap();
    let config = config(temp.path());
    let _held = RunLock::acquire(&temp.path().join(".deskship.lock")).await.unwrap();

    let compiler = Arc::new(StubCompiler::default());
    let orchestrator = Orchestrator::new(compiler.clone()).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(10), orchestrator.run(&config))
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(compiler.built().is_empty());
    assert!(!temp.path().join("Builds").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_installer_stage_runs_compiler_in_release_folder() {
    use deskship::test_utils::{fake_tool, tool_calls};

    let temp = TempDir::new().unwrap();
    let tools = temp.path().join("tools");
    std::fs::create_dir_all(&tools).unwrap();
    let iscc = fake_tool(
        &tools,
        "iscc",
        r#"for last; do :; done
touch "$(dirname "$last")/Widget-Installer.exe""#,
    );

    let mut config = config(&temp.path().join("out"));
    config.installer.enabled = true;
    config.installer.compiler = Some(iscc);
    config.installer.app_id = "6f1a3c2e-0000-4000-8000-000000000001".into();

    let orchestrator = Orchestrator::new(Arc::new(StubCompiler::default())).unwrap();
    let outcome = orchestrator.run(&config).await;

    assert!(outcome.succeeded(), "{}", outcome.message);
    assert_eq!(outcome.stage(Stage::Installer), Some(&StageOutcome::Succeeded));
    let release_dir = temp.path().join("out/Releases/v1.0.6");
    assert!(release_dir.join("Widget-Installer.exe").is_file());

    let calls = tool_calls(&tools);
    assert_eq!(calls.len(), 1);
    assert!(calls[0].starts_with("iscc /Q "), "{calls:?}");
}

#[tokio::test]
async fn test_explicit_version_is_used_verbatim() {
    let temp = TempDir::new().unwrap();
    let mut config = config(temp.path());
    config.version.policy = deskship::version::VersionPolicy::Explicit;
    config.version.explicit = "2.0.0".into();

    let orchestrator = Orchestrator::new(Arc::new(StubCompiler::default())).unwrap();
    let outcome = orchestrator.run(&config).await;

    assert!(outcome.succeeded(), "{}", outcome.message);
    assert_eq!(outcome.version.as_deref(), Some("2.0.0"));
    assert!(temp.path().join("Releases/v2.0.0/Widget-Windows.zip").is_file());
}

fn release_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_rerun_with_same_version_produces_same_release_files() {
    let temp = TempDir::new().unwrap();
    let mut config = config(temp.path());
    config.version.policy = deskship::version::VersionPolicy::Explicit;
    config.version.explicit = "3.1.0".into();
    let release_dir = temp.path().join("Releases/v3.1.0");

    let orchestrator = Orchestrator::new(Arc::new(StubCompiler::default())).unwrap();
    let first = orchestrator.run(&config).await;
    assert!(first.succeeded(), "{}", first.message);
    let after_first = release_files(&release_dir);

    let second = orchestrator.run(&config).await;
    assert!(second.succeeded(), "{}", second.message);
    assert_eq!(second.version.as_deref(), Some("3.1.0"));
    assert_eq!(release_files(&release_dir), after_first);
    assert_eq!(after_first, vec!["Widget-Linux.zip", "Widget-Windows.zip"]);
}
