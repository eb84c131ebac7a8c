//! The `deskship` binary end to end.

use assert_cmd::Command;
use deskship::test_utils::release_json;
use predicates::prelude::*;
use serial_test::serial;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn deskship() -> Command {
    let mut cmd = Command::cargo_bin("deskship").unwrap();
    cmd.env("DESKSHIP_NO_PROGRESS", "1").env_remove("DESKSHIP_CONFIG").env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("deskship.toml");
    std::fs::write(&path, body).unwrap();
    path
}

const LINUX_ONLY: &str = r#"# Widget release settings
platforms = ["linux"]

[product]
name = "Widget"
version = "1.0.5" # bumped after every release

[build]
command = ["sh", "-c", "echo built > \"$DESKSHIP_OUT_DIR/{executable}\""]
"#;

#[test]
fn test_help_lists_commands() {
    deskship()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("trigger-dmg"))
        .stdout(predicate::str::contains("check-update"));
}

#[test]
fn test_missing_config_fails_with_message() {
    let temp = TempDir::new().unwrap();
    deskship()
        .args(["validate", "--config"])
        .arg(temp.path().join("nope.toml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.toml"));
}

#[test]
fn test_validate_reports_every_failure() {
    let temp = TempDir::new().unwrap();
    let config = write_config(
        temp.path(),
        r#"platforms = []

[product]
name = "Widget"
version = "1.0.5"

[publish]
enabled = true
"#,
    );

    deskship()
        .arg("validate")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stdout(predicate::str::contains("select at least one platform"))
        .stdout(predicate::str::contains("publish enabled but repository is empty"))
        .stdout(predicate::str::contains("build command is empty"));
}

#[cfg(unix)]
#[test]
fn test_validate_json() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), LINUX_ONLY);

    let output = deskship()
        .args(["validate", "--format", "json", "--config"])
        .arg(&config)
        .output()
        .unwrap();
    assert!(output.status.success());

    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc["valid"], true);
    assert_eq!(doc["failures"].as_array().map(Vec::len), Some(0));
}

#[test]
#[serial]
fn test_config_from_environment() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "[product]\nname = \"Widget\"\n");

    deskship()
        .env("DESKSHIP_CONFIG", &config)
        .arg("validate")
        .assert()
        .failure()
        .stdout(predicate::str::contains("select at least one platform"));
}

#[cfg(unix)]
#[test]
fn test_run_records_new_version() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), LINUX_ONLY);

    deskship()
        .arg("run")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Release 1.0.6 completed"));

    assert!(temp.path().join("Builds/Widget-Linux/Widget").is_file());
    assert!(temp.path().join("Releases/v1.0.6/Widget-Linux.zip").is_file());

    let written = std::fs::read_to_string(&config).unwrap();
    assert!(written.contains(r#"version = "1.0.6""#), "{written}");
    assert!(written.contains("# bumped after every release"));
}

#[cfg(unix)]
#[test]
fn test_build_failure_exits_with_failure() {
    let temp = TempDir::new().unwrap();
    let config = write_config(
        temp.path(),
        r#"platforms = ["linux"]

[product]
name = "Widget"
version = "1.0.5"

[build]
command = ["sh", "-c", "echo 'linker error' >&2; exit 3"]
"#,
    );

    let output = deskship()
        .args(["build", "--format", "json", "--config"])
        .arg(&config)
        .output()
        .unwrap();
    assert!(!output.status.success());

    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc["status"], "failed");
    assert_eq!(doc["version"], "1.0.5");
    assert!(!temp.path().join("Releases").exists());
    // build-only runs never touch the recorded version
    assert!(std::fs::read_to_string(&config).unwrap().contains(r#"version = "1.0.5""#));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_check_update_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget/releases"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![release_json(
            5,
            "v1.1.0",
            false,
            &[("Widget-Linux.zip", "https://example.com/Widget-Linux.zip")],
        )]))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let updater = temp.path().join("updater.toml");
    std::fs::write(
        &updater,
        format!(
            concat!(
                "repository = \"https://github.com/acme/widget\"\n",
                "product_name = \"Widget\"\napi_base = \"{}\"\n"
            ),
            server.uri()
        ),
    )
    .unwrap();

    let output = deskship()
        .args(["check-update", "--format", "json", "--platform", "linux"])
        .args(["--current-version", "1.0.0"])
        .arg("--updater-config")
        .arg(&updater)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc["status"], "update-available");
    assert_eq!(doc["latest_version"], "1.1.0");
    assert_eq!(doc["asset"], "Widget-Linux.zip");
}

#[test]
fn test_check_update_needs_updater_table() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "[product]\nname = \"Widget\"\nversion = \"1.0.0\"\n");

    deskship()
        .arg("check-update")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("[updater]"));
}
