//! Update checks, downloads and installs against a mock release host.

use deskship::config::UpdaterConfig;
use deskship::core::DeskshipError;
use deskship::platform::{AssetKind, PlatformTarget};
use deskship::test_utils::{release_json, write_zip};
use deskship::updater::{CheckOutcome, UpdateResolver, UpdateState};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> UpdaterConfig {
    let mut config = UpdaterConfig::new("https://github.com/acme/widget", "Widget");
    config.api_base = server.uri();
    config.allow_in_development = true;
    config
}

fn resolver(server: &MockServer, current: &str) -> UpdateResolver {
    UpdateResolver::new(config(server), current)
        .with_platform(PlatformTarget::Linux)
        .with_retry_base(Duration::from_millis(1))
}

async fn serve_releases(server: &MockServer, releases: Vec<serde_json::Value>) {
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget/releases"))
        .respond_with(ResponseTemplate::new(200).set_body_json(releases))
        .mount(server)
        .await;
}

async fn serve_bytes(server: &MockServer, name: &str, bytes: Vec<u8>) -> String {
    Mock::given(method("GET"))
        .and(path(format!("/download/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
        .mount(server)
        .await;
    format!("{}/download/{name}", server.uri())
}

#[tokio::test]
async fn test_newest_stable_release_with_matching_asset() {
    let server = MockServer::start().await;
    let url = format!("{}/download/Widget-Linux.zip", server.uri());
    serve_releases(
        &server,
        vec![
            release_json(3, "v1.2.0", true, &[("Widget-Linux.zip", &url)]),
            release_json(
                2,
                "v1.1.0",
                false,
                &[("Widget-Windows.zip", &url), ("Widget-Linux.zip", &url)],
            ),
            release_json(1, "v1.0.0", false, &[("Widget-Linux.zip", &url)]),
        ],
    )
    .await;

    let resolver = resolver(&server, "1.0.0");
    let outcome = resolver.check().await.unwrap();

    let candidate = outcome.candidate().expect("update expected");
    assert_eq!(candidate.version, "1.1.0");
    assert_eq!(candidate.asset.name, "Widget-Linux.zip");
    assert_eq!(candidate.kind, AssetKind::Archive);
    assert_eq!(resolver.state(), UpdateState::UpdateAvailable);
}

#[tokio::test]
async fn test_same_version_is_up_to_date() {
    let server = MockServer::start().await;
    let release = release_json(1, "v1.0.0", false, &[("Widget-Linux.zip", "x")]);
    serve_releases(&server, vec![release]).await;

    let resolver = resolver(&server, "1.0.0");
    let outcome = resolver.check().await.unwrap();
    assert!(matches!(outcome, CheckOutcome::UpToDate { latest: Some(ref v) } if v == "1.0.0"));
    assert_eq!(resolver.state(), UpdateState::UpToDate);
}

#[tokio::test]
async fn test_versions_compare_numerically() {
    let server = MockServer::start().await;
    serve_releases(
        &server,
        vec![
            release_json(2, "v1.0.9", false, &[("Widget-Linux.zip", "x")]),
            release_json(3, "v1.0.10", false, &[("Widget-Linux.zip", "x")]),
        ],
    )
    .await;

    let outcome = resolver(&server, "1.0.9").check().await.unwrap();
    assert_eq!(outcome.candidate().map(|c| c.version.as_str()), Some("1.0.10"));
}

#[tokio::test]
async fn test_release_without_platform_asset() {
    let server = MockServer::start().await;
    let release = release_json(2, "v2.0.0", false, &[("Widget-Windows.zip", "x")]);
    serve_releases(&server, vec![release]).await;

    let resolver = resolver(&server, "1.0.0");
    match resolver.check().await.unwrap() {
        CheckOutcome::NoCompatibleAsset { version, expected } => {
            assert_eq!(version, "2.0.0");
            assert_eq!(expected, vec!["Widget-Linux.zip".to_string()]);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(resolver.state(), UpdateState::Idle);

    let err = resolver.update().await.unwrap_err();
    assert!(matches!(err, DeskshipError::NoCompatibleAsset { .. }));
}

#[tokio::test]
async fn test_missing_repository_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let resolver = resolver(&server, "1.0.0");
    let err = resolver.check().await.unwrap_err();
    assert!(matches!(
        err,
        DeskshipError::Network {
            kind: deskship::core::NetworkErrorKind::NotFound,
            ..
        }
    ));
    assert_eq!(resolver.state(), UpdateState::Error);
}

#[tokio::test]
async fn test_download_verifies_published_checksum() {
    let server = MockServer::start().await;
    let asset_url = serve_bytes(&server, "Widget-Linux.zip", b"payload".to_vec()).await;
    let sum_url = serve_bytes(
        &server,
        "Widget-Linux.zip.sha256",
        format!("{}  Widget-Linux.zip\n", "0".repeat(64)).into_bytes(),
    )
    .await;
    serve_releases(
        &server,
        vec![release_json(
            2,
            "v1.1.0",
            false,
            &[("Widget-Linux.zip", &asset_url), ("Widget-Linux.zip.sha256", &sum_url)],
        )],
    )
    .await;

    let scratch = TempDir::new().unwrap();
    let resolver = resolver(&server, "1.0.0");
    let err = resolver.download(scratch.path()).await.unwrap_err();
    assert!(matches!(err, DeskshipError::Integrity { .. }), "{err}");
    assert_eq!(resolver.state(), UpdateState::Error);
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_download_with_matching_checksum_list() {
    let server = MockServer::start().await;
    let asset_url = serve_bytes(&server, "Widget-Linux.zip", b"hello".to_vec()).await;
    let list_url = serve_bytes(
        &server,
        "checksums.txt",
        concat!(
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
            " *Widget-Linux.zip\n"
        )
        .as_bytes()
        .to_vec(),
    )
    .await;
    serve_releases(
        &server,
        vec![release_json(
            2,
            "v1.1.0",
            false,
            &[("Widget-Linux.zip", &asset_url), ("checksums.txt", &list_url)],
        )],
    )
    .await;

    let scratch = TempDir::new().unwrap();
    let (candidate, downloaded) =
        resolver(&server, "1.0.0").download(scratch.path()).await.unwrap().unwrap();
    assert_eq!(candidate.version, "1.1.0");
    assert_eq!(downloaded.bytes, 5);
    assert!(downloaded.checksum_verified);
    assert_eq!(std::fs::read(downloaded.path()).unwrap(), b"hello");
}

#[tokio::test]
async fn test_empty_download_is_rejected() {
    let server = MockServer::start().await;
    let asset_url = serve_bytes(&server, "Widget-Linux.zip", Vec::new()).await;
    let release = release_json(2, "v1.1.0", false, &[("Widget-Linux.zip", &asset_url)]);
    serve_releases(&server, vec![release]).await;

    let scratch = TempDir::new().unwrap();
    let err = resolver(&server, "1.0.0").download(scratch.path()).await.unwrap_err();
    assert!(matches!(err, DeskshipError::Integrity { .. }));
}

/// The swap script waits for the given process, copies the payload over the
/// installation and starts the relaunch target.
#[cfg(unix)]
#[tokio::test]
async fn test_update_swaps_installation_after_exit() {
    use deskship::test_utils::fake_tool;
    use deskship::updater::{InstallOutcome, Installer};

    let temp = TempDir::new().unwrap();
    let install_dir = temp.path().join("install");
    let scratch = temp.path().join("scratch");
    std::fs::create_dir_all(&install_dir).unwrap();
    std::fs::create_dir_all(&scratch).unwrap();
    std::fs::write(install_dir.join("Widget"), "old").unwrap();
    std::fs::write(install_dir.join("settings.json"), "{}").unwrap();

    let zip_path = temp.path().join("Widget-Linux.zip");
    write_zip(&zip_path, &[("Widget", "new"), ("lib/core.so", "core")]).unwrap();

    let server = MockServer::start().await;
    let zip_bytes = std::fs::read(&zip_path).unwrap();
    let asset_url = serve_bytes(&server, "Widget-Linux.zip", zip_bytes).await;
    let release = release_json(2, "v1.1.0", false, &[("Widget-Linux.zip", &asset_url)]);
    serve_releases(&server, vec![release]).await;

    // A process that has already exited
    let mut child = std::process::Command::new("true").spawn().unwrap();
    let dead_pid = child.id();
    child.wait().unwrap();

    let relaunch = fake_tool(temp.path(), "relaunch", "");
    let installer = Installer::new(&install_dir, &relaunch)
        .with_pid(dead_pid)
        .with_scratch_dir(&scratch);
    let resolver = resolver(&server, "1.0.0").with_installer(installer);

    let outcome = resolver.update().await.unwrap().expect("update expected");
    let InstallOutcome::SwapScheduled { script } = &outcome else {
        panic!("unexpected outcome: {outcome:?}");
    };
    assert!(outcome.requires_exit());
    assert_eq!(resolver.state(), UpdateState::Restarting);

    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while script.exists() && std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!script.exists(), "swap script did not finish");

    assert_eq!(std::fs::read_to_string(install_dir.join("Widget")).unwrap(), "new");
    assert_eq!(std::fs::read_to_string(install_dir.join("lib/core.so")).unwrap(), "core");
    assert!(install_dir.join("settings.json").exists());
    assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !temp.path().join("calls.log").exists() && std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(temp.path().join("calls.log").exists(), "application was not relaunched");
}
