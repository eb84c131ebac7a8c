//! Release host client against a mock server.

use deskship::core::{DeskshipError, NetworkErrorKind};
use deskship::host::{CreateReleaseRequest, DispatchInputs, DispatchRequest, ReleaseHostClient};
use deskship::test_utils::release_json;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REPO: &str = "https://github.com/acme/widget";

fn client(server: &MockServer, token: Option<&str>) -> ReleaseHostClient {
    ReleaseHostClient::for_repository(&server.uri(), REPO, token)
        .unwrap()
        .with_retry_base(Duration::from_millis(1))
}

fn request(tag: &str) -> CreateReleaseRequest {
    CreateReleaseRequest {
        tag_name: tag.to_string(),
        name: format!("Widget {tag}"),
        body: String::new(),
        prerelease: false,
    }
}

#[tokio::test]
async fn test_classic_token_uses_token_scheme() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget"))
        .and(header("authorization", "token ghp_abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1})))
        .expect(1)
        .mount(&server)
        .await;

    client(&server, Some("ghp_abc123")).check_repository().await.unwrap();
}

#[tokio::test]
async fn test_fine_grained_token_uses_bearer_scheme() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget"))
        .and(header("authorization", "Bearer github_pat_xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1})))
        .expect(1)
        .mount(&server)
        .await;

    client(&server, Some("github_pat_xyz")).check_repository().await.unwrap();
}

#[tokio::test]
async fn test_repository_errors_are_distinguished() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Bad credentials"))
        .expect(1) // never retried
        .mount(&server)
        .await;

    let err = client(&server, Some("ghp_wrong")).check_repository().await.unwrap_err();
    assert!(matches!(
        err,
        DeskshipError::Network {
            kind: NetworkErrorKind::Unauthorized,
            ..
        }
    ));

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let err = client(&server, None).check_repository().await.unwrap_err();
    assert!(matches!(
        err,
        DeskshipError::Network {
            kind: NetworkErrorKind::NotFound,
            ..
        }
    ));
}

#[tokio::test]
async fn test_reads_retry_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget/releases"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget/releases"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(vec![release_json(1, "v1.0.0", false, &[])]),
        )
        .mount(&server)
        .await;

    let releases = client(&server, None).list_releases().await.unwrap();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].tag_name, "v1.0.0");
}

#[tokio::test]
async fn test_existing_tag_is_reused() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget/releases/tags/v1.0.6"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(release_json(7, "v1.0.6", false, &[])),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/widget/releases"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let (release, created) =
        client(&server, Some("ghp_t")).ensure_release(&request("v1.0.6")).await.unwrap();
    assert!(!created);
    assert_eq!(release.id, 7);
}

#[tokio::test]
async fn test_missing_tag_is_created() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget/releases/tags/v1.0.6"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/widget/releases"))
        .and(body_partial_json(serde_json::json!({"tag_name": "v1.0.6", "prerelease": false})))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(release_json(8, "v1.0.6", false, &[])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (release, created) =
        client(&server, Some("ghp_t")).ensure_release(&request("v1.0.6")).await.unwrap();
    assert!(created);
    assert_eq!(release.id, 8);
}

#[tokio::test]
async fn test_upload_trims_uri_template() {
    let server = MockServer::start().await;
    let mut release: deskship::host::Release =
        serde_json::from_value(release_json(9, "v1.0.6", false, &[])).unwrap();
    release.upload_url = format!("{}/uploads/releases/9/assets{{?name,label}}", server.uri());

    Mock::given(method("POST"))
        .and(path("/uploads/releases/9/assets"))
        .and(query_param("name", "Widget-Linux.zip"))
        .and(header("content-type", "application/zip"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": 90,
            "name": "Widget-Linux.zip",
            "browser_download_url": "https://example.com/Widget-Linux.zip",
            "size": 5,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let file = temp.path().join("Widget-Linux.zip");
    std::fs::write(&file, b"PK\x05\x06x").unwrap();

    let asset = client(&server, Some("ghp_t")).upload_asset(&release, &file).await.unwrap();
    assert_eq!(asset.name, "Widget-Linux.zip");
    assert_eq!(asset.size, 5);
}

#[tokio::test]
async fn test_dispatch_sends_ref_and_string_inputs() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/widget/actions/workflows/build-dmg.yml/dispatches"))
        .and(body_partial_json(serde_json::json!({
            "ref": "main",
            "inputs": {"app_name": "Widget", "version": "1.0.6", "release_id": "9"}
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let request = DispatchRequest {
        git_ref: "main".into(),
        inputs: DispatchInputs::new("https://example.com/Widget-MacOS.zip", "Widget", "1.0.6", 9),
    };
    client(&server, Some("ghp_t")).dispatch_workflow("build-dmg.yml", &request).await.unwrap();
}

#[tokio::test]
async fn test_download_reports_bytes_and_digest() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assets/Widget-Linux.zip"))
        .and(header("accept", "application/octet-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
        .mount(&server)
        .await;

    let url = format!("{}/assets/Widget-Linux.zip", server.uri());
    let mut sink = Vec::new();
    let mut last = 0;
    let mut on_progress = |bytes: u64, _: Option<u64>| last = bytes;
    let summary = client(&server, None).download(&url, &mut sink, &mut on_progress).await.unwrap();

    assert_eq!(sink, b"hello");
    assert_eq!(summary.bytes, 5);
    assert_eq!(last, 5);
    assert_eq!(summary.expected_len, Some(5));
    assert_eq!(
        summary.sha256,
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
}
