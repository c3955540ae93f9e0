//! Integration tests for content downloads and the CDN to master fallback.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod common;

use common::{AfterReply, MockMaster, direct_client, padded_reply, refused_base_url};
use poe_patch::{DownloadError, Error, PatchDownloader, PatchSession, PatchUrls, UsageError};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

const FILE: &str = "Data/Mods.dat64";
const FILE_PATH: &str = "/3.23.0.1/Data/Mods.dat64";

fn base_url(server: &MockServer) -> String {
    format!("{}/3.23.0.1/", server.uri())
}

fn downloader(cdn: &str, master: &str) -> PatchDownloader {
    PatchDownloader::new(&PatchUrls::new(master, cdn), direct_client())
}

async fn serve(server: &MockServer, status: u16, body: &[u8], expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(FILE_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_bytes(body.to_vec()))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_cdn_success_skips_master() {
    let cdn = MockServer::start().await;
    let master = MockServer::start().await;
    serve(&cdn, 200, b"cdn content", 1).await;
    serve(&master, 200, b"master content", 0).await;

    let body = downloader(&base_url(&cdn), &base_url(&master))
        .fetch(FILE)
        .await
        .unwrap();
    assert_eq!(&body[..], b"cdn content");
}

#[tokio::test]
async fn test_refused_cdn_falls_back_to_master() {
    let master = MockServer::start().await;
    serve(&master, 200, b"master content", 1).await;

    let body = downloader(&refused_base_url(), &base_url(&master))
        .fetch(FILE)
        .await
        .expect("Fallback to master should succeed");
    assert_eq!(&body[..], b"master content");
}

#[tokio::test]
async fn test_cdn_not_found_does_not_fall_back() {
    let cdn = MockServer::start().await;
    let master = MockServer::start().await;
    serve(&cdn, 404, b"", 1).await;
    serve(&master, 200, b"master content", 0).await;

    let err = downloader(&base_url(&cdn), &base_url(&master))
        .fetch(FILE)
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(err.url(), Some(format!("{}{FILE}", base_url(&cdn)).as_str()));
}

#[tokio::test]
async fn test_cdn_server_error_does_not_fall_back() {
    let cdn = MockServer::start().await;
    let master = MockServer::start().await;
    serve(&cdn, 503, b"", 1).await;
    serve(&master, 200, b"master content", 0).await;

    let err = downloader(&base_url(&cdn), &base_url(&master))
        .fetch(FILE)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DownloadError::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            ..
        }
    ));
}

#[tokio::test]
async fn test_non_200_success_status_is_an_error() {
    let cdn = MockServer::start().await;
    serve(&cdn, 204, b"", 1).await;

    let err = downloader(&base_url(&cdn), &refused_base_url())
        .fetch(FILE)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NO_CONTENT));
}

#[tokio::test]
async fn test_master_status_surfaces_after_fallback() {
    let master = MockServer::start().await;
    serve(&master, 404, b"", 1).await;

    let err = downloader(&refused_base_url(), &base_url(&master))
        .fetch(FILE)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
}

#[tokio::test]
async fn test_all_refused_surfaces_last_refusal() {
    let master_base = refused_base_url();
    let err = downloader(&refused_base_url(), &master_base)
        .fetch(FILE)
        .await
        .unwrap_err();

    match err {
        DownloadError::ConnectionRefused { url, .. } => {
            assert_eq!(url, format!("{master_base}{FILE}"));
        }
        other => panic!("Expected ConnectionRefused, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_to_directory_keeps_layout() {
    let cdn = MockServer::start().await;
    serve(&cdn, 200, b"mods", 2).await;
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("nested").join("content");

    let downloader = downloader(&base_url(&cdn), &refused_base_url());
    for _ in 0..2 {
        let written = downloader
            .fetch_to_file(FILE, Some(&root), None)
            .await
            .expect("Download into a new nested directory should succeed");
        assert_eq!(written, root.join("Data").join("Mods.dat64"));
    }

    assert_eq!(
        std::fs::read(root.join("Data").join("Mods.dat64")).unwrap(),
        b"mods"
    );
}

#[tokio::test]
async fn test_fetch_to_file_ignores_layout() {
    let cdn = MockServer::start().await;
    serve(&cdn, 200, b"mods", 1).await;
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("elsewhere").join("HelloWorld.txt");

    let written = downloader(&base_url(&cdn), &refused_base_url())
        .fetch_to_file(FILE, None, Some(&target))
        .await
        .unwrap();

    assert_eq!(written, target);
    assert_eq!(std::fs::read(&target).unwrap(), b"mods");
    assert!(!dir.path().join("elsewhere").join("Data").exists());
}

#[tokio::test]
async fn test_destination_arguments_checked_before_network() {
    let cdn = MockServer::start().await;
    let master = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("out.bin");
    let downloader = downloader(&base_url(&cdn), &base_url(&master));

    let err = downloader
        .fetch_to_file(FILE, Some(dir.path()), Some(&file))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Usage(UsageError::ConflictingDestination)
    ));

    let err = downloader.fetch_to_file(FILE, None, None).await.unwrap_err();
    assert!(matches!(err, Error::Usage(UsageError::MissingDestination)));

    let err = downloader
        .fetch_to_file("../escape.bin", Some(dir.path()), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Usage(UsageError::InvalidContentPath { .. })
    ));

    assert!(cdn.received_requests().await.unwrap().is_empty());
    assert!(master.received_requests().await.unwrap().is_empty());
    assert!(!file.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fetches_to_same_file() {
    let cdn = MockServer::start().await;
    let body = vec![0x5a; 4 << 20];
    serve(&cdn, 200, &body, 12).await;
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.bin");
    let downloader = downloader(&base_url(&cdn), &refused_base_url());

    for _ in 0..3 {
        let fetches: Vec<_> = (0..4)
            .map(|_| {
                let downloader = downloader.clone();
                let target = target.clone();
                tokio::spawn(async move {
                    downloader.fetch_to_file(FILE, None, Some(&target)).await
                })
            })
            .collect();
        for fetch in fetches {
            let written = fetch
                .await
                .unwrap()
                .expect("Concurrent download to one file should succeed");
            assert_eq!(written, target);
        }
        assert_eq!(std::fs::read(&target).unwrap(), body);
    }

    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn test_failed_fetch_leaves_existing_file_unchanged() {
    let cdn = MockServer::start().await;
    serve(&cdn, 404, b"", 1).await;
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("Mods.dat64");
    std::fs::write(&target, b"previous").unwrap();

    let err = downloader(&base_url(&cdn), &refused_base_url())
        .fetch_to_file(FILE, None, Some(&target))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Download(DownloadError::Status { .. })));
    assert_eq!(std::fs::read(&target).unwrap(), b"previous");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn test_failed_fetch_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("content");

    let err = downloader(&refused_base_url(), &refused_base_url())
        .fetch_to_file(FILE, Some(&root), None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Download(DownloadError::ConnectionRefused { .. })
    ));
    assert!(!root.exists());
}

#[tokio::test]
async fn test_session_urls_drive_downloads() {
    let cdn = MockServer::start().await;
    let master_http = MockServer::start().await;
    serve(&cdn, 200, b"via cdn", 1).await;
    serve(&master_http, 200, b"via master", 0).await;

    let master = MockMaster::start(
        vec![padded_reply(&base_url(&master_http), &base_url(&cdn))],
        AfterReply::HoldOpen,
    )
    .await;

    let mut session = PatchSession::connect(&master.config()).await.unwrap();
    let downloader = PatchDownloader::new(session.urls(), direct_client());

    assert_eq!(
        downloader.base_urls(),
        &[base_url(&cdn), base_url(&master_http)]
    );
    let body = downloader.fetch(FILE).await.unwrap();
    assert_eq!(&body[..], b"via cdn");
    assert!(!session.is_released());

    session.release().unwrap();
}
