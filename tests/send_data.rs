//! Response hijacking against a mock upstream.

use std::net::SocketAddr;
use std::path::PathBuf;

use accel_proxy::send_data::{encode_params, EntryParams, ARTIFACTS_ENTRY_PREFIX};
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

mod common;

const FILE_CONTENT: &[u8] = b"file served by the proxy, not upstream";
const REPORT: &[u8] = br#"{"ok":true,"n":1}"#;

#[derive(Clone)]
struct Fixtures {
    file: PathBuf,
    archive: PathBuf,
}

fn entry_header(archive: &PathBuf, entry: &str) -> String {
    let params = EntryParams {
        archive: archive.to_string_lossy().into_owned(),
        entry: entry.into(),
    };
    encode_params(ARTIFACTS_ENTRY_PREFIX, &params).unwrap()
}

async fn sendfile(State(fx): State<Fixtures>) -> impl IntoResponse {
    (
        [
            ("x-sendfile", fx.file.to_string_lossy().into_owned()),
            ("cache-control", "private".to_string()),
        ],
        "upstream body that must never reach the client",
    )
}

async fn forbidden_sendfile(State(fx): State<Fixtures>) -> impl IntoResponse {
    (
        StatusCode::FORBIDDEN,
        [("x-sendfile", fx.file.to_string_lossy().into_owned())],
        "denied",
    )
}

async fn entry(State(fx): State<Fixtures>) -> impl IntoResponse {
    [("x-accel-send-data", entry_header(&fx.archive, "report.json"))]
}

async fn missing_entry(State(fx): State<Fixtures>) -> impl IntoResponse {
    [("x-accel-send-data", entry_header(&fx.archive, "missing.txt"))]
}

async fn sendfile_type(request: Request) -> String {
    request
        .headers()
        .get("x-sendfile-type")
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default()
}

struct Harness {
    proxy: SocketAddr,
    _dir: tempfile::TempDir,
    _shutdown: accel_proxy::Shutdown,
}

async fn start(upstream_port: u16, proxy_port: u16) -> Harness {
    let upstream: SocketAddr = format!("127.0.0.1:{upstream_port}").parse().unwrap();
    let proxy: SocketAddr = format!("127.0.0.1:{proxy_port}").parse().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("blob.bin");
    std::fs::write(&file, FILE_CONTENT).unwrap();
    let archive = dir.path().join("a.zip");
    common::write_zip(&archive, &[("report.json", REPORT)]);

    let app = Router::new()
        .route("/file", get(sendfile))
        .route("/forbidden", get(forbidden_sendfile))
        .route("/entry", get(entry))
        .route("/missing-entry", get(missing_entry))
        .route("/sendfile-type", get(sendfile_type))
        .with_state(Fixtures { file, archive });
    common::start_upstream(upstream, app).await;

    let mut config = common::proxy_config(proxy, upstream);
    config.send_data.zip_cat_path = env!("CARGO_BIN_EXE_zip-cat").to_string();
    let shutdown = common::start_proxy(config).await;

    Harness {
        proxy,
        _dir: dir,
        _shutdown: shutdown,
    }
}

#[tokio::test]
async fn sendfile_replaces_upstream_body() {
    let harness = start(28401, 28402).await;

    let response = common::client()
        .get(format!("http://{}/file", harness.proxy))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().get("x-sendfile").is_none());
    assert_eq!(response.headers()[header::CACHE_CONTROL], "private");
    assert_eq!(response.content_length(), Some(FILE_CONTENT.len() as u64));
    assert_eq!(response.bytes().await.unwrap(), FILE_CONTENT);
}

#[tokio::test]
async fn sendfile_honors_ranges() {
    let harness = start(28411, 28412).await;

    let response = common::client()
        .get(format!("http://{}/file", harness.proxy))
        .header(header::RANGE, "bytes=0-3")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT.as_u16());
    assert_eq!(response.bytes().await.unwrap(), &FILE_CONTENT[..4]);
}

#[tokio::test]
async fn non_ok_responses_are_not_hijacked() {
    let harness = start(28421, 28422).await;

    let response = common::client()
        .get(format!("http://{}/forbidden", harness.proxy))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN.as_u16());
    assert!(response.headers().get("x-sendfile").is_none());
    assert_eq!(response.text().await.unwrap(), "denied");
}

#[tokio::test]
async fn archive_entries_are_extracted() {
    let harness = start(28431, 28432).await;

    let response = common::client()
        .get(format!("http://{}/entry", harness.proxy))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.content_length(), Some(REPORT.len() as u64));
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"report.json\""
    );
    assert_eq!(response.bytes().await.unwrap(), REPORT);

    let response = common::client()
        .get(format!("http://{}/missing-entry", harness.proxy))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND.as_u16());
}

#[tokio::test]
async fn requests_advertise_sendfile_support() {
    let harness = start(28441, 28442).await;

    let response = common::client()
        .get(format!("http://{}/sendfile-type", harness.proxy))
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "X-Sendfile");
}
