//! The `zip-cat` helper as a process.

use std::net::SocketAddr;
use std::path::Path;
use std::process::Output;

use axum::extract::Request;
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower_http::services::ServeFile;

mod common;

const REPORT: &[u8] = br#"{"ok":true,"n":1}"#;

async fn zip_cat(args: &[&str]) -> Output {
    tokio::process::Command::new(env!("CARGO_BIN_EXE_zip-cat"))
        .args(args)
        .output()
        .await
        .unwrap()
}

fn fixture(dir: &Path) -> String {
    let archive = dir.join("a.zip");
    common::write_zip(
        &archive,
        &[("report.json", REPORT), ("logs/build.log", &b"line 1\nline 2\n"[..])],
    );
    archive.to_string_lossy().into_owned()
}

#[tokio::test]
async fn prints_frame_then_entry() {
    let dir = tempfile::tempdir().unwrap();
    let archive = fixture(dir.path());

    let output = zip_cat(&[archive.as_str(), "report.json"]).await;
    assert_eq!(output.status.code(), Some(0));

    let mut expected = b"17\n".to_vec();
    expected.extend_from_slice(REPORT);
    assert_eq!(output.stdout, expected);
}

#[tokio::test]
async fn missing_entry_prints_status_only() {
    let dir = tempfile::tempdir().unwrap();
    let archive = fixture(dir.path());

    let output = zip_cat(&[archive.as_str(), "missing.txt"]).await;
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(output.stdout, b"-2\n");
}

#[tokio::test]
async fn missing_archive_is_not_found() {
    let output = zip_cat(&["/nonexistent/archive.zip", "report.json"]).await;
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(output.stdout, b"-2\n");
}

#[tokio::test]
async fn usage_errors_exit_one() {
    let output = zip_cat(&[]).await;
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage"));
}

#[tokio::test]
async fn version_exits_zero() {
    let output = zip_cat(&["--version"]).await;
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("zip-cat"));
}

/// Behave like a signed object URL: GET only.
async fn reject_head(request: Request, next: Next) -> Response {
    if request.method() == Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    next.run(request).await
}

#[tokio::test]
async fn reads_remote_archives_by_range() {
    let dir = tempfile::tempdir().unwrap();
    let archive = fixture(dir.path());

    let addr: SocketAddr = "127.0.0.1:28501".parse().unwrap();
    let get_only = Router::new()
        .route_service("/signed.zip", ServeFile::new(&archive))
        .layer(middleware::from_fn(reject_head));
    let app = Router::new()
        .route_service("/a.zip", ServeFile::new(&archive))
        .merge(get_only);
    common::start_upstream(addr, app).await;

    let url = format!("http://{addr}/a.zip");
    let output = zip_cat(&[url.as_str(), "logs/build.log"]).await;
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(output.stdout, b"14\nline 1\nline 2\n");

    let signed = format!("http://{addr}/signed.zip");
    let output = zip_cat(&[signed.as_str(), "report.json"]).await;
    assert_eq!(output.status.code(), Some(0));
    let mut expected = b"17\n".to_vec();
    expected.extend_from_slice(REPORT);
    assert_eq!(output.stdout, expected);

    let missing = format!("http://{addr}/gone.zip");
    let output = zip_cat(&[missing.as_str(), "logs/build.log"]).await;
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(output.stdout, b"-2\n");
}
