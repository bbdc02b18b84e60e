//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use accel_proxy::config::ProxyConfig;
use accel_proxy::http::HttpServer;
use accel_proxy::lifecycle::Shutdown;
use accel_proxy::upload::ClaimsSigner;
use tokio::net::TcpListener;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const SECRET: &[u8] = b"integration-secret";

pub fn signer() -> ClaimsSigner {
    ClaimsSigner::new(SECRET, Duration::from_secs(60))
}

/// Serve `app` as the mock upstream on `addr`.
pub async fn start_upstream(addr: SocketAddr, app: axum::Router) {
    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
}

/// Start the proxy on `config.listener.bind_address`. Keep the returned
/// handle alive for the duration of the test.
pub async fn start_proxy(config: ProxyConfig) -> Shutdown {
    let listener = TcpListener::bind(&config.listener.bind_address)
        .await
        .unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, signer()).unwrap();
    tokio::spawn(server.run(listener, shutdown.subscribe()));
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown
}

pub fn proxy_config(proxy: SocketAddr, upstream: SocketAddr) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = proxy.to_string();
    config.upstream.address = upstream.to_string();
    config
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Write a zip at `path` holding `entries` (deflated).
pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let mut zip = ZipWriter::new(std::fs::File::create(path).unwrap());
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, data) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

/// A `multipart/form-data` body: `(name, filename, data)` per part.
pub fn multipart_body(boundary: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, file_name, data) in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match file_name {
            Some(file_name) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}
