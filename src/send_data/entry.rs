//! Zip entry delivery through the `zip-cat` extractor.

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use tokio::io::BufReader;
use tokio::process::Command;

use crate::archive::{Frame, STATUS_ENTRY_NOT_FOUND};
use crate::send_data::error::SendDataError;
use crate::send_data::instruction::EntryParams;
use crate::send_data::process::{spawn_piped, ChildBody};

/// Run `zip_cat` for one entry and turn its framed output into a response.
pub async fn send_entry(zip_cat: &str, params: &EntryParams) -> Result<Response<Body>, SendDataError> {
    let mut command = Command::new(zip_cat);
    command.arg(&params.archive).arg(&params.entry);
    let mut child = spawn_piped(command, zip_cat)?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| SendDataError::spawn(zip_cat, std::io::ErrorKind::BrokenPipe.into()))?;
    let mut reader = BufReader::new(stdout);

    let size = match Frame::read_from(&mut reader).await? {
        Frame::Size(size) => size,
        Frame::Status(code) => {
            // Reap it; the frame already told us everything.
            let _ = child.wait().await;
            return Err(if code == STATUS_ENTRY_NOT_FOUND {
                SendDataError::EntryNotFound
            } else {
                SendDataError::Extractor(code)
            });
        }
    };

    tracing::info!(
        archive = %params.archive,
        entry = %params.entry,
        bytes = size,
        "Sending archive entry"
    );

    let mut response = Response::new(Body::from_stream(ChildBody::new(reader, child)));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    if let Some(value) = attachment(&params.entry) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// `attachment; filename="<base name>"`, quotes and controls dropped.
fn attachment(entry: &str) -> Option<HeaderValue> {
    let name: String = entry
        .rsplit('/')
        .next()
        .unwrap_or(entry)
        .chars()
        .filter(|c| *c != '"' && *c != '\\' && !c.is_control())
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{name}\"")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_uses_base_name() {
        assert_eq!(
            attachment("logs/build \"1\".txt").unwrap(),
            "attachment; filename=\"build 1.txt\""
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn negative_frame_maps_to_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-zip-cat");
        std::fs::write(&script, "#!/bin/sh\necho -2\nexit 2\n").unwrap();
        make_executable(&script);

        let params = EntryParams {
            archive: "a.zip".into(),
            entry: "missing.txt".into(),
        };
        let err = send_entry(script.to_str().unwrap(), &params).await.unwrap_err();
        assert!(matches!(err, SendDataError::EntryNotFound));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn other_failures_are_server_errors() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-zip-cat");
        std::fs::write(&script, "#!/bin/sh\necho -1\nexit 1\n").unwrap();
        make_executable(&script);

        let params = EntryParams {
            archive: "a.zip".into(),
            entry: "x".into(),
        };
        let err = send_entry(script.to_str().unwrap(), &params).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[cfg(unix)]
    fn make_executable(path: &std::path::Path) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
}
