//! Git blob delivery via `git cat-file`.

use axum::body::Body;
use axum::http::{header, HeaderValue, Response};
use tokio::process::Command;

use crate::send_data::error::SendDataError;
use crate::send_data::instruction::BlobParams;
use crate::send_data::process::{spawn_piped, ChildBody};

fn cat_file(git: &str, params: &BlobParams) -> Command {
    let mut command = Command::new(git);
    command.arg("--git-dir").arg(&params.repo_path).arg("cat-file");
    command
}

/// Size of the blob, or `BlobNotFound` if git does not know it.
async fn blob_size(git: &str, params: &BlobParams) -> Result<u64, SendDataError> {
    let output = cat_file(git, params)
        .arg("-s")
        .arg(&params.blob_id)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| SendDataError::spawn(git, e))?;

    if !output.status.success() {
        tracing::debug!(
            repo = %params.repo_path,
            blob = %params.blob_id,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "Blob lookup failed"
        );
        return Err(SendDataError::BlobNotFound);
    }
    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse()
        .map_err(|_| SendDataError::BlobNotFound)
}

pub async fn send_blob(git: &str, params: &BlobParams) -> Result<Response<Body>, SendDataError> {
    let size = blob_size(git, params).await?;

    let mut command = cat_file(git, params);
    command.arg("blob").arg(&params.blob_id);
    let mut child = spawn_piped(command, git)?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| SendDataError::spawn(git, std::io::ErrorKind::BrokenPipe.into()))?;

    tracing::info!(repo = %params.repo_path, blob = %params.blob_id, bytes = size, "Sending blob");

    let mut response = Response::new(Body::from_stream(ChildBody::new(stdout, child)));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_repository_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let params = BlobParams {
            repo_path: dir.path().join("none.git").to_string_lossy().into_owned(),
            blob_id: "deadbeef".into(),
        };
        match send_blob("git", &params).await {
            Err(SendDataError::BlobNotFound) => {}
            // No git on this machine.
            Err(SendDataError::Spawn { .. }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
