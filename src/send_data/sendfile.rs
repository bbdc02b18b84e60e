//! Local file delivery with conditional and range support.

use std::path::Path;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use tower::ServiceExt;
use tower_http::services::ServeFile;

/// Serve `path` answering `request`'s method, range and validator headers.
pub async fn send_file(path: &Path, request: Request<Body>) -> Response<Body> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) | Err(_) => {
            tracing::warn!(path = %path.display(), "Send file: not a regular file");
            return StatusCode::NOT_FOUND.into_response();
        }
    }

    tracing::info!(path = %path.display(), method = %request.method(), "Sending file");
    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}
