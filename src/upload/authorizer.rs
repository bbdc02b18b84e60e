//! Pre-authorization round trip.
//!
//! Before reading an upload body the proxy asks upstream whether the
//! request may proceed and where diverted files should go. The check is a
//! copy of the original request with an empty body, sent to the original
//! path plus the configured suffix.

use axum::body::Body;
use axum::http::request::Parts;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;

use crate::http::upstream::Upstream;
use crate::upload::error::UploadError;
use crate::upload::preparer::AuthorizeResponse;

/// Largest authorization answer that will be buffered.
const MAX_AUTHORIZE_BODY: usize = 64 * 1024;

/// Headers that describe the original body and would mislead upstream.
const BODY_HEADERS: [header::HeaderName; 4] = [
    header::CONTENT_LENGTH,
    header::CONTENT_TYPE,
    header::TRANSFER_ENCODING,
    header::EXPECT,
];

/// Outcome of pre-authorization.
#[derive(Debug)]
pub enum Authorization {
    /// Upstream accepted; its answer parameterizes storage.
    Granted(AuthorizeResponse),
    /// Upstream said anything but `200`; its response goes back verbatim.
    Denied(Response),
}

#[derive(Debug, Clone)]
pub struct PreAuthorizer {
    upstream: Upstream,
    suffix: String,
}

impl PreAuthorizer {
    pub fn new(upstream: Upstream, suffix: impl Into<String>) -> Self {
        Self {
            upstream,
            suffix: suffix.into(),
        }
    }

    /// Path and query the check is sent to.
    pub fn authorize_target(&self, parts: &Parts) -> String {
        let path = format!("{}{}", parts.uri.path().trim_end_matches('/'), self.suffix);
        match parts.uri.query() {
            Some(query) => format!("{path}?{query}"),
            None => path,
        }
    }

    pub async fn authorize(&self, parts: &Parts) -> Result<Authorization, UploadError> {
        let mut request = Request::builder()
            .method(parts.method.clone())
            .uri(self.authorize_target(parts))
            .body(Body::empty())
            .map_err(|e| UploadError::Authorize(e.to_string()))?;

        let headers = request.headers_mut();
        for (name, value) in parts.headers.iter() {
            if !BODY_HEADERS.contains(name) {
                headers.append(name.clone(), value.clone());
            }
        }

        let response = self
            .upstream
            .send(request)
            .await
            .map_err(|e| UploadError::Authorize(e.to_string()))?;

        if response.status() != StatusCode::OK {
            tracing::info!(
                path = %parts.uri.path(),
                status = %response.status(),
                "Upload not authorized"
            );
            return Ok(Authorization::Denied(response));
        }

        let body = axum::body::to_bytes(response.into_body(), MAX_AUTHORIZE_BODY)
            .await
            .map_err(|e| UploadError::Authorize(e.to_string()))?;
        let answer: AuthorizeResponse = serde_json::from_slice(&body)?;

        tracing::debug!(path = %parts.uri.path(), answer = ?answer, "Upload authorized");
        Ok(Authorization::Granted(answer))
    }
}
