//! Upload interception errors and their HTTP mapping.

use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::storage::{ConsumeError, StorageError};
use crate::upload::claims::ClaimsError;
use crate::upload::preparer::PrepareError;

#[derive(Debug, Error)]
pub enum UploadError {
    /// The pre-authorization round trip failed at the transport level.
    #[error("authorization request failed: {0}")]
    Authorize(String),

    #[error("invalid authorization response: {0}")]
    AuthorizeResponse(#[from] serde_json::Error),

    #[error("preparing storage options: {0}")]
    Prepare(#[from] PrepareError),

    #[error("malformed multipart body: {0}")]
    Multipart(#[from] multer::Error),

    /// The client's body stream broke off or was malformed mid-part.
    #[error("reading part {field:?}: {detail}")]
    ClientBody { field: String, detail: String },

    /// The client sent a field whose name collides with a reference field.
    #[error("client supplied reserved field {0:?}")]
    InjectedField(String),

    #[error("part {field:?} exceeds {limit} bytes")]
    TooLarge { field: String, limit: u64 },

    #[error("storing part {field:?}: {source}")]
    Storage {
        field: String,
        #[source]
        source: ConsumeError,
    },

    #[error("signing claims: {0}")]
    Claims(#[from] ClaimsError),

    #[error("building rewritten headers: {0}")]
    Header(String),
}

impl UploadError {
    /// Storage failures caused by the client's body stream are protocol
    /// errors, not backend errors.
    pub(crate) fn from_consume(field: &str, err: ConsumeError) -> Self {
        if let StorageError::Io(io) = &err.source {
            if io.kind() == io::ErrorKind::InvalidData {
                return UploadError::ClientBody {
                    field: field.to_string(),
                    detail: io.to_string(),
                };
            }
        }
        UploadError::Storage {
            field: field.to_string(),
            source: err,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            UploadError::Multipart(_)
            | UploadError::ClientBody { .. }
            | UploadError::InjectedField(_) => StatusCode::BAD_REQUEST,
            UploadError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::Authorize(_) => StatusCode::BAD_GATEWAY,
            UploadError::AuthorizeResponse(_)
            | UploadError::Prepare(_)
            | UploadError::Storage { .. }
            | UploadError::Claims(_)
            | UploadError::Header(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, status.canonical_reason().unwrap_or_default()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_status_classes() {
        assert_eq!(
            UploadError::InjectedField("file.path".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            UploadError::TooLarge { field: "file".into(), limit: 1 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );

        let backend = ConsumeError {
            written: 3,
            source: StorageError::DeadlineExceeded,
        };
        assert_eq!(
            UploadError::from_consume("file", backend).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let client = ConsumeError {
            written: 3,
            source: StorageError::Io(io::Error::new(io::ErrorKind::InvalidData, "bad boundary")),
        };
        assert_eq!(
            UploadError::from_consume("file", client).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
