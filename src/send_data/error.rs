use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::archive::FrameError;

#[derive(Debug, Error)]
pub enum SendDataError {
    /// Upstream set a send-data header we could not decode.
    #[error("invalid send-data descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("archive entry not found")]
    EntryNotFound,

    #[error("blob not found")]
    BlobNotFound,

    #[error("extractor exited with status {0}")]
    Extractor(u32),

    #[error("extractor frame: {0}")]
    Frame(#[from] FrameError),

    #[error("running {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("response delivery already {0}")]
    InvalidTransition(&'static str),
}

impl SendDataError {
    pub(crate) fn spawn(program: &str, source: io::Error) -> Self {
        SendDataError::Spawn {
            program: program.to_string(),
            source,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            SendDataError::EntryNotFound | SendDataError::BlobNotFound => StatusCode::NOT_FOUND,
            SendDataError::InvalidDescriptor(_)
            | SendDataError::Extractor(_)
            | SendDataError::Frame(_)
            | SendDataError::Spawn { .. }
            | SendDataError::InvalidTransition(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SendDataError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, status.canonical_reason().unwrap_or_default()).into_response()
    }
}
