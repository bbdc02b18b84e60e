//! Decoding upstream's accelerated-delivery headers.

use std::path::PathBuf;

use axum::http::HeaderMap;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::send_data::error::SendDataError;

/// Response header naming a local file to send.
pub const SENDFILE_HEADER: &str = "x-sendfile";
/// Request header advertising that [`SENDFILE_HEADER`] is understood.
pub const SENDFILE_TYPE_HEADER: &str = "x-sendfile-type";
/// Response header carrying a structured send instruction.
pub const SEND_DATA_HEADER: &str = "x-accel-send-data";

pub const ARTIFACTS_ENTRY_PREFIX: &str = "artifacts-entry:";
pub const GIT_BLOB_PREFIX: &str = "git-blob:";

/// One zip entry to extract and send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EntryParams {
    /// Local path or `http(s)://` URL of the archive.
    pub archive: String,
    pub entry: String,
}

/// One git blob to stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BlobParams {
    pub repo_path: String,
    pub blob_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendInstruction {
    File(PathBuf),
    ArchiveEntry(EntryParams),
    GitBlob(BlobParams),
}

impl SendInstruction {
    /// Remove both delivery headers from `headers` and decode the one that
    /// applies. The local-file header wins when both are present.
    pub fn take_from(headers: &mut HeaderMap) -> Result<Option<Self>, SendDataError> {
        let sendfile = headers.remove(SENDFILE_HEADER);
        let send_data = headers.remove(SEND_DATA_HEADER);

        if let Some(value) = sendfile {
            let path = value
                .to_str()
                .map_err(|e| SendDataError::InvalidDescriptor(e.to_string()))?;
            return Ok(Some(SendInstruction::File(PathBuf::from(path))));
        }

        let Some(value) = send_data else {
            return Ok(None);
        };
        let value = value
            .to_str()
            .map_err(|e| SendDataError::InvalidDescriptor(e.to_string()))?;

        if let Some(encoded) = value.strip_prefix(ARTIFACTS_ENTRY_PREFIX) {
            return Ok(Some(SendInstruction::ArchiveEntry(decode_params(encoded)?)));
        }
        if let Some(encoded) = value.strip_prefix(GIT_BLOB_PREFIX) {
            let params: BlobParams = decode_params(encoded)?;
            if !is_object_id(&params.blob_id) {
                return Err(SendDataError::InvalidDescriptor(format!(
                    "blob id {:?}",
                    params.blob_id
                )));
            }
            return Ok(Some(SendInstruction::GitBlob(params)));
        }

        tracing::warn!(value = %value.split(':').next().unwrap_or_default(), "Unknown send-data kind");
        Ok(None)
    }

    /// Label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SendInstruction::File(_) => "sendfile",
            SendInstruction::ArchiveEntry(_) => "artifacts-entry",
            SendInstruction::GitBlob(_) => "git-blob",
        }
    }
}

/// Inverse of the decoding done by [`SendInstruction::take_from`], for
/// upstreams and tests that build the header.
pub fn encode_params<T: Serialize>(prefix: &str, params: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(params)?;
    Ok(format!("{prefix}{}", URL_SAFE_NO_PAD.encode(json)))
}

fn decode_params<T: DeserializeOwned>(encoded: &str) -> Result<T, SendDataError> {
    let json = URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .map_err(|e| SendDataError::InvalidDescriptor(e.to_string()))?;
    serde_json::from_slice(&json).map_err(|e| SendDataError::InvalidDescriptor(e.to_string()))
}

fn is_object_id(id: &str) -> bool {
    (4..=64).contains(&id.len()) && id.bytes().all(|b| b.is_ascii_hexdigit())
}
