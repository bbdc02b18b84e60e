//! Accelerated response delivery ("send data").
//!
//! # Data Flow
//! ```text
//! request → middleware adds X-Sendfile-Type, keeps a bodiless copy
//!     → upstream response
//!     → delivery.rs (Pending → Hijacked | Normal)
//!         Normal   → upstream body untouched
//!         Hijacked → upstream body dropped, then one of
//!             sendfile.rs  X-Sendfile: <path>
//!             entry.rs     X-Accel-Send-Data: artifacts-entry:<params>  (zip-cat)
//!             blob.rs      X-Accel-Send-Data: git-blob:<params>         (git cat-file)
//!     → Closed
//! ```
//!
//! # Design Decisions
//! - Only a `200` is hijacked; every other status is relayed with the
//!   delivery headers removed
//! - Upstream headers survive a successful hijack except those describing
//!   upstream's own body
//! - Child processes belong to the response body and die with it

pub mod blob;
pub mod delivery;
pub mod entry;
pub mod error;
pub mod instruction;
pub mod process;
pub mod sendfile;

use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, HttpBody};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::config::SendDataConfig;
use crate::observability::metrics;

pub use delivery::{Delivery, DeliveryState, ResponseDelivery};
pub use error::SendDataError;
pub use instruction::{
    encode_params, BlobParams, EntryParams, SendInstruction, ARTIFACTS_ENTRY_PREFIX,
    GIT_BLOB_PREFIX, SENDFILE_HEADER, SENDFILE_TYPE_HEADER, SEND_DATA_HEADER,
};

/// Upstream headers that describe upstream's own body.
const BODY_HEADERS: [header::HeaderName; 5] = [
    header::CONTENT_LENGTH,
    header::CONTENT_RANGE,
    header::CONTENT_ENCODING,
    header::TRANSFER_ENCODING,
    header::ACCEPT_RANGES,
];

#[derive(Debug, Clone)]
pub struct SendDataState {
    config: Arc<SendDataConfig>,
}

impl SendDataState {
    pub fn new(config: SendDataConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    async fn deliver(&self, instruction: SendInstruction, request: Request) -> Response {
        let result = match instruction {
            SendInstruction::File(path) => Ok(sendfile::send_file(&path, request).await),
            SendInstruction::ArchiveEntry(params) => {
                entry::send_entry(&self.config.zip_cat_path, &params).await
            }
            SendInstruction::GitBlob(params) => blob::send_blob(&self.config.git_path, &params).await,
        };
        result.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Send data failed");
            e.into_response()
        })
    }
}

/// Axum middleware that lets upstream hand body delivery to the proxy.
pub async fn send_data_middleware(
    State(state): State<SendDataState>,
    mut request: Request,
    next: Next,
) -> Response {
    request
        .headers_mut()
        .insert(SENDFILE_TYPE_HEADER, HeaderValue::from_static("X-Sendfile"));
    let replay = bodiless_copy(&request);

    let response = next.run(request).await;
    let (mut parts, body) = response.into_parts();

    let mut delivery = ResponseDelivery::new();
    let decision = delivery.finalize_headers(parts.status, &mut parts.headers);
    let response = match decision {
        Ok(Delivery::Normal) => Response::from_parts(parts, body),
        Ok(Delivery::Hijack(instruction)) => {
            let start = Instant::now();
            let kind = instruction.kind();
            let upstream_len = body.size_hint().exact();
            drop(body);

            let mut served = state.deliver(instruction, replay).await;
            let outcome = if served.status().is_success() || served.status().is_redirection() {
                merge_upstream_headers(served.headers_mut(), &parts.headers);
                "ok"
            } else {
                "error"
            };
            tracing::debug!(
                kind,
                status = %served.status(),
                upstream_len = ?upstream_len,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Hijacked response"
            );
            metrics::record_send_data(kind, outcome);
            served
        }
        Err(e) => {
            tracing::error!(error = %e, "Rejected send-data instruction");
            metrics::record_send_data("invalid", "error");
            e.into_response()
        }
    };
    delivery.close();
    response
}

fn bodiless_copy(request: &Request) -> Request {
    let mut copy = Request::new(Body::empty());
    *copy.method_mut() = request.method().clone();
    *copy.uri_mut() = request.uri().clone();
    *copy.version_mut() = request.version();
    *copy.headers_mut() = request.headers().clone();
    copy
}

/// Keep upstream's headers unless the served response set them or they
/// describe upstream's discarded body.
fn merge_upstream_headers(served: &mut HeaderMap, upstream: &HeaderMap) {
    for name in upstream.keys() {
        if served.contains_key(name) || BODY_HEADERS.contains(name) {
            continue;
        }
        for value in upstream.get_all(name) {
            served.append(name.clone(), value.clone());
        }
    }
}
