//! Upload interception: authorize, rewrite, then hand the slim request on.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Request};
use axum::response::Response;

use crate::observability::metrics;
use crate::storage::ObjectSink;
use crate::upload::authorizer::{Authorization, PreAuthorizer};
use crate::upload::claims::{ClaimsSigner, MultipartClaims};
use crate::upload::error::UploadError;
use crate::upload::preparer::Preparer;
use crate::upload::rewrite::FormRewriter;
use crate::upload::session::UploadSession;

/// Request header carrying the signed list of rewritten fields.
pub const REWRITTEN_FIELDS_HEADER: &str = "x-accel-multipart-fields";

/// What to do with an upload request after interception.
#[derive(Debug)]
pub enum Interception {
    /// Forward `request` upstream; keep `session` alive until upstream answered.
    Forward {
        request: Request<Body>,
        session: UploadSession,
    },
    /// Answer the client directly.
    Respond(Response),
}

pub struct UploadInterceptor {
    authorizer: PreAuthorizer,
    preparer: Arc<dyn Preparer>,
    sink: ObjectSink,
    signer: ClaimsSigner,
}

impl UploadInterceptor {
    pub fn new(
        authorizer: PreAuthorizer,
        preparer: Arc<dyn Preparer>,
        sink: ObjectSink,
        signer: ClaimsSigner,
    ) -> Self {
        Self {
            authorizer,
            preparer,
            sink,
            signer,
        }
    }

    pub async fn intercept(
        &self,
        request: Request<Body>,
        request_id: &str,
    ) -> Result<Interception, UploadError> {
        let (mut parts, body) = request.into_parts();
        parts.headers.remove(REWRITTEN_FIELDS_HEADER);

        let answer = match self.authorizer.authorize(&parts).await? {
            Authorization::Granted(answer) => answer,
            Authorization::Denied(response) => return Ok(Interception::Respond(response)),
        };

        let Some(boundary) = form_data_boundary(&parts.headers) else {
            tracing::debug!(request_id, "Upload route without form data, forwarding as-is");
            return Ok(Interception::Forward {
                request: Request::from_parts(parts, body),
                session: UploadSession::new(request_id),
            });
        };

        let opts = self.preparer.prepare(&answer)?;
        let mut session = UploadSession::new(request_id);
        let result = FormRewriter::new(&opts, &self.sink, &self.signer)
            .rewrite(body.into_data_stream(), &boundary, &mut session)
            .await;

        for file in session.saved_files() {
            metrics::record_upload_part(file.destination.backend(), "stored", file.size);
        }
        let form = match result {
            Ok(form) => form,
            Err(e) => {
                metrics::record_upload_part(opts.backend(), "failed", 0);
                return Err(e);
            }
        };

        let claims = self.signer.sign(&MultipartClaims {
            rewritten_fields: session.rewritten_fields(),
        })?;

        let headers = &mut parts.headers;
        headers.remove(header::TRANSFER_ENCODING);
        headers.insert(header::CONTENT_TYPE, header_value(form.content_type)?);
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(form.body.len()));
        headers.insert(REWRITTEN_FIELDS_HEADER, header_value(claims)?);

        tracing::info!(
            request_id,
            files = session.saved_files().len(),
            bytes = session.total_bytes(),
            "Rewrote upload"
        );

        Ok(Interception::Forward {
            request: Request::from_parts(parts, Body::from(form.body)),
            session,
        })
    }
}

fn header_value(value: String) -> Result<HeaderValue, UploadError> {
    HeaderValue::try_from(value).map_err(|e| UploadError::Header(e.to_string()))
}

/// Boundary of a `multipart/form-data` body, if that is what the request carries.
pub fn form_data_boundary(headers: &HeaderMap) -> Option<String> {
    let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    if !essence.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    multer::parse_boundary(content_type).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_form_data_only() {
        let mut headers = HeaderMap::new();
        assert_eq!(form_data_boundary(&headers), None);

        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        assert_eq!(form_data_boundary(&headers), None);

        headers.insert(header::CONTENT_TYPE, "multipart/mixed; boundary=abc".parse().unwrap());
        assert_eq!(form_data_boundary(&headers), None);

        headers.insert(
            header::CONTENT_TYPE,
            "multipart/form-data; boundary=----abc".parse().unwrap(),
        );
        assert_eq!(form_data_boundary(&headers).as_deref(), Some("----abc"));
    }
}
