//! Multipart body rewriting.
//!
//! Parts are read strictly in order. A file part selected by the upload
//! options is streamed into the sink and replaced by reference fields;
//! every other part is copied into the outgoing body unchanged.

use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::{Stream, TryStreamExt};
use multer::{Field, Multipart};
use tokio::io::AsyncReadExt;
use tokio::time::Instant;
use tokio_util::io::StreamReader;
use uuid::Uuid;

use crate::storage::ObjectSink;
use crate::upload::claims::{ClaimsSigner, UploadClaims};
use crate::upload::error::UploadError;
use crate::upload::hashing::HashingReader;
use crate::upload::preparer::{PrepareError, UploadOpts, MAX_STORE_TIMEOUT};
use crate::upload::session::{SavedFile, UploadSession};

/// Suffixes of the reference fields generated for a diverted part.
const REFERENCE_SUFFIXES: [&str; 7] = [
    "name",
    "size",
    "sha256",
    "path",
    "remote_url",
    "remote_id",
    "upload",
];

/// The slimmed body and its content type.
#[derive(Debug, Clone)]
pub struct RewrittenForm {
    pub body: Bytes,
    pub content_type: String,
}

/// Rewrites one multipart body.
pub struct FormRewriter<'a> {
    opts: &'a UploadOpts,
    sink: &'a ObjectSink,
    signer: &'a ClaimsSigner,
}

impl<'a> FormRewriter<'a> {
    pub fn new(opts: &'a UploadOpts, sink: &'a ObjectSink, signer: &'a ClaimsSigner) -> Self {
        Self { opts, sink, signer }
    }

    /// Consume the multipart `stream`, diverting file parts into storage and
    /// recording them in `session`. Nothing is returned unless every part
    /// was processed.
    pub async fn rewrite<S, O, E>(
        &self,
        stream: S,
        boundary: &str,
        session: &mut UploadSession,
    ) -> Result<RewrittenForm, UploadError>
    where
        S: Stream<Item = Result<O, E>> + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        let mut multipart = Multipart::new(stream, boundary);
        let mut form = FormWriter::new();
        let mut plain_names = Vec::new();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field
                .file_name()
                .filter(|n| !n.is_empty())
                .map(base_name);

            match file_name {
                Some(file_name) if self.opts.accepts(&name) => {
                    let saved = self.save_part(field, name, file_name, session).await?;
                    let reference = saved.reference_fields();
                    let token = self.signer.sign(&UploadClaims {
                        upload: reference.iter().cloned().collect(),
                    })?;

                    for (key, value) in &reference {
                        form.text_field(key, value);
                    }
                    form.text_field(&format!("{}.upload", saved.field), &token);
                    session.track(saved);
                }
                _ => {
                    let raw_file_name = field.file_name().map(str::to_string);
                    let content_type = field.content_type().map(ToString::to_string);
                    let data = read_inline(field, &name, self.opts.max_field_size).await?;
                    form.field(&name, raw_file_name.as_deref(), content_type.as_deref(), &data);
                    plain_names.push(name);
                }
            }
        }

        if let Some(injected) = plain_names
            .into_iter()
            .find(|name| collides_with_reference(name, session))
        {
            return Err(UploadError::InjectedField(injected));
        }

        Ok(form.finish())
    }

    async fn save_part(
        &self,
        field: Field<'static>,
        name: String,
        file_name: String,
        session: &UploadSession,
    ) -> Result<SavedFile, UploadError> {
        let destination = self
            .opts
            .new_destination()
            .map_err(|e| UploadError::Prepare(PrepareError::from(e)))?;

        let stream = field.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e));
        let mut hashing = HashingReader::new(StreamReader::new(stream));

        let limit = self.opts.max_size;
        let reader = (&mut hashing).take(limit.map_or(u64::MAX, |n| n.saturating_add(1)));
        let now = Instant::now();
        let deadline = now
            .checked_add(self.opts.store_timeout)
            .unwrap_or_else(|| now + MAX_STORE_TIMEOUT);

        let written = self
            .sink
            .consume(reader, &destination, deadline, session.cancel_token())
            .await
            .map_err(|e| UploadError::from_consume(&name, e))?;

        if let Some(limit) = limit.filter(|&limit| written > limit) {
            self.sink.delete_eventually(&destination).await;
            return Err(UploadError::TooLarge { field: name, limit });
        }

        Ok(SavedFile {
            field: name,
            file_name,
            destination,
            size: written,
            sha256: hashing.hex_digest(),
        })
    }
}

/// `F.path` and friends are reserved once `F` has been rewritten.
fn collides_with_reference(name: &str, session: &UploadSession) -> bool {
    match name.rsplit_once('.') {
        Some((base, suffix)) => {
            REFERENCE_SUFFIXES.contains(&suffix) && session.is_rewritten(base)
        }
        None => false,
    }
}

/// Last path component of a client-supplied file name.
fn base_name(name: &str) -> String {
    name.rsplit(['/', '\\']).next().unwrap_or(name).to_string()
}

/// Serializes form-data parts under a fresh boundary.
struct FormWriter {
    boundary: String,
    buf: BytesMut,
}

impl FormWriter {
    fn new() -> Self {
        Self {
            boundary: format!("accel-proxy-{}", Uuid::new_v4().simple()),
            buf: BytesMut::new(),
        }
    }

    fn text_field(&mut self, name: &str, value: &str) {
        self.field(name, None, None, value.as_bytes());
    }

    fn field(&mut self, name: &str, file_name: Option<&str>, content_type: Option<&str>, data: &[u8]) {
        let mut head = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"",
            self.boundary,
            escape_quoted(name)
        );
        if let Some(file_name) = file_name {
            head.push_str(&format!("; filename=\"{}\"", escape_quoted(file_name)));
        }
        head.push_str("\r\n");
        if let Some(content_type) = content_type {
            head.push_str(&format!("Content-Type: {content_type}\r\n"));
        }
        head.push_str("\r\n");

        self.buf.put_slice(head.as_bytes());
        self.buf.put_slice(data);
        self.buf.put_slice(b"\r\n");
    }

    fn finish(mut self) -> RewrittenForm {
        self.buf.put_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        RewrittenForm {
            body: self.buf.freeze(),
            content_type: format!("multipart/form-data; boundary={}", self.boundary),
        }
    }
}

fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Buffer a part that is forwarded as-is, up to `limit` bytes.
async fn read_inline(
    mut field: Field<'static>,
    name: &str,
    limit: Option<u64>,
) -> Result<Bytes, UploadError> {
    let mut data = BytesMut::new();
    while let Some(chunk) = field.chunk().await? {
        data.extend_from_slice(&chunk);
        if let Some(limit) = limit.filter(|&limit| data.len() as u64 > limit) {
            return Err(UploadError::TooLarge {
                field: name.to_string(),
                limit,
            });
        }
    }
    Ok(data.freeze())
}
