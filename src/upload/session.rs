//! Per-request record of diverted file parts.

use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;

use crate::storage::Destination;

/// One file part that was written to storage instead of being forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    /// Multipart field name of the original part.
    pub field: String,
    /// Client-supplied file name, reduced to its last path component.
    pub file_name: String,
    pub destination: Destination,
    pub size: u64,
    /// Lowercase hex SHA-256 of the content.
    pub sha256: String,
}

impl SavedFile {
    /// Reference fields that replace the part, in forwarding order.
    pub fn reference_fields(&self) -> Vec<(String, String)> {
        let key = |suffix: &str| format!("{}.{suffix}", self.field);
        let mut fields = vec![
            (key("name"), self.file_name.clone()),
            (key("size"), self.size.to_string()),
            (key("sha256"), self.sha256.clone()),
        ];
        match &self.destination {
            Destination::Local { path } => {
                fields.push((key("path"), path.to_string_lossy().into_owned()));
            }
            Destination::Bucket { url } => {
                fields.push((key("remote_url"), url.to_string()));
                fields.push((key("remote_id"), url.path().trim_start_matches('/').to_string()));
            }
        }
        fields
    }

    /// Where upstream finds the content.
    pub fn location(&self) -> String {
        self.destination.to_string()
    }
}

/// State of one intercepted multipart request.
///
/// Owned by the task handling the request. Dropping the session cancels
/// its token, which aborts writes still in flight and removes objects that
/// were already committed.
#[derive(Debug)]
pub struct UploadSession {
    request_id: String,
    cancel: CancellationToken,
    saved: Vec<SavedFile>,
}

impl UploadSession {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            cancel: CancellationToken::new(),
            saved: Vec::new(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Token tying storage writes to this session's lifetime.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn track(&mut self, file: SavedFile) {
        tracing::debug!(
            request_id = %self.request_id,
            field = %file.field,
            destination = %file.destination,
            bytes = file.size,
            "Saved file part"
        );
        self.saved.push(file);
    }

    pub fn saved_files(&self) -> &[SavedFile] {
        &self.saved
    }

    pub fn is_rewritten(&self, field: &str) -> bool {
        self.saved.iter().any(|f| f.field == field)
    }

    /// Field name → location, for the signed rewritten-fields claim.
    pub fn rewritten_fields(&self) -> BTreeMap<String, String> {
        self.saved
            .iter()
            .map(|f| (f.field.clone(), f.location()))
            .collect()
    }

    pub fn total_bytes(&self) -> u64 {
        self.saved.iter().map(|f| f.size).sum()
    }
}

impl Drop for UploadSession {
    fn drop(&mut self) {
        if !self.saved.is_empty() {
            tracing::debug!(
                request_id = %self.request_id,
                files = self.saved.len(),
                "Releasing upload session"
            );
        }
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn saved(field: &str, destination: Destination) -> SavedFile {
        SavedFile {
            field: field.into(),
            file_name: "a.png".into(),
            destination,
            size: 42,
            sha256: "ab".repeat(32),
        }
    }

    #[test]
    fn local_reference_fields() {
        let file = saved(
            "file",
            Destination::Local {
                path: PathBuf::from("/tmp/up/123"),
            },
        );
        let names: Vec<_> = file.reference_fields().into_iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["file.name", "file.size", "file.sha256", "file.path"]);
    }

    #[test]
    fn bucket_reference_fields() {
        let file = saved("avatar", Destination::parse("s3://bucket/tmp/123").unwrap());
        let fields: BTreeMap<_, _> = file.reference_fields().into_iter().collect();
        assert_eq!(fields["avatar.remote_url"], "s3://bucket/tmp/123");
        assert_eq!(fields["avatar.remote_id"], "tmp/123");
        assert_eq!(fields["avatar.size"], "42");
    }

    #[test]
    fn drop_cancels_token() {
        let mut session = UploadSession::new("req-1");
        session.track(saved("file", Destination::parse("/tmp/x").unwrap()));
        let token = session.cancel_token().clone();

        assert!(session.is_rewritten("file"));
        assert_eq!(session.total_bytes(), 42);
        assert_eq!(session.rewritten_fields()["file"], "/tmp/x");

        drop(session);
        assert!(token.is_cancelled());
    }
}
