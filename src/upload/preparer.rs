//! Turning upstream's authorization answer into per-request storage options.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::storage::{Destination, StorageError};

/// Upper bound for one part's storage deadline, whatever upstream asks for.
pub const MAX_STORE_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Body of upstream's `200` answer to a pre-authorization request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthorizeResponse {
    /// Local directory for diverted files.
    pub temp_path: Option<String>,
    /// Bucket location for diverted files; wins over `temp_path`.
    pub remote_object: Option<RemoteObject>,
    /// Upper bound for one diverted part in bytes.
    pub max_size: Option<u64>,
}

/// A bucket location named by upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteObject {
    /// e.g. `s3://uploads-bucket/tmp`
    pub bucket_url: String,
    /// Prepended to the generated object name.
    pub object_prefix: String,
    /// Deadline for each object write.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("authorization response names no usable storage: {0}")]
    Storage(#[from] StorageError),
}

/// Base location new destinations are created under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageTarget {
    LocalDir(PathBuf),
    Bucket { bucket_url: String, prefix: String },
}

/// Storage options for one upload request.
#[derive(Debug, Clone)]
pub struct UploadOpts {
    pub target: StorageTarget,
    /// Time allowed for each part's write.
    pub store_timeout: Duration,
    pub max_size: Option<u64>,
    /// Upper bound for a part forwarded inline, including file parts the
    /// allow-list skips.
    pub max_field_size: Option<u64>,
    /// Fields eligible for diversion. Empty means every file part.
    pub allowed_fields: Vec<String>,
}

impl UploadOpts {
    /// Whether a file part named `field` should be diverted.
    pub fn accepts(&self, field: &str) -> bool {
        self.allowed_fields.is_empty() || self.allowed_fields.iter().any(|f| f == field)
    }

    /// Storage backend label for metrics.
    pub fn backend(&self) -> &'static str {
        match self.target {
            StorageTarget::LocalDir(_) => "local",
            StorageTarget::Bucket { .. } => "bucket",
        }
    }

    /// A fresh, unique destination for one part.
    pub fn new_destination(&self) -> Result<Destination, StorageError> {
        let name = Uuid::new_v4().simple().to_string();
        match &self.target {
            StorageTarget::LocalDir(dir) => Ok(Destination::Local {
                path: dir.join(name),
            }),
            StorageTarget::Bucket { bucket_url, prefix } => {
                Destination::in_bucket(bucket_url, &format!("{prefix}{name}"))
            }
        }
    }
}

/// Decides where and how an authorized upload is stored.
pub trait Preparer: Send + Sync {
    fn prepare(&self, auth: &AuthorizeResponse) -> Result<UploadOpts, PrepareError>;
}

/// Combines upstream's answer with the configured policy.
#[derive(Debug, Clone)]
pub struct DefaultPreparer {
    config: UploadConfig,
}

impl DefaultPreparer {
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }

    fn max_size(&self, auth: &AuthorizeResponse) -> Option<u64> {
        let configured = Some(self.config.max_part_size).filter(|&n| n > 0);
        match (auth.max_size, configured) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

impl Preparer for DefaultPreparer {
    fn prepare(&self, auth: &AuthorizeResponse) -> Result<UploadOpts, PrepareError> {
        let default_timeout = Duration::from_secs(self.config.store_timeout_secs);

        let (target, store_timeout) = match &auth.remote_object {
            Some(remote) => {
                // Validate early so a bad URL fails before the body is read.
                Destination::in_bucket(&remote.bucket_url, "check")?;
                let timeout = remote
                    .timeout_secs
                    .filter(|&secs| secs > 0)
                    .map(Duration::from_secs)
                    .unwrap_or(default_timeout);
                let target = StorageTarget::Bucket {
                    bucket_url: remote.bucket_url.clone(),
                    prefix: remote.object_prefix.clone(),
                };
                (target, timeout)
            }
            None => {
                let dir = auth
                    .temp_path
                    .clone()
                    .unwrap_or_else(|| self.config.local_temp_dir.clone());
                (StorageTarget::LocalDir(PathBuf::from(dir)), default_timeout)
            }
        };

        Ok(UploadOpts {
            target,
            store_timeout: store_timeout.min(MAX_STORE_TIMEOUT),
            max_size: self.max_size(auth),
            max_field_size: Some(self.config.max_field_size).filter(|&n| n > 0),
            allowed_fields: self.config.allowed_fields.clone(),
        })
    }
}
