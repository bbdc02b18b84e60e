//! Destination descriptors and storage errors.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use url::Url;

/// Errors that can occur while talking to a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Local filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Bucket backend failure.
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// The descriptor could not be turned into a destination.
    #[error("Invalid destination {descriptor:?}: {reason}")]
    InvalidDestination { descriptor: String, reason: String },

    /// The write did not finish before its deadline.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// The caller cancelled the write.
    #[error("Write cancelled")]
    Cancelled,
}

impl StorageError {
    pub(crate) fn invalid(descriptor: impl Into<String>, reason: impl fmt::Display) -> Self {
        StorageError::InvalidDestination {
            descriptor: descriptor.into(),
            reason: reason.to_string(),
        }
    }
}

/// A failed `consume`, with the number of bytes read before it failed.
#[derive(Debug, Error)]
#[error("{source} after {written} bytes")]
pub struct ConsumeError {
    pub written: u64,
    #[source]
    pub source: StorageError,
}

/// Where a consumed stream ends up.
///
/// Immutable once assigned to a part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// A file on the proxy's filesystem.
    Local { path: PathBuf },
    /// An object addressed by a bucket URL, e.g. `s3://bucket/key`.
    Bucket { url: Url },
}

impl Destination {
    /// Select a backend from the form of `descriptor` alone.
    ///
    /// URLs with a scheme other than `file` address a bucket; `file://`
    /// URLs and plain paths address the local filesystem.
    pub fn parse(descriptor: &str) -> Result<Self, StorageError> {
        if descriptor.is_empty() {
            return Err(StorageError::invalid(descriptor, "empty descriptor"));
        }

        match Url::parse(descriptor) {
            Ok(url) if url.scheme() == "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| StorageError::invalid(descriptor, "not a local file URL"))?;
                Ok(Destination::Local { path })
            }
            // Single-letter schemes are Windows drive prefixes.
            Ok(url) if url.scheme().len() > 1 => Destination::bucket(url),
            _ => Ok(Destination::Local {
                path: PathBuf::from(descriptor),
            }),
        }
    }

    /// A bucket object named `object_name` under `bucket_url`.
    pub fn in_bucket(bucket_url: &str, object_name: &str) -> Result<Self, StorageError> {
        let mut url = Url::parse(bucket_url).map_err(|e| StorageError::invalid(bucket_url, e))?;
        let base = url.path().trim_end_matches('/').to_string();
        let object = object_name.trim_start_matches('/');
        if object.is_empty() {
            return Err(StorageError::invalid(bucket_url, "empty object name"));
        }
        url.set_path(&format!("{base}/{object}"));
        Destination::bucket(url)
    }

    fn bucket(url: Url) -> Result<Self, StorageError> {
        if url.path().trim_matches('/').is_empty() {
            return Err(StorageError::invalid(url.as_str(), "missing object name"));
        }
        Ok(Destination::Bucket { url })
    }

    /// Backend family label for logs and metrics.
    pub fn backend(&self) -> &'static str {
        match self {
            Destination::Local { .. } => "local",
            Destination::Bucket { .. } => "bucket",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Local { path } => write!(f, "{}", path.display()),
            Destination::Bucket { url } => write!(f, "{url}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_paths_are_local() {
        assert_eq!(
            Destination::parse("/tmp/uploads/abc").unwrap(),
            Destination::Local {
                path: PathBuf::from("/tmp/uploads/abc")
            }
        );
        assert_eq!(Destination::parse("relative/file").unwrap().backend(), "local");
    }

    #[test]
    fn file_urls_are_local() {
        assert_eq!(
            Destination::parse("file:///srv/tmp/obj").unwrap(),
            Destination::Local {
                path: PathBuf::from("/srv/tmp/obj")
            }
        );
    }

    #[test]
    fn scheme_urls_are_buckets() {
        for descriptor in [
            "s3://bucket/tmp/obj",
            "gs://bucket/obj",
            "az://container/obj",
            "memory:///container/obj",
        ] {
            let dest = Destination::parse(descriptor).unwrap();
            assert_eq!(dest.backend(), "bucket", "{descriptor}");
            assert_eq!(dest.to_string(), descriptor);
        }
    }

    #[test]
    fn bucket_without_object_is_rejected() {
        assert!(Destination::parse("s3://bucket").is_err());
        assert!(Destination::parse("").is_err());
        assert!(Destination::in_bucket("s3://bucket/prefix", "").is_err());
    }

    #[test]
    fn joins_object_name_onto_bucket() {
        let dest = Destination::in_bucket("s3://bucket/tmp/uploads/", "/abc.png").unwrap();
        assert_eq!(dest.to_string(), "s3://bucket/tmp/uploads/abc.png");

        let dest = Destination::in_bucket("az://container", "obj").unwrap();
        assert_eq!(dest.to_string(), "az://container/obj");
    }
}
