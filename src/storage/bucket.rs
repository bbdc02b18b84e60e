//! Bucket-URL backend over `object_store`.
//!
//! One client is built per bucket (scheme + authority) and shared by every
//! request through [`BucketMux`]. Credentials come from the environment
//! (`AWS_*`, `GOOGLE_*`, `AZURE_*`).

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use object_store::buffered::BufWriter;
use object_store::path::Path;
use object_store::ObjectStore;
use tokio::io::{AsyncRead, AsyncWriteExt};
use url::Url;

use crate::storage::types::StorageError;

const CREDENTIAL_PREFIXES: [&str; 3] = ["aws_", "google_", "azure_"];

/// Concurrent cache of bucket clients keyed by `scheme://authority`.
#[derive(Default)]
pub struct BucketMux {
    stores: DashMap<String, Arc<dyn ObjectStore>>,
}

impl std::fmt::Debug for BucketMux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketMux")
            .field("buckets", &self.stores.len())
            .finish()
    }
}

impl BucketMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `url` to a shared client and the object path inside it.
    pub fn open(&self, url: &Url) -> Result<(Arc<dyn ObjectStore>, Path), StorageError> {
        let path = Path::from_url_path(url.path())
            .map_err(|e| StorageError::invalid(url.as_str(), e))?;
        let key = bucket_key(url);

        if let Some(store) = self.stores.get(&key) {
            return Ok((Arc::clone(store.value()), path));
        }

        let (store, _) = object_store::parse_url_opts(url, credential_options())?;
        let store: Arc<dyn ObjectStore> = Arc::from(store);
        let store = self
            .stores
            .entry(key.clone())
            .or_insert_with(|| store)
            .value()
            .clone();

        tracing::debug!(bucket = %key, "Opened bucket client");
        Ok((store, path))
    }

    /// Number of distinct buckets opened so far.
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

fn bucket_key(url: &Url) -> String {
    format!("{}://{}", url.scheme(), url.authority())
}

fn credential_options() -> Vec<(String, String)> {
    std::env::vars()
        .map(|(k, v)| (k.to_ascii_lowercase(), v))
        .filter(|(k, _)| CREDENTIAL_PREFIXES.iter().any(|p| k.starts_with(p)))
        .collect()
}

/// Operations on one bucket object.
pub struct BucketObject {
    store: Arc<dyn ObjectStore>,
    path: Path,
}

impl BucketObject {
    pub fn open(mux: &BucketMux, url: &Url) -> Result<Self, StorageError> {
        let (store, path) = mux.open(url)?;
        Ok(Self { store, path })
    }

    /// Stream `reader` into the object. Small objects are sent with a single
    /// put, large ones as a multipart upload; either way the object only
    /// becomes visible when the upload completes.
    pub async fn write<R>(&self, reader: &mut R) -> Result<(), StorageError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut upload = PendingUpload::new(Arc::clone(&self.store), self.path.clone());

        let copied = tokio::io::copy(reader, &mut upload.writer).await;
        let committed = match copied {
            Ok(_) => {
                upload.committing = true;
                upload.writer.shutdown().await
            }
            Err(e) => Err(e),
        };

        match committed {
            Ok(()) => {
                upload.finished = true;
                Ok(())
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    pub async fn exists(&self) -> Result<bool, StorageError> {
        match self.store.head(&self.path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self) -> Result<(), StorageError> {
        match self.store.delete(&self.path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn read(&self) -> Result<Bytes, StorageError> {
        let result = self.store.get(&self.path).await?;
        Ok(result.bytes().await?)
    }
}

/// An upload in flight. Unless marked finished, dropping it aborts the
/// multipart upload in the background, and deletes the object too if the
/// commit was already under way.
struct PendingUpload {
    store: Arc<dyn ObjectStore>,
    path: Path,
    writer: BufWriter,
    committing: bool,
    finished: bool,
}

impl PendingUpload {
    fn new(store: Arc<dyn ObjectStore>, path: Path) -> Self {
        let writer = BufWriter::new(Arc::clone(&store), path.clone());
        Self {
            store,
            path,
            writer,
            committing: false,
            finished: false,
        }
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(path = %self.path, "No runtime to abort upload");
            return;
        };

        // The replacement writer never talks to the store.
        let placeholder = BufWriter::new(Arc::clone(&self.store), self.path.clone());
        let mut writer = std::mem::replace(&mut self.writer, placeholder);
        let store = Arc::clone(&self.store);
        let path = self.path.clone();
        let committing = self.committing;

        handle.spawn(async move {
            if let Err(e) = writer.abort().await {
                tracing::debug!(path = %path, error = %e, "Upload abort failed");
            }
            if committing {
                match store.delete(&path).await {
                    Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
                    Err(e) => tracing::warn!(path = %path, error = %e, "Failed to delete object"),
                }
            }
        });
    }
}
