//! The uniform `consume` contract over every backend.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::resilience::backoff::calculate_backoff;
use crate::storage::bucket::{BucketMux, BucketObject};
use crate::storage::local::LocalStore;
use crate::storage::types::{ConsumeError, Destination, StorageError};

const DELETE_ATTEMPTS: u32 = 5;
const DELETE_BASE_DELAY_MS: u64 = 50;
const DELETE_MAX_DELAY_MS: u64 = 2000;

/// Writes byte streams into destinations, whichever backend they name.
///
/// Cheap to clone; clones share the bucket client pool.
#[derive(Debug, Clone, Default)]
pub struct ObjectSink {
    mux: Arc<BucketMux>,
}

impl ObjectSink {
    pub fn new(mux: Arc<BucketMux>) -> Self {
        Self { mux }
    }

    /// Consume `reader` into `dest` before `deadline`.
    ///
    /// On success the object is committed and a watcher is armed: once
    /// `cancel` fires the object is deleted again. On failure, deadline or
    /// cancellation nothing is left visible at `dest`, and the same holds
    /// when this future is dropped mid-write. The error carries the number of
    /// bytes read before the write stopped.
    pub async fn consume<R>(
        &self,
        reader: R,
        dest: &Destination,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<u64, ConsumeError>
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = CountingReader::new(reader);

        let write = self.write(&mut reader, dest);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StorageError::Cancelled),
            res = tokio::time::timeout_at(deadline, write) => {
                res.unwrap_or(Err(StorageError::DeadlineExceeded))
            }
        };

        let written = reader.count();
        match result {
            Ok(()) => {
                tracing::debug!(destination = %dest, bytes = written, "Object committed");
                self.delete_on_cancel(dest.clone(), cancel.clone());
                Ok(written)
            }
            Err(source) => {
                if matches!(source, StorageError::Cancelled | StorageError::DeadlineExceeded) {
                    self.discard(dest).await;
                }
                tracing::warn!(destination = %dest, bytes = written, error = %source, "Object write failed");
                Err(ConsumeError { written, source })
            }
        }
    }

    async fn write<R>(&self, reader: &mut R, dest: &Destination) -> Result<(), StorageError>
    where
        R: AsyncRead + Unpin,
    {
        match dest {
            Destination::Local { path } => Ok(LocalStore.write(reader, path).await?),
            Destination::Bucket { url } => BucketObject::open(&self.mux, url)?.write(reader).await,
        }
    }

    async fn discard(&self, dest: &Destination) {
        if let Err(e) = self.delete(dest).await {
            tracing::warn!(destination = %dest, error = %e, "Failed to discard object");
        }
    }

    fn delete_on_cancel(&self, dest: Destination, cancel: CancellationToken) {
        let sink = self.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            sink.delete_eventually(&dest).await;
        });
    }

    /// Best-effort delete, retried with backoff.
    pub async fn delete_eventually(&self, dest: &Destination) {
        for attempt in 1..=DELETE_ATTEMPTS {
            match self.delete(dest).await {
                Ok(()) => {
                    tracing::debug!(destination = %dest, "Object deleted");
                    return;
                }
                Err(e) => {
                    tracing::warn!(destination = %dest, attempt, error = %e, "Object delete failed");
                    let delay = calculate_backoff(attempt, DELETE_BASE_DELAY_MS, DELETE_MAX_DELAY_MS);
                    tokio::time::sleep(delay).await;
                }
            }
        }
        tracing::error!(destination = %dest, "Giving up on object delete");
    }

    pub async fn exists(&self, dest: &Destination) -> Result<bool, StorageError> {
        match dest {
            Destination::Local { path } => Ok(LocalStore.exists(path).await?),
            Destination::Bucket { url } => BucketObject::open(&self.mux, url)?.exists().await,
        }
    }

    pub async fn delete(&self, dest: &Destination) -> Result<(), StorageError> {
        match dest {
            Destination::Local { path } => Ok(LocalStore.delete(path).await?),
            Destination::Bucket { url } => BucketObject::open(&self.mux, url)?.delete().await,
        }
    }

    /// Read a whole object back.
    pub async fn read(&self, dest: &Destination) -> Result<Bytes, StorageError> {
        match dest {
            Destination::Local { path } => Ok(LocalStore.read(path).await?),
            Destination::Bucket { url } => BucketObject::open(&self.mux, url)?.read().await,
        }
    }
}

/// Counts bytes handed out by the inner reader.
struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R> CountingReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }

    fn count(&self) -> u64 {
        self.count
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for CountingReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            self.count += (buf.filled().len() - before) as u64;
        }
        poll
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const CONTENT: &[u8] = b"sink round trip content";

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    async fn eventually_gone(sink: &ObjectSink, dest: &Destination) {
        for _ in 0..50 {
            if !sink.exists(dest).await.unwrap() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("{dest} is still present");
    }

    #[tokio::test]
    async fn local_round_trip_and_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let dest = Destination::Local {
            path: dir.path().join("upload.bin"),
        };
        let sink = ObjectSink::default();
        let cancel = CancellationToken::new();

        let n = sink.consume(CONTENT, &dest, far_deadline(), &cancel).await.unwrap();
        assert_eq!(n, CONTENT.len() as u64);
        assert_eq!(sink.read(&dest).await.unwrap(), CONTENT);

        cancel.cancel();
        eventually_gone(&sink, &dest).await;
    }

    #[tokio::test]
    async fn bucket_round_trip_and_cancel() {
        let dest = Destination::parse("memory:///test-container/test.png").unwrap();
        let sink = ObjectSink::default();
        let cancel = CancellationToken::new();

        let n = sink.consume(CONTENT, &dest, far_deadline(), &cancel).await.unwrap();
        assert_eq!(n, CONTENT.len() as u64);
        assert_eq!(sink.read(&dest).await.unwrap(), CONTENT);

        cancel.cancel();
        eventually_gone(&sink, &dest).await;
    }

    #[tokio::test]
    async fn cancelled_before_completion_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let local = Destination::Local {
            path: dir.path().join("never.bin"),
        };
        let bucket = Destination::parse("memory:///test-container/never.bin").unwrap();
        let sink = ObjectSink::default();

        for dest in [local, bucket] {
            let (mut client, server) = tokio::io::duplex(64);
            tokio::io::AsyncWriteExt::write_all(&mut client, b"partial").await.unwrap();

            let cancel = CancellationToken::new();
            let canceller = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                canceller.cancel();
            });

            let err = sink.consume(server, &dest, far_deadline(), &cancel).await.unwrap_err();
            assert!(matches!(err.source, StorageError::Cancelled));
            assert_eq!(err.written, 7);
            eventually_gone(&sink, &dest).await;
            drop(client);
        }
    }

    #[tokio::test]
    async fn aborted_request_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let local = Destination::Local {
            path: dir.path().join("upload.bin"),
        };
        let bucket = Destination::parse("memory:///test-container/aborted.bin").unwrap();
        let sink = ObjectSink::default();

        for dest in [local, bucket] {
            let (mut client, server) = tokio::io::duplex(64);
            tokio::io::AsyncWriteExt::write_all(&mut client, b"partial").await.unwrap();

            let cancel = CancellationToken::new();
            let task = {
                let (sink, dest, cancel) = (sink.clone(), dest.clone(), cancel.clone());
                tokio::spawn(async move { sink.consume(server, &dest, far_deadline(), &cancel).await })
            };
            tokio::time::sleep(Duration::from_millis(100)).await;

            task.abort();
            assert!(task.await.unwrap_err().is_cancelled());
            cancel.cancel();
            tokio::time::sleep(Duration::from_millis(100)).await;

            assert!(!sink.exists(&dest).await.unwrap());
            drop(client);
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn deadline_aborts_write() {
        let dir = tempfile::tempdir().unwrap();
        let dest = Destination::Local {
            path: dir.path().join("slow.bin"),
        };
        let sink = ObjectSink::default();
        let (_client, server) = tokio::io::duplex(64);

        let deadline = Instant::now() + Duration::from_millis(50);
        let err = sink
            .consume(server, &dest, deadline, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err.source, StorageError::DeadlineExceeded));
        assert_eq!(err.written, 0);
        assert!(!sink.exists(&dest).await.unwrap());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn reports_partial_count_on_read_error() {
        struct FailAfterPrefix(&'static [u8]);
        impl AsyncRead for FailAfterPrefix {
            fn poll_read(
                mut self: Pin<&mut Self>,
                _: &mut Context<'_>,
                buf: &mut ReadBuf<'_>,
            ) -> Poll<io::Result<()>> {
                if self.0.is_empty() {
                    return Poll::Ready(Err(io::ErrorKind::ConnectionReset.into()));
                }
                let n = self.0.len().min(buf.remaining());
                buf.put_slice(&self.0[..n]);
                self.0 = &self.0[n..];
                Poll::Ready(Ok(()))
            }
        }

        let dest = Destination::parse("memory:///test-container/broken.bin").unwrap();
        let sink = ObjectSink::default();
        let err = sink
            .consume(FailAfterPrefix(b"12345"), &dest, far_deadline(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.written, 5);
        assert!(!sink.exists(&dest).await.unwrap());
    }
}
