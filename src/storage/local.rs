//! Local filesystem backend.
//!
//! Writes go to a hidden temp file next to the destination and are renamed
//! into place on success, so a partial file is never visible under the
//! destination name. The temp file is unlinked whenever the write does not
//! finish, including when the writing future is dropped.

use std::io;
use std::path::Path;

use bytes::Bytes;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWriteExt};

/// Stateless handle over the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStore;

impl LocalStore {
    /// Copy `reader` to `path` through a temp file in the same directory.
    pub async fn write<R>(&self, reader: &mut R, path: &Path) -> io::Result<()>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent).await?;
                parent
            }
            None => Path::new("."),
        };

        // Unlinked on drop until persisted.
        let (file, temp) = temp_file_in(parent, path)?.into_parts();
        let mut file = File::from_std(file);
        tokio::io::copy(reader, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        temp.persist(path)?;
        Ok(())
    }

    pub async fn exists(&self, path: &Path) -> io::Result<bool> {
        fs::try_exists(path).await
    }

    pub async fn delete(&self, path: &Path) -> io::Result<()> {
        match fs::remove_file(path).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    pub async fn read(&self, path: &Path) -> io::Result<Bytes> {
        fs::read(path).await.map(Bytes::from)
    }
}

/// Hidden sibling of `path`, e.g. `.file.png.a1B2c3.tmp`.
fn temp_file_in(parent: &Path, path: &Path) -> io::Result<tempfile::NamedTempFile> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(".tmp")
        .tempfile_in(parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entries(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn write_renames_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/object.bin");

        let mut reader: &[u8] = b"payload";
        LocalStore.write(&mut reader, &path).await.unwrap();

        assert_eq!(LocalStore.read(&path).await.unwrap(), &b"payload"[..]);
        assert_eq!(entries(&dir.path().join("nested")), ["object.bin"]);
    }

    #[tokio::test]
    async fn failed_write_leaves_nothing_behind() {
        struct Broken;
        impl AsyncRead for Broken {
            fn poll_read(
                self: std::pin::Pin<&mut Self>,
                _: &mut std::task::Context<'_>,
                _: &mut tokio::io::ReadBuf<'_>,
            ) -> std::task::Poll<io::Result<()>> {
                std::task::Poll::Ready(Err(io::ErrorKind::ConnectionReset.into()))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("object.bin");

        assert!(LocalStore.write(&mut Broken, &path).await.is_err());
        assert!(entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn dropped_write_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.bin");
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(b"partial").await.unwrap();

        let task = {
            let path = path.clone();
            tokio::spawn(async move { LocalStore.write(&mut server, &path).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        let temps = entries(dir.path());
        assert_eq!(temps.len(), 1);
        assert!(temps[0].starts_with(".upload.bin."));
        assert!(temps[0].ends_with(".tmp"));

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(entries(dir.path()).is_empty());
        drop(client);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone");
        LocalStore.delete(&path).await.unwrap();
    }
}
