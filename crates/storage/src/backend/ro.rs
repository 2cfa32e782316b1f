//! Read-only storage backend, used for dry runs.

use async_trait::async_trait;
use futures::TryStreamExt;
use std::path::Path;

use crate::backend::{ByteStream, FileInfoStream};
use crate::{BackendHandle, StorageBackend, error::Result, file::FileInfo};

/// Read-only storage backend.
///
/// Wraps another backend and silently drops all write operations, logging an
/// [`info event`](tracing::Event) for each. Reads pass straight through.
#[derive(Clone)]
pub struct ReadOnlyBackend {
    inner: BackendHandle,
}
impl ReadOnlyBackend {
    pub fn new(inner: BackendHandle) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl StorageBackend for ReadOnlyBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        self.inner.list_stream(prefix)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.inner.read(path).await
    }

    async fn reader(&self, path: &Path) -> Result<ByteStream<'static>> {
        self.inner.reader(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        tracing::info!(backend = self.inner.name(), path = %path.display(), bytes = data.len(), "Dry run: skipping write");
        Ok(())
    }

    /// Drains the stream so the caller sees the real byte count.
    async fn write_stream(&self, path: &Path, chunks: ByteStream<'_>) -> Result<u64> {
        let bytes = chunks.try_fold(0u64, |n, chunk| async move { Ok(n + chunk.len() as u64) }).await?;
        tracing::info!(backend = self.inner.name(), path = %path.display(), bytes, "Dry run: skipping write");
        Ok(bytes)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        tracing::info!(backend = self.inner.name(), path = %path.display(), "Dry run: skipping delete");
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        self.inner.stat(path).await
    }
}
