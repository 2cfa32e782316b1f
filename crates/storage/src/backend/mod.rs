//! Storage backend trait and implementations.
//!
//! The sync client never touches the filesystem directly; it goes through a
//! [`StorageBackend`]. The local directory being synchronised is one backend,
//! a second drive used as a mirror is another, and tests use an in-memory one.

mod local;
#[cfg(feature = "mock")]
mod mock;
mod ro;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
pub use self::ro::ReadOnlyBackend;
use crate::error::Result;
use crate::file::FileInfo;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::Path;
use std::pin::Pin;

pub(crate) type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;
/// File contents as a stream of chunks.
pub type ByteStream<'a> = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send + 'a>>;

/// Unified interface for storage backends.
///
/// A glorified CRUD interface over relative paths. All paths are relative to
/// the storage root and must be validated using
/// [`validate_path`](crate::validate_path) before use; implementations
/// enforce this.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use sfs_storage::{backend::StorageBackend, error::Result};
///
/// async fn copy_between(from: &dyn StorageBackend, to: &dyn StorageBackend, path: &Path) -> Result<u64> {
///     let chunks = from.reader(path).await?;
///     to.write_stream(path, chunks).await
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend, used for logging.
    fn name(&self) -> &str;

    /// List all files matching an optional prefix.
    ///
    /// Default implementation collects [`list_stream()`](Self::list_stream)
    /// into a [`Vec`].
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream metadata for every file below the root (or below `prefix`).
    ///
    /// The walk covers the whole tree: every subdirectory is descended, not
    /// just the first one found.
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// # use sfs_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut stream = backend.list_stream(None);
    /// while let Some(info) = stream.try_next().await? {
    ///     println!("{}: {} bytes", info.path.display(), info.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// Check if a file exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Stream file contents in chunks.
    ///
    /// The stream owns everything it needs, so it can outlive the borrow of
    /// the backend (an HTTP request body, for example). Default
    /// implementation reads the whole file and yields it as one chunk.
    async fn reader(&self, path: &Path) -> Result<ByteStream<'static>> {
        let data = self.read(path).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(data) })))
    }

    /// Write file contents, creating or truncating the file.
    ///
    /// Implementations create parent directories as needed.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Write file contents from a stream of chunks, returning the number of
    /// bytes written.
    ///
    /// If the stream fails the file is not created or replaced. Default
    /// implementation collects the chunks and calls [`write()`](Self::write).
    async fn write_stream(&self, path: &Path, chunks: ByteStream<'_>) -> Result<u64> {
        let data: Vec<u8> = chunks.try_concat().await?;
        self.write(path, &data).await?;
        Ok(data.len() as u64)
    }

    /// Delete a file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Get file metadata without reading contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn stat(&self, path: &Path) -> Result<FileInfo>;
}
