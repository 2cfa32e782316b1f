//! In-memory storage backend for testing.

use super::FileInfoStream;
use crate::error::{ErrorKind, Result};
use crate::file::FileInfo;
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use exn::OptionExt;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::StorageBackend;

/// In-memory storage backend for testing.
///
/// Files live in an ordered map behind a [`RwLock`], so listings come back
/// sorted by path and every method works on `&self`. Modification times can be
/// set with [`touch()`](Self::touch) for change-detection tests.
///
/// # Examples
///
/// ```
/// use sfs_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("docs/notes.txt", b"remember the milk")]);
/// backend.write(Path::new("docs/todo.txt"), b"data...").await?;
/// assert_eq!(backend.paths().await.len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    files: RwLock<BTreeMap<PathBuf, MockFile>>,
}

#[derive(Clone)]
struct MockFile {
    data: Vec<u8>,
    modified: OffsetDateTime,
}
impl MockFile {
    fn info(&self, path: &Path) -> FileInfo {
        FileInfo::new(path, self.data.len() as u64, self.modified)
    }
}

impl MockBackend {
    /// Create a mock backend pre-populated with files, all modified "now".
    ///
    /// Panics on an invalid path: broken test setup should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let modified = OffsetDateTime::now_utc();
        let files = files
            .into_iter()
            .map(|(path, data)| {
                let path = path.into();
                match validate_path(&path) {
                    Ok(valid) => (valid, MockFile { data: data.into(), modified }),
                    Err(_) => panic!("MockBackend::with_files: invalid path {}", path.display()),
                }
            })
            .collect();
        Self { name: "mock".to_string(), files: RwLock::new(files) }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the modification time of an existing file.
    pub async fn touch(&self, path: &Path, at: OffsetDateTime) -> Result<()> {
        let path = validate_path(path)?;
        let mut files = self.files.write().await;
        let file = files.get_mut(&path).ok_or_raise(|| ErrorKind::NotFound(path.clone()))?;
        file.modified = at;
        Ok(())
    }

    /// Every stored path, sorted.
    pub async fn paths(&self) -> Vec<PathBuf> {
        self.files.read().await.keys().cloned().collect()
    }

    async fn get(&self, path: &Path) -> Result<(PathBuf, MockFile)> {
        let path = validate_path(path)?;
        let file = self.files.read().await.get(&path).cloned().ok_or_raise(|| ErrorKind::NotFound(path.clone()))?;
        Ok((path, file))
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        Self::with_files(std::iter::empty::<(PathBuf, Vec<u8>)>())
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let prefix = match prefix.map(validate_path).transpose() {
            Ok(prefix) => prefix,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };
        Box::pin(stream! {
            // Snapshot under the read lock; never hold it across a yield.
            let listing: Vec<FileInfo> = self
                .files
                .read()
                .await
                .iter()
                .filter(|(path, _)| prefix.as_ref().is_none_or(|p| path.starts_with(p)))
                .map(|(path, file)| file.info(path))
                .collect();
            for info in listing {
                yield Ok(info);
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.files.read().await.contains_key(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(self.get(path).await?.1.data)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = validate_path(path)?;
        let file = MockFile { data: data.to_vec(), modified: OffsetDateTime::now_utc() };
        self.files.write().await.insert(path, file);
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        match self.files.write().await.remove(&path) {
            Some(_) => Ok(()),
            None => exn::bail!(ErrorKind::NotFound(path)),
        }
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let (path, file) = self.get(path).await?;
        Ok(file.info(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[tokio::test]
    async fn test_write_and_read() {
        let backend = MockBackend::default();
        backend.write(Path::new("test.txt"), b"hello").await.unwrap();
        let data = backend.read(Path::new("test.txt")).await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let backend = MockBackend::default();
        let err = backend.read(Path::new("missing.txt")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete() {
        let backend = MockBackend::default();
        backend.write(Path::new("file.txt"), b"data").await.unwrap();
        backend.delete(Path::new("file.txt")).await.unwrap();
        assert!(!backend.exists(Path::new("file.txt")).await.unwrap());
        let err = backend.delete(Path::new("file.txt")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_touch_sets_modified() {
        let backend = MockBackend::with_files([("notes.txt", Vec::from(*b"12345"))]);
        let at = datetime!(2024-03-01 12:00 UTC);
        backend.touch(Path::new("notes.txt"), at).await.unwrap();
        let info = backend.stat(Path::new("notes.txt")).await.unwrap();
        assert_eq!(info.modified, at);
        assert_eq!(info.size, 5);
        assert!(backend.touch(Path::new("missing.txt"), at).await.is_err());
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let backend = MockBackend::with_files([
            ("photos/a.jpg", Vec::from(*b"a")),
            ("photos/b.jpg", Vec::from(*b"b")),
            ("music/c.flac", Vec::from(*b"c")),
        ]);
        let files: Vec<_> = backend.list(Some(Path::new("photos"))).await.unwrap().into_iter().map(|f| f.path).collect();
        assert_eq!(files, vec![PathBuf::from("photos/a.jpg"), PathBuf::from("photos/b.jpg")]);
        assert_eq!(backend.paths().await.len(), 3);
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let backend = MockBackend::default();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.write(Path::new("../escape"), b"bad").await.is_err());
    }

    #[test]
    #[should_panic(expected = "invalid path")]
    fn test_with_files_panics_on_bad_path() {
        MockBackend::with_files([("../escape", Vec::from(*b"bad"))]);
    }
}
