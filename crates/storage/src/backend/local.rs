//! Local filesystem storage backend.
//!
//! Used both for the directory being synchronised and for mirror
//! destinations. Writes land in a partial file next to the target and are
//! renamed into place, so a destination never holds a half-written copy under
//! the real name.

use crate::backend::{ByteStream, FileInfoStream};
use crate::error::ErrorKind;
use crate::{FileInfo, StorageBackend, error::Result, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use futures::TryStreamExt;
use std::ffi::OsString;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Suffix of in-flight writes. Files carrying it are never listed.
const PARTIAL_SUFFIX: &str = ".sfs-partial";
/// Read size of streamed contents.
const CHUNK_SIZE: usize = 64 * 1024;

/// Local filesystem storage backend.
///
/// ```no_run
/// use sfs_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("home", "/home/me/sync")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}

impl LocalBackend {
    /// The root must be absolute. It is created if missing.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() || root.is_file() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        // Blocking, but only ever called once per backend.
        std::fs::create_dir_all(&root).map_err(|e| io_error(e, &root))?;
        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a relative storage path.
    pub fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        Ok(self.root.join(validate_path(path.as_ref())?))
    }

    fn relative_path(&self, absolute: &Path) -> Result<PathBuf> {
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("{} is outside of {}", absolute.display(), self.root.display()))
        })?;
        validate_path(relative)
    }

    fn partial_path(target: &Path) -> PathBuf {
        let mut name = target.file_name().map(OsString::from).unwrap_or_default();
        name.push(PARTIAL_SUFFIX);
        target.with_file_name(name)
    }

    fn is_partial(path: &Path) -> bool {
        path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.ends_with(PARTIAL_SUFFIX))
    }

    /// Move `partial` into place at `target`, or remove it if that fails.
    async fn commit(partial: &Path, target: &Path, path: &Path) -> Result<()> {
        if let Err(e) = fs::rename(partial, target).await {
            let _ = fs::remove_file(partial).await;
            exn::bail!(io_error(e, path));
        }
        Ok(())
    }

    /// Read one directory of the walk.
    ///
    /// Returns the files found (filtered by `prefix`) and the subdirectories
    /// still worth descending into.
    async fn read_level(&self, dir: &Path, prefix: Option<&Path>) -> Result<(Vec<FileInfo>, Vec<PathBuf>)> {
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            // Removed while we were walking.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((files, dirs)),
            Err(e) => exn::bail!(io_error(e, dir)),
        };
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(e, dir))? {
            let path = entry.path();
            let metadata = entry.metadata().await.map_err(|e| io_error(e, &path))?;
            let relative = self.relative_path(&path)?;
            let wanted = prefix.is_none_or(|p| relative.starts_with(p));
            if metadata.is_dir() {
                // Directories above the prefix lead to it.
                if wanted || prefix.is_some_and(|p| p.starts_with(&relative)) {
                    dirs.push(path);
                }
            } else if metadata.is_file() && wanted && !Self::is_partial(&relative) {
                files.push(file_info(relative, &metadata)?);
            }
        }
        Ok((files, dirs))
    }
}

fn io_error(e: std::io::Error, path: &Path) -> ErrorKind {
    match e.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
        std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
        _ => ErrorKind::Io(e),
    }
}

fn file_info(relative: PathBuf, metadata: &Metadata) -> Result<FileInfo> {
    let modified = metadata.modified().map_err(ErrorKind::Io)?;
    Ok(FileInfo::new(relative, metadata.len(), modified.into()))
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let prefix = match prefix.map(validate_path).transpose() {
            Ok(prefix) => prefix,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };
        Box::pin(stream! {
            // Every directory pushed is popped again: the walk covers the
            // whole tree, however deep or wide.
            let mut pending = vec![self.root.clone()];
            while let Some(dir) = pending.pop() {
                match self.read_level(&dir, prefix.as_deref()).await {
                    Ok((files, dirs)) => {
                        pending.extend(dirs);
                        for file in files {
                            yield Ok(file);
                        }
                    },
                    Err(e) => {
                        tracing::warn!(backend = %self.name, dir = %dir.display(), "Could not list directory");
                        yield Err(e);
                    },
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let absolute = self.absolute_path(path)?;
        Ok(fs::try_exists(&absolute).await.map_err(ErrorKind::Io)?)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let absolute = self.absolute_path(path)?;
        Ok(fs::read(&absolute).await.map_err(|e| io_error(e, path))?)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let absolute = self.absolute_path(path)?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await.map_err(|e| io_error(e, path))?;
        }
        let partial = Self::partial_path(&absolute);
        fs::write(&partial, data).await.map_err(|e| io_error(e, path))?;
        Self::commit(&partial, &absolute, path).await
    }

    async fn reader(&self, path: &Path) -> Result<ByteStream<'static>> {
        let absolute = self.absolute_path(path)?;
        let mut file = fs::File::open(&absolute).await.map_err(|e| io_error(e, path))?;
        let path = path.to_path_buf();
        Ok(Box::pin(stream! {
            let mut buffer = vec![0u8; CHUNK_SIZE];
            loop {
                match file.read(&mut buffer).await {
                    Ok(0) => break,
                    Ok(n) => yield Ok(buffer[..n].to_vec()),
                    Err(e) => {
                        yield Err(exn::Exn::from(io_error(e, &path)));
                        break;
                    },
                }
            }
        }))
    }

    async fn write_stream(&self, path: &Path, mut chunks: ByteStream<'_>) -> Result<u64> {
        let absolute = self.absolute_path(path)?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await.map_err(|e| io_error(e, path))?;
        }
        let partial = Self::partial_path(&absolute);
        let mut file = fs::File::create(&partial).await.map_err(|e| io_error(e, path))?;
        let mut written = 0u64;
        let filled: Result<()> = async {
            while let Some(chunk) = chunks.try_next().await? {
                file.write_all(&chunk).await.map_err(|e| io_error(e, path))?;
                written += chunk.len() as u64;
            }
            Ok(file.flush().await.map_err(|e| io_error(e, path))?)
        }
        .await;
        drop(file);
        if let Err(e) = filled {
            let _ = fs::remove_file(&partial).await;
            return Err(e);
        }
        Self::commit(&partial, &absolute, path).await?;
        Ok(written)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let absolute = self.absolute_path(path)?;
        Ok(fs::remove_file(&absolute).await.map_err(|e| io_error(e, path))?)
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let relative = validate_path(path)?;
        let metadata = fs::metadata(self.root.join(&relative)).await.map_err(|e| io_error(e, path))?;
        if !metadata.is_file() {
            exn::bail!(ErrorKind::NotFound(relative));
        }
        file_info(relative, &metadata)
    }
}
