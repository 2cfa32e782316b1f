//! File identity and the file references batches are built from.

use crate::error::{ErrorKind, Result};
use derive_more::Display;
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::OffsetDateTime;

/// Stable identity of a tracked file.
///
/// Identity is keyed by ID rather than path, so a file keeps its ID across
/// scans. IDs are assigned once by the metadata cache.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);
impl FileId {
    /// Generate a new random (v4 UUID) identity.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<String> for FileId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
impl From<&str> for FileId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Anything that can be placed into a [`Batch`](crate::batch::Batch).
///
/// The size is looked up lazily every time it is asked for, never cached:
/// the file may have changed since it was discovered.
pub trait FileRef {
    fn id(&self) -> &FileId;
    fn size(&self) -> Result<u64>;
    fn modified(&self) -> OffsetDateTime;
}

/// A file tracked by the sync client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFile {
    pub id: FileId,
    /// Owner of the tree this file belongs to
    pub owner: String,
    /// Path relative to the sync root
    pub path: PathBuf,
    /// Absolute location on the local filesystem
    pub location: PathBuf,
    /// Last modification time as of the last scan
    pub modified: OffsetDateTime,
    /// BLAKE3 hex digest of the contents, if known
    pub checksum: Option<String>,
}
impl SyncFile {
    pub fn new(
        id: FileId,
        owner: impl Into<String>,
        path: impl Into<PathBuf>,
        location: impl Into<PathBuf>,
        modified: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            owner: owner.into(),
            path: path.into(),
            location: location.into(),
            modified,
            checksum: None,
        }
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }
}
impl FileRef for SyncFile {
    fn id(&self) -> &FileId {
        &self.id
    }

    fn size(&self) -> Result<u64> {
        let metadata = std::fs::metadata(&self.location).or_raise(|| ErrorKind::Storage(self.id.clone()))?;
        Ok(metadata.len())
    }

    fn modified(&self) -> OffsetDateTime {
        self.modified
    }
}

/// A file as the sync server describes it.
///
/// There is no local copy to look at, so the size is the one the server
/// reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: FileId,
    pub owner: String,
    /// Path relative to the sync root
    pub path: PathBuf,
    pub size: u64,
    pub modified: OffsetDateTime,
    /// BLAKE3 hex digest of the contents
    pub checksum: String,
}
impl FileRef for RemoteFile {
    fn id(&self) -> &FileId {
        &self.id
    }

    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }

    fn modified(&self) -> OffsetDateTime {
        self.modified
    }
}
