use sfs_sync::FileId;
use std::path::PathBuf;
use time::OffsetDateTime;

/// What the cache knows about one tracked file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Assigned when the path is first seen, reused afterwards
    pub id: FileId,
    pub owner: String,
    /// Path relative to the owner's sync root
    pub path: PathBuf,
    pub size: u64,
    pub modified: OffsetDateTime,
    /// BLAKE3 hex digest of the contents
    pub checksum: String,
    /// When the file was last transferred successfully
    pub last_sync: Option<OffsetDateTime>,
}
impl FileRecord {
    /// A record for a file seen for the first time, with a new identity.
    pub fn discovered(
        owner: impl Into<String>,
        path: impl Into<PathBuf>,
        size: u64,
        modified: OffsetDateTime,
        checksum: impl Into<String>,
    ) -> Self {
        Self {
            id: FileId::generate(),
            owner: owner.into(),
            path: path.into(),
            size,
            modified,
            checksum: checksum.into(),
            last_sync: None,
        }
    }
}
