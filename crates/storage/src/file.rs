//! File metadata as reported by storage backends.

use std::path::PathBuf;
use time::OffsetDateTime;

/// File metadata returned by storage backends.
///
/// This is what a listing or a `stat` knows about a file: where it lives
/// relative to the backend root, how big it is right now, and when it was last
/// modified. Identity (the sync ID) is assigned elsewhere, by the metadata
/// cache, so that it survives across scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Relative path from storage root
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: OffsetDateTime) -> Self {
        Self {
            path: path.into(),
            size,
            modified,
        }
    }

    /// Name of the file (last path component), or an empty string for
    /// whatever weirdness a backend may report.
    pub fn name(&self) -> &str {
        self.path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
    }
}
