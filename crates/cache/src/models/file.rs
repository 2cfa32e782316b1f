use crate::error::{Error, ErrorKind};
use crate::record::FileRecord;
use exn::{OptionExt, ResultExt};
use sfs_sync::FileId;
use std::path::PathBuf;
use time::OffsetDateTime;

fn to_nanos(at: OffsetDateTime, field: &'static str) -> Result<i64, Error> {
    i64::try_from(at.unix_timestamp_nanos()).or_raise(|| ErrorKind::InvalidData(field))
}

fn from_nanos(nanos: i64, field: &'static str) -> Result<OffsetDateTime, Error> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos)).or_raise(|| ErrorKind::InvalidData(field))
}

/// Row of the `files` table. Timestamps are Unix nanoseconds so that a
/// rescan compares modification times at full precision.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FileRow {
    pub id: String,
    pub owner: String,
    pub path: String,
    pub size: i64,
    pub modified: i64,
    pub checksum: String,
    pub last_sync: Option<i64>,
}
impl TryFrom<&FileRecord> for FileRow {
    type Error = Error;
    fn try_from(record: &FileRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: record.id.as_str().to_string(),
            owner: record.owner.clone(),
            path: record.path.to_str().ok_or_raise(|| ErrorKind::InvalidData("path"))?.to_string(),
            size: i64::try_from(record.size).or_raise(|| ErrorKind::InvalidData("file size"))?,
            modified: to_nanos(record.modified, "modified time")?,
            checksum: record.checksum.clone(),
            last_sync: record.last_sync.map(|at| to_nanos(at, "last sync time")).transpose()?,
        })
    }
}
impl TryFrom<FileRow> for FileRecord {
    type Error = Error;
    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: FileId::from(row.id),
            owner: row.owner,
            path: PathBuf::from(row.path),
            size: u64::try_from(row.size).or_raise(|| ErrorKind::InvalidData("file size"))?,
            modified: from_nanos(row.modified, "modified time")?,
            checksum: row.checksum,
            last_sync: row.last_sync.map(|n| from_nanos(n, "last sync time")).transpose()?,
        })
    }
}
