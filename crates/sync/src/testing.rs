//! In-memory files for unit tests.

use crate::error::Result;
use crate::file::{FileId, FileRef};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TestFile {
    pub id: FileId,
    pub size: u64,
    pub modified: OffsetDateTime,
}
impl FileRef for TestFile {
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

pub(crate) fn file(id: &str, size: u64) -> TestFile {
    TestFile {
        id: FileId::from(id),
        size,
        modified: OffsetDateTime::UNIX_EPOCH,
    }
}

/// One file per size, named `f0`, `f1`, ...
pub(crate) fn files(sizes: &[u64]) -> Vec<TestFile> {
    sizes.iter().enumerate().map(|(i, size)| file(&format!("f{i}"), *size)).collect()
}

pub(crate) fn ids<F: FileRef>(files: &[F]) -> Vec<&str> {
    files.iter().map(|f| f.id().as_str()).collect()
}
