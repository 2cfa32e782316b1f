//! Repository for file records.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::FileRow;
use crate::record::FileRecord;
use exn::{OptionExt, ResultExt};
use sfs_sync::FileId;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Repository for [`FileRecord`]s.
///
/// In dry-run mode nothing is written: mutating methods report what they
/// would have done and return.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
    dry_run: bool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone(), dry_run: false }
    }
}
impl Repository {
    pub fn new(pool: SqlitePool, dry_run: bool) -> Self {
        Self { pool, dry_run }
    }

    fn sqlx_hates_paths(path: impl AsRef<Path>) -> Result<String> {
        Ok(path.as_ref().to_str().ok_or_raise(|| ErrorKind::InvalidData("path"))?.to_string())
    }

    // =========================================================================
    // Insert/Update
    // =========================================================================

    /// Insert a record, or update size, modification time and checksum of
    /// the record already at the same `(owner, path)`.
    ///
    /// Returns the record as stored: an existing row keeps its ID and last
    /// sync time, whatever the given record says.
    pub async fn upsert(&self, record: &FileRecord) -> Result<FileRecord> {
        if self.dry_run {
            return match self.get_by_path(&record.owner, &record.path).await? {
                Some(existing) => Ok(FileRecord { id: existing.id, last_sync: existing.last_sync, ..record.clone() }),
                None => Ok(record.clone()),
            };
        }
        let row = FileRow::try_from(record)?;
        let stored: FileRow = sqlx::query_as(include_str!("../queries/upsert_file.sql"))
            .bind(row.id)
            .bind(row.owner)
            .bind(row.path)
            .bind(row.size)
            .bind(row.modified)
            .bind(row.checksum)
            .bind(row.last_sync)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        stored.try_into()
    }

    /// Move the record with `record.id` to `record.path`, taking over size,
    /// modification time and checksum.
    ///
    /// The file keeps its identity, but counts as not synced since: the last
    /// sync time is cleared. Returns `false` if no record has that ID.
    pub async fn relocate(&self, record: &FileRecord) -> Result<bool> {
        if self.dry_run {
            return Ok(self.get_by_id(&record.id).await?.is_some());
        }
        let row = FileRow::try_from(record)?;
        let result = sqlx::query(include_str!("../queries/relocate_file.sql"))
            .bind(row.path)
            .bind(row.size)
            .bind(row.modified)
            .bind(row.checksum)
            .bind(row.id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a successful transfer.
    ///
    /// Returns `false` if no record has that ID.
    pub async fn mark_synced(&self, id: &FileId, at: OffsetDateTime) -> Result<bool> {
        if self.dry_run {
            return Ok(self.get_by_id(id).await?.is_some());
        }
        let at = i64::try_from(at.unix_timestamp_nanos()).or_raise(|| ErrorKind::InvalidData("last sync time"))?;
        let result = sqlx::query(include_str!("../queries/mark_synced.sql"))
            .bind(at)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Get/Fetch
    // =========================================================================

    pub async fn get_by_id(&self, id: &FileId) -> Result<Option<FileRecord>> {
        let row: Option<FileRow> = sqlx::query_as(include_str!("../queries/get_by_id.sql"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(FileRecord::try_from).transpose()
    }

    /// The path is relative to the owner's sync root (e.g. `"photos/beach.jpg"`).
    pub async fn get_by_path(&self, owner: impl AsRef<str>, path: impl AsRef<Path>) -> Result<Option<FileRecord>> {
        let row: Option<FileRow> = sqlx::query_as(include_str!("../queries/get_by_path.sql"))
            .bind(owner.as_ref())
            .bind(Self::sqlx_hates_paths(path)?)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(FileRecord::try_from).transpose()
    }

    /// Every record for `owner`, ordered by path.
    pub async fn list_for_owner(&self, owner: impl AsRef<str>) -> Result<Vec<FileRecord>> {
        let rows: Vec<FileRow> = sqlx::query_as(include_str!("../queries/list_for_owner.sql"))
            .bind(owner.as_ref())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(FileRecord::try_from).collect()
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Returns `true` if a record was deleted.
    pub async fn delete_by_id(&self, id: &FileId) -> Result<bool> {
        if self.dry_run {
            return Ok(self.get_by_id(id).await?.is_some());
        }
        let result = sqlx::query(include_str!("../queries/delete_by_id.sql"))
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every record for `owner` whose path is not in `existing`.
    ///
    /// Returns the number of records deleted (or that would be, in dry-run
    /// mode).
    pub async fn delete_missing(&self, owner: impl AsRef<str>, existing: &[PathBuf]) -> Result<u64> {
        let existing: HashSet<&Path> = existing.iter().map(PathBuf::as_path).collect();
        let stale: Vec<FileRecord> = self
            .list_for_owner(owner)
            .await?
            .into_iter()
            .filter(|r| !existing.contains(r.path.as_path()))
            .collect();
        if self.dry_run || stale.is_empty() {
            return Ok(stale.len() as u64);
        }
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let mut deleted = 0;
        for record in &stale {
            tracing::debug!(file = %record.id, path = %record.path.display(), "Forgetting deleted file");
            let result = sqlx::query(include_str!("../queries/delete_by_id.sql"))
                .bind(record.id.as_str())
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
            deleted += result.rows_affected();
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const MODIFIED: OffsetDateTime = datetime!(2024-05-01 12:00 UTC);

    fn record(owner: &str, path: &str, size: u64) -> FileRecord {
        FileRecord::discovered(owner, path, size, MODIFIED, blake3::hash(path.as_bytes()).to_string())
    }

    async fn setup() -> (Database, Repository) {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        (db, repo)
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let (_db, repo) = setup().await;
        let stored = repo.upsert(&record("alice", "docs/a.txt", 10)).await.unwrap();
        let by_path = repo.get_by_path("alice", "docs/a.txt").await.unwrap().unwrap();
        let by_id = repo.get_by_id(&stored.id).await.unwrap().unwrap();
        assert_eq!(by_path, stored);
        assert_eq!(by_id, stored);
        assert!(repo.get_by_path("bob", "docs/a.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_keeps_identity() {
        let (_db, repo) = setup().await;
        let first = repo.upsert(&record("alice", "a.txt", 10)).await.unwrap();
        repo.mark_synced(&first.id, MODIFIED).await.unwrap();
        // A rescan produces a fresh record with a new ID for the same path.
        let rescanned = FileRecord { checksum: "changed".to_string(), ..record("alice", "a.txt", 20) };
        let stored = repo.upsert(&rescanned).await.unwrap();
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.size, 20);
        assert_eq!(stored.checksum, "changed");
        assert_eq!(stored.last_sync, Some(MODIFIED));
    }

    #[tokio::test]
    async fn test_relocate_keeps_identity() {
        let (_db, repo) = setup().await;
        let stored = repo.upsert(&record("alice", "old/name.txt", 10)).await.unwrap();
        repo.mark_synced(&stored.id, MODIFIED).await.unwrap();
        let moved = FileRecord { path: PathBuf::from("new/name.txt"), ..stored.clone() };
        assert!(repo.relocate(&moved).await.unwrap());

        assert!(repo.get_by_path("alice", "old/name.txt").await.unwrap().is_none());
        let found = repo.get_by_path("alice", "new/name.txt").await.unwrap().unwrap();
        assert_eq!(found.id, stored.id);
        assert_eq!(found.checksum, stored.checksum);
        assert_eq!(found.last_sync, None);

        let unknown = FileRecord { id: FileId::generate(), ..moved };
        assert!(!repo.relocate(&unknown).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_for_owner_is_ordered() {
        let (_db, repo) = setup().await;
        for path in ["b.txt", "a/z.txt", "c.txt"] {
            repo.upsert(&record("alice", path, 1)).await.unwrap();
        }
        repo.upsert(&record("bob", "a.txt", 1)).await.unwrap();
        let paths: Vec<_> = repo.list_for_owner("alice").await.unwrap().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec![PathBuf::from("a/z.txt"), PathBuf::from("b.txt"), PathBuf::from("c.txt")]);
    }

    #[tokio::test]
    async fn test_mark_synced_unknown_id() {
        let (_db, repo) = setup().await;
        assert!(!repo.mark_synced(&FileId::generate(), MODIFIED).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_by_id() {
        let (_db, repo) = setup().await;
        let stored = repo.upsert(&record("alice", "a.txt", 1)).await.unwrap();
        assert!(repo.delete_by_id(&stored.id).await.unwrap());
        assert!(!repo.delete_by_id(&stored.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_missing() {
        let (_db, repo) = setup().await;
        for path in ["keep.txt", "gone.txt", "dir/gone.txt"] {
            repo.upsert(&record("alice", path, 1)).await.unwrap();
        }
        repo.upsert(&record("bob", "gone.txt", 1)).await.unwrap();
        let deleted = repo.delete_missing("alice", &[PathBuf::from("keep.txt")]).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(repo.list_for_owner("alice").await.unwrap().len(), 1);
        assert_eq!(repo.list_for_owner("bob").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let db = Database::connect_in_memory().await.unwrap();
        let writer = Repository::from(&db);
        let kept = writer.upsert(&record("alice", "kept.txt", 1)).await.unwrap();
        let repo = Repository::new(db.pool().clone(), true);

        let new = repo.upsert(&record("alice", "new.txt", 1)).await.unwrap();
        assert!(repo.get_by_id(&new.id).await.unwrap().is_none());
        let again = repo.upsert(&record("alice", "kept.txt", 5)).await.unwrap();
        assert_eq!(again.id, kept.id);
        assert_eq!(repo.get_by_id(&kept.id).await.unwrap().unwrap().size, 1);

        assert_eq!(repo.delete_missing("alice", &[]).await.unwrap(), 1);
        assert!(repo.delete_by_id(&kept.id).await.unwrap());
        assert!(repo.get_by_id(&kept.id).await.unwrap().is_some());
    }
}
