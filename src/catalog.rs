//! Keeping the metadata cache in step with the sync root.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use futures::TryStreamExt;
use sfs_cache::{FileRecord, Repository};
use sfs_storage::backend::LocalBackend;
use sfs_storage::{BackendHandle, FileInfo, StorageBackend, digest};
use sfs_sync::{Directory, FileId, RemoteFile, SyncFile};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::instrument;

/// What a scan changed in the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub discovered: usize,
    /// New paths whose contents match a file that disappeared
    pub renamed: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub removed: u64,
}

/// The files of one owner: on disk through `source`, remembered in `repo`.
pub struct Catalog {
    owner: String,
    source: Arc<LocalBackend>,
    repo: Repository,
}

impl Catalog {
    pub fn new(owner: impl Into<String>, source: Arc<LocalBackend>, repo: Repository) -> Self {
        Self { owner: owner.into(), source, repo }
    }

    pub fn source(&self) -> BackendHandle {
        self.source.clone()
    }

    async fn checksum(&self, path: &Path) -> Result<String> {
        let chunks = self.source.reader(path).await.or_raise(|| ErrorKind::Storage)?;
        Ok(digest(chunks).await.or_raise(|| ErrorKind::Storage)?.checksum)
    }

    /// Walk the sync root and record every file in the cache.
    ///
    /// Files whose size and modification time match the cache are left
    /// alone. Anything else is hashed and upserted, keeping the identity
    /// already assigned to its path. A new path whose checksum matches a
    /// file that vanished in the same walk is taken to be that file, moved:
    /// it keeps its identity. Records for files no longer on disk are
    /// dropped.
    #[instrument(level = "debug", skip_all, fields(owner = %self.owner, root = %self.source.root().display()))]
    pub async fn scan(&self) -> Result<ScanSummary> {
        let mut summary = ScanSummary::default();
        let mut seen = Vec::new();
        let mut fresh: Vec<(FileInfo, String)> = Vec::new();
        let mut listing = self.source.list_stream(None);
        while let Some(info) = listing.try_next().await.or_raise(|| ErrorKind::Storage)? {
            seen.push(info.path.clone());
            match self.repo.get_by_path(&self.owner, &info.path).await.or_raise(|| ErrorKind::Cache)? {
                Some(record) if record.size == info.size && record.modified == info.modified => summary.unchanged += 1,
                Some(_) => {
                    let checksum = self.checksum(&info.path).await?;
                    let record = FileRecord::discovered(&self.owner, &info.path, info.size, info.modified, checksum);
                    let stored = self.repo.upsert(&record).await.or_raise(|| ErrorKind::Cache)?;
                    tracing::debug!(file = %stored.id, path = %stored.path.display(), size = stored.size, "File changed");
                    summary.changed += 1;
                },
                None => {
                    let checksum = self.checksum(&info.path).await?;
                    fresh.push((info, checksum));
                },
            }
        }

        let mut keep = seen.clone();
        let mut vanished = self.vanished(&seen).await?;
        for (info, checksum) in fresh {
            let record = FileRecord::discovered(&self.owner, &info.path, info.size, info.modified, checksum);
            match vanished.get_mut(&record.checksum).and_then(Vec::pop) {
                Some(moved) => {
                    tracing::debug!(file = %moved.id, from = %moved.path.display(), to = %record.path.display(), "File moved");
                    keep.push(moved.path.clone());
                    let record = FileRecord { id: moved.id, ..record };
                    self.repo.relocate(&record).await.or_raise(|| ErrorKind::Cache)?;
                    summary.renamed += 1;
                },
                None => {
                    let stored = self.repo.upsert(&record).await.or_raise(|| ErrorKind::Cache)?;
                    tracing::debug!(file = %stored.id, path = %stored.path.display(), size = stored.size, "New file");
                    summary.discovered += 1;
                },
            }
        }
        summary.removed = self.repo.delete_missing(&self.owner, &keep).await.or_raise(|| ErrorKind::Cache)?;
        tracing::info!(
            discovered = summary.discovered,
            renamed = summary.renamed,
            changed = summary.changed,
            unchanged = summary.unchanged,
            removed = summary.removed,
            "Scan complete"
        );
        Ok(summary)
    }

    /// Cached records whose path was not seen on disk, grouped by checksum.
    async fn vanished(&self, seen: &[PathBuf]) -> Result<HashMap<String, Vec<FileRecord>>> {
        let seen: HashSet<&PathBuf> = seen.iter().collect();
        let mut vanished: HashMap<String, Vec<FileRecord>> = HashMap::new();
        for record in self.repo.list_for_owner(&self.owner).await.or_raise(|| ErrorKind::Cache)? {
            if !seen.contains(&record.path) {
                vanished.entry(record.checksum.clone()).or_default().push(record);
            }
        }
        Ok(vanished)
    }

    /// The cached files as a directory tree, ready for indexing.
    pub async fn tree(&self) -> Result<Directory> {
        let mut root = Directory::new(self.source.name(), &self.owner);
        for record in self.repo.list_for_owner(&self.owner).await.or_raise(|| ErrorKind::Cache)? {
            let location = self.source.absolute_path(&record.path).or_raise(|| ErrorKind::Storage)?;
            let file = SyncFile::new(record.id, &self.owner, record.path.clone(), location, record.modified)
                .with_checksum(record.checksum);
            root.insert(&record.path, file);
        }
        Ok(root)
    }

    /// Files never transferred, or moved since they last were.
    pub async fn unsynced(&self) -> Result<Vec<FileId>> {
        let records = self.repo.list_for_owner(&self.owner).await.or_raise(|| ErrorKind::Cache)?;
        Ok(records.into_iter().filter(|r| r.last_sync.is_none()).map(|r| r.id).collect())
    }

    /// Whether the local copy at the remote file's path already has its
    /// contents, as of the last scan.
    pub async fn has_current(&self, remote: &RemoteFile) -> Result<bool> {
        let local = self.repo.get_by_path(&self.owner, &remote.path).await.or_raise(|| ErrorKind::Cache)?;
        Ok(local.is_some_and(|local| local.checksum == remote.checksum))
    }

    /// Record a file just downloaded from the server.
    ///
    /// A path new to the cache takes the server's identity for the file; a
    /// known path keeps its own. The record is marked synced at `at`.
    pub async fn adopt(&self, remote: &RemoteFile, at: OffsetDateTime) -> Result<FileRecord> {
        let info = self.source.stat(&remote.path).await.or_raise(|| ErrorKind::Storage)?;
        let record = FileRecord {
            id: remote.id.clone(),
            ..FileRecord::discovered(&self.owner, &info.path, info.size, info.modified, &remote.checksum)
        };
        let stored = self.repo.upsert(&record).await.or_raise(|| ErrorKind::Cache)?;
        self.repo.mark_synced(&stored.id, at).await.or_raise(|| ErrorKind::Cache)?;
        Ok(FileRecord { last_sync: Some(at), ..stored })
    }

    /// Stamp the last sync time on every file in `ids`.
    pub async fn mark_synced(&self, ids: &[FileId], at: OffsetDateTime) -> Result<usize> {
        let mut marked = 0;
        for id in ids {
            if self.repo.mark_synced(id, at).await.or_raise(|| ErrorKind::Cache)? {
                marked += 1;
            } else {
                tracing::warn!(file = %id, "Transferred file is no longer in the cache");
            }
        }
        Ok(marked)
    }
}
