//! Sync index: what was synced when, and what changed since.
//!
//! The index holds a baseline (`last_sync`, file ID to modification time as of
//! the last sync) and the derived set of files that need to be synced again
//! (`to_update`). Change detection only compares timestamps. A file that is
//! not in the baseline is never picked up by [`SyncIndex::refresh()`];
//! [`SyncIndex::stage()`] queues those as well.

use crate::error::{ErrorKind, Result};
use crate::file::{FileId, FileRef, SyncFile};
use crate::tree::FileTree;
use exn::ResultExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use tracing::instrument;

const SAVE_TIMESTAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]-[minute]-[second]");

/// Check that `owner` can be used as part of a saved index file name.
///
/// Letters, digits, `-`, `_`, `.` and `@` are allowed; the name may not
/// start with a dot.
pub fn validate_owner(owner: &str) -> Result<()> {
    let allowed = |c: char| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '@');
    if owner.is_empty() || owner.starts_with('.') || !owner.chars().all(allowed) {
        exn::bail!(ErrorKind::InvalidOwner(owner.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncIndex<F = SyncFile> {
    /// Owner of the tree this index describes
    pub owner: String,
    /// Baseline: file ID to modification time at last sync
    pub last_sync: BTreeMap<FileId, OffsetDateTime>,
    /// Files modified after their baseline time
    pub to_update: BTreeMap<FileId, F>,
}

impl<F: FileRef + Clone> SyncIndex<F> {
    /// An empty index for `owner`.
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            last_sync: BTreeMap::new(),
            to_update: BTreeMap::new(),
        }
    }

    /// Build a baseline from every file reachable in `tree`.
    ///
    /// The owner is taken from the tree.
    #[instrument(level = "debug", skip_all, fields(owner = tree.owner()))]
    pub fn baseline<T: FileTree<File = F>>(tree: &T) -> Self {
        let mut index = Self::new(tree.owner());
        index.rebuild_baseline(tree);
        index
    }

    /// Replace the baseline with the current state of `tree`.
    ///
    /// Leaves `to_update` alone.
    pub fn rebuild_baseline<T: FileTree<File = F>>(&mut self, tree: &T) {
        self.last_sync = tree.files().into_iter().map(|f| (f.id().clone(), f.modified())).collect();
        tracing::debug!(owner = %self.owner, files = self.last_sync.len(), "Built sync baseline");
    }

    /// Walk `tree` again and mark every file modified after its baseline time.
    ///
    /// Returns how many files are now pending sync.
    #[instrument(level = "debug", skip_all, fields(owner = %self.owner))]
    pub fn refresh<T: FileTree<File = F>>(&mut self, tree: &T) -> usize {
        for file in tree.files() {
            let Some(synced) = self.last_sync.get(file.id()) else {
                continue;
            };
            if file.modified() > *synced {
                tracing::debug!(file = %file.id(), "File modified since last sync");
                self.to_update.insert(file.id().clone(), file.clone());
            }
        }
        self.to_update.len()
    }

    /// Refresh, then also queue every file in `tree` that is not in the
    /// baseline at all.
    ///
    /// Returns how many files are now pending sync.
    #[instrument(level = "debug", skip_all, fields(owner = %self.owner))]
    pub fn stage<T: FileTree<File = F>>(&mut self, tree: &T) -> usize {
        self.refresh(tree);
        for file in self.untracked(tree) {
            tracing::debug!(file = %file.id(), "File not in baseline");
            self.to_update.insert(file.id().clone(), file);
        }
        self.to_update.len()
    }

    /// Files in `tree` that are not part of the baseline.
    pub fn untracked<T: FileTree<File = F>>(&self, tree: &T) -> Vec<F> {
        tree.files().into_iter().filter(|f| !self.has_file(f.id())).cloned().collect()
    }

    /// Drop a file from the baseline so it counts as untracked again.
    pub fn forget(&mut self, id: &FileId) -> Option<OffsetDateTime> {
        self.last_sync.remove(id)
    }

    /// Rebuild the baseline from `tree` after a sync in which `failed` did
    /// not make it across.
    ///
    /// Failed files keep the baseline entry they had before, or stay out of
    /// the baseline if they had none, so the next sync picks them up again.
    pub fn settle<T: FileTree<File = F>>(&mut self, tree: &T, failed: &[FileId]) {
        let previous: Vec<_> = failed.iter().map(|id| (id, self.last_sync.get(id).copied())).collect();
        self.rebuild_baseline(tree);
        for (id, synced) in previous {
            match synced {
                Some(synced) => self.last_sync.insert(id.clone(), synced),
                None => self.last_sync.remove(id),
            };
        }
    }

    /// Clear the pending set. The baseline is not touched.
    pub fn reset(&mut self) {
        self.to_update.clear();
    }

    /// Files pending sync, ordered by ID.
    pub fn changed_files(&self) -> Vec<F> {
        self.to_update.values().cloned().collect()
    }

    /// Whether the file is part of the baseline.
    pub fn has_file(&self, id: &FileId) -> bool {
        self.last_sync.contains_key(id)
    }

    /// Both a baseline and pending changes exist.
    pub fn is_mapped(&self) -> bool {
        !self.last_sync.is_empty() && !self.to_update.is_empty()
    }

    /// Difference between an older index and a newer one for the same owner.
    ///
    /// Only files known to both are considered. The result's baseline holds
    /// the newer timestamps; its pending set holds the files the newer index
    /// has pending whose timestamp is later than the original baseline.
    pub fn compare(original: &Self, newer: &Self) -> Self {
        let mut diff = Self::new(original.owner.clone());
        for (id, newer_time) in &newer.last_sync {
            let Some(original_time) = original.last_sync.get(id) else {
                continue;
            };
            diff.last_sync.insert(id.clone(), *newer_time);
            if let Some(file) = newer.to_update.get(id)
                && file.modified() > *original_time
            {
                diff.to_update.insert(id.clone(), file.clone());
            }
        }
        diff
    }
}

impl<F: Serialize + DeserializeOwned> SyncIndex<F> {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).or_raise(|| ErrorKind::Serialize)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).or_raise(|| ErrorKind::Serialize)
    }

    /// Write the index into `dir` as `<owner>-sync-index-<timestamp>.json`.
    ///
    /// Returns the path written.
    ///
    /// Fails with [`ErrorKind::InvalidOwner`] if the owner would not make a
    /// plain file name.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        validate_owner(&self.owner)?;
        let stamp = OffsetDateTime::now_utc().format(SAVE_TIMESTAMP).or_raise(|| ErrorKind::Serialize)?;
        let path = dir.join(format!("{}-sync-index-{stamp}.json", self.owner));
        std::fs::create_dir_all(dir).or_raise(|| ErrorKind::Io(dir.to_path_buf()))?;
        std::fs::write(&path, self.to_json()?).or_raise(|| ErrorKind::Io(path.clone()))?;
        tracing::info!(path = %path.display(), "Saved sync index");
        Ok(path)
    }

    /// Load the most recently saved index for `owner` from `dir`, if any.
    pub fn load_latest(dir: impl AsRef<Path>, owner: &str) -> Result<Option<Self>> {
        let dir = dir.as_ref();
        validate_owner(owner)?;
        let prefix = format!("{owner}-sync-index-");
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).or_raise(|| ErrorKind::Io(dir.to_path_buf())),
        };
        let mut latest: Option<PathBuf> = None;
        for entry in entries {
            let path = entry.or_raise(|| ErrorKind::Io(dir.to_path_buf()))?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            // Timestamps in the name sort lexicographically.
            if name.starts_with(&prefix)
                && name.ends_with(".json")
                && latest.as_ref().is_none_or(|l| l.file_name().is_some_and(|l| l.to_str() < Some(name)))
            {
                latest = Some(path);
            }
        }
        let Some(path) = latest else {
            return Ok(None);
        };
        let json = std::fs::read_to_string(&path).or_raise(|| ErrorKind::Io(path.clone()))?;
        tracing::debug!(path = %path.display(), "Loading sync index");
        Self::from_json(&json).map(Some)
    }
}
