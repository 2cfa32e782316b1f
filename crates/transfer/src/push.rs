//! One full push cycle: stage, batch, transfer, rebaseline.

use crate::drain::{DrainReport, drain};
use crate::error::{ErrorKind, Result};
use crate::transfer::Transfer;
use exn::ResultExt;
use sfs_sync::{FileTree, QueueBuilder, SyncFile, SyncIndex};
use tracing::instrument;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Nothing was modified or added since the baseline was taken.
    NothingToSync,
    Pushed(DrainReport),
}

/// Push every file modified since `index`'s baseline, and every file in
/// `tree` the baseline does not know yet, through `transfer`.
///
/// Afterwards the pending set is cleared and the baseline rebuilt from
/// `tree`. Files that failed to transfer keep their previous baseline entry,
/// or stay out of the baseline if they were new, so the next push picks them
/// up again.
#[instrument(level = "debug", skip_all, fields(owner = %index.owner, to = %transfer.describe()))]
pub async fn push<T: FileTree<File = SyncFile>>(
    index: &mut SyncIndex,
    tree: &T,
    builder: &QueueBuilder,
    transfer: &dyn Transfer,
) -> Result<PushOutcome> {
    let pending = index.stage(tree);
    tracing::info!(owner = %index.owner, files = pending, "Files pending sync");
    let Some(queue) = builder.build(index).or_raise(|| ErrorKind::Sync)? else {
        return Ok(PushOutcome::NothingToSync);
    };
    let report = drain(queue, transfer).await?;
    index.reset();
    index.settle(tree, &report.failed);
    if !report.failed.is_empty() {
        tracing::warn!(failed = report.failed.len(), "Some files were not transferred and stay pending");
    }
    Ok(PushOutcome::Pushed(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sfs_sync::{Directory, FileId};
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Mutex;
    use time::macros::datetime;
    use time::{Duration, OffsetDateTime};

    const T0: OffsetDateTime = datetime!(2024-06-01 12:00 UTC);

    #[derive(Default)]
    struct Collect {
        fail: HashSet<String>,
        sent: Mutex<Vec<String>>,
    }
    #[async_trait]
    impl Transfer for Collect {
        fn describe(&self) -> String {
            "collect".to_string()
        }

        async fn send(&self, file: &SyncFile) -> Result<()> {
            if self.fail.contains(file.id.as_str()) {
                exn::bail!(ErrorKind::Request);
            }
            self.sent.lock().unwrap().push(file.id.to_string());
            Ok(())
        }
    }

    fn tree(dir: &Path, files: &[(&str, OffsetDateTime)]) -> Directory {
        let mut root = Directory::new("root", "alice");
        for (name, modified) in files {
            let location = dir.join(name);
            std::fs::write(&location, name.as_bytes()).unwrap();
            root.insert(name, SyncFile::new(FileId::from(*name), "alice", *name, location, *modified));
        }
        root
    }

    #[tokio::test]
    async fn test_nothing_to_sync() {
        let dir = tempfile::tempdir().unwrap();
        let root = tree(dir.path(), &[("a", T0), ("b", T0)]);
        let mut index = SyncIndex::baseline(&root);
        let transfer = Collect::default();
        let outcome = push(&mut index, &root, &QueueBuilder::default(), &transfer).await.unwrap();
        assert_eq!(outcome, PushOutcome::NothingToSync);
        assert!(transfer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_push_modified_files_and_rebaseline() {
        let dir = tempfile::tempdir().unwrap();
        let later = T0 + Duration::hours(1);
        let mut index = SyncIndex::baseline(&tree(dir.path(), &[("a", T0), ("b", T0), ("c", T0)]));
        let root = tree(dir.path(), &[("a", later), ("b", T0), ("c", later)]);
        let transfer = Collect::default();

        let PushOutcome::Pushed(report) = push(&mut index, &root, &QueueBuilder::default(), &transfer).await.unwrap()
        else {
            panic!("expected a push");
        };
        assert_eq!(report.batches, 1);
        let mut sent = transfer.sent.lock().unwrap().clone();
        sent.sort();
        assert_eq!(sent, vec!["a", "c"]);
        assert!(index.to_update.is_empty());
        assert_eq!(index.last_sync[&FileId::from("a")], later);

        // A second push right after has nothing left to do.
        let outcome = push(&mut index, &root, &QueueBuilder::default(), &transfer).await.unwrap();
        assert_eq!(outcome, PushOutcome::NothingToSync);
    }

    #[tokio::test]
    async fn test_new_files_are_pushed_and_tracked() {
        let dir = tempfile::tempdir().unwrap();
        let later = T0 + Duration::hours(1);
        let mut index = SyncIndex::baseline(&tree(dir.path(), &[("a", T0)]));
        let root = tree(dir.path(), &[("a", later), ("new", later)]);
        let transfer = Collect::default();

        let PushOutcome::Pushed(report) = push(&mut index, &root, &QueueBuilder::default(), &transfer).await.unwrap()
        else {
            panic!("expected a push");
        };
        let mut sent = transfer.sent.lock().unwrap().clone();
        sent.sort();
        assert_eq!(sent, vec!["a", "new"]);
        assert_eq!(report.sent.len(), 2);
        assert_eq!(index.last_sync[&FileId::from("new")], later);
    }

    #[tokio::test]
    async fn test_failed_new_files_stay_untracked() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = SyncIndex::baseline(&tree(dir.path(), &[("a", T0)]));
        let root = tree(dir.path(), &[("a", T0), ("new", T0)]);
        let transfer = Collect { fail: HashSet::from(["new".to_string()]), ..Default::default() };

        push(&mut index, &root, &QueueBuilder::default(), &transfer).await.unwrap();
        assert!(!index.has_file(&FileId::from("new")));

        let retry = Collect::default();
        push(&mut index, &root, &QueueBuilder::default(), &retry).await.unwrap();
        assert_eq!(*retry.sent.lock().unwrap(), vec!["new"]);
        assert!(index.has_file(&FileId::from("new")));
    }

    #[tokio::test]
    async fn test_failed_files_stay_pending() {
        let dir = tempfile::tempdir().unwrap();
        let later = T0 + Duration::hours(1);
        let mut index = SyncIndex::baseline(&tree(dir.path(), &[("a", T0), ("b", T0)]));
        let root = tree(dir.path(), &[("a", later), ("b", later)]);
        let transfer = Collect { fail: HashSet::from(["b".to_string()]), ..Default::default() };

        let PushOutcome::Pushed(report) = push(&mut index, &root, &QueueBuilder::default(), &transfer).await.unwrap()
        else {
            panic!("expected a push");
        };
        assert_eq!(report.sent, vec![FileId::from("a")]);
        assert_eq!(report.failed, vec![FileId::from("b")]);
        assert_eq!(index.last_sync[&FileId::from("a")], later);
        assert_eq!(index.last_sync[&FileId::from("b")], T0);

        let retry = Collect::default();
        push(&mut index, &root, &QueueBuilder::default(), &retry).await.unwrap();
        assert_eq!(*retry.sent.lock().unwrap(), vec!["b"]);
    }
}
