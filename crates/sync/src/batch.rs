//! Capacity-bounded transfer batches.
//!
//! A [`Batch`] holds the files sent in one transfer round. Its byte capacity
//! bounds how much a single round moves; files are placed greedily, first-fit
//! in the order they are given. No sorting by size happens here: sorting would
//! change the order files are transferred in.

use crate::error::{ErrorKind, Result};
use crate::file::{FileId, FileRef};
use derive_more::Display;
use std::collections::HashSet;
use uuid::Uuid;

/// Default upper bound on the number of bytes in a single batch (1 GB).
pub const DEFAULT_MAX_CAPACITY: u64 = 1_000_000_000;

/// How a call to [`Batch::place()`] went.
///
/// These are control-flow signals for the queue builder, not errors.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every candidate was placed (or was already a member).
    #[display("success")]
    Success,
    /// The batch was already partially filled and some candidates did not fit
    /// in what was left.
    #[display("under capacity")]
    UnderCap,
    /// The batch started fresh and still could not take every candidate.
    #[display("capacity maxed")]
    CapMaxed,
    /// Nothing was placed and nothing was rejected: every candidate was
    /// already a member.
    #[display("no-op")]
    NoOp,
}

/// Result of [`Batch::place()`].
#[derive(Debug)]
pub struct Placement<F> {
    /// Candidates rejected for size, in input order. Never contains
    /// duplicates of existing members.
    pub leftover: Vec<F>,
    pub outcome: Outcome,
}

/// A group of files destined for one transfer round.
///
/// Invariant: `remaining == capacity - sum(size of members)` for every batch
/// built with [`place()`](Self::place). Remaining capacity is unsigned, so it
/// can never drop below zero; a file is only placed if it fits.
#[derive(Debug, Clone)]
pub struct Batch<F> {
    id: Uuid,
    capacity: u64,
    remaining: u64,
    members: Vec<F>,
    known: HashSet<FileId>,
    full: bool,
    oversized: bool,
}

impl<F: FileRef> Batch<F> {
    /// Create an empty batch with the given capacity in bytes.
    pub fn new(capacity: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            capacity,
            remaining: capacity,
            members: Vec::new(),
            known: HashSet::new(),
            full: false,
            oversized: false,
        }
    }

    /// Create a batch holding files that individually exceed `capacity`.
    ///
    /// See [`place_oversized()`](Self::place_oversized).
    pub fn oversized(capacity: u64, files: Vec<F>) -> Result<Self> {
        let mut batch = Self::new(capacity);
        batch.place_oversized(files)?;
        Ok(batch)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes still available in this batch.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether a placement starting from a fresh batch ran out of capacity.
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Whether this batch was built with [`place_oversized()`](Self::place_oversized).
    pub fn is_oversized(&self) -> bool {
        self.oversized
    }

    /// Nothing has consumed any capacity yet.
    pub fn is_fresh(&self) -> bool {
        self.remaining == self.capacity
    }

    pub fn contains(&self, id: &FileId) -> bool {
        self.known.contains(id)
    }

    /// Members in the order they were placed.
    pub fn files(&self) -> &[F] {
        &self.members
    }

    pub fn into_files(self) -> Vec<F> {
        self.members
    }

    /// Pair each candidate that is not yet a member with its current size.
    fn sized(&self, candidates: Vec<F>) -> Result<Vec<(F, u64)>> {
        let mut sized = Vec::with_capacity(candidates.len());
        for file in candidates {
            if self.contains(file.id()) {
                tracing::debug!(batch = %self.id, file = %file.id(), "File already in batch, ignoring");
                continue;
            }
            let size = file.size()?;
            sized.push((file, size));
        }
        Ok(sized)
    }

    fn insert(&mut self, file: F) {
        self.known.insert(file.id().clone());
        self.members.push(file);
    }

    /// Greedily place as many candidates as fit, first-fit in input order.
    ///
    /// Candidates already in the batch are skipped and not reported. Every
    /// other candidate is examined, even after remaining capacity reaches
    /// zero: later candidates that no longer fit end up in the leftover list
    /// (and zero-byte files still fit).
    ///
    /// Fails only if the size of a candidate cannot be looked up. Every size
    /// is looked up before anything is placed, so a failure leaves the batch
    /// as it was.
    pub fn place(&mut self, candidates: Vec<F>) -> Result<Placement<F>> {
        let fresh = self.is_fresh();
        let examined = candidates.len();
        let sized = self.sized(candidates)?;
        let mut placed = 0usize;
        let mut leftover = Vec::new();
        for (file, size) in sized {
            // Repeated within this call.
            if self.contains(file.id()) {
                continue;
            }
            if size <= self.remaining {
                self.remaining -= size;
                self.insert(file);
                placed += 1;
            } else {
                tracing::debug!(batch = %self.id, file = %file.id(), size, remaining = self.remaining, "File does not fit");
                leftover.push(file);
            }
        }
        if placed == 0 && examined > 0 {
            tracing::warn!(batch = %self.id, candidates = examined, "No files were added to batch");
        }

        let outcome = if leftover.is_empty() {
            if placed == 0 && examined > 0 { Outcome::NoOp } else { Outcome::Success }
        } else if fresh {
            self.full = true;
            Outcome::CapMaxed
        } else {
            Outcome::UnderCap
        };
        Ok(Placement { leftover, outcome })
    }

    /// Place files without checking capacity.
    ///
    /// Used for a dedicated batch of files that each exceed the maximum batch
    /// capacity on their own. Remaining capacity bottoms out at zero and the
    /// batch is marked full. Fails if `files` is empty.
    pub fn place_oversized(&mut self, files: Vec<F>) -> Result<()> {
        if files.is_empty() {
            exn::bail!(ErrorKind::NoOversizedFiles);
        }
        for (file, size) in self.sized(files)? {
            if self.contains(file.id()) {
                continue;
            }
            self.remaining = self.remaining.saturating_sub(size);
            self.insert(file);
        }
        self.oversized = true;
        self.full = true;
        Ok(())
    }

    /// Total bytes of all members, looked up now.
    pub fn total_size(&self) -> Result<u64> {
        self.members.iter().try_fold(0u64, |acc, f| Ok(acc.saturating_add(f.size()?)))
    }
}

impl<F: FileRef> Default for Batch<F> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestFile, file, files, ids};
    use rstest::rstest;

    fn used(batch: &Batch<TestFile>) -> u64 {
        batch.files().iter().map(|f| f.size).sum()
    }

    #[rstest]
    #[case::empty_input(&[], Outcome::Success, 0)]
    #[case::everything_fits(&[10, 20, 30], Outcome::Success, 0)]
    #[case::exact_fit(&[60, 40], Outcome::Success, 0)]
    #[case::fresh_batch_overflows(&[70, 50, 20], Outcome::CapMaxed, 1)]
    #[case::single_file_too_big(&[101], Outcome::CapMaxed, 1)]
    fn test_place_on_fresh_batch(#[case] sizes: &[u64], #[case] expected: Outcome, #[case] leftover: usize) {
        let mut batch = Batch::new(100);
        let placement = batch.place(files(sizes)).unwrap();
        assert_eq!(placement.outcome, expected);
        assert_eq!(placement.leftover.len(), leftover);
        assert_eq!(batch.is_full(), expected == Outcome::CapMaxed);
    }

    #[test]
    fn test_under_cap_on_partially_filled_batch() {
        let mut batch = Batch::new(100);
        batch.place(vec![file("existing", 50)]).unwrap();
        let placement = batch.place(vec![file("a", 30), file("b", 40), file("c", 20)]).unwrap();
        assert_eq!(placement.outcome, Outcome::UnderCap);
        assert_eq!(ids(&placement.leftover), vec!["b"]);
        assert_eq!(batch.remaining(), 0);
        assert!(!batch.is_full());
    }

    #[test]
    fn test_capacity_invariant_over_many_placements() {
        let mut batch = Batch::new(1_000);
        for round in 0..10u64 {
            let candidates = (0..5).map(|i| file(&format!("r{round}-{i}"), (round * 37 + i * 11) % 200)).collect();
            batch.place(candidates).unwrap();
            assert_eq!(batch.remaining() + used(&batch), batch.capacity());
        }
    }

    #[test]
    fn test_duplicates_change_nothing() {
        let mut batch = Batch::new(100);
        batch.place(vec![file("a", 40)]).unwrap();
        let (remaining, count) = (batch.remaining(), batch.len());
        let placement = batch.place(vec![file("a", 40)]).unwrap();
        assert_eq!(placement.outcome, Outcome::NoOp);
        assert!(placement.leftover.is_empty());
        assert_eq!(batch.remaining(), remaining);
        assert_eq!(batch.len(), count);
    }

    #[test]
    fn test_duplicates_within_one_call() {
        let mut batch = Batch::new(100);
        let placement = batch.place(vec![file("a", 10), file("a", 10), file("b", 10)]).unwrap();
        assert_eq!(placement.outcome, Outcome::Success);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.remaining(), 80);
    }

    #[test]
    fn test_every_candidate_is_accounted_for() {
        let mut batch = Batch::new(500);
        batch.place(vec![file("d0", 100), file("d1", 50)]).unwrap();
        let before = batch.len();
        let mut candidates = files(&[120, 300, 5, 80, 0, 250, 45]);
        candidates.push(file("d0", 100));
        candidates.push(file("d1", 50));
        let total = candidates.len();
        let placement = batch.place(candidates).unwrap();
        let added = batch.len() - before;
        let duplicates = 2;
        assert_eq!(added + duplicates + placement.leftover.len(), total);
        for f in &placement.leftover {
            assert!(!batch.contains(&f.id));
        }
    }

    #[test]
    fn test_twenty_files_over_capacity() {
        let mut batch = Batch::new(25_000);
        let candidates: Vec<_> = (1..=20u64).map(|i| file(&format!("f{i}"), i * 250)).collect();
        assert!(candidates.iter().map(|f| f.size).sum::<u64>() > 25_000);
        let placement = batch.place(candidates).unwrap();
        assert!(!placement.leftover.is_empty());
        assert!(placement.leftover.len() < 20);
        assert_eq!(placement.outcome, Outcome::CapMaxed);
    }

    #[test]
    fn test_scanning_continues_after_capacity_reaches_zero() {
        let mut batch = Batch::new(100);
        let placement = batch.place(files(&[60, 40, 10, 0, 30])).unwrap();
        assert_eq!(batch.remaining(), 0);
        // The 10 and 30 byte files are reported rather than silently dropped,
        // and the zero-byte file still fits.
        assert_eq!(ids(&placement.leftover), vec!["f2", "f4"]);
        assert_eq!(ids(batch.files()), vec!["f0", "f1", "f3"]);
        assert_eq!(placement.outcome, Outcome::CapMaxed);
    }

    #[test]
    fn test_duplicates_after_capacity_reaches_zero_are_ignored() {
        let mut batch = Batch::new(100);
        let placement = batch.place(vec![file("a", 60), file("b", 40), file("a", 60)]).unwrap();
        assert_eq!(placement.outcome, Outcome::Success);
        assert!(placement.leftover.is_empty());
    }

    #[test]
    fn test_leftover_keeps_input_order() {
        let mut batch = Batch::new(50);
        let placement = batch.place(files(&[90, 10, 80, 70, 20, 60])).unwrap();
        assert_eq!(ids(&placement.leftover), vec!["f0", "f2", "f3", "f5"]);
    }

    #[test]
    fn test_place_oversized() {
        let mut batch = Batch::new(100);
        batch.place_oversized(files(&[500, 1_000])).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.remaining(), 0);
        assert!(batch.is_oversized());
        assert!(batch.is_full());
    }

    #[test]
    fn test_place_oversized_requires_files() {
        let mut batch = Batch::<TestFile>::new(100);
        let err = batch.place_oversized(Vec::new()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NoOversizedFiles));
    }

    #[test]
    fn test_size_lookup_failure_aborts_placement() {
        use crate::file::SyncFile;
        use time::OffsetDateTime;
        let dir = tempfile::tempdir().unwrap();
        let missing = SyncFile::new(FileId::from("x"), "me", "x", dir.path().join("x"), OffsetDateTime::now_utc());
        let mut batch = Batch::new(100);
        let err = batch.place(vec![missing]).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Storage(_)));
    }

    #[test]
    fn test_size_lookup_failure_leaves_batch_untouched() {
        use crate::file::SyncFile;
        use time::OffsetDateTime;
        let dir = tempfile::tempdir().unwrap();
        let sync_file = |name: &str| {
            SyncFile::new(FileId::from(name), "me", name, dir.path().join(name), OffsetDateTime::now_utc())
        };
        std::fs::write(dir.path().join("kept"), b"12345").unwrap();
        std::fs::write(dir.path().join("first"), b"123").unwrap();
        std::fs::write(dir.path().join("third"), b"1234").unwrap();

        let mut batch = Batch::new(100);
        batch.place(vec![sync_file("kept")]).unwrap();
        let err = batch.place(vec![sync_file("first"), sync_file("vanished"), sync_file("third")]).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Storage(id) if id.as_str() == "vanished"));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.remaining(), 95);
        assert!(!batch.contains(&FileId::from("first")));

        let err = batch.place_oversized(vec![sync_file("third"), sync_file("vanished")]).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Storage(_)));
        assert_eq!(batch.len(), 1);
        assert!(!batch.is_oversized());
    }
}
