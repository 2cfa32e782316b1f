//! Turning a flat list of changed files into a queue of batches.

use crate::batch::{Batch, DEFAULT_MAX_CAPACITY, Outcome, Placement};
use crate::error::Result;
use crate::file::FileRef;
use crate::index::SyncIndex;
use crate::queue::Queue;
use tracing::instrument;

/// Builds transfer queues with a fixed maximum batch capacity.
#[derive(Debug, Clone, Copy)]
pub struct QueueBuilder {
    max_capacity: u64,
}

impl Default for QueueBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CAPACITY)
    }
}

impl QueueBuilder {
    pub fn new(max_capacity: u64) -> Self {
        Self { max_capacity }
    }

    pub fn max_capacity(&self) -> u64 {
        self.max_capacity
    }

    /// Queue up every file pending sync in `index`.
    ///
    /// Returns `None` when nothing is pending. Files too large for any batch
    /// are collected into a single oversized batch at the tail of the queue;
    /// if every file is too large, that batch is the whole queue.
    #[instrument(level = "debug", skip_all, fields(owner = %index.owner))]
    pub fn build<F: FileRef + Clone>(&self, index: &SyncIndex<F>) -> Result<Option<Queue<F>>> {
        let files = index.changed_files();
        if files.is_empty() {
            tracing::info!(owner = %index.owner, "No files matched for syncing");
            return Ok(None);
        }
        if self.wont_fit(&files, self.max_capacity)? {
            tracing::warn!(files = files.len(), max = self.max_capacity, "Every file exceeds max batch size, creating oversized queue");
            let mut queue = Queue::new();
            queue.enqueue(Batch::oversized(self.max_capacity, files)?);
            return Ok(Some(queue));
        }
        let oversized = self.oversized_files(&files)?;
        let files = self.prune(files)?;
        let mut queue = self.build_queue(files, Batch::new(self.max_capacity), Queue::new())?;
        if !oversized.is_empty() {
            tracing::warn!(files = oversized.len(), "Queueing oversized files after the regular batches");
            queue.enqueue(Batch::oversized(self.max_capacity, oversized)?);
        }
        Ok(Some(queue))
    }

    /// Place `files` into `batch`, and fresh batches after it, until every
    /// file is queued.
    pub fn build_queue<F: FileRef>(&self, files: Vec<F>, batch: Batch<F>, queue: Queue<F>) -> Result<Queue<F>> {
        self.drain_into(files, batch, queue).map(|(queue, _)| queue)
    }

    /// Returns the finished queue and the number of placement rounds it took.
    fn drain_into<F: FileRef>(
        &self,
        mut files: Vec<F>,
        mut batch: Batch<F>,
        mut queue: Queue<F>,
    ) -> Result<(Queue<F>, usize)> {
        let mut rounds = 0;
        while !files.is_empty() {
            rounds += 1;
            let Placement { leftover, outcome } = batch.place(files)?;
            match outcome {
                Outcome::Success | Outcome::NoOp => {
                    // NoOp: every candidate was already a member; nothing
                    // more can happen with this file list.
                    if !batch.is_empty() {
                        queue.enqueue(batch);
                    }
                    return Ok((queue, rounds));
                },
                Outcome::CapMaxed if batch.is_empty() => {
                    // A fresh batch took nothing: everything left is too
                    // large for any regular batch.
                    tracing::warn!(files = leftover.len(), "Files do not fit in an empty batch, queueing as oversized");
                    queue.enqueue(Batch::oversized(self.max_capacity, leftover)?);
                    return Ok((queue, rounds));
                },
                Outcome::CapMaxed => {
                    queue.enqueue(batch);
                    batch = Batch::new(self.max_capacity);
                },
                Outcome::UnderCap => {
                    if self.wont_fit(&leftover, batch.remaining())? && !batch.is_empty() {
                        queue.enqueue(batch);
                        batch = Batch::new(self.max_capacity);
                    }
                },
            }
            files = leftover;
        }
        if !batch.is_empty() {
            queue.enqueue(batch);
        }
        Ok((queue, rounds))
    }

    /// True if every file is larger than `limit` (vacuously true for none).
    pub fn wont_fit<F: FileRef>(&self, files: &[F], limit: u64) -> Result<bool> {
        for file in files {
            if file.size()? <= limit {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Files that fit in a regular batch, in input order.
    pub fn prune<F: FileRef>(&self, files: Vec<F>) -> Result<Vec<F>> {
        let mut kept = Vec::with_capacity(files.len());
        for file in files {
            if file.size()? <= self.max_capacity {
                kept.push(file);
            }
        }
        Ok(kept)
    }

    /// Files larger than the maximum batch capacity, in input order.
    pub fn oversized_files<F: FileRef + Clone>(&self, files: &[F]) -> Result<Vec<F>> {
        let mut oversized = Vec::new();
        for file in files {
            if file.size()? > self.max_capacity {
                oversized.push(file.clone());
            }
        }
        Ok(oversized)
    }
}
