//! FIFO queue of batches awaiting transfer.

use crate::batch::Batch;
use crate::error::{ErrorKind, Result};
use exn::OptionExt;
use std::collections::VecDeque;

/// Batches in the order they will be transferred.
///
/// A plain data structure: no locking, no de-duplication. Enqueuing the same
/// batch twice is the caller's mistake.
#[derive(Debug, Clone)]
pub struct Queue<F> {
    batches: VecDeque<Batch<F>>,
}

impl<F> Queue<F> {
    pub fn new() -> Self {
        Self { batches: VecDeque::new() }
    }

    /// Append a batch to the tail.
    pub fn enqueue(&mut self, batch: Batch<F>) {
        self.batches.push_back(batch);
    }

    /// Remove and return the head of the queue.
    ///
    /// Returns [`ErrorKind::EmptyQueue`] when there is nothing left, which is
    /// distinct from returning a batch with no files in it.
    pub fn dequeue(&mut self) -> Result<Batch<F>> {
        self.batches.pop_front().ok_or_raise(|| ErrorKind::EmptyQueue)
    }

    /// Number of batches still queued.
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Batch<F>> {
        self.batches.iter()
    }
}

impl<F> Default for Queue<F> {
    fn default() -> Self {
        Self::new()
    }
}
