//! Working through a batch queue, one batch at a time.

use crate::error::{ErrorKind, Result};
use crate::transfer::Transfer;
use async_stream::stream;
use exn::ResultExt;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use sfs_sync::{FileId, FileRef, Queue};

/// Progress events emitted by [`drain_stream`].
///
/// For every batch: one [`BatchStarted`](Self::BatchStarted), one
/// [`Sent`](Self::Sent) or [`Failed`](Self::Failed) per file in completion
/// order, then [`BatchComplete`](Self::BatchComplete). The next batch only
/// starts once the previous one has completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainEvent {
    BatchStarted { batch: String, files: usize },
    Sent(FileId),
    Failed(FileId),
    BatchComplete { batch: String },
}

/// Outcome of draining a whole queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub batches: usize,
    pub sent: Vec<FileId>,
    pub failed: Vec<FileId>,
}
impl DrainReport {
    fn record(&mut self, event: DrainEvent) {
        match event {
            DrainEvent::BatchStarted { .. } => self.batches += 1,
            DrainEvent::Sent(id) => self.sent.push(id),
            DrainEvent::Failed(id) => self.failed.push(id),
            DrainEvent::BatchComplete { .. } => {},
        }
    }
}

/// Streams [`DrainEvent`]s while transferring every file in `queue`.
///
/// Files within a batch are sent concurrently and the whole batch is awaited
/// before the next one is dequeued, so a batch takes as long as its slowest
/// file. A failed file is logged and reported, never retried, and never stops
/// the drain.
pub fn drain_stream<'a, F: FileRef + Send + Sync + 'static>(
    mut queue: Queue<F>,
    transfer: &'a dyn Transfer<F>,
) -> impl Stream<Item = Result<DrainEvent>> + 'a {
    stream!({
        while !queue.is_empty() {
            let batch = match queue.dequeue().or_raise(|| ErrorKind::Sync) {
                Ok(batch) => batch,
                Err(e) => {
                    yield Err(e);
                    return;
                },
            };
            let id = batch.id().to_string();
            tracing::info!(batch = %id, files = batch.len(), to = %transfer.describe(), "Transferring batch");
            yield Ok(DrainEvent::BatchStarted { batch: id.clone(), files: batch.len() });

            let mut processing: FuturesUnordered<_> =
                batch.files().iter().map(|file| async move { (file, transfer.send(file).await) }).collect();
            while let Some((file, result)) = processing.next().await {
                match result {
                    Ok(()) => yield Ok(DrainEvent::Sent(file.id().clone())),
                    Err(e) => {
                        tracing::error!(file = %file.id(), error = ?e, "Transfer failed");
                        yield Ok(DrainEvent::Failed(file.id().clone()));
                    },
                }
            }
            yield Ok(DrainEvent::BatchComplete { batch: id });
        }
    })
}

/// Transfer every file in `queue` and report what happened.
pub async fn drain<F: FileRef + Send + Sync + 'static>(
    queue: Queue<F>,
    transfer: &dyn Transfer<F>,
) -> Result<DrainReport> {
    let mut report = DrainReport::default();
    let mut events = std::pin::pin!(drain_stream(queue, transfer));
    while let Some(event) = events.next().await {
        report.record(event?);
    }
    tracing::info!(batches = report.batches, sent = report.sent.len(), failed = report.failed.len(), "Queue drained");
    Ok(report)
}
