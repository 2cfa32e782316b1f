//! Sync Error Types
//!
//! Capacity outcomes from batch placement are not errors; see
//! [`Outcome`](crate::batch::Outcome). What ends up here is either structural
//! misuse (dequeuing from an empty queue, an oversized batch with no files) or
//! a collaborator failing underneath us.

use crate::file::FileId;
use derive_more::{Display, Error};
use std::path::PathBuf;

/// A sync error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Dequeue was called on a queue with no batches left.
    #[display("batch queue is empty")]
    EmptyQueue,
    /// An oversized batch was requested for zero files.
    #[display("no files given for oversized batch")]
    NoOversizedFiles,
    /// The size of a file could not be looked up.
    #[display("could not determine size of file {_0}")]
    Storage(#[error(not(source))] FileId),
    /// Sync index could not be (de)serialized.
    #[display("invalid sync index data")]
    Serialize,
    /// Owner name that cannot be used in an index file name.
    #[display("invalid owner name: {_0:?}")]
    InvalidOwner(#[error(not(source))] String),
    /// Reading or writing a saved sync index failed.
    #[display("sync index I/O failed: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Io(_))
    }
}
