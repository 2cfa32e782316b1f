//! Transfer Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A transfer error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for transfer operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Reading from or writing to a storage backend failed.
    #[display("storage operation failed")]
    Storage,
    /// What arrived at the destination is not what was sent.
    #[display("checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        #[error(not(source))]
        path: PathBuf,
        #[error(not(source))]
        expected: String,
        #[error(not(source))]
        actual: String,
    },
    /// The request could not be sent, or no response came back.
    #[display("request failed")]
    Request,
    /// The server sent an index for a different owner.
    #[display("server index belongs to {actual}, expected {expected}")]
    WrongOwner {
        #[error(not(source))]
        expected: String,
        #[error(not(source))]
        actual: String,
    },
    /// The server answered with a non-success status.
    #[display("server responded with status {_0}")]
    Status(#[error(not(source))] u16),
    /// Building or draining the sync queue failed.
    #[display("sync queue error")]
    Sync,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage | Self::Request => true,
            Self::Status(code) => *code >= 500 || *code == 429,
            Self::ChecksumMismatch { .. } | Self::WrongOwner { .. } | Self::Sync => false,
        }
    }
}
