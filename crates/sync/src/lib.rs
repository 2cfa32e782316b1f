//! Change tracking and transfer batching for the sync client.
//!
//! The flow through this crate:
//!
//! 1. A [`Directory`] tree of [`SyncFile`]s describes everything currently on
//!    disk for one owner.
//! 2. A [`SyncIndex`] baseline records when each file was last synced;
//!    refreshing it against the tree finds the files modified since.
//! 3. A [`QueueBuilder`] packs those files into capacity-bounded [`Batch`]es
//!    and lines them up in a FIFO [`Queue`] for transfer.
//!
//! Nothing in here does async I/O. The only filesystem access is the lazy
//! size lookup of a [`SyncFile`], and saving or loading an index.

pub mod batch;
pub mod builder;
pub mod error;
pub mod file;
pub mod index;
pub mod queue;
#[cfg(test)]
mod testing;
pub mod tree;

pub use crate::batch::{Batch, DEFAULT_MAX_CAPACITY, Outcome, Placement};
pub use crate::builder::QueueBuilder;
pub use crate::file::{FileId, FileRef, RemoteFile, SyncFile};
pub use crate::index::{SyncIndex, validate_owner};
pub use crate::queue::Queue;
pub use crate::tree::{Directory, FileTree};
