//! Moving queued files to where they need to go.
//!
//! A [`Queue`](sfs_sync::Queue) is drained one batch at a time. Every file in
//! a batch is handed to a [`Transfer`] concurrently, and the batch is awaited
//! as a whole before the next one starts. Failed files are reported, not
//! retried.
//!
//! [`push()`] sends local changes out; [`pull()`] brings down what the sync
//! server has pending for this client.

mod download;
mod drain;
pub mod error;
mod pull;
mod push;
mod server;
#[cfg(test)]
mod testing;
mod transfer;

pub use crate::download::HttpDownload;
pub use crate::drain::{DrainEvent, DrainReport, drain, drain_stream};
pub use crate::pull::{PullOutcome, pull};
pub use crate::push::{PushOutcome, push};
pub use crate::server::{MIN_TRANSFER_RATE, SyncServer};
pub use crate::transfer::{DryRunTransfer, HttpTransfer, StorageTransfer, Transfer};
