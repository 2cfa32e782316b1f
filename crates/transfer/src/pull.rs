//! One full pull cycle: batch the server's pending files, download, reset.

use crate::drain::{DrainReport, drain};
use crate::error::{ErrorKind, Result};
use crate::transfer::Transfer;
use exn::ResultExt;
use sfs_sync::{QueueBuilder, RemoteFile, SyncIndex};
use tracing::instrument;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// The server has nothing pending for this client.
    NothingToSync,
    Pulled(DrainReport),
}

/// Download every file pending in the server's `index` through `transfer`.
///
/// Files that arrived are removed from the pending set; files that failed
/// stay in it.
#[instrument(level = "debug", skip_all, fields(owner = %index.owner, from = %transfer.describe()))]
pub async fn pull(
    index: &mut SyncIndex<RemoteFile>,
    builder: &QueueBuilder,
    transfer: &dyn Transfer<RemoteFile>,
) -> Result<PullOutcome> {
    tracing::info!(owner = %index.owner, files = index.to_update.len(), "Files pending download");
    let Some(queue) = builder.build(index).or_raise(|| ErrorKind::Sync)? else {
        return Ok(PullOutcome::NothingToSync);
    };
    let report = drain(queue, transfer).await?;
    for id in &report.sent {
        index.to_update.remove(id);
    }
    if !report.failed.is_empty() {
        tracing::warn!(failed = report.failed.len(), "Some files were not downloaded and stay pending");
    }
    Ok(PullOutcome::Pulled(report))
}
