//! Destinations a file can be sent to.

use crate::error::{ErrorKind, Result};
use crate::server::{SyncServer, check};
use async_trait::async_trait;
use exn::ResultExt;
use futures::TryStreamExt;
use reqwest::Body;
use reqwest::header::CONTENT_LENGTH;
use sfs_storage::{BackendHandle, Digest, Digester, digest};
use sfs_sync::{FileRef, SyncFile};

/// Sends one file somewhere.
///
/// Implementations are called concurrently for every file in a batch. Pushes
/// send [`SyncFile`]s; pulls send [`RemoteFile`](sfs_sync::RemoteFile)s from
/// the server to local storage.
#[async_trait]
pub trait Transfer<F: Send + Sync + 'static = SyncFile>: Send + Sync {
    /// Where files go, for logging.
    fn describe(&self) -> String;

    async fn send(&self, file: &F) -> Result<()>;
}

/// Copies files between two storage backends, e.g. onto a second drive.
///
/// Contents are streamed and hashed as they pass. Afterwards the destination
/// copy is read back and its BLAKE3 checksum compared to what was sent.
pub struct StorageTransfer {
    source: BackendHandle,
    destination: BackendHandle,
    verify: bool,
}
impl StorageTransfer {
    pub fn new(source: BackendHandle, destination: BackendHandle) -> Self {
        Self { source, destination, verify: true }
    }

    /// Skip reading back what was written. Needed when the destination drops
    /// writes (dry runs).
    pub fn without_verify(mut self) -> Self {
        self.verify = false;
        self
    }
}

#[async_trait]
impl Transfer for StorageTransfer {
    fn describe(&self) -> String {
        format!("{} -> {}", self.source.name(), self.destination.name())
    }

    async fn send(&self, file: &SyncFile) -> Result<()> {
        let chunks = self.source.reader(&file.path).await.or_raise(|| ErrorKind::Storage)?;
        let mut digester = Digester::new();
        let tee = chunks.inspect_ok(|chunk| digester.update(chunk));
        self.destination.write_stream(&file.path, Box::pin(tee)).await.or_raise(|| ErrorKind::Storage)?;
        let sent = digester.finish();
        if file.checksum.as_ref().is_some_and(|recorded| *recorded != sent.checksum) {
            tracing::debug!(file = %file.id, path = %file.path.display(), "File changed since it was scanned");
        }
        if self.verify {
            let written = self.destination.reader(&file.path).await.or_raise(|| ErrorKind::Storage)?;
            let actual = digest(written).await.or_raise(|| ErrorKind::Storage)?;
            if actual.checksum != sent.checksum {
                exn::bail!(ErrorKind::ChecksumMismatch {
                    path: file.path.clone(),
                    expected: sent.checksum,
                    actual: actual.checksum,
                });
            }
        }
        tracing::debug!(file = %file.id, bytes = sent.size, "Copied file");
        Ok(())
    }
}

/// Uploads files to the sync server.
///
/// Each file is a `PUT {endpoint}/v1/files/{id}` with the contents streamed as
/// the body. The file is read twice: once to hash it for `X-Sfs-Checksum`,
/// once to send it.
pub struct HttpTransfer {
    server: SyncServer,
    source: BackendHandle,
}
impl HttpTransfer {
    pub fn new(server: SyncServer, source: BackendHandle) -> Self {
        Self { server, source }
    }
}

#[async_trait]
impl Transfer for HttpTransfer {
    fn describe(&self) -> String {
        self.server.endpoint().to_string()
    }

    async fn send(&self, file: &SyncFile) -> Result<()> {
        let chunks = self.source.reader(&file.path).await.or_raise(|| ErrorKind::Storage)?;
        let Digest { checksum, size } = digest(chunks).await.or_raise(|| ErrorKind::Storage)?;
        let body = self.source.reader(&file.path).await.or_raise(|| ErrorKind::Storage)?;
        let url = self.server.file_url(&file.id);
        tracing::debug!(file = %file.id, url = %url, bytes = size, "Uploading file");
        let response = self
            .server
            .client()
            .put(&url)
            .timeout(self.server.deadline(size))
            .header(CONTENT_LENGTH, size)
            .header("X-Sfs-Owner", &file.owner)
            .header("X-Sfs-Checksum", checksum)
            .header("X-Sfs-Path", file.path.to_string_lossy().as_ref())
            .body(Body::wrap_stream(body))
            .send()
            .await
            .or_raise(|| ErrorKind::Request)?;
        check(response)?;
        Ok(())
    }
}

/// Logs what would be sent to `destination` and sends nothing.
pub struct DryRunTransfer {
    destination: String,
}
impl DryRunTransfer {
    pub fn new(destination: impl Into<String>) -> Self {
        Self { destination: destination.into() }
    }
}

#[async_trait]
impl<F: FileRef + Send + Sync + 'static> Transfer<F> for DryRunTransfer {
    fn describe(&self) -> String {
        format!("{} (dry run)", self.destination)
    }

    async fn send(&self, file: &F) -> Result<()> {
        tracing::info!(file = %file.id(), to = %self.destination, "Dry run: skipping transfer");
        Ok(())
    }
}
