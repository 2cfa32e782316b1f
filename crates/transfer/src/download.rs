//! Fetching files from the sync server into local storage.

use crate::error::{ErrorKind, Result};
use crate::server::{SyncServer, check};
use crate::transfer::Transfer;
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use futures::StreamExt;
use sfs_storage::error::ErrorKind as StorageErrorKind;
use sfs_storage::{BackendHandle, Digest, Digester};
use sfs_sync::RemoteFile;

/// Downloads files with `GET {endpoint}/v1/files/{id}`.
///
/// The body is streamed into the destination and hashed on the way. If the
/// digest does not match the checksum the server listed, the write is
/// abandoned and whatever was at the path before stays in place.
pub struct HttpDownload {
    server: SyncServer,
    destination: BackendHandle,
}
impl HttpDownload {
    pub fn new(server: SyncServer, destination: BackendHandle) -> Self {
        Self { server, destination }
    }
}

#[async_trait]
impl Transfer<RemoteFile> for HttpDownload {
    fn describe(&self) -> String {
        format!("{} -> {}", self.server.endpoint(), self.destination.name())
    }

    async fn send(&self, file: &RemoteFile) -> Result<()> {
        let url = self.server.file_url(&file.id);
        tracing::debug!(file = %file.id, url = %url, bytes = file.size, "Downloading file");
        let response = self
            .server
            .client()
            .get(&url)
            .timeout(self.server.deadline(file.size))
            .send()
            .await
            .or_raise(|| ErrorKind::Request)?;
        let mut body = check(response)?.bytes_stream();

        let mut received: Option<Digest> = None;
        let expected = file.checksum.as_str();
        let chunks = {
            let received = &mut received;
            stream! {
                let mut digester = Digester::new();
                while let Some(chunk) = body.next().await {
                    match chunk {
                        Ok(bytes) => {
                            digester.update(&bytes);
                            yield Ok(Vec::from(bytes));
                        },
                        Err(e) => {
                            yield Err(exn::Exn::from(StorageErrorKind::Io(std::io::Error::other(e))));
                            return;
                        },
                    }
                }
                let digest = digester.finish();
                let matches = digest.checksum == expected;
                *received = Some(digest);
                if !matches {
                    // Fail the write so nothing gets committed.
                    yield Err(exn::Exn::from(StorageErrorKind::BackendError("checksum mismatch".to_string())));
                }
            }
        };
        let written = self.destination.write_stream(&file.path, Box::pin(chunks)).await;
        if let Some(actual) = received
            && actual.checksum != file.checksum
        {
            exn::bail!(ErrorKind::ChecksumMismatch {
                path: file.path.clone(),
                expected: file.checksum.clone(),
                actual: actual.checksum,
            });
        }
        let bytes = written.or_raise(|| ErrorKind::Storage)?;
        tracing::debug!(file = %file.id, bytes, "Downloaded file");
        Ok(())
    }
}
