//! The sync server's HTTP API.
//!
//! | Request                     | Meaning                                  |
//! |-----------------------------|------------------------------------------|
//! | `PUT /v1/files/{id}`        | Upload a file; body is the raw contents. |
//! | `GET /v1/files/{id}`        | Download a file.                         |
//! | `GET /v1/index/{owner}`     | The server's sync index for an owner.    |
//!
//! Uploads and downloads carry `X-Sfs-Checksum`, the BLAKE3 hex digest of the
//! contents.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use reqwest::{Client, Response};
use sfs_sync::{FileId, RemoteFile, SyncIndex};
use std::time::Duration;
use tracing::instrument;

/// Slowest transfer rate a request is given time for, in bytes per second.
pub const MIN_TRANSFER_RATE: u64 = 64 * 1024;

/// Client for one sync server.
///
/// There is no client-wide timeout: a single deadline would cut off large
/// files. Connecting is bounded by `timeout`, and every request gets
/// `timeout` plus time for its bytes at [`MIN_TRANSFER_RATE`].
#[derive(Debug, Clone)]
pub struct SyncServer {
    client: Client,
    endpoint: String,
    timeout: Duration,
}
impl SyncServer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .user_agent(concat!("sfs/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::Request)?;
        Ok(Self::with_client(client, endpoint, timeout))
    }

    pub fn with_client(client: Client, endpoint: impl Into<String>, timeout: Duration) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self { client, endpoint, timeout }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn file_url(&self, id: &FileId) -> String {
        format!("{}/v1/files/{id}", self.endpoint)
    }

    pub(crate) fn index_url(&self, owner: &str) -> String {
        format!("{}/v1/index/{owner}", self.endpoint)
    }

    /// How long a request moving `bytes` may take.
    pub fn deadline(&self, bytes: u64) -> Duration {
        self.timeout + Duration::from_secs(bytes.div_ceil(MIN_TRANSFER_RATE))
    }

    /// Fetch the server's sync index for `owner`.
    ///
    /// Its pending set lists the files the server has that this client
    /// should download.
    #[instrument(level = "debug", skip(self), fields(endpoint = %self.endpoint))]
    pub async fn fetch_index(&self, owner: &str) -> Result<SyncIndex<RemoteFile>> {
        let response = self
            .client
            .get(self.index_url(owner))
            .timeout(self.timeout)
            .send()
            .await
            .or_raise(|| ErrorKind::Request)?;
        let json = check(response)?.text().await.or_raise(|| ErrorKind::Request)?;
        let index = SyncIndex::from_json(&json).or_raise(|| ErrorKind::Sync)?;
        if index.owner != owner {
            exn::bail!(ErrorKind::WrongOwner { expected: owner.to_string(), actual: index.owner });
        }
        tracing::debug!(files = index.to_update.len(), "Fetched server index");
        Ok(index)
    }
}

/// Turn a non-success status into an error.
pub(crate) fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if !status.is_success() {
        exn::bail!(ErrorKind::Status(status.as_u16()));
    }
    Ok(response)
}
