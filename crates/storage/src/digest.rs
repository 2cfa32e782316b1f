//! BLAKE3 content digests, computed one chunk at a time.

use crate::backend::ByteStream;
use crate::error::Result;
use futures::TryStreamExt;

/// Checksum and length of some contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    /// BLAKE3 hex digest
    pub checksum: String,
    pub size: u64,
}

/// Running digest, fed chunk by chunk as contents stream past.
///
/// ```
/// use sfs_storage::Digester;
///
/// let mut digester = Digester::new();
/// digester.update(b"remember ");
/// digester.update(b"the milk");
/// assert_eq!(digester.finish().checksum, blake3::hash(b"remember the milk").to_hex().as_str());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Digester {
    hasher: blake3::Hasher,
    size: u64,
}
impl Digester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.size += chunk.len() as u64;
    }

    pub fn finish(&self) -> Digest {
        Digest {
            checksum: self.hasher.finalize().to_hex().to_string(),
            size: self.size,
        }
    }
}

/// Hash a stream of chunks, holding at most one chunk in memory.
pub async fn digest(mut chunks: ByteStream<'_>) -> Result<Digest> {
    let mut digester = Digester::new();
    while let Some(chunk) = chunks.try_next().await? {
        digester.update(&chunk);
    }
    Ok(digester.finish())
}
