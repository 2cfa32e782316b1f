pub mod backend;
pub mod digest;
pub mod error;
pub mod file;
mod path;

pub use crate::backend::{ByteStream, StorageBackend};
pub use crate::digest::{Digest, Digester, digest};
pub use crate::file::FileInfo;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
