//! SQLite metadata store for tracked files.
//!
//! Remembers, per owner and relative path, the identity assigned to a file
//! along with its size, modification time, checksum and when it was last
//! synced. The files on disk are the source of truth: if the database is
//! deleted, the next scan rebuilds it (with new identities).

mod db;
pub mod error;
mod models;
mod record;
mod repo;

pub use crate::db::Database;
pub use crate::record::FileRecord;
pub use crate::repo::Repository;
