//! CLI Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A command error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for command handlers.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("metadata cache error")]
    Cache,
    #[display("storage error")]
    Storage,
    #[display("sync error")]
    Sync,
    #[display("transfer error")]
    Transfer,
    /// Commands comparing against a baseline need one saved first.
    #[display("no sync index for {owner} in {}, run `sfs index` first", dir.display())]
    NoIndex {
        #[error(not(source))]
        owner: String,
        #[error(not(source))]
        dir: PathBuf,
    },
}
