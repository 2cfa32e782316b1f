//! Path validation for storage backends.
//!
//! Every path handed to a backend is relative to that backend's root. This
//! module makes sure it stays that way.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a storage path and returns it normalized.
///
/// Rejects anything that would escape the storage root (`..` past the root),
/// Windows prefixes, NUL bytes, and paths that normalize to nothing.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use sfs_storage::validate_path;
/// assert!(validate_path("documents/taxes/2024.pdf").is_ok());
/// assert!(validate_path("a/../notes.txt").is_ok());
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a/../../b").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert_eq!(
///     validate_path("music/../photos/./2024//beach.jpg/").unwrap(),
///     Path::new("photos/2024/beach.jpg")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(s) => {
                // NUL survives Path::components() on Unix but truncates in syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(original.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
            },
        }
    }
    if components.is_empty() {
        exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
    }
    Ok(components.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        assert_eq!(validate("documents/report.odt").unwrap(), Path::new("documents/report.odt"));
        assert_eq!(validate("notes.txt").unwrap(), Path::new("notes.txt"));
    }

    #[test]
    fn test_normalization() {
        assert_eq!(validate("a//b/./c/").unwrap(), Path::new("a/b/c"));
        assert_eq!(validate("/rooted/file").unwrap(), Path::new("rooted/file"));
        assert_eq!(validate("a/b/..").unwrap(), Path::new("a"));
    }

    #[test]
    fn test_traversal_rejected() {
        assert!(validate("..").is_err());
        assert!(validate("../secrets").is_err());
        assert!(validate("photos/../../secrets").is_err());
    }

    #[test]
    fn test_empty_rejected() {
        assert!(validate("").is_err());
        assert!(validate("./.").is_err());
        assert!(validate("//").is_err());
    }

    #[test]
    fn test_nul_rejected() {
        assert!(validate("bad\0name").is_err());
    }
}
