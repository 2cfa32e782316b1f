//! In-memory directory tree of tracked files.

use crate::file::{FileId, FileRef, SyncFile};
use std::collections::BTreeMap;
use std::path::{Component, Path};

/// Source of "every file reachable from a root" for a single owner.
///
/// The sync index is built against this, not against [`Directory`] directly.
pub trait FileTree {
    type File: FileRef + Clone;

    /// Owner identity of the root.
    fn owner(&self) -> &str;

    /// Every file reachable from the root, in a stable order.
    fn files(&self) -> Vec<&Self::File>;
}

/// A directory node: files directly inside it and its subdirectories.
#[derive(Debug, Clone)]
pub struct Directory<F = SyncFile> {
    pub name: String,
    pub owner: String,
    files: BTreeMap<String, F>,
    dirs: BTreeMap<String, Directory<F>>,
}

impl<F: FileRef> Directory<F> {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            files: BTreeMap::new(),
            dirs: BTreeMap::new(),
        }
    }

    /// Insert a file at a path relative to this directory, creating any
    /// intermediate directories. Replaces a file already at that path.
    ///
    /// Returns `false` (and inserts nothing) if the path has no file name.
    pub fn insert(&mut self, path: impl AsRef<Path>, file: F) -> bool {
        let path = path.as_ref();
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            tracing::warn!(path = %path.display(), "Not inserting file without a name into tree");
            return false;
        };
        let mut current = self;
        for component in path.parent().into_iter().flat_map(Path::components) {
            if let Component::Normal(segment) = component {
                let segment = segment.to_string_lossy().into_owned();
                let owner = current.owner.clone();
                current = current.dirs.entry(segment.clone()).or_insert_with(|| Directory::new(segment, owner));
            }
        }
        current.files.insert(name, file);
        true
    }

    /// Every file in this directory and all of its subdirectories.
    pub fn walk(&self) -> Vec<&F> {
        let mut found = Vec::with_capacity(self.files.len());
        self.walk_into(&mut found);
        found
    }

    fn walk_into<'a>(&'a self, found: &mut Vec<&'a F>) {
        found.extend(self.files.values());
        for dir in self.dirs.values() {
            dir.walk_into(found);
        }
    }

    pub fn find(&self, id: &FileId) -> Option<&F> {
        self.files
            .values()
            .find(|f| f.id() == id)
            .or_else(|| self.dirs.values().find_map(|d| d.find(id)))
    }

    /// Subdirectory directly below this one.
    pub fn dir(&self, name: &str) -> Option<&Directory<F>> {
        self.dirs.get(name)
    }

    /// Number of files in the whole subtree.
    pub fn len(&self) -> usize {
        self.files.len() + self.dirs.values().map(Directory::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<F: FileRef + Clone> FileTree for Directory<F> {
    type File = F;

    fn owner(&self) -> &str {
        &self.owner
    }

    fn files(&self) -> Vec<&F> {
        self.walk()
    }
}
