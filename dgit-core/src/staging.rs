//! Pending changes for the next commit.
//!
//! [`StagingArea`] keeps the staged additions and the removal marks in one
//! place so a filename can never be both staged and marked for removal.
//! [`StagingMirror`] keeps a copy of each staged blob under `.dgit/staging`
//! until the next commit or reset.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use crate::object::{FileMap, ObjectId};
use crate::storage::{self, ContentStore};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingArea {
    additions: BTreeMap<String, ObjectId>,
    removals: BTreeSet<String>,
}

impl StagingArea {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `name` at `id`, clearing any removal mark. Returns the previously staged digest.
    pub fn stage(&mut self, name: impl Into<String>, id: ObjectId) -> Option<ObjectId> {
        let name = name.into();
        self.removals.remove(&name);
        self.additions.insert(name, id)
    }

    pub fn unstage(&mut self, name: &str) -> Option<ObjectId> {
        self.additions.remove(name)
    }

    /// Mark `name` for removal, dropping any staged addition. Returns the dropped digest.
    pub fn mark_removed(&mut self, name: impl Into<String>) -> Option<ObjectId> {
        let name = name.into();
        let dropped = self.additions.remove(&name);
        self.removals.insert(name);
        dropped
    }

    pub fn unmark_removed(&mut self, name: &str) -> bool {
        self.removals.remove(name)
    }

    pub fn staged(&self, name: &str) -> Option<ObjectId> {
        self.additions.get(name).copied()
    }

    pub fn is_removed(&self, name: &str) -> bool {
        self.removals.contains(name)
    }

    pub fn additions(&self) -> &BTreeMap<String, ObjectId> {
        &self.additions
    }

    pub fn removals(&self) -> &BTreeSet<String> {
        &self.removals
    }

    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }

    pub fn clear(&mut self) {
        self.additions.clear();
        self.removals.clear();
    }

    /// The file mapping of the next commit: `base` with additions overlaid and removals dropped.
    pub fn apply_to(&self, base: &FileMap) -> FileMap {
        let mut files = base.clone();
        for (name, id) in &self.additions {
            files.insert(name.clone(), *id);
        }
        for name in &self.removals {
            files.remove(name);
        }
        files
    }
}

/// Copies of staged blobs, kept apart from the permanent store.
#[derive(Debug, Clone)]
pub struct StagingMirror {
    store: ContentStore,
}

impl StagingMirror {
    pub fn open(dir: impl Into<PathBuf>) -> storage::Result<Self> {
        Ok(Self {
            store: ContentStore::open(dir)?,
        })
    }

    pub fn put(&self, data: &[u8]) -> storage::Result<ObjectId> {
        self.store.put(data)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.store.contains(id)
    }

    /// Drop the copy of `id`, unless another staged file still refers to it.
    pub fn discard(&self, id: &ObjectId, staging: &StagingArea) -> storage::Result<()> {
        if staging.additions.values().any(|staged| staged == id) {
            return Ok(());
        }
        let path = self.store.dir().join(id.to_hex());
        match fs::remove_file(path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    pub fn clear(&self) -> storage::Result<()> {
        for entry in fs::read_dir(self.store.dir())? {
            let path = entry?.path();
            if path.is_file() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}
