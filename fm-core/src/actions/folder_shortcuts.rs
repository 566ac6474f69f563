//! Folders pinned to the navigation list, in insertion order.

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::fs::entry::Entry;

#[derive(Debug, Default)]
pub struct FolderShortcuts {
    shortcuts: RwLock<IndexMap<String, Entry>>,
}

impl FolderShortcuts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exists(&self, entry: &Entry) -> bool {
        self.shortcuts.read().contains_key(entry.url())
    }

    /// Returns `false` if the shortcut already existed.
    pub fn add(&self, entry: &Entry) -> bool {
        let added = self
            .shortcuts
            .write()
            .insert(entry.url().to_string(), entry.clone())
            .is_none();
        debug!(url = entry.url(), added, "Folder shortcut added");
        added
    }

    pub fn remove(&self, entry: &Entry) -> bool {
        self.shortcuts.write().shift_remove(entry.url()).is_some()
    }

    pub fn list(&self) -> Vec<Entry> {
        self.shortcuts.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.shortcuts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
