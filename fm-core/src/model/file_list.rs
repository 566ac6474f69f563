//! Ordered entry list observed by the UI, and its selection.

use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::fs::entry::Entry;

pub type SharedFileList = Arc<Mutex<FileListModel>>;

/// Entries kept in display order: directories first, then by name.
#[derive(Debug, Default, Clone)]
pub struct FileListModel {
    entries: Vec<Entry>,
}

fn display_order(a: &Entry, b: &Entry) -> Ordering {
    match (a.is_directory(), b.is_directory()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a
            .name()
            .to_lowercase()
            .cmp(&b.name().to_lowercase())
            .then_with(|| a.name().cmp(b.name())),
    }
}

impl FileListModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedFileList {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn item(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn urls(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.url().to_string()).collect()
    }

    pub fn index_of_url(&self, url: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.url() == url)
    }

    /// Inserts in display order; an entry with the same URL is replaced.
    pub fn add_sorted(&mut self, new_entries: impl IntoIterator<Item = Entry>) {
        for entry in new_entries {
            if let Some(existing) = self.index_of_url(entry.url()) {
                self.entries.remove(existing);
            }
            let at = self
                .entries
                .partition_point(|e| display_order(e, &entry) == Ordering::Less);
            self.entries.insert(at, entry);
        }
    }

    pub fn remove_urls(&mut self, urls: &[String]) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !urls.iter().any(|u| u == e.url()));
        before - self.entries.len()
    }

    pub fn splice(&mut self, start: usize, delete_count: usize, insert: Vec<Entry>) -> Vec<Entry> {
        let start = start.min(self.entries.len());
        let end = (start + delete_count).min(self.entries.len());
        self.entries.splice(start..end, insert).collect()
    }

    pub fn replace_all(&mut self, entries: Vec<Entry>) {
        self.entries = entries;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Selected indexes of a [`FileListModel`] plus the lead (focused) index.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ListSelectionModel {
    selected: BTreeSet<usize>,
    lead_index: Option<usize>,
}

impl ListSelectionModel {
    pub fn selected_indexes(&self) -> Vec<usize> {
        self.selected.iter().copied().collect()
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn lead_index(&self) -> Option<usize> {
        self.lead_index
    }

    pub fn set_lead_index(&mut self, index: Option<usize>) {
        self.lead_index = index;
    }

    pub fn select_index(&mut self, index: usize) {
        self.selected.clear();
        self.selected.insert(index);
        self.lead_index = Some(index);
    }

    pub fn set_selected_indexes(&mut self, indexes: impl IntoIterator<Item = usize>) {
        self.selected = indexes.into_iter().collect();
    }

    pub fn select_range(&mut self, len: usize) {
        self.selected = (0..len).collect();
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.lead_index = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_sorted_puts_directories_first() {
        let mut list = FileListModel::new();
        list.add_sorted(vec![
            Entry::file("downloads", "/b.txt"),
            Entry::directory("downloads", "/zeta"),
            Entry::file("downloads", "/A.txt"),
            Entry::directory("downloads", "/alpha"),
        ]);

        let names: Vec<&str> = list.entries().iter().map(Entry::name).collect();
        assert_eq!(names, vec!["alpha", "zeta", "A.txt", "b.txt"]);

        list.add_sorted(vec![Entry::file("downloads", "/b.txt")]);
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn test_splice_and_remove() {
        let mut list = FileListModel::new();
        list.add_sorted((0..4).map(|i| Entry::file("downloads", &format!("/{i}"))));

        let removed = list.splice(1, 2, vec![]);
        assert_eq!(removed.len(), 2);
        assert_eq!(list.urls(), vec!["filesystem:downloads/0", "filesystem:downloads/3"]);

        assert_eq!(list.remove_urls(&["filesystem:downloads/3".to_string()]), 1);
        assert_eq!(list.len(), 1);
    }
}
