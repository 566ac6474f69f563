//! Hides dot-files unless the user asked to see them.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::fs::entry::Entry;

#[derive(Debug, Default)]
pub struct FileFilter {
    show_hidden: AtomicBool,
}

impl FileFilter {
    pub fn new(show_hidden: bool) -> Self {
        Self {
            show_hidden: AtomicBool::new(show_hidden),
        }
    }

    pub fn accepts(&self, entry: &Entry) -> bool {
        self.show_hidden() || !entry.name().starts_with('.')
    }

    pub fn show_hidden(&self) -> bool {
        self.show_hidden.load(Ordering::Acquire)
    }

    /// Returns whether the setting changed.
    pub fn set_show_hidden(&self, show: bool) -> bool {
        self.show_hidden.swap(show, Ordering::AcqRel) != show
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_toggle() {
        let filter = FileFilter::new(false);
        let hidden = Entry::file("downloads", "/.bashrc");
        let visible = Entry::file("downloads", "/notes.txt");

        assert!(!filter.accepts(&hidden));
        assert!(filter.accepts(&visible));

        assert!(filter.set_show_hidden(true));
        assert!(!filter.set_show_hidden(true));
        assert!(filter.accepts(&hidden));
    }
}
