//! External application store.
//!
//! Immutable [`StoreState`] snapshots swapped atomically on every dispatch and
//! broadcast to subscribers. The directory model both reports into the store
//! (directory and search status) and reacts to changes made by others.

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

use crate::fs::entry::{Entry, FileKey};
use crate::scan::search_options::SearchOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropStatus {
    Started,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentDirectory {
    pub key: FileKey,
    pub status: PropStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchData {
    pub query: String,
    pub options: SearchOptions,
    pub status: PropStatus,
}

#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub revision: u64,
    pub current_directory: Option<CurrentDirectory>,
    pub search: Option<SearchData>,
    /// Listings of virtual locations, keyed by their file key
    pub views: HashMap<FileKey, Arc<Vec<Entry>>>,
}

impl StoreState {
    pub fn materialized_view(&self, key: &FileKey) -> Option<Arc<Vec<Entry>>> {
        self.views.get(key).cloned()
    }
}

#[derive(Debug, Clone)]
pub enum StoreAction {
    ChangeDirectory { key: FileKey, status: PropStatus },
    UpdateSearch {
        query: String,
        options: SearchOptions,
        status: PropStatus,
    },
    ClearSearch,
    SetMaterializedView { key: FileKey, entries: Vec<Entry> },
}

fn reduce(state: &StoreState, action: StoreAction) -> StoreState {
    let mut next = state.clone();
    next.revision += 1;

    match action {
        StoreAction::ChangeDirectory { key, status } => {
            next.current_directory = Some(CurrentDirectory { key, status });
        }
        StoreAction::UpdateSearch {
            query,
            options,
            status,
        } => {
            next.search = Some(SearchData {
                query,
                options,
                status,
            });
        }
        StoreAction::ClearSearch => next.search = None,
        StoreAction::SetMaterializedView { key, entries } => {
            next.views.insert(key, Arc::new(entries));
        }
    }

    next
}

pub struct Store {
    state: ArcSwap<StoreState>,
    dispatch_lock: Mutex<()>,
    tx: broadcast::Sender<Arc<StoreState>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            state: ArcSwap::from_pointee(StoreState::default()),
            dispatch_lock: Mutex::new(()),
            tx,
        }
    }

    pub fn state(&self) -> Arc<StoreState> {
        self.state.load_full()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StoreState>> {
        self.tx.subscribe()
    }

    pub fn dispatch(&self, action: StoreAction) {
        let next = {
            let _guard = self.dispatch_lock.lock();
            let next = Arc::new(reduce(&self.state.load(), action));
            self.state.store(next.clone());
            next
        };
        trace!(revision = next.revision, "Store updated");
        let _ = self.tx.send(next);
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("revision", &self.state.load().revision)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dispatch_updates_snapshot_and_notifies() {
        let store = Store::new();
        let mut rx = store.subscribe();

        store.dispatch(StoreAction::ChangeDirectory {
            key: FileKey::new("filesystem:downloads/"),
            status: PropStatus::Started,
        });

        let seen = rx.recv().await.unwrap();
        assert_eq!(seen.revision, 1);
        assert_eq!(
            store.state().current_directory,
            Some(CurrentDirectory {
                key: FileKey::new("filesystem:downloads/"),
                status: PropStatus::Started,
            })
        );
    }

    #[test]
    fn test_search_lifecycle() {
        let store = Store::new();
        store.dispatch(StoreAction::UpdateSearch {
            query: "cat".into(),
            options: SearchOptions::default(),
            status: PropStatus::Started,
        });
        assert_eq!(store.state().search.as_ref().map(|s| s.status), Some(PropStatus::Started));

        store.dispatch(StoreAction::ClearSearch);
        assert!(store.state().search.is_none());
        assert_eq!(store.state().revision, 2);
    }
}
