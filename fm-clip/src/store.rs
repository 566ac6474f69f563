//! Local key-value store mirroring the drag payload.
//!
//! Drop targets in another window only see a protected transfer, so the drag
//! source mirrors the fields they need into a store both windows can read.
//! [`FileLocalStore`] persists that map with an atomic temp-file swap.

use crate::error::{ClipError, ClipResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// String key-value storage shared between windows.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String);

    fn remove(&self, key: &str);
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl LocalStore for MemoryLocalStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.values.write().insert(key.to_owned(), value);
    }

    fn remove(&self, key: &str) {
        self.values.write().remove(key);
    }
}

/// Persisted map with versioning
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStore {
    version: u32,
    values: BTreeMap<String, String>,
}

/// File-backed store. Writes go to memory; [`FileLocalStore::flush`] persists.
#[derive(Debug)]
pub struct FileLocalStore {
    file_path: PathBuf,
    temp_path: PathBuf,
    inner: MemoryLocalStore,
}

impl FileLocalStore {
    const CURRENT_VERSION: u32 = 1;

    /// Opens the store, starting empty when the file is missing or corrupted.
    pub async fn open(file_path: PathBuf) -> ClipResult<Self> {
        if let Some(parent) = file_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ClipError::store_io(&e, "create directory"))?;
        }

        let store = Self {
            temp_path: file_path.with_extension("tmp"),
            file_path,
            inner: MemoryLocalStore::new(),
        };

        match store.load().await {
            Ok(values) => *store.inner.values.write() = values,
            Err(e) if e.is_stale_store() => {
                warn!("Local store {:?} unreadable, starting empty: {}", store.file_path, e);
            }
            Err(e) => return Err(e),
        }

        Ok(store)
    }

    async fn load(&self) -> ClipResult<BTreeMap<String, String>> {
        if !Path::new(&self.file_path).exists() {
            return Ok(BTreeMap::new());
        }

        let data = fs::read(&self.file_path)
            .await
            .map_err(|e| ClipError::store_io(&e, "read"))?;

        let persisted: PersistedStore = rmp_serde::from_slice(&data)
            .map_err(|_| ClipError::store_corrupted(&self.file_path))?;

        if persisted.version != Self::CURRENT_VERSION {
            return Err(ClipError::StoreFormat {
                expected: Self::CURRENT_VERSION,
                found: persisted.version,
            });
        }

        Ok(persisted.values)
    }

    /// Persists the current map through a temporary file and a rename.
    pub async fn flush(&self) -> ClipResult<()> {
        let persisted = PersistedStore {
            version: Self::CURRENT_VERSION,
            values: self.inner.values.read().clone(),
        };
        let data = rmp_serde::to_vec(&persisted)?;

        fs::write(&self.temp_path, &data)
            .await
            .map_err(|e| ClipError::store_io(&e, "write temp file"))?;

        fs::rename(&self.temp_path, &self.file_path)
            .await
            .map_err(|e| ClipError::store_io(&e, "swap temp file"))?;

        debug!("Local store flushed to {:?}", self.file_path);
        Ok(())
    }
}

impl LocalStore for FileLocalStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: String) {
        self.inner.set(key, value);
    }

    fn remove(&self, key: &str) {
        self.inner.remove(key);
    }
}
