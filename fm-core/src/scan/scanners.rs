//! Concrete [`ContentScanner`]s, one per kind of location.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::fs::entry::{Entry, FileKey};
use crate::fs::file_system::{FileCategory, FileSystem, SearchQuery};
use crate::fs::predicates::is_descendant_or_same;
use crate::fs::volume::{DriveConnectionState, VolumeManager, VolumeType};
use crate::model::store::Store;
use crate::scan::content_scanner::{BatchSink, ContentScanner, ScanOptions};
use crate::scan::search_options::{SearchLocation, SearchOptions};
use crate::services::private_api::{
    DriveSearchQuery, DriveSearchType, GuestTarget, PrivateApi, RecentQuery, SourceRestriction,
};

macro_rules! scanner_token {
    ($name:literal) => {
        fn name(&self) -> &'static str {
            $name
        }

        fn token(&self) -> &CancellationToken {
            &self.token
        }
    };
}

/// Lists one real directory.
pub struct DirectoryContentScanner {
    entry: Entry,
    fs: Arc<dyn FileSystem>,
    token: CancellationToken,
}

impl std::fmt::Debug for DirectoryContentScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryContentScanner")
            .field("entry", &self.entry)
            .finish_non_exhaustive()
    }
}

impl DirectoryContentScanner {
    pub fn new(entry: Entry, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            entry,
            fs,
            token: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl ContentScanner for DirectoryContentScanner {
    scanner_token!("directory");

    async fn produce(&self, sink: &BatchSink, _options: ScanOptions) -> Result<(), AppError> {
        let entries = self.fs.read_directory(&self.entry).await?;
        debug!(url = self.entry.url(), count = entries.len(), "Directory read");
        sink.push(entries);
        Ok(())
    }
}

/// Lists the roots aggregated by a synthetic entry-list root.
#[derive(Debug)]
pub struct EntryListContentScanner {
    entry: Entry,
    token: CancellationToken,
}

impl EntryListContentScanner {
    pub fn new(entry: Entry) -> Self {
        Self {
            entry,
            token: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl ContentScanner for EntryListContentScanner {
    scanner_token!("entry_list");

    async fn produce(&self, sink: &BatchSink, _options: ScanOptions) -> Result<(), AppError> {
        sink.push(self.entry.children().to_vec());
        Ok(())
    }
}

/// Recently modified files across volumes, optionally name-filtered.
pub struct RecentContentScanner {
    query: String,
    category: FileCategory,
    restriction: SourceRestriction,
    max_results: usize,
    cutoff_days: u32,
    api: Arc<dyn PrivateApi>,
    volume_manager: Arc<dyn VolumeManager>,
    token: CancellationToken,
}

impl std::fmt::Debug for RecentContentScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecentContentScanner")
            .field("query", &self.query)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

impl RecentContentScanner {
    pub fn new(
        query: &str,
        category: FileCategory,
        max_results: usize,
        cutoff_days: u32,
        api: Arc<dyn PrivateApi>,
        volume_manager: Arc<dyn VolumeManager>,
    ) -> Self {
        Self {
            query: query.to_string(),
            category,
            restriction: SourceRestriction::AnySource,
            max_results,
            cutoff_days,
            api,
            volume_manager,
            token: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl ContentScanner for RecentContentScanner {
    scanner_token!("recent");

    async fn produce(&self, sink: &BatchSink, options: ScanOptions) -> Result<(), AppError> {
        let request = RecentQuery {
            restriction: self.restriction,
            query: self.query.clone(),
            cutoff_days: self.cutoff_days,
            category: self.category,
            invalidate_cache: options.invalidate_cache,
        };
        let files = self.api.get_recent_files(&request).await?;
        let needle = self.query.to_lowercase();

        let visible: Vec<Entry> = files
            .into_iter()
            // Files on volumes that are gone or not yet mounted are hidden.
            .filter(|entry| self.volume_manager.volume_info(entry).is_some())
            .filter(|entry| needle.is_empty() || entry.name().to_lowercase().contains(&needle))
            .filter(|entry| self.category.matches(entry.name()))
            .take(self.max_results)
            .collect();

        sink.push(visible);
        Ok(())
    }
}

/// Name search over one folder, one volume, or everything mounted.
pub struct SearchContentScanner {
    root: Option<Entry>,
    query: String,
    options: SearchOptions,
    max_results: usize,
    fs: Arc<dyn FileSystem>,
    api: Arc<dyn PrivateApi>,
    volume_manager: Arc<dyn VolumeManager>,
    token: CancellationToken,
}

impl std::fmt::Debug for SearchContentScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchContentScanner")
            .field("root", &self.root)
            .field("query", &self.query)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SearchContentScanner {
    pub fn new(
        root: Option<Entry>,
        query: &str,
        options: SearchOptions,
        max_results: usize,
        fs: Arc<dyn FileSystem>,
        api: Arc<dyn PrivateApi>,
        volume_manager: Arc<dyn VolumeManager>,
    ) -> Self {
        Self {
            root,
            query: query.to_string(),
            options,
            max_results,
            fs,
            api,
            volume_manager,
            token: CancellationToken::new(),
        }
    }

    /// Roots to search, and whether each is Drive-backed.
    fn search_roots(&self) -> Vec<(Entry, bool)> {
        let root = self.root.as_ref().filter(|root| !root.is_fake());

        match (self.options.location, root) {
            (SearchLocation::ThisFolder, Some(root)) => {
                let is_drive = self
                    .volume_manager
                    .location_info(root)
                    .is_some_and(|l| l.is_drive_based);
                vec![(root.clone(), is_drive)]
            }
            (SearchLocation::RootFolder, Some(root)) => match self.volume_manager.volume_info(root) {
                Some(volume) => vec![(volume.display_root(), volume.volume_type == VolumeType::Drive)],
                None => vec![(root.clone(), false)],
            },
            _ => {
                let drive_online =
                    self.volume_manager.drive_connection_state() != DriveConnectionState::Offline;
                self.volume_manager
                    .volume_list()
                    .iter()
                    .filter(|v| v.error.is_none())
                    .filter(|v| v.volume_type != VolumeType::Drive || drive_online)
                    .map(|v| (v.display_root(), v.volume_type == VolumeType::Drive))
                    .collect()
            }
        }
    }
}

#[async_trait]
impl ContentScanner for SearchContentScanner {
    scanner_token!("search");

    async fn produce(&self, sink: &BatchSink, _options: ScanOptions) -> Result<(), AppError> {
        let roots = self.search_roots();
        let single_root = roots.len() == 1;
        let mut remaining = self.max_results;

        for (root, is_drive) in roots {
            if sink.is_cancelled() || remaining == 0 {
                break;
            }

            let found = if is_drive {
                let query = DriveSearchQuery {
                    query: self.query.clone(),
                    search_type: DriveSearchType::All,
                    category: self.options.category,
                    max_results: remaining,
                };
                self.api.search_drive_metadata(&query).await.map(|entries| {
                    entries
                        .into_iter()
                        .filter(|e| {
                            self.options.location != SearchLocation::ThisFolder
                                || is_descendant_or_same(root.url(), e.url())
                        })
                        .collect::<Vec<_>>()
                })
            } else {
                let query = SearchQuery {
                    query: self.query.clone(),
                    category: self.options.category,
                    max_results: remaining,
                    modified_after: self.options.recency.modified_after(Utc::now()),
                };
                self.fs.search(&root, &query).await
            };

            match found {
                Ok(mut entries) => {
                    entries.truncate(remaining);
                    remaining -= entries.len();
                    sink.push(entries);
                }
                Err(e) if single_root => return Err(e.into()),
                Err(e) => warn!(root = root.url(), error = %e, "Search skipped a volume"),
            }
        }

        Ok(())
    }
}

/// Drive views answered by the metadata database (offline, shared with me).
pub struct DriveMetadataSearchContentScanner {
    search_type: DriveSearchType,
    max_results: usize,
    api: Arc<dyn PrivateApi>,
    token: CancellationToken,
}

impl std::fmt::Debug for DriveMetadataSearchContentScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveMetadataSearchContentScanner")
            .field("search_type", &self.search_type)
            .finish_non_exhaustive()
    }
}

impl DriveMetadataSearchContentScanner {
    pub fn new(search_type: DriveSearchType, max_results: usize, api: Arc<dyn PrivateApi>) -> Self {
        Self {
            search_type,
            max_results,
            api,
            token: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl ContentScanner for DriveMetadataSearchContentScanner {
    scanner_token!("drive_metadata_search");

    async fn produce(&self, sink: &BatchSink, _options: ScanOptions) -> Result<(), AppError> {
        let query = DriveSearchQuery {
            query: String::new(),
            search_type: self.search_type,
            category: FileCategory::All,
            max_results: self.max_results,
        };
        let entries = self.api.search_drive_metadata(&query).await?;
        sink.push(entries);
        Ok(())
    }
}

/// Mounts a guest environment; lists nothing itself.
pub struct GuestMountContentScanner {
    guest: GuestTarget,
    api: Arc<dyn PrivateApi>,
    token: CancellationToken,
}

impl std::fmt::Debug for GuestMountContentScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestMountContentScanner")
            .field("guest", &self.guest)
            .finish_non_exhaustive()
    }
}

impl GuestMountContentScanner {
    pub fn new(guest: GuestTarget, api: Arc<dyn PrivateApi>) -> Self {
        Self {
            guest,
            api,
            token: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl ContentScanner for GuestMountContentScanner {
    scanner_token!("guest_mount");

    async fn produce(&self, _sink: &BatchSink, _options: ScanOptions) -> Result<(), AppError> {
        self.api.mount_guest(&self.guest).await?;
        Ok(())
    }
}

/// Items in the trash of every trash-enabled volume.
pub struct TrashContentScanner {
    fs: Arc<dyn FileSystem>,
    volume_manager: Arc<dyn VolumeManager>,
    token: CancellationToken,
}

impl std::fmt::Debug for TrashContentScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrashContentScanner").finish_non_exhaustive()
    }
}

impl TrashContentScanner {
    pub fn new(fs: Arc<dyn FileSystem>, volume_manager: Arc<dyn VolumeManager>) -> Self {
        Self {
            fs,
            volume_manager,
            token: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl ContentScanner for TrashContentScanner {
    scanner_token!("trash");

    async fn produce(&self, sink: &BatchSink, _options: ScanOptions) -> Result<(), AppError> {
        for volume in self.volume_manager.volume_list() {
            if !volume.trash_enabled || sink.is_cancelled() {
                continue;
            }
            match self.fs.read_trash(&volume).await {
                Ok(entries) => {
                    sink.push(entries);
                }
                Err(e) => warn!(volume_id = %volume.volume_id, error = %e, "Trash unreadable"),
            }
        }
        Ok(())
    }
}

/// Completes immediately with no entries.
#[derive(Debug, Default)]
pub struct EmptyContentScanner {
    token: CancellationToken,
}

impl EmptyContentScanner {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentScanner for EmptyContentScanner {
    scanner_token!("empty");

    async fn produce(&self, _sink: &BatchSink, _options: ScanOptions) -> Result<(), AppError> {
        Ok(())
    }
}

/// Listing materialized by the external store.
#[derive(Debug)]
pub struct StoreViewContentScanner {
    key: FileKey,
    store: Arc<Store>,
    token: CancellationToken,
}

impl StoreViewContentScanner {
    pub fn new(key: FileKey, store: Arc<Store>) -> Self {
        Self {
            key,
            store,
            token: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl ContentScanner for StoreViewContentScanner {
    scanner_token!("store_view");

    async fn produce(&self, sink: &BatchSink, _options: ScanOptions) -> Result<(), AppError> {
        let view = self
            .store
            .state()
            .materialized_view(&self.key)
            .ok_or_else(|| AppError::not_found(self.key.as_str()))?;
        sink.push(view.as_ref().clone());
        Ok(())
    }
}

/// Every media file below a media-view root, flattened.
pub struct MediaViewContentScanner {
    root: Entry,
    fs: Arc<dyn FileSystem>,
    token: CancellationToken,
}

impl std::fmt::Debug for MediaViewContentScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaViewContentScanner")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl MediaViewContentScanner {
    pub fn new(root: Entry, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root,
            fs,
            token: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl ContentScanner for MediaViewContentScanner {
    scanner_token!("media_view");

    async fn produce(&self, sink: &BatchSink, _options: ScanOptions) -> Result<(), AppError> {
        let all = SearchQuery::default();
        let files: Vec<Entry> = self
            .fs
            .search(&self.root, &all)
            .await?
            .into_iter()
            .filter(Entry::is_file)
            .collect();
        sink.push(files);
        Ok(())
    }
}
