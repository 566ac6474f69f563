//! Picks the scanner for a navigation target.
//!
//! The choice depends only on the target's variant and root type, whether the
//! trimmed query is empty, and the search location. Every root type is matched
//! explicitly so a new one cannot silently fall through.

use std::fmt;
use std::sync::Arc;

use crate::config::SearchConfig;
use crate::fs::entry::{Entry, NavTarget, RootType};
use crate::fs::file_system::FileSystem;
use crate::fs::volume::VolumeManager;
use crate::model::store::Store;
use crate::scan::content_scanner::ContentScanner;
use crate::scan::scanners::{
    DirectoryContentScanner, DriveMetadataSearchContentScanner, EmptyContentScanner,
    EntryListContentScanner, GuestMountContentScanner, MediaViewContentScanner,
    RecentContentScanner, SearchContentScanner, StoreViewContentScanner, TrashContentScanner,
};
use crate::scan::search_options::{SearchLocation, SearchOptions};
use crate::services::private_api::{DriveSearchType, GuestTarget, PrivateApi};

/// Builds a fresh scanner for every scan of the same contents.
pub type ScannerFactory = Arc<dyn Fn() -> Arc<dyn ContentScanner> + Send + Sync>;

/// Collaborators scanners are built from.
#[derive(Clone)]
pub struct ScannerDeps {
    pub fs: Arc<dyn FileSystem>,
    pub api: Arc<dyn PrivateApi>,
    pub volume_manager: Arc<dyn VolumeManager>,
    pub store: Arc<Store>,
    pub search: SearchConfig,
}

impl fmt::Debug for ScannerDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScannerDeps")
            .field("search", &self.search)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerKind {
    Directory,
    EntryList,
    Recent,
    Search,
    DriveMetadata(DriveSearchType),
    GuestMount,
    Trash,
    Empty,
    StoreView,
    MediaView,
}

pub struct ScannerPlan {
    pub kind: ScannerKind,
    pub is_search: bool,
    pub factory: ScannerFactory,
}

impl fmt::Debug for ScannerPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScannerPlan")
            .field("kind", &self.kind)
            .field("is_search", &self.is_search)
            .finish_non_exhaustive()
    }
}

/// Which scanner lists `target`, and whether the listing is a search result.
pub fn select_scanner_kind(
    target: &NavTarget,
    root_type_of_location: Option<RootType>,
    query: &str,
    options: &SearchOptions,
) -> (ScannerKind, bool) {
    let searching = !query.trim().is_empty();
    let search_or = |kind| {
        if searching {
            (ScannerKind::Search, true)
        } else {
            (kind, false)
        }
    };

    match target {
        NavTarget::StoreView(_) => (ScannerKind::StoreView, false),
        NavTarget::EntryList(_) => search_or(ScannerKind::EntryList),
        NavTarget::Directory(_) => {
            if root_type_of_location == Some(RootType::MediaView) {
                search_or(ScannerKind::MediaView)
            } else {
                search_or(ScannerKind::Directory)
            }
        }
        NavTarget::FakeRoot { root_type, .. } => match root_type {
            // Mounting happens regardless of the query.
            RootType::Crostini | RootType::GuestOs => (ScannerKind::GuestMount, false),
            // Searching "this folder" on Recent keeps the Recent scanner.
            RootType::Recent => {
                if searching && options.location != SearchLocation::ThisFolder {
                    (ScannerKind::Search, true)
                } else {
                    (ScannerKind::Recent, searching)
                }
            }
            RootType::Trash => search_or(ScannerKind::Trash),
            RootType::DriveOffline => search_or(ScannerKind::DriveMetadata(DriveSearchType::Offline)),
            RootType::DriveSharedWithMe => {
                search_or(ScannerKind::DriveMetadata(DriveSearchType::SharedWithMe))
            }
            RootType::DriveRecent => {
                search_or(ScannerKind::DriveMetadata(DriveSearchType::ExcludeDirectories))
            }
            RootType::MediaView => search_or(ScannerKind::MediaView),
            RootType::DriveFakeRoot | RootType::OneDrivePlaceholder => (ScannerKind::Empty, false),
            RootType::Downloads
            | RootType::MyFiles
            | RootType::Removable
            | RootType::Archive
            | RootType::Drive
            | RootType::SharedDrivesGrandRoot
            | RootType::SharedDrive
            | RootType::ComputersGrandRoot
            | RootType::Computer
            | RootType::Android
            | RootType::Provided
            | RootType::DocumentsProvider
            | RootType::Smb
            | RootType::Mtp => search_or(ScannerKind::Empty),
        },
    }
}

/// Chooses the scanner for `target` and returns a factory for it.
pub fn plan_scanner(
    deps: &ScannerDeps,
    target: &NavTarget,
    query: &str,
    options: SearchOptions,
) -> ScannerPlan {
    let location_root = target
        .entry()
        .and_then(|entry| deps.volume_manager.location_info(entry))
        .map(|location| location.root_type);
    let (kind, is_search) = select_scanner_kind(target, location_root, query, &options);
    let query = query.trim().to_string();
    let deps = deps.clone();
    let entry = target.entry().cloned();
    let key = target.key();

    let factory = match kind {
        ScannerKind::StoreView => {
            let store = deps.store.clone();
            scanner_factory(move || Arc::new(StoreViewContentScanner::new(key.clone(), store.clone())))
        }
        ScannerKind::EntryList => {
            let entry = entry_or_placeholder(entry);
            scanner_factory(move || Arc::new(EntryListContentScanner::new(entry.clone())))
        }
        ScannerKind::Directory => {
            let entry = entry_or_placeholder(entry);
            scanner_factory(move || Arc::new(DirectoryContentScanner::new(entry.clone(), deps.fs.clone())))
        }
        ScannerKind::MediaView => {
            let entry = entry_or_placeholder(entry);
            scanner_factory(move || Arc::new(MediaViewContentScanner::new(entry.clone(), deps.fs.clone())))
        }
        ScannerKind::Recent => scanner_factory(move || {
            Arc::new(RecentContentScanner::new(
                &query,
                options.category,
                deps.search.recent_max_results,
                deps.search.recent_cutoff_days,
                deps.api.clone(),
                deps.volume_manager.clone(),
            ))
        }),
        ScannerKind::Search => scanner_factory(move || {
            Arc::new(SearchContentScanner::new(
                entry.clone(),
                &query,
                options,
                deps.search.max_results,
                deps.fs.clone(),
                deps.api.clone(),
                deps.volume_manager.clone(),
            ))
        }),
        ScannerKind::DriveMetadata(search_type) => scanner_factory(move || {
            Arc::new(DriveMetadataSearchContentScanner::new(
                search_type,
                deps.search.max_results,
                deps.api.clone(),
            ))
        }),
        ScannerKind::GuestMount => {
            let guest = match target.fake_root_type() {
                Some(RootType::GuestOs) => GuestTarget::GuestOs {
                    vm_name: entry.as_ref().map(Entry::name).unwrap_or_default().into(),
                },
                _ => GuestTarget::Crostini,
            };
            scanner_factory(move || Arc::new(GuestMountContentScanner::new(guest.clone(), deps.api.clone())))
        }
        ScannerKind::Trash => scanner_factory(move || {
            Arc::new(TrashContentScanner::new(deps.fs.clone(), deps.volume_manager.clone()))
        }),
        ScannerKind::Empty => scanner_factory(|| Arc::new(EmptyContentScanner::new())),
    };

    ScannerPlan {
        kind,
        is_search,
        factory,
    }
}

fn scanner_factory<F>(build: F) -> ScannerFactory
where
    F: Fn() -> Arc<dyn ContentScanner> + Send + Sync + 'static,
{
    Arc::new(build)
}

fn entry_or_placeholder(entry: Option<Entry>) -> Entry {
    entry.unwrap_or_else(|| Entry::directory("", "/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::entry::FileKey;

    fn fake(root_type: RootType) -> NavTarget {
        NavTarget::from_entry(Entry::fake(root_type, root_type.as_str()))
    }

    #[test]
    fn test_guest_roots_always_mount() {
        let options = SearchOptions::default();
        for root in [RootType::Crostini, RootType::GuestOs] {
            assert_eq!(
                select_scanner_kind(&fake(root), None, "", &options),
                (ScannerKind::GuestMount, false)
            );
            assert_eq!(
                select_scanner_kind(&fake(root), None, "query", &options).0,
                ScannerKind::GuestMount
            );
        }
    }

    #[test]
    fn test_recent_this_folder_keeps_recent_scanner() {
        let recent = fake(RootType::Recent);
        let this_folder = SearchOptions::this_folder();
        let everywhere = SearchOptions::default();

        assert_eq!(
            select_scanner_kind(&recent, None, "cat", &this_folder),
            (ScannerKind::Recent, true)
        );
        assert_eq!(
            select_scanner_kind(&recent, None, "cat", &everywhere),
            (ScannerKind::Search, true)
        );
        assert_eq!(
            select_scanner_kind(&recent, None, "   ", &everywhere),
            (ScannerKind::Recent, false)
        );
    }

    #[test]
    fn test_special_roots() {
        let options = SearchOptions::default();
        let kind = |root| select_scanner_kind(&fake(root), None, "", &options).0;

        assert_eq!(kind(RootType::Trash), ScannerKind::Trash);
        assert_eq!(kind(RootType::DriveFakeRoot), ScannerKind::Empty);
        assert_eq!(kind(RootType::OneDrivePlaceholder), ScannerKind::Empty);
        assert_eq!(
            kind(RootType::DriveOffline),
            ScannerKind::DriveMetadata(DriveSearchType::Offline)
        );
        assert_eq!(
            kind(RootType::DriveRecent),
            ScannerKind::DriveMetadata(DriveSearchType::ExcludeDirectories)
        );
        assert_eq!(
            select_scanner_kind(&fake(RootType::Trash), None, "x", &options),
            (ScannerKind::Search, true)
        );
        assert_eq!(
            select_scanner_kind(&fake(RootType::OneDrivePlaceholder), None, "x", &options),
            (ScannerKind::Empty, false)
        );
    }

    #[test]
    fn test_directories_and_views() {
        let options = SearchOptions::default();
        let dir = NavTarget::Directory(Entry::directory("downloads", "/a"));

        assert_eq!(
            select_scanner_kind(&dir, Some(RootType::Downloads), "", &options),
            (ScannerKind::Directory, false)
        );
        assert_eq!(
            select_scanner_kind(&dir, Some(RootType::MediaView), "", &options),
            (ScannerKind::MediaView, false)
        );
        assert_eq!(
            select_scanner_kind(&dir, Some(RootType::Downloads), " a ", &options),
            (ScannerKind::Search, true)
        );
        assert_eq!(
            select_scanner_kind(&NavTarget::StoreView(FileKey::new("view")), None, "x", &options),
            (ScannerKind::StoreView, false)
        );
    }
}
