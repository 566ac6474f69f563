//! Entries, root kinds and navigation targets.
//!
//! An [`Entry`] is a cheap, cloneable handle (`Arc` inside) to a file or
//! directory on some file system, or to one of the synthetic roots the UI
//! shows (Recent, Trash, the Linux files placeholder, ...). Entries compare
//! by URL.

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// URL scheme of entries that do not live on any file system.
pub const FAKE_ENTRY_SCHEME: &str = "fake-entry://";
/// URL scheme of real entries, followed by `<filesystem><full path>`.
pub const FILESYSTEM_SCHEME: &str = "filesystem:";

/// Kind of location an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootType {
    /// The user's local files (the real Downloads/MyFiles volume).
    Downloads,
    /// Aggregate root listing MyFiles together with the guest volumes.
    MyFiles,
    Removable,
    Archive,
    /// Drive "My Drive" tree.
    Drive,
    SharedDrivesGrandRoot,
    SharedDrive,
    ComputersGrandRoot,
    Computer,
    DriveSharedWithMe,
    DriveOffline,
    DriveRecent,
    /// Placeholder shown while Drive is disabled or not mounted.
    DriveFakeRoot,
    Recent,
    Trash,
    /// Linux files before the container is mounted.
    Crostini,
    /// A guest VM before its volume is mounted.
    GuestOs,
    Android,
    MediaView,
    Provided,
    DocumentsProvider,
    Smb,
    Mtp,
    /// Placeholder for a OneDrive account that still needs sign-in.
    OneDrivePlaceholder,
}

impl RootType {
    /// Drive views backed by a metadata query rather than a directory.
    pub const fn is_special_search_root(self) -> bool {
        matches!(
            self,
            Self::DriveOffline | Self::DriveSharedWithMe | Self::DriveRecent
        )
    }

    pub const fn is_drive(self) -> bool {
        matches!(
            self,
            Self::Drive
                | Self::SharedDrivesGrandRoot
                | Self::SharedDrive
                | Self::ComputersGrandRoot
                | Self::Computer
                | Self::DriveSharedWithMe
                | Self::DriveOffline
                | Self::DriveRecent
                | Self::DriveFakeRoot
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Downloads => "downloads",
            Self::MyFiles => "my_files",
            Self::Removable => "removable",
            Self::Archive => "archive",
            Self::Drive => "drive",
            Self::SharedDrivesGrandRoot => "shared_drives_grand_root",
            Self::SharedDrive => "shared_drive",
            Self::ComputersGrandRoot => "computers_grand_root",
            Self::Computer => "computer",
            Self::DriveSharedWithMe => "drive_shared_with_me",
            Self::DriveOffline => "drive_offline",
            Self::DriveRecent => "drive_recent",
            Self::DriveFakeRoot => "drive_fake_root",
            Self::Recent => "recent",
            Self::Trash => "trash",
            Self::Crostini => "crostini",
            Self::GuestOs => "guest_os",
            Self::Android => "android_files",
            Self::MediaView => "media_view",
            Self::Provided => "provided",
            Self::DocumentsProvider => "documents_provider",
            Self::Smb => "smb",
            Self::Mtp => "mtp",
            Self::OneDrivePlaceholder => "onedrive_placeholder",
        }
    }
}

impl fmt::Display for RootType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a trashed entry came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrashInfo {
    /// Full path the entry is restored to
    pub restore_path: String,
    pub deletion_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub enum EntryOrigin {
    /// Lives on a real file system.
    Native,
    /// Synthetic root with no backing directory.
    Fake { root_type: RootType },
    /// Synthetic root aggregating other roots.
    EntryList {
        root_type: RootType,
        children: Vec<Entry>,
    },
    /// Item in a trash directory.
    Trashed(TrashInfo),
}

#[derive(Debug)]
struct EntryData {
    url: String,
    name: CompactString,
    full_path: String,
    is_directory: bool,
    filesystem: CompactString,
    origin: EntryOrigin,
}

/// Handle to a file, a directory, or a synthetic root.
#[derive(Clone)]
pub struct Entry(Arc<EntryData>);

impl Entry {
    fn build(
        filesystem: &str,
        full_path: &str,
        is_directory: bool,
        origin: EntryOrigin,
    ) -> Self {
        let full_path = normalize_path(full_path);
        let name = full_path
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("");
        Self(Arc::new(EntryData {
            url: format!("{FILESYSTEM_SCHEME}{filesystem}{full_path}"),
            name: CompactString::new(name),
            filesystem: CompactString::new(filesystem),
            full_path,
            is_directory,
            origin,
        }))
    }

    pub fn file(filesystem: &str, full_path: &str) -> Self {
        Self::build(filesystem, full_path, false, EntryOrigin::Native)
    }

    pub fn directory(filesystem: &str, full_path: &str) -> Self {
        Self::build(filesystem, full_path, true, EntryOrigin::Native)
    }

    /// Entry inside a trash directory, restorable to `info.restore_path`.
    pub fn trashed(filesystem: &str, full_path: &str, is_directory: bool, info: TrashInfo) -> Self {
        Self::build(filesystem, full_path, is_directory, EntryOrigin::Trashed(info))
    }

    /// Synthetic root, identified by `fake-entry://<root type>`.
    pub fn fake(root_type: RootType, label: &str) -> Self {
        Self(Arc::new(EntryData {
            url: format!("{FAKE_ENTRY_SCHEME}{}", root_type.as_str()),
            name: CompactString::new(label),
            full_path: "/".to_string(),
            is_directory: true,
            filesystem: CompactString::const_new("fake"),
            origin: EntryOrigin::Fake { root_type },
        }))
    }

    pub fn entry_list(root_type: RootType, label: &str, children: Vec<Entry>) -> Self {
        Self(Arc::new(EntryData {
            url: format!("entry-list://{}", root_type.as_str()),
            name: CompactString::new(label),
            full_path: "/".to_string(),
            is_directory: true,
            filesystem: CompactString::const_new("entry-list"),
            origin: EntryOrigin::EntryList {
                root_type,
                children,
            },
        }))
    }

    pub fn url(&self) -> &str {
        &self.0.url
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn full_path(&self) -> &str {
        &self.0.full_path
    }

    pub fn is_directory(&self) -> bool {
        self.0.is_directory
    }

    pub fn is_file(&self) -> bool {
        !self.0.is_directory
    }

    /// Name of the file system (volume) the entry lives on.
    pub fn filesystem_name(&self) -> &str {
        &self.0.filesystem
    }

    pub fn origin(&self) -> &EntryOrigin {
        &self.0.origin
    }

    /// Root type carried by synthetic entries.
    pub fn fake_root_type(&self) -> Option<RootType> {
        match &self.0.origin {
            EntryOrigin::Fake { root_type } | EntryOrigin::EntryList { root_type, .. } => {
                Some(*root_type)
            }
            EntryOrigin::Native | EntryOrigin::Trashed(_) => None,
        }
    }

    pub fn is_fake(&self) -> bool {
        self.fake_root_type().is_some()
    }

    pub fn is_trashed(&self) -> bool {
        matches!(self.0.origin, EntryOrigin::Trashed(_))
    }

    pub fn trash_info(&self) -> Option<&TrashInfo> {
        match &self.0.origin {
            EntryOrigin::Trashed(info) => Some(info),
            _ => None,
        }
    }

    pub fn children(&self) -> &[Entry] {
        match &self.0.origin {
            EntryOrigin::EntryList { children, .. } => children,
            _ => &[],
        }
    }

    /// URL of the containing directory, `None` for roots and synthetic entries.
    pub fn parent_url(&self) -> Option<String> {
        if self.is_fake() || self.0.full_path == "/" {
            return None;
        }
        let cut = self.0.full_path.rfind('/')?;
        let parent = if cut == 0 { "/" } else { &self.0.full_path[..cut] };
        Some(format!("{FILESYSTEM_SCHEME}{}{parent}", self.0.filesystem))
    }

    /// Child of this directory with the given name.
    pub fn child(&self, name: &str, is_directory: bool) -> Self {
        let path = if self.0.full_path == "/" {
            format!("/{name}")
        } else {
            format!("{}/{name}", self.0.full_path)
        };
        Self::build(&self.0.filesystem, &path, is_directory, EntryOrigin::Native)
    }

    pub fn key(&self) -> FileKey {
        FileKey::new(&self.0.url)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.0.url == other.0.url
    }
}

impl Eq for Entry {}

impl Hash for Entry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.url.hash(state);
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("url", &self.0.url)
            .field("dir", &self.0.is_directory)
            .finish()
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Stable identifier of a navigable location in the external store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileKey(CompactString);

impl FileKey {
    pub fn new(key: &str) -> Self {
        Self(CompactString::new(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the directory model navigates to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavTarget {
    /// A real directory on some volume.
    Directory(Entry),
    /// A synthetic root such as Recent or Trash.
    FakeRoot { root_type: RootType, entry: Entry },
    /// A synthetic root whose children are other roots.
    EntryList(Entry),
    /// A virtual listing materialized by the external store.
    StoreView(FileKey),
}

impl NavTarget {
    pub fn from_entry(entry: Entry) -> Self {
        match entry.origin() {
            EntryOrigin::Fake { root_type } => Self::FakeRoot {
                root_type: *root_type,
                entry,
            },
            EntryOrigin::EntryList { .. } => Self::EntryList(entry),
            EntryOrigin::Native | EntryOrigin::Trashed(_) => Self::Directory(entry),
        }
    }

    pub fn entry(&self) -> Option<&Entry> {
        match self {
            Self::Directory(entry) | Self::EntryList(entry) => Some(entry),
            Self::FakeRoot { entry, .. } => Some(entry),
            Self::StoreView(_) => None,
        }
    }

    pub fn key(&self) -> FileKey {
        match self {
            Self::StoreView(key) => key.clone(),
            other => other.entry().map_or_else(|| FileKey::new(""), Entry::key),
        }
    }

    pub fn fake_root_type(&self) -> Option<RootType> {
        match self {
            Self::FakeRoot { root_type, .. } => Some(*root_type),
            Self::EntryList(entry) => entry.fake_root_type(),
            Self::Directory(_) | Self::StoreView(_) => None,
        }
    }
}

impl fmt::Display for NavTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_and_names() {
        let dir = Entry::directory("downloads", "/photos/2024/");
        assert_eq!(dir.url(), "filesystem:downloads/photos/2024");
        assert_eq!(dir.name(), "2024");
        assert_eq!(dir.parent_url().as_deref(), Some("filesystem:downloads/photos"));

        let root = Entry::directory("downloads", "/");
        assert_eq!(root.url(), "filesystem:downloads/");
        assert_eq!(root.parent_url(), None);

        let top = Entry::file("downloads", "a.txt");
        assert_eq!(top.parent_url().as_deref(), Some("filesystem:downloads/"));
        assert_eq!(root.child("a.txt", false), top);
    }

    #[test]
    fn test_nav_target_classification() {
        let recent = Entry::fake(RootType::Recent, "Recent");
        let list = Entry::entry_list(RootType::MyFiles, "My files", vec![]);
        let dir = Entry::directory("drive", "/root");

        assert!(matches!(
            NavTarget::from_entry(recent.clone()),
            NavTarget::FakeRoot {
                root_type: RootType::Recent,
                ..
            }
        ));
        assert!(matches!(NavTarget::from_entry(list), NavTarget::EntryList(_)));
        assert_eq!(NavTarget::from_entry(dir.clone()), NavTarget::Directory(dir));
        assert!(recent.is_fake());
        assert_eq!(recent.parent_url(), None);
    }
}
