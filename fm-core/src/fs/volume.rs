//! Volumes and location classification.
//!
//! [`VolumeManager`] is the read side the models depend on. The concrete
//! [`StaticVolumeManager`] keeps the mounted volumes in memory, derives
//! [`LocationInfo`] from entry paths and broadcasts list changes.

use compact_str::CompactString;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::fs::entry::{Entry, FILESYSTEM_SCHEME, RootType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeType {
    Downloads,
    Drive,
    Removable,
    Archive,
    Provided,
    Mtp,
    MediaView,
    Crostini,
    GuestOs,
    Android,
    DocumentsProvider,
    Smb,
}

impl VolumeType {
    /// Root type of entries on a volume of this type that is not Drive.
    pub const fn root_type(self) -> RootType {
        match self {
            Self::Downloads => RootType::Downloads,
            Self::Drive => RootType::Drive,
            Self::Removable => RootType::Removable,
            Self::Archive => RootType::Archive,
            Self::Provided => RootType::Provided,
            Self::Mtp => RootType::Mtp,
            Self::MediaView => RootType::MediaView,
            Self::Crostini => RootType::Crostini,
            Self::GuestOs => RootType::GuestOs,
            Self::Android => RootType::Android,
            Self::DocumentsProvider => RootType::DocumentsProvider,
            Self::Smb => RootType::Smb,
        }
    }

    /// Volumes whose provider exposes custom actions.
    pub const fn supports_custom_actions(self) -> bool {
        matches!(self, Self::Provided)
    }

    /// Volumes the user can eject or unmount.
    pub const fn is_unmountable(self) -> bool {
        matches!(self, Self::Removable | Self::Archive | Self::Provided | Self::Smb | Self::Mtp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    pub volume_id: CompactString,
    pub volume_type: VolumeType,
    /// File system name carried by the volume's entries
    pub filesystem: CompactString,
    pub label: String,
    pub is_read_only: bool,
    /// Mount error, if the volume is unusable
    pub error: Option<String>,
    pub trash_enabled: bool,
    /// On-disk format of removable media (`vfat`, `exfat`, `ntfs`, ...)
    pub disk_fs_type: Option<CompactString>,
    pub provider_id: Option<CompactString>,
}

impl VolumeInfo {
    pub fn new(volume_id: &str, volume_type: VolumeType, filesystem: &str, label: &str) -> Self {
        Self {
            volume_id: CompactString::new(volume_id),
            volume_type,
            filesystem: CompactString::new(filesystem),
            label: label.to_string(),
            is_read_only: false,
            error: None,
            trash_enabled: false,
            disk_fs_type: None,
            provider_id: None,
        }
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.is_read_only = true;
        self
    }

    #[must_use]
    pub fn with_trash(mut self) -> Self {
        self.trash_enabled = true;
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    #[must_use]
    pub fn with_disk_fs_type(mut self, fs_type: &str) -> Self {
        self.disk_fs_type = Some(CompactString::new(fs_type));
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider_id: &str) -> Self {
        self.provider_id = Some(CompactString::new(provider_id));
        self
    }

    pub fn root_url(&self) -> String {
        format!("{FILESYSTEM_SCHEME}{}/", self.filesystem)
    }

    /// Directory shown when the volume is opened.
    pub fn display_root(&self) -> Entry {
        match self.volume_type {
            VolumeType::Drive => Entry::directory(&self.filesystem, "/root"),
            _ => Entry::directory(&self.filesystem, "/"),
        }
    }
}

/// Where an entry sits within its volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationInfo {
    /// `None` for synthetic roots.
    pub volume: Option<Arc<VolumeInfo>>,
    pub root_type: RootType,
    pub is_root_entry: bool,
    pub is_read_only: bool,
    pub is_drive_based: bool,
    pub is_special_search_root: bool,
}

impl LocationInfo {
    pub fn volume_root_url(&self) -> String {
        self.volume
            .as_ref()
            .map(|volume| volume.root_url())
            .unwrap_or_default()
    }

    pub fn has_volume_error(&self) -> bool {
        self.volume.as_ref().is_some_and(|v| v.error.is_some())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriveConnectionState {
    #[default]
    Online,
    Metered,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeEvent {
    Mounted(CompactString),
    Unmounted(CompactString),
    DriveConnectionChanged(DriveConnectionState),
}

/// Read-only view of mounted volumes.
pub trait VolumeManager: Send + Sync {
    fn volume_info(&self, entry: &Entry) -> Option<Arc<VolumeInfo>>;

    fn location_info(&self, entry: &Entry) -> Option<LocationInfo>;

    fn volume_list(&self) -> Vec<Arc<VolumeInfo>>;

    fn drive_connection_state(&self) -> DriveConnectionState;

    /// Directory to fall back to when the current one disappears.
    fn default_display_root(&self) -> Option<Entry>;

    /// Synthetic roots currently shown in the navigation list.
    fn fake_entries(&self) -> Vec<Entry> {
        Vec::new()
    }

    /// Root URLs of volumes that support trash.
    fn enabled_trash_volume_urls(&self) -> Vec<String> {
        self.volume_list()
            .iter()
            .filter(|volume| volume.trash_enabled)
            .map(|volume| volume.root_url())
            .collect()
    }

    /// True when every entry resolves to the same volume.
    fn is_same_volume(&self, entries: &[Entry]) -> bool {
        let mut ids = entries
            .iter()
            .map(|entry| self.volume_info(entry).map(|v| v.volume_id.clone()));
        match ids.next() {
            Some(Some(first)) => ids.all(|id| id.as_ref() == Some(&first)),
            _ => false,
        }
    }
}

/// In-memory volume registry.
#[derive(Debug)]
pub struct StaticVolumeManager {
    volumes: RwLock<Vec<Arc<VolumeInfo>>>,
    fake_entries: RwLock<Vec<Entry>>,
    connection: RwLock<DriveConnectionState>,
    events: broadcast::Sender<VolumeEvent>,
}

impl Default for StaticVolumeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticVolumeManager {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            volumes: RwLock::new(Vec::new()),
            fake_entries: RwLock::new(Vec::new()),
            connection: RwLock::new(DriveConnectionState::Online),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VolumeEvent> {
        self.events.subscribe()
    }

    pub fn mount(&self, info: VolumeInfo) -> Arc<VolumeInfo> {
        let info = Arc::new(info);
        {
            let mut volumes = self.volumes.write();
            volumes.retain(|v| v.volume_id != info.volume_id);
            volumes.push(info.clone());
        }
        info!(marker = "VOLUME_MOUNTED", volume_id = %info.volume_id, "Volume mounted");
        let _ = self.events.send(VolumeEvent::Mounted(info.volume_id.clone()));
        info
    }

    pub fn unmount(&self, volume_id: &str) -> Option<Arc<VolumeInfo>> {
        let removed = {
            let mut volumes = self.volumes.write();
            let index = volumes.iter().position(|v| v.volume_id == volume_id)?;
            volumes.remove(index)
        };
        info!(marker = "VOLUME_UNMOUNTED", volume_id, "Volume unmounted");
        let _ = self
            .events
            .send(VolumeEvent::Unmounted(removed.volume_id.clone()));
        Some(removed)
    }

    pub fn add_fake_entry(&self, entry: Entry) {
        self.fake_entries.write().push(entry);
    }

    pub fn set_drive_connection_state(&self, state: DriveConnectionState) {
        *self.connection.write() = state;
        debug!(?state, "Drive connection state changed");
        let _ = self.events.send(VolumeEvent::DriveConnectionChanged(state));
    }
}

/// Classifies a path inside the Drive volume.
fn drive_location(path: &str) -> (RootType, bool) {
    let mut parts = path.trim_start_matches('/').split('/');
    let first = parts.next().unwrap_or("");
    let depth = parts.filter(|p| !p.is_empty()).count();

    match first {
        "" => (RootType::Drive, true),
        "root" => (RootType::Drive, depth == 0),
        "team_drives" if depth == 0 => (RootType::SharedDrivesGrandRoot, true),
        "team_drives" => (RootType::SharedDrive, depth == 1),
        "Computers" if depth == 0 => (RootType::ComputersGrandRoot, true),
        "Computers" => (RootType::Computer, depth == 1),
        ".files-by-id" | ".shortcut-targets-by-id" => (RootType::DriveSharedWithMe, false),
        _ => (RootType::Drive, false),
    }
}

impl VolumeManager for StaticVolumeManager {
    fn volume_info(&self, entry: &Entry) -> Option<Arc<VolumeInfo>> {
        if entry.is_fake() {
            return None;
        }
        self.volumes
            .read()
            .iter()
            .find(|v| v.filesystem == entry.filesystem_name())
            .cloned()
    }

    fn location_info(&self, entry: &Entry) -> Option<LocationInfo> {
        if let Some(root_type) = entry.fake_root_type() {
            return Some(LocationInfo {
                volume: None,
                root_type,
                is_root_entry: true,
                is_read_only: !matches!(root_type, RootType::Trash | RootType::MyFiles),
                is_drive_based: root_type.is_drive(),
                is_special_search_root: root_type.is_special_search_root(),
            });
        }

        let volume = self.volume_info(entry)?;
        let path = entry.full_path();
        let is_drive = volume.volume_type == VolumeType::Drive;
        let (root_type, is_root_entry) = if is_drive {
            drive_location(path)
        } else {
            (volume.volume_type.root_type(), path == "/")
        };

        let is_read_only = volume.is_read_only
            || matches!(
                root_type,
                RootType::SharedDrivesGrandRoot
                    | RootType::ComputersGrandRoot
                    | RootType::DriveSharedWithMe
            )
            || (is_drive && path == "/");

        Some(LocationInfo {
            volume: Some(volume),
            root_type,
            is_root_entry,
            is_read_only,
            is_drive_based: is_drive,
            is_special_search_root: root_type.is_special_search_root(),
        })
    }

    fn volume_list(&self) -> Vec<Arc<VolumeInfo>> {
        self.volumes.read().clone()
    }

    fn drive_connection_state(&self) -> DriveConnectionState {
        *self.connection.read()
    }

    fn default_display_root(&self) -> Option<Entry> {
        self.volumes
            .read()
            .iter()
            .find(|v| v.volume_type == VolumeType::Downloads)
            .map(|v| v.display_root())
    }

    fn fake_entries(&self) -> Vec<Entry> {
        self.fake_entries.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> StaticVolumeManager {
        let vm = StaticVolumeManager::new();
        vm.mount(VolumeInfo::new("downloads", VolumeType::Downloads, "downloads", "My files").with_trash());
        vm.mount(VolumeInfo::new("drive", VolumeType::Drive, "drive", "Google Drive"));
        vm.mount(VolumeInfo::new("usb", VolumeType::Removable, "usb", "USB").read_only());
        vm
    }

    #[test]
    fn test_drive_locations() {
        let vm = manager();

        let grand = vm.location_info(&Entry::directory("drive", "/team_drives")).unwrap();
        assert_eq!(grand.root_type, RootType::SharedDrivesGrandRoot);
        assert!(grand.is_root_entry && grand.is_read_only);

        let team = vm.location_info(&Entry::directory("drive", "/team_drives/Eng")).unwrap();
        assert_eq!(team.root_type, RootType::SharedDrive);
        assert!(team.is_root_entry && !team.is_read_only && team.is_drive_based);

        let nested = vm.location_info(&Entry::file("drive", "/team_drives/Eng/doc")).unwrap();
        assert!(!nested.is_root_entry);

        let my_drive = vm.location_info(&Entry::directory("drive", "/root")).unwrap();
        assert_eq!(my_drive.root_type, RootType::Drive);
        assert!(my_drive.is_root_entry);
    }

    #[test]
    fn test_fake_and_unknown_entries() {
        let vm = manager();

        let recent = vm.location_info(&Entry::fake(RootType::Recent, "Recent")).unwrap();
        assert!(recent.volume.is_none() && recent.is_read_only);

        let trash = vm.location_info(&Entry::fake(RootType::Trash, "Trash")).unwrap();
        assert!(!trash.is_read_only);

        assert!(vm.location_info(&Entry::file("gone", "/x")).is_none());
    }

    #[test]
    fn test_volume_queries() {
        let vm = manager();
        let a = Entry::file("downloads", "/a");
        let b = Entry::file("downloads", "/b");
        let c = Entry::file("drive", "/root/c");

        assert!(vm.is_same_volume(&[a.clone(), b]));
        assert!(!vm.is_same_volume(&[a, c]));
        assert!(!vm.is_same_volume(&[]));
        assert_eq!(vm.enabled_trash_volume_urls(), vec!["filesystem:downloads/"]);
        assert_eq!(
            vm.default_display_root().map(|e| e.url().to_string()),
            Some("filesystem:downloads/".to_string())
        );
        assert!(vm.location_info(&Entry::file("usb", "/x")).unwrap().is_read_only);
    }

    #[tokio::test]
    async fn test_unmount_broadcasts() {
        let vm = manager();
        let mut rx = vm.subscribe();

        assert!(vm.unmount("usb").is_some());
        assert_eq!(rx.recv().await.unwrap(), VolumeEvent::Unmounted("usb".into()));
        assert!(vm.unmount("usb").is_none());
    }
}
