//! Host services the core drives but does not implement: IO tasks, Drive
//! pinning and search, recent files, guest mounts, provider actions and the
//! data-loss-prevention policy.

use async_trait::async_trait;
use compact_str::CompactString;
use std::fmt;

use crate::error::{AppError, FsError};
use crate::fs::entry::Entry;
use crate::fs::file_system::FileCategory;

/// Long-running operations executed by the host's task queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoTaskType {
    Copy,
    Move,
    Delete,
    Trash,
    Restore,
    RestoreToDestination,
    EmptyTrash,
    Zip,
}

impl IoTaskType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Move => "move",
            Self::Delete => "delete",
            Self::Trash => "trash",
            Self::Restore => "restore",
            Self::RestoreToDestination => "restore_to_destination",
            Self::EmptyTrash => "empty_trash",
            Self::Zip => "zip",
        }
    }
}

impl fmt::Display for IoTaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IoTaskParams {
    pub destination: Option<Entry>,
}

impl IoTaskParams {
    pub fn to(destination: Entry) -> Self {
        Self {
            destination: Some(destination),
        }
    }
}

/// Action a file-system provider offers for a set of entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomActionInfo {
    pub id: CompactString,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceRestriction {
    #[default]
    AnySource,
    NativeSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecentQuery {
    pub restriction: SourceRestriction,
    pub query: String,
    pub cutoff_days: u32,
    pub category: FileCategory,
    pub invalidate_cache: bool,
}

/// Drive views answered from the metadata database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriveSearchType {
    All,
    SharedWithMe,
    Offline,
    ExcludeDirectories,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveSearchQuery {
    pub query: String,
    pub search_type: DriveSearchType,
    pub category: FileCategory,
    pub max_results: usize,
}

/// Guest environment whose files become available after mounting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GuestTarget {
    Crostini,
    GuestOs { vm_name: CompactString },
}

/// Host-side services. Every call may fail; failures are reported, never
/// panicked on.
#[async_trait]
pub trait PrivateApi: Send + Sync {
    /// Queues a task and returns once it is dispatched.
    fn start_io_task(
        &self,
        task: IoTaskType,
        entries: &[Entry],
        params: IoTaskParams,
    ) -> Result<(), AppError>;

    async fn pin_drive_file(&self, entry: &Entry, pin: bool) -> Result<(), FsError>;

    async fn get_custom_actions(&self, entries: &[Entry]) -> Result<Vec<CustomActionInfo>, AppError>;

    async fn execute_custom_action(&self, entries: &[Entry], action_id: &str) -> Result<(), AppError>;

    async fn get_recent_files(&self, query: &RecentQuery) -> Result<Vec<Entry>, FsError>;

    async fn search_drive_metadata(&self, query: &DriveSearchQuery) -> Result<Vec<Entry>, FsError>;

    /// Mounts the guest; failures are reported as `GuestConnection` errors.
    async fn mount_guest(&self, guest: &GuestTarget) -> Result<(), FsError>;

    /// Entries the policy forbids moving or copying to `destination`.
    async fn get_disallowed_transfers(
        &self,
        entries: &[Entry],
        destination: &Entry,
        is_move: bool,
    ) -> Result<Vec<Entry>, AppError>;

    /// Asks Drive to refresh pin state of hosted documents.
    fn poll_hosted_pin_states(&self);

    async fn remove_mount(&self, volume_id: &str) -> Result<(), AppError>;
}
