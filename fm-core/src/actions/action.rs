//! Action identifiers, the [`Action`] trait and invalidation plumbing.

use async_trait::async_trait;
use compact_str::CompactString;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::broadcast;

use crate::error::AppError;

/// Actions with built-in semantics that providers may also supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommonActionId {
    Share,
    SaveForOffline,
    OfflineNotNecessary,
}

impl CommonActionId {
    pub const ALL: [Self; 3] = [Self::Share, Self::SaveForOffline, Self::OfflineNotNecessary];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Share => "SHARE",
            Self::SaveForOffline => "SAVE_FOR_OFFLINE",
            Self::OfflineNotNecessary => "OFFLINE_NOT_NECESSARY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InternalActionId {
    ManageInDrive,
    CreateFolderShortcut,
    RemoveFolderShortcut,
}

impl InternalActionId {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ManageInDrive => "MANAGE_IN_DRIVE",
            Self::CreateFolderShortcut => "CREATE_FOLDER_SHORTCUT",
            Self::RemoveFolderShortcut => "REMOVE_FOLDER_SHORTCUT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionId {
    Common(CommonActionId),
    Internal(InternalActionId),
    Custom(CompactString),
}

impl ActionId {
    /// Provider ids that name a common action map onto it.
    pub fn from_provider(id: &str) -> Self {
        CommonActionId::ALL
            .into_iter()
            .find(|common| common.as_str() == id)
            .map_or_else(|| Self::Custom(CompactString::new(id)), Self::Common)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Common(id) => id.as_str(),
            Self::Internal(id) => id.as_str(),
            Self::Custom(id) => id.as_str(),
        }
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation bound to a concrete entry set.
#[async_trait]
pub trait Action: Send + Sync + fmt::Debug {
    fn id(&self) -> ActionId;

    fn title(&self) -> Option<String> {
        None
    }

    fn can_execute(&self) -> bool;

    async fn execute(&self) -> Result<(), AppError>;
}

/// Tells the owning model that its action set may be stale.
#[derive(Debug, Clone)]
pub struct Invalidator {
    inner: Arc<InvalidatorInner>,
}

#[derive(Debug)]
struct InvalidatorInner {
    invalidated: AtomicBool,
    count: AtomicUsize,
    tx: broadcast::Sender<()>,
}

impl Default for Invalidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Invalidator {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(InvalidatorInner {
                invalidated: AtomicBool::new(false),
                count: AtomicUsize::new(0),
                tx,
            }),
        }
    }

    pub fn invalidate(&self) {
        self.inner.invalidated.store(true, Ordering::Release);
        self.inner.count.fetch_add(1, Ordering::AcqRel);
        let _ = self.inner.tx.send(());
    }

    pub fn is_invalidated(&self) -> bool {
        self.inner.invalidated.load(Ordering::Acquire)
    }

    pub fn count(&self) -> usize {
        self.inner.count.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.inner.tx.subscribe()
    }
}
