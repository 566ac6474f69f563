//! Built-in actions for Drive entries: share, offline pinning, opening in
//! the Drive web UI and folder shortcuts.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::actions::action::{Action, ActionId, CommonActionId, InternalActionId, Invalidator};
use crate::actions::actions_model::ActionsDeps;
use crate::cache::metadata_cache::{DRIVE_PROPERTIES, MetadataProperty};
use crate::error::AppError;
use crate::fs::entry::Entry;
use crate::fs::predicates::{is_grand_root, should_show_menu_items};
use crate::fs::volume::DriveConnectionState;

pub const METRIC_PIN_FILE: &str = "DrivePinFile";
pub const METRIC_PIN_HOSTED_FILE: &str = "DrivePinHostedFile";
pub const METRIC_UNPIN_FILE: &str = "DriveUnpinFile";

fn is_offline(deps: &ActionsDeps) -> bool {
    deps.volume_manager.drive_connection_state() == DriveConnectionState::Offline
}

/// Opens the Drive sharing dialog for a single entry.
#[derive(Debug)]
pub struct DriveShareAction {
    entry: Entry,
    deps: ActionsDeps,
}

impl DriveShareAction {
    pub fn create(entries: &[Entry], deps: &ActionsDeps) -> Option<Self> {
        let [entry] = entries else {
            return None;
        };
        if !should_show_menu_items(deps.volume_manager.as_ref(), entry) {
            return None;
        }
        Some(Self {
            entry: entry.clone(),
            deps: deps.clone(),
        })
    }
}

#[async_trait]
impl Action for DriveShareAction {
    fn id(&self) -> ActionId {
        ActionId::Common(CommonActionId::Share)
    }

    fn can_execute(&self) -> bool {
        if is_offline(&self.deps) {
            return false;
        }
        let metadata = self
            .deps
            .metadata
            .get_cache(std::slice::from_ref(&self.entry), &[MetadataProperty::CanShare]);
        metadata.first().is_none_or(|m| m.can_share != Some(false))
    }

    async fn execute(&self) -> Result<(), AppError> {
        let metadata = self
            .deps
            .metadata
            .get(
                std::slice::from_ref(&self.entry),
                &[MetadataProperty::ShareUrl, MetadataProperty::AlternateUrl],
            )
            .await;
        let url = metadata
            .into_iter()
            .next()
            .and_then(|m| m.share_url.or(m.alternate_url));

        match url {
            Some(url) => self.deps.ui.open_url(&url),
            None => {
                warn!(url = self.entry.url(), "No share URL for entry");
                self.deps.ui.alert("Sharing this item is not available right now.");
            }
        }
        Ok(())
    }
}

/// Pins (`SAVE_FOR_OFFLINE`) or unpins (`OFFLINE_NOT_NECESSARY`) entries.
#[derive(Debug)]
pub struct DriveToggleOfflineAction {
    entries: Vec<Entry>,
    eligible: Vec<Entry>,
    pin: bool,
    deps: ActionsDeps,
    invalidator: Invalidator,
}

impl DriveToggleOfflineAction {
    /// `None` when no selected entry can be pinned. Whether the action pins
    /// or unpins follows from the current pin state of the eligible entries.
    pub fn create(entries: &[Entry], deps: &ActionsDeps, invalidator: &Invalidator) -> Option<Self> {
        let metadata = deps.metadata.get_cache(entries, DRIVE_PROPERTIES);
        let eligible: Vec<(Entry, bool)> = entries
            .iter()
            .zip(&metadata)
            .filter(|(_, m)| m.can_pin == Some(true))
            .map(|(entry, m)| (entry.clone(), m.is_pinned()))
            .collect();

        if eligible.is_empty() {
            return None;
        }

        let pin = !eligible.iter().all(|(_, pinned)| *pinned);
        Some(Self {
            entries: entries.to_vec(),
            eligible: eligible.into_iter().map(|(entry, _)| entry).collect(),
            pin,
            deps: deps.clone(),
            invalidator: invalidator.clone(),
        })
    }

    pub fn is_pin(&self) -> bool {
        self.pin
    }

    /// Entries the action would pin or unpin right now.
    pub fn targets(&self) -> Vec<Entry> {
        if !self.pin || self.deps.features.hosted_file_pinning {
            return self.eligible.clone();
        }
        let metadata = self.deps.metadata.get_cache(&self.eligible, DRIVE_PROPERTIES);
        self.eligible
            .iter()
            .zip(&metadata)
            .filter(|(_, m)| !m.is_hosted())
            .map(|(entry, _)| entry.clone())
            .collect()
    }
}

#[async_trait]
impl Action for DriveToggleOfflineAction {
    fn id(&self) -> ActionId {
        if self.pin {
            ActionId::Common(CommonActionId::SaveForOffline)
        } else {
            ActionId::Common(CommonActionId::OfflineNotNecessary)
        }
    }

    fn can_execute(&self) -> bool {
        if !self.pin {
            return true;
        }
        let metadata = self.deps.metadata.get_cache(&self.entries, DRIVE_PROPERTIES);
        let all_unpinnable_hosted = metadata
            .iter()
            .all(|m| m.is_hosted() && m.can_pin != Some(true));
        let any_plain = metadata.iter().any(|m| !m.is_hosted());

        !all_unpinnable_hosted && (self.deps.features.hosted_file_pinning || any_plain)
    }

    async fn execute(&self) -> Result<(), AppError> {
        let targets = self.targets();
        let metadata = self.deps.metadata.get_cache(&targets, DRIVE_PROPERTIES);

        for (entry, m) in targets.iter().zip(&metadata) {
            match self.deps.api.pin_drive_file(entry, self.pin).await {
                Ok(()) => {
                    let metric = match (self.pin, m.is_hosted()) {
                        (true, true) => METRIC_PIN_HOSTED_FILE,
                        (true, false) => METRIC_PIN_FILE,
                        (false, _) => METRIC_UNPIN_FILE,
                    };
                    self.deps.metrics.record(metric);
                }
                Err(e) => {
                    warn!(url = entry.url(), pin = self.pin, error = %e, "Pin toggle failed");
                }
            }
        }

        debug!(count = targets.len(), pin = self.pin, "Offline state toggled");
        self.deps.metadata.notify_entries_changed(&targets);
        self.deps.ui.refresh_list();
        self.invalidator.invalidate();
        Ok(())
    }
}

/// Opens the entry in the Drive web UI.
#[derive(Debug)]
pub struct DriveManageAction {
    entry: Entry,
    deps: ActionsDeps,
}

impl DriveManageAction {
    /// Shared drive roots keep this action although other roots do not.
    pub fn create(entries: &[Entry], deps: &ActionsDeps) -> Option<Self> {
        let [entry] = entries else {
            return None;
        };
        if !should_show_menu_items(deps.volume_manager.as_ref(), entry) {
            return None;
        }
        Some(Self {
            entry: entry.clone(),
            deps: deps.clone(),
        })
    }
}

#[async_trait]
impl Action for DriveManageAction {
    fn id(&self) -> ActionId {
        ActionId::Internal(InternalActionId::ManageInDrive)
    }

    fn can_execute(&self) -> bool {
        !is_offline(&self.deps)
    }

    async fn execute(&self) -> Result<(), AppError> {
        let metadata = self
            .deps
            .metadata
            .get(std::slice::from_ref(&self.entry), &[MetadataProperty::AlternateUrl])
            .await;
        match metadata.into_iter().next().and_then(|m| m.alternate_url) {
            Some(url) => self.deps.ui.open_url(&url),
            None => self.deps.ui.alert("This item cannot be opened in Drive."),
        }
        Ok(())
    }
}

/// Adds or removes a folder shortcut for one directory.
#[derive(Debug)]
pub struct FolderShortcutAction {
    entry: Entry,
    create: bool,
    deps: ActionsDeps,
    invalidator: Invalidator,
}

impl FolderShortcutAction {
    pub fn create(entries: &[Entry], deps: &ActionsDeps, invalidator: &Invalidator) -> Option<Self> {
        let [entry] = entries else {
            return None;
        };
        if !entry.is_directory() || entry.is_fake() || is_grand_root(entry) {
            return None;
        }
        Some(Self {
            entry: entry.clone(),
            create: !deps.shortcuts.exists(entry),
            deps: deps.clone(),
            invalidator: invalidator.clone(),
        })
    }
}

#[async_trait]
impl Action for FolderShortcutAction {
    fn id(&self) -> ActionId {
        if self.create {
            ActionId::Internal(InternalActionId::CreateFolderShortcut)
        } else {
            ActionId::Internal(InternalActionId::RemoveFolderShortcut)
        }
    }

    fn can_execute(&self) -> bool {
        self.deps.shortcuts.exists(&self.entry) != self.create
    }

    async fn execute(&self) -> Result<(), AppError> {
        if self.create {
            self.deps.shortcuts.add(&self.entry);
        } else {
            self.deps.shortcuts.remove(&self.entry);
        }
        self.invalidator.invalidate();
        Ok(())
    }
}
