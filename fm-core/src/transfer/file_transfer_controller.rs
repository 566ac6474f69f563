//! # File transfer controller
//!
//! Turns clipboard and drag-and-drop gestures into IO tasks:
//!
//! * eligibility of a paste or drop target ([`can_paste_or_drop`])
//! * drop effect feedback while dragging ([`select_drop_effect`])
//! * the paste itself: resolution, sharing confirmation, the
//!   data-loss-prevention check and task dispatch
//!
//! [`can_paste_or_drop`]: FileTransferController::can_paste_or_drop
//! [`select_drop_effect`]: FileTransferController::select_drop_effect

use fm_clip::payload::{FILES, SOURCES, TAG, split_sources};
use fm_clip::{DataTransfer, DragSession, DropEffect, EffectAllowed, TransferPayload};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::metadata_cache::{MetadataCache, MetadataProperty};
use crate::config::{FeatureFlags, TransferConfig};
use crate::error::AppError;
use crate::fs::entry::{Entry, NavTarget};
use crate::fs::file_system::FileSystem;
use crate::fs::predicates::{
    is_descendant_or_same, is_non_modifiable, is_recent_root, is_trash_root, shared_drive_name,
};
use crate::fs::volume::{DriveConnectionState, VolumeManager};
use crate::model::directory_model::DirectoryModel;
use crate::services::private_api::{IoTaskParams, IoTaskType, PrivateApi};
use crate::transfer::confirmation::{ConfirmationType, TransferSharing};
use crate::transfer::paste_plan::PastePlan;
use crate::ui::delegate::{ProgressItem, Toast, UiDelegate};
use crate::util::debounce::DeadlineTimer;

pub const DLP_HELP_URL: &str = "https://support.google.com/chrome/a?p=dlp_files";

/// Keyboard modifiers held during a drag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropModifiers {
    pub shift: bool,
    pub ctrl: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasteOutcome {
    /// The destination or payload is not eligible.
    Rejected,
    /// The user declined the sharing confirmation.
    Cancelled,
    /// The policy blocked this many entries; nothing was transferred.
    Blocked { count: usize },
    /// Every source was filtered out or failed to resolve.
    NothingToDo,
    Started { task: IoTaskType, count: usize },
}

#[derive(Clone)]
pub struct TransferDeps {
    pub fs: Arc<dyn FileSystem>,
    pub api: Arc<dyn PrivateApi>,
    pub volume_manager: Arc<dyn VolumeManager>,
    pub metadata: Arc<MetadataCache>,
    pub ui: Arc<dyn UiDelegate>,
    pub directory_model: Arc<DirectoryModel>,
    pub drag: Arc<DragSession>,
    pub features: FeatureFlags,
    pub transfer: TransferConfig,
}

pub struct FileTransferController {
    deps: TransferDeps,
    clipboard: Mutex<Option<DataTransfer>>,
    hover_timer: DeadlineTimer,
    hovered_url: Mutex<Option<String>>,
}

impl fmt::Debug for FileTransferController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileTransferController")
            .field("has_clipboard", &self.clipboard.lock().is_some())
            .field("hovered_url", &*self.hovered_url.lock())
            .field("drag", &self.deps.drag)
            .finish_non_exhaustive()
    }
}

impl FileTransferController {
    pub fn new(deps: TransferDeps) -> Self {
        Self {
            deps,
            clipboard: Mutex::new(None),
            hover_timer: DeadlineTimer::new(),
            hovered_url: Mutex::new(None),
        }
    }

    fn vm(&self) -> &dyn VolumeManager {
        self.deps.volume_manager.as_ref()
    }

    fn root_url_of(&self, entry: &Entry) -> Option<String> {
        self.vm().volume_info(entry).map(|volume| volume.root_url())
    }

    /// Source URLs of `transfer`. A protected transfer falls back to the
    /// drag started in this window.
    fn source_urls(&self, transfer: &DataTransfer) -> Vec<String> {
        if let Some(sources) = transfer.get_data(SOURCES) {
            return split_sources(sources);
        }
        if transfer.is_protected()
            && let Some(payload) = self.deps.drag.payload()
        {
            return payload.source_urls;
        }
        transfer.files().to_vec()
    }

    // ------------------------------------------------------------------------
    // Eligibility
    // ------------------------------------------------------------------------

    pub fn can_paste_or_drop(&self, transfer: Option<&DataTransfer>, destination: Option<&Entry>) -> bool {
        let Some(transfer) = transfer else {
            return false;
        };
        let Some(destination) = destination else {
            return false;
        };
        let Some(location) = self.vm().location_info(destination) else {
            return false;
        };
        if location.is_read_only || is_recent_root(destination) || location.has_volume_error() {
            return false;
        }
        if !transfer.has_type(TAG) && !transfer.has_type(FILES) {
            return false;
        }

        if is_trash_root(destination) {
            return self.can_trash_selection(transfer);
        }

        let source_root = self.deps.drag.source_root_url(transfer);
        let sources = self.source_urls(transfer);
        let crosses_filesystems =
            !source_root.is_empty() && Some(&source_root) != self.root_url_of(destination).as_ref();
        if crosses_filesystems {
            if self.deps.drag.missing_file_contents(transfer) {
                debug!("Drop rejected: file contents unavailable");
                return false;
            }
            if self.deps.drag.encrypted(transfer) {
                debug!("Drop rejected: encrypted sources");
                return false;
            }
            let has_hosted = sources.iter().any(|url| {
                self.deps
                    .metadata
                    .peek_url(url)
                    .is_some_and(|m| m.is_hosted())
            });
            if has_hosted {
                debug!("Drop rejected: hosted sources leave their file system");
                return false;
            }
        }

        if sources
            .iter()
            .any(|source| is_descendant_or_same(source, destination.url()))
        {
            debug!(destination = destination.url(), "Drop rejected: destination inside a source");
            return false;
        }

        let denies_children = self
            .deps
            .metadata
            .peek_url(destination.url())
            .is_some_and(|m| m.can_add_children == Some(false));
        !denies_children
    }

    /// Whether the current selection may be sent to the trash.
    pub fn can_trash_selection(&self, transfer: &DataTransfer) -> bool {
        if !self.deps.features.trash {
            return false;
        }
        let selection = self.deps.directory_model.selected_entries();
        let source_root = self.deps.drag.source_root_url(transfer);
        self.can_trash(&selection, &source_root)
    }

    /// Same check for an explicit entry set, without the drag fallback.
    pub fn can_trash_entries(&self, entries: &[Entry]) -> bool {
        self.deps.features.trash && !entries.is_empty() && self.can_trash(entries, "")
    }

    fn can_trash(&self, entries: &[Entry], source_root_url: &str) -> bool {
        let trash_roots = self.vm().enabled_trash_volume_urls();

        if entries.is_empty() {
            return !source_root_url.is_empty() && trash_roots.iter().any(|root| root == source_root_url);
        }

        entries.iter().all(|entry| {
            !is_non_modifiable(self.vm(), entry)
                && trash_roots.iter().any(|root| entry.url().starts_with(root.as_str()))
        })
    }

    /// Cursor feedback for a drag over `destination`.
    pub fn select_drop_effect(
        &self,
        transfer: &DataTransfer,
        destination: Option<&Entry>,
        modifiers: DropModifiers,
    ) -> DropEffect {
        if !self.can_paste_or_drop(Some(transfer), destination) {
            return DropEffect::None;
        }
        let Some(destination) = destination else {
            return DropEffect::None;
        };
        if is_trash_root(destination) {
            return DropEffect::Move;
        }

        let allowed = transfer.effect_allowed;
        let source_root = self.deps.drag.source_root_url(transfer);
        let same_volume =
            !source_root.is_empty() && Some(&source_root) == self.root_url_of(destination).as_ref();

        if modifiers.shift && allowed.allows(DropEffect::Move) {
            DropEffect::Move
        } else if same_volume && !modifiers.ctrl && allowed.allows(DropEffect::Move) {
            DropEffect::Move
        } else if allowed.allows(DropEffect::Copy) {
            DropEffect::Copy
        } else if allowed.allows(DropEffect::Move) {
            DropEffect::Move
        } else {
            DropEffect::None
        }
    }

    // ------------------------------------------------------------------------
    // Clipboard
    // ------------------------------------------------------------------------

    /// Serializes `entries` into a transfer carrying the `fs/*` keys.
    pub fn format_entries(&self, entries: &[Entry], effect_allowed: EffectAllowed) -> DataTransfer {
        let metadata = self.deps.metadata.get_cache(
            entries,
            &[MetadataProperty::ContentMimeType, MetadataProperty::AvailableOffline],
        );
        let offline = self.vm().drive_connection_state() == DriveConnectionState::Offline;

        let payload = TransferPayload {
            source_urls: entries.iter().map(|e| e.url().to_string()).collect(),
            source_root_url: entries.first().and_then(|e| self.root_url_of(e)),
            effect_allowed,
            encrypted: metadata.iter().any(|m| m.is_encrypted()),
            missing_file_contents: offline
                && entries
                    .iter()
                    .zip(&metadata)
                    .any(|(e, m)| e.is_file() && m.available_offline == Some(false)),
        };

        let mut transfer = DataTransfer::new();
        payload.write_to(&mut transfer);
        transfer
    }

    pub fn can_cut_or_copy(&self, is_move: bool) -> bool {
        let selection = self.deps.directory_model.selected_entries();
        if selection.is_empty() {
            return false;
        }
        !is_move || selection.iter().all(|entry| !is_non_modifiable(self.vm(), entry))
    }

    pub fn cut(&self) -> bool {
        self.put_selection(EffectAllowed::Move)
    }

    pub fn copy(&self) -> bool {
        self.put_selection(EffectAllowed::Copy)
    }

    fn put_selection(&self, effect_allowed: EffectAllowed) -> bool {
        let is_move = effect_allowed == EffectAllowed::Move;
        if !self.can_cut_or_copy(is_move) {
            return false;
        }
        let selection = self.deps.directory_model.selected_entries();
        let transfer = self.format_entries(&selection, effect_allowed);
        info!(count = selection.len(), effect = %effect_allowed, "Selection put on clipboard");
        *self.clipboard.lock() = Some(transfer);
        true
    }

    pub fn clipboard(&self) -> Option<DataTransfer> {
        self.clipboard.lock().clone()
    }

    /// Replaces the clipboard, e.g. with content from another window.
    pub fn set_clipboard(&self, transfer: Option<DataTransfer>) {
        *self.clipboard.lock() = transfer;
    }

    pub fn can_paste(&self, destination: Option<&Entry>) -> bool {
        let clipboard = self.clipboard();
        let current = self.deps.directory_model.current_entry();
        self.can_paste_or_drop(clipboard.as_ref(), destination.or(current.as_ref()))
    }

    /// Pastes the clipboard into `destination`, or the current directory.
    pub async fn paste(&self, destination: Option<Entry>) -> Result<PasteOutcome, AppError> {
        let Some(transfer) = self.clipboard() else {
            return Ok(PasteOutcome::Rejected);
        };
        let Some(destination) = destination.or_else(|| self.deps.directory_model.current_entry()) else {
            return Ok(PasteOutcome::Rejected);
        };
        if !self.can_paste_or_drop(Some(&transfer), Some(&destination)) {
            return Ok(PasteOutcome::Rejected);
        }

        let plan = self.prepare_paste(&transfer, destination, None)?;
        let is_move = plan.is_move;
        let outcome = self.execute_paste_if_allowed(plan).await?;

        if is_move && matches!(outcome, PasteOutcome::Started { .. }) {
            self.clipboard.lock().take();
        }
        Ok(outcome)
    }

    /// Pastes into the single selected directory.
    pub async fn paste_into_folder(&self) -> Result<PasteOutcome, AppError> {
        match self.deps.directory_model.selected_entries().as_slice() {
            [folder] if folder.is_directory() => self.paste(Some(folder.clone())).await,
            _ => Ok(PasteOutcome::Rejected),
        }
    }

    /// Builds the plan for a readable transfer. Without an explicit drop
    /// effect the payload's allowed effect decides between move and copy.
    pub fn prepare_paste(
        &self,
        transfer: &DataTransfer,
        destination: Entry,
        effect: Option<DropEffect>,
    ) -> Result<PastePlan, AppError> {
        if !transfer.has_type(TAG) {
            let is_move = effect == Some(DropEffect::Move);
            return Ok(PastePlan::new(transfer.files().to_vec(), destination, is_move));
        }
        let payload = TransferPayload::read_from(transfer)?;
        let is_move = match effect {
            Some(effect) => effect == DropEffect::Move,
            None => payload.effect_allowed == EffectAllowed::Move,
        };
        Ok(PastePlan::from_payload(&payload, destination, is_move))
    }

    /// Resolves the sources, asks for confirmation when the transfer changes
    /// sharing, then executes.
    pub async fn execute_paste_if_allowed(&self, mut plan: PastePlan) -> Result<PasteOutcome, AppError> {
        let entries = plan.resolve_entries(self.deps.fs.as_ref()).await;

        if let Some(first) = entries.first()
            && !is_trash_root(&plan.destination)
        {
            let confirmation = self.confirmation_for(first, &plan).await;
            if let Some((kind, messages)) = confirmation
                && !self.deps.ui.confirm_transfer(kind, &messages).await
            {
                info!(kind = ?kind, "Transfer declined");
                return Ok(PasteOutcome::Cancelled);
            }
        }

        self.execute_paste(&plan, entries).await
    }

    async fn confirmation_for(
        &self,
        source: &Entry,
        plan: &PastePlan,
    ) -> Option<(ConfirmationType, smallvec::SmallVec<[String; 2]>)> {
        let destination = &plan.destination;
        let on_drive = |entry: &Entry| {
            self.vm()
                .location_info(entry)
                .is_some_and(|location| location.is_drive_based)
        };

        let destination_shared = on_drive(destination)
            && self
                .deps
                .metadata
                .get(std::slice::from_ref(destination), &[MetadataProperty::Shared])
                .await
                .first()
                .is_some_and(|m| m.shared == Some(true));

        let sharing = TransferSharing {
            source_shared_drive: on_drive(source).then(|| shared_drive_name(source)).flatten(),
            destination_shared_drive: on_drive(destination)
                .then(|| shared_drive_name(destination))
                .flatten(),
            destination_name: destination.name(),
            destination_shared,
            is_move: plan.is_move,
        };
        let kind = ConfirmationType::classify(&sharing);
        kind.needs_confirmation()
            .then(|| (kind, kind.messages(&sharing)))
    }

    /// Dispatches the IO task for already resolved sources.
    pub async fn execute_paste(&self, plan: &PastePlan, entries: Vec<Entry>) -> Result<PasteOutcome, AppError> {
        for url in plan.failure_urls() {
            let name = url.rsplit('/').next().unwrap_or(url);
            self.deps
                .ui
                .update_progress(ProgressItem::error(format!("Could not find \"{name}\".")));
        }

        let destination = &plan.destination;
        let to_trash = is_trash_root(destination);

        if self.deps.features.dlp_restrictions && !to_trash && !entries.is_empty() {
            match self
                .deps
                .api
                .get_disallowed_transfers(&entries, destination, plan.is_move)
                .await
            {
                Ok(blocked) if !blocked.is_empty() => {
                    let count = blocked.len();
                    let text = if count == 1 {
                        "1 file was blocked by your administrator's policy.".to_string()
                    } else {
                        format!("{count} files were blocked by your administrator's policy.")
                    };
                    warn!(marker = "PASTE_BLOCKED", count, "Transfer blocked by policy");
                    self.deps
                        .ui
                        .show_toast(Toast::new(text).with_action("Learn more", DLP_HELP_URL));
                    return Ok(PasteOutcome::Blocked { count });
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Policy check failed"),
            }
        }

        let destination_url = destination.url().trim_end_matches('/');
        let entries: Vec<Entry> = if plan.is_move {
            entries
                .into_iter()
                .filter(|entry| entry.parent_url().as_deref().map(|u| u.trim_end_matches('/')) != Some(destination_url))
                .collect()
        } else {
            entries
        };
        if entries.is_empty() {
            debug!("Nothing left to paste");
            return Ok(PasteOutcome::NothingToDo);
        }

        let (task, params) = if to_trash {
            (IoTaskType::Trash, IoTaskParams::default())
        } else if entries.iter().all(Entry::is_trashed) {
            (IoTaskType::RestoreToDestination, IoTaskParams::to(destination.clone()))
        } else if plan.is_move {
            (IoTaskType::Move, IoTaskParams::to(destination.clone()))
        } else {
            (IoTaskType::Copy, IoTaskParams::to(destination.clone()))
        };

        self.deps.api.start_io_task(task, &entries, params)?;
        info!(%task, count = entries.len(), destination = destination.url(), "IO task started");
        Ok(PasteOutcome::Started {
            task,
            count: entries.len(),
        })
    }

    // ------------------------------------------------------------------------
    // Drag and drop
    // ------------------------------------------------------------------------

    /// Starts dragging `entries`; returns the transfer handed to the platform.
    pub fn drag_start(&self, entries: &[Entry]) -> Option<DataTransfer> {
        if entries.is_empty() {
            return None;
        }
        let any_fixed = entries.iter().any(|e| is_non_modifiable(self.vm(), e));
        let effect_allowed = if any_fixed {
            EffectAllowed::Copy
        } else {
            EffectAllowed::CopyMove
        };
        let transfer = self.format_entries(entries, effect_allowed);
        let payload = TransferPayload::read_from(&transfer).ok()?;
        self.deps.drag.start(payload);
        Some(transfer)
    }

    /// Drag over `destination`; arms hover navigation for directories.
    pub fn drag_over(
        &self,
        transfer: &DataTransfer,
        destination: Option<&Entry>,
        modifiers: DropModifiers,
    ) -> DropEffect {
        match destination {
            Some(dir) if dir.is_directory() => self.arm_hover(dir),
            _ => self.drag_leave(),
        }
        self.select_drop_effect(transfer, destination, modifiers)
    }

    fn arm_hover(&self, dir: &Entry) {
        {
            let mut hovered = self.hovered_url.lock();
            if hovered.as_deref() == Some(dir.url()) {
                return;
            }
            *hovered = Some(dir.url().to_string());
        }

        let model = Arc::downgrade(&self.deps.directory_model);
        let target = dir.clone();
        self.hover_timer
            .schedule_replace(self.deps.transfer.hover_navigation_delay, move || {
                if let Some(model) = model.upgrade()
                    && model.current_entry().as_ref() != Some(&target)
                {
                    debug!(url = target.url(), "Hover navigation");
                    drop(model.change_directory_entry(NavTarget::from_entry(target)));
                }
            });
    }

    pub fn drag_leave(&self) {
        self.hover_timer.cancel();
        self.hovered_url.lock().take();
    }

    /// Drop onto `destination` with a readable transfer.
    pub async fn drop(
        &self,
        transfer: &DataTransfer,
        destination: Option<Entry>,
        modifiers: DropModifiers,
    ) -> Result<PasteOutcome, AppError> {
        self.drag_leave();
        let effect = self.select_drop_effect(transfer, destination.as_ref(), modifiers);
        let Some(destination) = destination.filter(|_| effect != DropEffect::None) else {
            return Ok(PasteOutcome::Rejected);
        };
        let plan = self.prepare_paste(transfer, destination, Some(effect))?;
        self.execute_paste_if_allowed(plan).await
    }

    pub fn drag_end(&self) {
        self.drag_leave();
        self.deps.drag.end();
    }
}
