//! # Commands
//!
//! Every user-invokable operation is a [`Command`] registered under a
//! stable id in a table built once at startup. Availability is answered
//! synchronously from current state; execution is async.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::actions::action::{ActionId, CommonActionId, InternalActionId};
use crate::actions::actions_controller::ActionsController;
use crate::config::FeatureFlags;
use crate::error::AppError;
use crate::fs::entry::{Entry, RootType};
use crate::fs::file_name::validate_new_name;
use crate::fs::file_system::FileSystem;
use crate::fs::predicates::{is_non_modifiable, is_trash_root};
use crate::fs::volume::VolumeManager;
use crate::model::directory_model::DirectoryModel;
use crate::services::private_api::{IoTaskParams, IoTaskType, PrivateApi};
use crate::transfer::file_transfer_controller::FileTransferController;
use crate::ui::delegate::UiDelegate;

pub const DEFAULT_FOLDER_NAME: &str = "New folder";

/// Everything a command may touch.
#[derive(Clone)]
pub struct CommandContext {
    pub directory_model: Arc<DirectoryModel>,
    pub transfer: Arc<FileTransferController>,
    pub actions: Arc<ActionsController>,
    pub fs: Arc<dyn FileSystem>,
    pub api: Arc<dyn PrivateApi>,
    pub volume_manager: Arc<dyn VolumeManager>,
    pub ui: Arc<dyn UiDelegate>,
    pub features: FeatureFlags,
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("transfer", &self.transfer)
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

impl CommandContext {
    fn selection(&self) -> Vec<Entry> {
        self.directory_model.selected_entries()
    }

    fn current_dir_writable(&self) -> Option<Entry> {
        let current = self.directory_model.current_entry()?;
        let location = self.volume_manager.location_info(&current)?;
        (!location.is_read_only && !current.is_fake() && !self.directory_model.is_searching())
            .then_some(current)
    }

    fn all_modifiable(&self, entries: &[Entry]) -> bool {
        !entries.is_empty()
            && entries.iter().all(|entry| {
                !is_non_modifiable(self.volume_manager.as_ref(), entry)
                    && self
                        .volume_manager
                        .location_info(entry)
                        .is_some_and(|location| !location.is_read_only)
            })
    }
}

#[async_trait]
pub trait Command: Send + Sync {
    fn can_execute(&self, ctx: &CommandContext) -> bool;

    async fn execute(&self, ctx: &CommandContext) -> Result<(), AppError>;
}

// ----------------------------------------------------------------------------
// File operations
// ----------------------------------------------------------------------------

struct NewFolder;

#[async_trait]
impl Command for NewFolder {
    fn can_execute(&self, ctx: &CommandContext) -> bool {
        ctx.current_dir_writable().is_some()
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<(), AppError> {
        let Some(parent) = ctx.current_dir_writable() else {
            return Ok(());
        };

        let mut name = DEFAULT_FOLDER_NAME.to_string();
        let mut suffix = 1;
        while ctx.fs.resolve_child(&parent, &name).await.is_ok() {
            name = format!("{DEFAULT_FOLDER_NAME} ({suffix})");
            suffix += 1;
        }

        let created = ctx.fs.create_directory(&parent, &name).await?;
        info!(url = created.url(), "Folder created");
        ctx.directory_model.add_and_select_entry(created).await;
        Ok(())
    }
}

struct Rename;

#[async_trait]
impl Command for Rename {
    fn can_execute(&self, ctx: &CommandContext) -> bool {
        let selection = ctx.selection();
        selection.len() == 1 && ctx.all_modifiable(&selection)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<(), AppError> {
        let [entry]: [Entry; 1] = ctx
            .selection()
            .try_into()
            .map_err(|_| AppError::CommandDisabled("rename".to_string()))?;
        let Some(new_name) = ctx.ui.prompt_name("Rename", entry.name()).await else {
            return Ok(());
        };
        let new_name = new_name.trim();
        if new_name == entry.name() {
            return Ok(());
        }

        let parent = entry
            .parent_url()
            .ok_or_else(|| AppError::not_found(entry.url()))?;
        let parent = ctx.fs.resolve_url(&parent).await?;
        let disk_fs_type = ctx
            .volume_manager
            .volume_info(&entry)
            .and_then(|volume| volume.disk_fs_type.clone());

        if let Err(e) = validate_new_name(ctx.fs.as_ref(), &parent, new_name, disk_fs_type.as_deref()).await {
            warn!(name = new_name, error = %e, "Rename rejected");
            ctx.ui.alert(&e.to_string());
            return Ok(());
        }

        let renamed = ctx.fs.rename(&entry, new_name).await?;
        ctx.directory_model.on_rename_entry(&entry, renamed).await;
        Ok(())
    }
}

struct Delete;

#[async_trait]
impl Command for Delete {
    fn can_execute(&self, ctx: &CommandContext) -> bool {
        ctx.all_modifiable(&ctx.selection())
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<(), AppError> {
        let selection = ctx.selection();
        let message = match selection.as_slice() {
            [entry] => format!("Are you sure you want to delete \"{}\"?", entry.name()),
            entries => format!("Are you sure you want to delete {} items?", entries.len()),
        };
        if !ctx.ui.confirm(&message).await {
            return Ok(());
        }
        ctx.api
            .start_io_task(IoTaskType::Delete, &selection, IoTaskParams::default())
    }
}

struct MoveToTrash;

#[async_trait]
impl Command for MoveToTrash {
    fn can_execute(&self, ctx: &CommandContext) -> bool {
        let selection = ctx.selection();
        ctx.all_modifiable(&selection) && ctx.transfer.can_trash_entries(&selection)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<(), AppError> {
        let selection = ctx.selection();
        ctx.api
            .start_io_task(IoTaskType::Trash, &selection, IoTaskParams::default())
    }
}

struct Restore;

#[async_trait]
impl Command for Restore {
    fn can_execute(&self, ctx: &CommandContext) -> bool {
        let selection = ctx.selection();
        !selection.is_empty() && selection.iter().all(Entry::is_trashed)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<(), AppError> {
        ctx.api
            .start_io_task(IoTaskType::Restore, &ctx.selection(), IoTaskParams::default())
    }
}

struct EmptyTrash;

#[async_trait]
impl Command for EmptyTrash {
    fn can_execute(&self, ctx: &CommandContext) -> bool {
        ctx.features.trash
            && ctx
                .directory_model
                .current_entry()
                .is_some_and(|entry| is_trash_root(&entry))
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<(), AppError> {
        if !ctx
            .ui
            .confirm("Permanently delete all items in the trash?")
            .await
        {
            return Ok(());
        }
        ctx.api
            .start_io_task(IoTaskType::EmptyTrash, &[], IoTaskParams::default())
    }
}

struct Zip;

#[async_trait]
impl Command for Zip {
    fn can_execute(&self, ctx: &CommandContext) -> bool {
        let Some(current) = ctx.current_dir_writable() else {
            return false;
        };
        let selection = ctx.selection();
        let on_drive = ctx
            .volume_manager
            .location_info(&current)
            .is_some_and(|location| location.is_drive_based);
        !selection.is_empty() && !on_drive && !selection.iter().any(Entry::is_trashed)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<(), AppError> {
        let Some(current) = ctx.current_dir_writable() else {
            return Ok(());
        };
        ctx.api
            .start_io_task(IoTaskType::Zip, &ctx.selection(), IoTaskParams::to(current))
    }
}

struct Unmount;

impl Unmount {
    fn volume_id(ctx: &CommandContext) -> Option<String> {
        let current = ctx.directory_model.current_entry()?;
        let volume = ctx.volume_manager.volume_info(&current)?;
        volume
            .volume_type
            .is_unmountable()
            .then(|| volume.volume_id.to_string())
    }
}

#[async_trait]
impl Command for Unmount {
    fn can_execute(&self, ctx: &CommandContext) -> bool {
        Self::volume_id(ctx).is_some()
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<(), AppError> {
        let Some(volume_id) = Self::volume_id(ctx) else {
            return Ok(());
        };
        ctx.api.remove_mount(&volume_id).await?;
        info!(volume_id = %volume_id, "Volume unmounted");
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Clipboard
// ----------------------------------------------------------------------------

struct CutSelection;

#[async_trait]
impl Command for CutSelection {
    fn can_execute(&self, ctx: &CommandContext) -> bool {
        ctx.transfer.can_cut_or_copy(true)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<(), AppError> {
        ctx.transfer.cut();
        Ok(())
    }
}

struct CopySelection;

#[async_trait]
impl Command for CopySelection {
    fn can_execute(&self, ctx: &CommandContext) -> bool {
        ctx.transfer.can_cut_or_copy(false)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<(), AppError> {
        ctx.transfer.copy();
        Ok(())
    }
}

struct Paste;

#[async_trait]
impl Command for Paste {
    fn can_execute(&self, ctx: &CommandContext) -> bool {
        ctx.transfer.can_paste(None)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<(), AppError> {
        let outcome = ctx.transfer.paste(None).await?;
        debug!(?outcome, "Paste finished");
        Ok(())
    }
}

struct PasteIntoFolder;

#[async_trait]
impl Command for PasteIntoFolder {
    fn can_execute(&self, ctx: &CommandContext) -> bool {
        match ctx.selection().as_slice() {
            [folder] if folder.is_directory() => ctx.transfer.can_paste(Some(folder)),
            _ => false,
        }
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<(), AppError> {
        let outcome = ctx.transfer.paste_into_folder().await?;
        debug!(?outcome, "Paste into folder finished");
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// List
// ----------------------------------------------------------------------------

struct Refresh;

#[async_trait]
impl Command for Refresh {
    fn can_execute(&self, ctx: &CommandContext) -> bool {
        ctx.directory_model.current_target().is_some()
            && ctx.directory_model.current_root_type() != Some(RootType::DriveFakeRoot)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<(), AppError> {
        ctx.directory_model.rescan(true, true);
        Ok(())
    }
}

struct SelectAll;

#[async_trait]
impl Command for SelectAll {
    fn can_execute(&self, ctx: &CommandContext) -> bool {
        !ctx.directory_model.file_list().lock().is_empty()
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<(), AppError> {
        ctx.directory_model.select_all();
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Actions
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum ActionRef {
    Common(CommonActionId),
    Internal(InternalActionId),
}

impl ActionRef {
    fn id(self) -> ActionId {
        match self {
            Self::Common(id) => ActionId::Common(id),
            Self::Internal(id) => ActionId::Internal(id),
        }
    }
}

/// Runs the action of the same id from the selection's actions model.
struct ActionCommand(ActionRef);

#[async_trait]
impl Command for ActionCommand {
    fn can_execute(&self, ctx: &CommandContext) -> bool {
        let selection = ctx.selection();
        ctx.actions
            .cached(&selection)
            .and_then(|model| model.get_action(&self.0.id()))
            .is_some_and(|action| action.can_execute())
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<(), AppError> {
        let selection = ctx.selection();
        let id = self.0.id();
        let Some(action) = ctx.actions.action(&selection, &id).await else {
            return Err(AppError::CommandDisabled(id.to_string()));
        };
        action.execute().await
    }
}

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

static COMMAND_TABLE: &[(&str, &dyn Command)] = &[
    ("new-folder", &NewFolder),
    ("rename", &Rename),
    ("delete", &Delete),
    ("move-to-trash", &MoveToTrash),
    ("restore-from-trash", &Restore),
    ("empty-trash", &EmptyTrash),
    ("zip-selection", &Zip),
    ("unmount", &Unmount),
    ("cut", &CutSelection),
    ("copy", &CopySelection),
    ("paste", &Paste),
    ("paste-into-folder", &PasteIntoFolder),
    ("refresh", &Refresh),
    ("select-all", &SelectAll),
    ("share", &ActionCommand(ActionRef::Common(CommonActionId::Share))),
    (
        "toggle-pinned",
        &ActionCommand(ActionRef::Common(CommonActionId::SaveForOffline)),
    ),
    (
        "offline-not-necessary",
        &ActionCommand(ActionRef::Common(CommonActionId::OfflineNotNecessary)),
    ),
    (
        "manage-in-drive",
        &ActionCommand(ActionRef::Internal(InternalActionId::ManageInDrive)),
    ),
    (
        "pin-folder",
        &ActionCommand(ActionRef::Internal(InternalActionId::CreateFolderShortcut)),
    ),
    (
        "unpin-folder",
        &ActionCommand(ActionRef::Internal(InternalActionId::RemoveFolderShortcut)),
    ),
];

pub struct CommandRegistry {
    commands: IndexMap<&'static str, &'static dyn Command>,
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.commands.keys()).finish()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: COMMAND_TABLE.iter().copied().collect(),
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.keys().copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.commands.contains_key(id)
    }

    pub fn can_execute(&self, id: &str, ctx: &CommandContext) -> bool {
        self.commands
            .get(id)
            .is_some_and(|command| command.can_execute(ctx))
    }

    pub async fn execute(&self, id: &str, ctx: &CommandContext) -> Result<(), AppError> {
        let Some(command) = self.commands.get(id).copied() else {
            return Err(AppError::not_found(id));
        };
        if !command.can_execute(ctx) {
            debug!(command = id, "Command not executable");
            return Err(AppError::CommandDisabled(id.to_string()));
        }
        info!(command = id, "Executing command");
        command.execute(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::metadata_cache::Metadata;
    use crate::fs::entry::NavTarget;
    use crate::test_support::{TestEnv, downloads_root};

    async fn setup(env: &TestEnv, dir: &Entry) -> CommandContext {
        let ctx = env.command_context();
        ctx.directory_model
            .change_directory_entry(NavTarget::Directory(dir.clone()))
            .await
            .unwrap();
        ctx
    }

    #[test]
    fn test_registry_ids_are_unique() {
        let registry = CommandRegistry::new();
        assert_eq!(registry.ids().count(), COMMAND_TABLE.len());
        assert!(registry.contains("paste-into-folder"));
    }

    #[tokio::test]
    async fn test_new_folder_picks_a_free_name() {
        let env = TestEnv::new();
        let root = downloads_root();
        env.fs.add_dir(&root, vec![root.child(DEFAULT_FOLDER_NAME, true)]);
        let ctx = setup(&env, &root).await;
        let registry = CommandRegistry::new();

        registry.execute("new-folder", &ctx).await.unwrap();

        let selected = ctx.directory_model.selected_entries();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name(), "New folder (1)");
    }

    #[tokio::test]
    async fn test_rename_validates_and_updates_list() {
        let env = TestEnv::new();
        let root = downloads_root();
        let a = root.child("a.txt", false);
        env.fs.add_dir(&root, vec![a.clone(), root.child("b.txt", false)]);
        let ctx = setup(&env, &root).await;
        let registry = CommandRegistry::new();
        ctx.directory_model.select_entry(a.url());

        env.ui.set_prompt_answer(Some("b.txt"));
        registry.execute("rename", &ctx).await.unwrap();
        assert_eq!(env.ui.alerts().len(), 1);

        env.ui.set_prompt_answer(Some("c.txt"));
        registry.execute("rename", &ctx).await.unwrap();
        let selected = ctx.directory_model.selected_entries();
        assert_eq!(selected[0].name(), "c.txt");
        assert_eq!(ctx.directory_model.file_list().lock().len(), 2);
    }

    #[tokio::test]
    async fn test_trash_and_delete_dispatch_tasks() {
        let env = TestEnv::new();
        let root = downloads_root();
        let a = root.child("a.txt", false);
        env.fs.add_dir(&root, vec![a.clone()]);
        let ctx = setup(&env, &root).await;
        let registry = CommandRegistry::new();

        assert!(!registry.can_execute("move-to-trash", &ctx));
        ctx.directory_model.select_entry(a.url());
        assert!(registry.can_execute("move-to-trash", &ctx));

        registry.execute("move-to-trash", &ctx).await.unwrap();
        env.ui.set_confirm(false);
        registry.execute("delete", &ctx).await.unwrap();
        env.ui.set_confirm(true);
        registry.execute("delete", &ctx).await.unwrap();

        let tasks: Vec<IoTaskType> = env.api.io_tasks().iter().map(|t| t.task).collect();
        assert_eq!(tasks, vec![IoTaskType::Trash, IoTaskType::Delete]);
    }

    #[tokio::test]
    async fn test_disabled_command_is_an_error() {
        let env = TestEnv::new();
        let ctx = setup(&env, &downloads_root()).await;
        let registry = CommandRegistry::new();

        let result = registry.execute("restore-from-trash", &ctx).await;

        assert!(matches!(result, Err(AppError::CommandDisabled(_))));
        assert!(matches!(
            registry.execute("no-such-command", &ctx).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_action_commands_follow_the_actions_model() {
        let env = TestEnv::new();
        let root = Entry::directory("drive", "/root");
        let file = root.child("a.txt", false);
        env.fs.add_dir(&root, vec![file.clone()]);
        let mut meta = Metadata::default();
        meta.can_pin = Some(true);
        meta.pinned = Some(false);
        meta.hosted = Some(false);
        env.metadata.insert(&file, meta.complete());
        let ctx = setup(&env, &root).await;
        let registry = CommandRegistry::new();
        ctx.directory_model.select_entry(file.url());

        assert!(!registry.can_execute("toggle-pinned", &ctx));
        ctx.actions.model_for(&ctx.directory_model.selected_entries()).await;
        assert!(registry.can_execute("toggle-pinned", &ctx));
        assert!(!registry.can_execute("offline-not-necessary", &ctx));

        registry.execute("toggle-pinned", &ctx).await.unwrap();
        assert_eq!(env.api.pinned(), vec![(file.url().to_string(), true)]);
    }
}
