//! # File manager
//!
//! Composition root: builds the store, the metadata cache, the directory
//! model, the transfer and actions controllers and the command registry
//! from the host's services, then routes keys and commands to them.

use crossterm::event::KeyEvent;
use fm_clip::{DragSession, LocalStore};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::actions::actions_controller::ActionsController;
use crate::actions::actions_model::ActionsDeps;
use crate::actions::folder_shortcuts::FolderShortcuts;
use crate::cache::metadata_cache::{MetadataCache, MetadataSource};
use crate::config::Config;
use crate::controller::commands::{CommandContext, CommandRegistry};
use crate::controller::keymap::Keymap;
use crate::error::AppError;
use crate::fs::entry::{Entry, NavTarget};
use crate::fs::file_system::FileSystem;
use crate::fs::volume::{VolumeEvent, VolumeManager};
use crate::model::directory_model::{ChangeOutcome, DirectoryModel, DirectoryModelDeps};
use crate::model::store::Store;
use crate::scan::selection::ScannerDeps;
use crate::services::private_api::PrivateApi;
use crate::transfer::file_transfer_controller::{FileTransferController, TransferDeps};
use crate::ui::delegate::UiDelegate;
use crate::util::metrics::Metrics;

/// What the host application provides.
pub struct Services {
    pub fs: Arc<dyn FileSystem>,
    pub api: Arc<dyn PrivateApi>,
    pub volume_manager: Arc<dyn VolumeManager>,
    pub volume_events: Option<broadcast::Receiver<VolumeEvent>>,
    pub metadata_source: Arc<dyn MetadataSource>,
    pub ui: Arc<dyn UiDelegate>,
    pub local_store: Arc<dyn LocalStore>,
}

pub struct FileManager {
    config: Config,
    store: Arc<Store>,
    metadata: Arc<MetadataCache>,
    metrics: Arc<Metrics>,
    shortcuts: Arc<FolderShortcuts>,
    drag: Arc<DragSession>,
    context: CommandContext,
    commands: CommandRegistry,
    keymap: Keymap,
    volume_events: parking_lot::Mutex<Option<broadcast::Receiver<VolumeEvent>>>,
}

impl fmt::Debug for FileManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileManager")
            .field("commands", &self.commands)
            .field("current", &self.context.directory_model.current_target())
            .finish_non_exhaustive()
    }
}

impl FileManager {
    /// Must be called inside a Tokio runtime.
    pub fn new(config: Config, services: Services) -> Self {
        let store = Arc::new(Store::new());
        let metadata = Arc::new(MetadataCache::new(&config.cache, services.metadata_source));
        let metrics = Arc::new(Metrics::new());
        let shortcuts = Arc::new(FolderShortcuts::new());
        let drag = Arc::new(DragSession::new(
            config.transfer.app_id.as_str(),
            services.local_store,
        ));

        let directory_model = DirectoryModel::new(DirectoryModelDeps {
            scanners: ScannerDeps {
                fs: services.fs.clone(),
                api: services.api.clone(),
                volume_manager: services.volume_manager.clone(),
                store: store.clone(),
                search: config.search.clone(),
            },
            metadata: metadata.clone(),
            metrics: metrics.clone(),
            scan: config.scan.clone(),
            features: config.features,
        });

        let transfer = Arc::new(FileTransferController::new(TransferDeps {
            fs: services.fs.clone(),
            api: services.api.clone(),
            volume_manager: services.volume_manager.clone(),
            metadata: metadata.clone(),
            ui: services.ui.clone(),
            directory_model: directory_model.clone(),
            drag: drag.clone(),
            features: config.features,
            transfer: config.transfer.clone(),
        }));

        let actions = Arc::new(ActionsController::new(ActionsDeps {
            volume_manager: services.volume_manager.clone(),
            metadata: metadata.clone(),
            api: services.api.clone(),
            shortcuts: shortcuts.clone(),
            ui: services.ui.clone(),
            metrics: metrics.clone(),
            features: config.features,
        }));

        let context = CommandContext {
            directory_model,
            transfer,
            actions,
            fs: services.fs,
            api: services.api,
            volume_manager: services.volume_manager,
            ui: services.ui,
            features: config.features,
        };

        Self {
            keymap: Keymap::new(&config.features),
            commands: CommandRegistry::new(),
            config,
            store,
            metadata,
            metrics,
            shortcuts,
            drag,
            context,
            volume_events: parking_lot::Mutex::new(services.volume_events),
        }
    }

    /// Attaches the store and volume listeners, then opens `initial` or the
    /// default display root.
    pub async fn start(&self, initial: Option<Entry>) -> Result<ChangeOutcome, AppError> {
        let model = &self.context.directory_model;
        model.attach_store();
        if let Some(events) = self.volume_events.lock().take() {
            model.attach_volume_events(events);
        }

        let target = initial
            .or_else(|| self.context.volume_manager.default_display_root())
            .ok_or_else(|| AppError::not_found("default display root"))?;
        info!(url = target.url(), "Starting file manager");

        model
            .change_directory_entry(NavTarget::from_entry(target))
            .await
            .map_err(|_| AppError::Other("directory change dropped".to_string()))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn metadata(&self) -> &Arc<MetadataCache> {
        &self.metadata
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn shortcuts(&self) -> &Arc<FolderShortcuts> {
        &self.shortcuts
    }

    pub fn drag_session(&self) -> &Arc<DragSession> {
        &self.drag
    }

    pub fn directory_model(&self) -> &Arc<DirectoryModel> {
        &self.context.directory_model
    }

    pub fn transfer(&self) -> &Arc<FileTransferController> {
        &self.context.transfer
    }

    pub fn actions(&self) -> &Arc<ActionsController> {
        &self.context.actions
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn keymap(&self) -> &Keymap {
        &self.keymap
    }

    /// Rebuilds the selection's actions so action commands can answer
    /// `can_execute` synchronously.
    pub async fn on_selection_changed(&self) {
        let selection = self.context.directory_model.selected_entries();
        if selection.is_empty() {
            self.context.actions.reset();
            return;
        }
        self.context.actions.model_for(&selection).await;
    }

    pub fn can_execute(&self, command: &str) -> bool {
        self.commands.can_execute(command, &self.context)
    }

    pub async fn execute(&self, command: &str) -> Result<(), AppError> {
        self.commands.execute(command, &self.context).await
    }

    /// Runs the command bound to `event`. Returns the command id, or `None`
    /// when the key is unbound or the command is unavailable.
    pub async fn handle_key(&self, event: KeyEvent) -> Result<Option<&'static str>, AppError> {
        let Some(command) = self.keymap.command_for(event) else {
            return Ok(None);
        };
        if !self.can_execute(command) {
            debug!(command, "Shortcut ignored");
            return Ok(None);
        }
        self.execute(command).await?;
        if matches!(command, "select-all") {
            self.on_selection_changed().await;
        }
        Ok(Some(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestEnv, downloads_root};
    use crossterm::event::{KeyCode, KeyModifiers};

    #[tokio::test]
    async fn test_start_opens_default_root_and_routes_keys() {
        let env = TestEnv::new();
        let root = downloads_root();
        env.fs.add_dir(&root, vec![root.child("a.txt", false)]);
        let manager = FileManager::new(env.config.clone(), env.services());

        let outcome = manager.start(None).await.unwrap();
        assert_eq!(outcome, ChangeOutcome::Changed { listed: true });
        assert_eq!(manager.directory_model().current_entry(), Some(root));

        let select_all = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::CONTROL);
        assert_eq!(manager.handle_key(select_all).await.unwrap(), Some("select-all"));
        assert_eq!(manager.directory_model().selected_entries().len(), 1);

        let copy = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(manager.handle_key(copy).await.unwrap(), Some("copy"));
        assert!(manager.transfer().clipboard().is_some());
    }
}
