//! In-memory collaborators and a wired-up environment for unit tests.

use async_trait::async_trait;
use fm_clip::{DragSession, MemoryLocalStore};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::actions::actions_controller::ActionsController;
use crate::actions::actions_model::ActionsDeps;
use crate::actions::folder_shortcuts::FolderShortcuts;
use crate::cache::metadata_cache::{Metadata, MetadataCache, MetadataProperty, MetadataSource};
use crate::config::Config;
use crate::controller::commands::CommandContext;
use crate::controller::file_manager::Services;
use crate::error::{AppError, FsError, FsErrorKind};
use crate::fs::entry::Entry;
use crate::fs::file_system::{FileSystem, SearchQuery, parse_url};
use crate::fs::predicates::is_descendant_or_same;
use crate::fs::volume::{StaticVolumeManager, VolumeInfo, VolumeType};
use crate::model::directory_contents::FileListContext;
use crate::model::directory_model::{DirectoryModel, DirectoryModelDeps};
use crate::model::file_filter::FileFilter;
use crate::model::file_list::{FileListModel, SharedFileList};
use crate::model::store::Store;
use crate::scan::selection::ScannerDeps;
use crate::services::private_api::{
    CustomActionInfo, DriveSearchQuery, GuestTarget, IoTaskParams, IoTaskType, PrivateApi,
    RecentQuery,
};
use crate::transfer::confirmation::ConfirmationType;
use crate::transfer::file_transfer_controller::{FileTransferController, TransferDeps};
use crate::ui::delegate::{ProgressItem, Toast, UiDelegate};
use crate::util::metrics::Metrics;

pub fn downloads_root() -> Entry {
    Entry::directory("downloads", "/")
}

// ----------------------------------------------------------------------------
// File system
// ----------------------------------------------------------------------------

#[derive(Default)]
struct FsState {
    entries: HashMap<String, Entry>,
    listings: HashMap<String, Vec<Entry>>,
    errors: HashMap<String, FsError>,
    reads: HashMap<String, usize>,
    watched: HashSet<String>,
    delay: Option<Duration>,
}

/// Registry-backed file system. Directories are listed exactly as given to
/// [`FakeFileSystem::add_dir`].
#[derive(Default)]
pub struct FakeFileSystem {
    state: Mutex<FsState>,
}

impl FakeFileSystem {
    /// Registers `dir` and replaces its listing with `children`.
    pub fn add_dir(&self, dir: &Entry, children: Vec<Entry>) {
        let mut state = self.state.lock();
        if let Some(previous) = state.listings.remove(dir.url()) {
            for gone in previous.iter().filter(|e| !children.contains(*e)) {
                state.entries.remove(gone.url());
            }
        }
        state.entries.insert(dir.url().to_string(), dir.clone());
        for child in &children {
            state.entries.insert(child.url().to_string(), child.clone());
        }
        state.listings.insert(dir.url().to_string(), children);
    }

    pub fn register(&self, entry: &Entry) {
        self.state
            .lock()
            .entries
            .insert(entry.url().to_string(), entry.clone());
    }

    /// Every directory read waits this long first.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = Some(delay);
    }

    pub fn set_error(&self, url: &str, error: Option<FsError>) {
        let mut state = self.state.lock();
        match error {
            Some(e) => state.errors.insert(url.to_string(), e),
            None => state.errors.remove(url),
        };
    }

    pub fn read_count(&self, url: &str) -> usize {
        self.state.lock().reads.get(url).copied().unwrap_or(0)
    }

    pub fn is_watched(&self, url: &str) -> bool {
        self.state.lock().watched.contains(url)
    }

    fn lookup(&self, url: &str) -> Result<Entry, FsError> {
        self.state
            .lock()
            .entries
            .get(url)
            .cloned()
            .ok_or_else(|| FsError::not_found(url))
    }
}

#[async_trait]
impl FileSystem for FakeFileSystem {
    async fn read_directory(&self, dir: &Entry) -> Result<Vec<Entry>, FsError> {
        let delay = {
            let mut state = self.state.lock();
            *state.reads.entry(dir.url().to_string()).or_default() += 1;
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock();
        if let Some(e) = state.errors.get(dir.url()) {
            return Err(e.clone());
        }
        state
            .listings
            .get(dir.url())
            .cloned()
            .ok_or_else(|| FsError::not_found(dir.url()))
    }

    async fn resolve_url(&self, url: &str) -> Result<Entry, FsError> {
        self.lookup(url)
    }

    async fn resolve_child(&self, parent: &Entry, name: &str) -> Result<Entry, FsError> {
        self.lookup(parent.child(name, false).url())
    }

    async fn create_directory(&self, parent: &Entry, name: &str) -> Result<Entry, FsError> {
        let created = parent.child(name, true);
        let mut state = self.state.lock();
        if state.entries.contains_key(created.url()) {
            return Err(FsError::new(FsErrorKind::PathExists, name));
        }
        state
            .entries
            .insert(created.url().to_string(), created.clone());
        state
            .listings
            .entry(parent.url().to_string())
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn rename(&self, entry: &Entry, new_name: &str) -> Result<Entry, FsError> {
        let parent_url = entry
            .parent_url()
            .ok_or_else(|| FsError::new(FsErrorKind::InvalidModification, "root"))?;
        let (filesystem, parent_path) =
            parse_url(&parent_url).ok_or_else(|| FsError::not_found(&parent_url))?;
        let renamed = Entry::directory(filesystem, &parent_path).child(new_name, entry.is_directory());

        let mut state = self.state.lock();
        if state.entries.contains_key(renamed.url()) {
            return Err(FsError::new(FsErrorKind::PathExists, new_name));
        }
        state.entries.remove(entry.url());
        state
            .entries
            .insert(renamed.url().to_string(), renamed.clone());
        if let Some(listing) = state.listings.get_mut(&parent_url)
            && let Some(slot) = listing.iter_mut().find(|e| e.url() == entry.url())
        {
            *slot = renamed.clone();
        }
        Ok(renamed)
    }

    async fn search(&self, root: &Entry, query: &SearchQuery) -> Result<Vec<Entry>, FsError> {
        let mut found: Vec<Entry> = self
            .state
            .lock()
            .entries
            .values()
            .filter(|e| e.url() != root.url() && is_descendant_or_same(root.url(), e.url()))
            .filter(|e| query.matches_name(e.name()))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.url().cmp(b.url()));
        if query.max_results > 0 {
            found.truncate(query.max_results);
        }
        Ok(found)
    }

    async fn read_trash(&self, volume: &VolumeInfo) -> Result<Vec<Entry>, FsError> {
        Ok(self
            .state
            .lock()
            .entries
            .values()
            .filter(|e| e.is_trashed() && volume.filesystem == e.filesystem_name())
            .cloned()
            .collect())
    }

    async fn watch(&self, dir: &Entry) -> Result<(), FsError> {
        self.state.lock().watched.insert(dir.url().to_string());
        Ok(())
    }

    async fn unwatch(&self, dir: &Entry) -> Result<(), FsError> {
        self.state.lock().watched.remove(dir.url());
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Host services
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTask {
    pub task: IoTaskType,
    pub entries: Vec<String>,
    pub destination: Option<String>,
}

#[derive(Default)]
struct ApiState {
    tasks: Vec<RecordedTask>,
    pinned: Vec<(String, bool)>,
    failing_pins: HashSet<String>,
    custom_actions: Option<Result<Vec<CustomActionInfo>, AppError>>,
    executed: Vec<String>,
    mount_result: Option<Result<(), FsError>>,
    mount_attempts: usize,
    disallowed: Vec<Entry>,
    hosted_pin_polls: usize,
}

#[derive(Default)]
pub struct FakeApi {
    state: Mutex<ApiState>,
}

impl FakeApi {
    pub fn io_tasks(&self) -> Vec<RecordedTask> {
        self.state.lock().tasks.clone()
    }

    pub fn pinned(&self) -> Vec<(String, bool)> {
        self.state.lock().pinned.clone()
    }

    pub fn fail_pin(&self, url: &str) {
        self.state.lock().failing_pins.insert(url.to_string());
    }

    pub fn set_custom_actions(&self, result: Result<Vec<CustomActionInfo>, AppError>) {
        self.state.lock().custom_actions = Some(result);
    }

    pub fn executed_actions(&self) -> Vec<String> {
        self.state.lock().executed.clone()
    }

    pub fn set_mount_result(&self, result: Result<(), FsError>) {
        self.state.lock().mount_result = Some(result);
    }

    pub fn mount_attempts(&self) -> usize {
        self.state.lock().mount_attempts
    }

    pub fn set_disallowed(&self, entries: Vec<Entry>) {
        self.state.lock().disallowed = entries;
    }

    pub fn hosted_pin_polls(&self) -> usize {
        self.state.lock().hosted_pin_polls
    }
}

#[async_trait]
impl PrivateApi for FakeApi {
    fn start_io_task(
        &self,
        task: IoTaskType,
        entries: &[Entry],
        params: IoTaskParams,
    ) -> Result<(), AppError> {
        self.state.lock().tasks.push(RecordedTask {
            task,
            entries: entries.iter().map(|e| e.url().to_string()).collect(),
            destination: params.destination.map(|d| d.url().to_string()),
        });
        Ok(())
    }

    async fn pin_drive_file(&self, entry: &Entry, pin: bool) -> Result<(), FsError> {
        let mut state = self.state.lock();
        if state.failing_pins.contains(entry.url()) {
            return Err(FsError::new(FsErrorKind::Io, "pin rejected"));
        }
        state.pinned.push((entry.url().to_string(), pin));
        Ok(())
    }

    async fn get_custom_actions(&self, _entries: &[Entry]) -> Result<Vec<CustomActionInfo>, AppError> {
        self.state
            .lock()
            .custom_actions
            .clone()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn execute_custom_action(&self, _entries: &[Entry], action_id: &str) -> Result<(), AppError> {
        self.state.lock().executed.push(action_id.to_string());
        Ok(())
    }

    async fn get_recent_files(&self, _query: &RecentQuery) -> Result<Vec<Entry>, FsError> {
        Ok(Vec::new())
    }

    async fn search_drive_metadata(&self, _query: &DriveSearchQuery) -> Result<Vec<Entry>, FsError> {
        Ok(Vec::new())
    }

    async fn mount_guest(&self, _guest: &GuestTarget) -> Result<(), FsError> {
        let mut state = self.state.lock();
        state.mount_attempts += 1;
        state.mount_result.clone().unwrap_or(Ok(()))
    }

    async fn get_disallowed_transfers(
        &self,
        entries: &[Entry],
        _destination: &Entry,
        _is_move: bool,
    ) -> Result<Vec<Entry>, AppError> {
        let state = self.state.lock();
        Ok(entries
            .iter()
            .filter(|e| state.disallowed.contains(e))
            .cloned()
            .collect())
    }

    fn poll_hosted_pin_states(&self) {
        self.state.lock().hosted_pin_polls += 1;
    }

    async fn remove_mount(&self, _volume_id: &str) -> Result<(), AppError> {
        Ok(())
    }
}

/// Answers every request with empty records.
pub struct FakeMetadataSource;

#[async_trait]
impl MetadataSource for FakeMetadataSource {
    async fn fetch(
        &self,
        entries: &[Entry],
        _properties: &[MetadataProperty],
    ) -> Result<Vec<Metadata>, AppError> {
        Ok(vec![Metadata::default(); entries.len()])
    }
}

// ----------------------------------------------------------------------------
// UI
// ----------------------------------------------------------------------------

struct UiState {
    alerts: Vec<String>,
    confirm: bool,
    confirmations: Vec<ConfirmationType>,
    prompt_answer: Option<String>,
    toasts: Vec<Toast>,
    progress: Vec<ProgressItem>,
    refreshes: usize,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            alerts: Vec::new(),
            confirm: true,
            confirmations: Vec::new(),
            prompt_answer: None,
            toasts: Vec::new(),
            progress: Vec::new(),
            refreshes: 0,
        }
    }
}

/// Records what the core shows; dialogs answer with preset values.
#[derive(Default)]
pub struct RecordingUi {
    state: Mutex<UiState>,
}

impl RecordingUi {
    pub fn alerts(&self) -> Vec<String> {
        self.state.lock().alerts.clone()
    }

    pub fn set_confirm(&self, answer: bool) {
        self.state.lock().confirm = answer;
    }

    pub fn confirmations(&self) -> Vec<ConfirmationType> {
        self.state.lock().confirmations.clone()
    }

    pub fn set_prompt_answer(&self, answer: Option<&str>) {
        self.state.lock().prompt_answer = answer.map(str::to_string);
    }

    pub fn toasts(&self) -> Vec<Toast> {
        self.state.lock().toasts.clone()
    }

    pub fn progress_items(&self) -> Vec<ProgressItem> {
        self.state.lock().progress.clone()
    }

    pub fn refresh_count(&self) -> usize {
        self.state.lock().refreshes
    }
}

#[async_trait]
impl UiDelegate for RecordingUi {
    fn alert(&self, message: &str) {
        self.state.lock().alerts.push(message.to_string());
    }

    async fn confirm(&self, _message: &str) -> bool {
        self.state.lock().confirm
    }

    async fn confirm_transfer(
        &self,
        confirmation: ConfirmationType,
        _messages: &SmallVec<[String; 2]>,
    ) -> bool {
        let mut state = self.state.lock();
        state.confirmations.push(confirmation);
        state.confirm
    }

    async fn prompt_name(&self, _title: &str, _default_name: &str) -> Option<String> {
        self.state.lock().prompt_answer.clone()
    }

    fn show_toast(&self, toast: Toast) {
        self.state.lock().toasts.push(toast);
    }

    fn open_url(&self, _url: &str) {}

    fn refresh_list(&self) {
        self.state.lock().refreshes += 1;
    }

    fn update_progress(&self, item: ProgressItem) {
        self.state.lock().progress.push(item);
    }
}

// ----------------------------------------------------------------------------
// Environment
// ----------------------------------------------------------------------------

/// Downloads (with trash) and Drive mounted, the Downloads root listed empty.
pub struct TestEnv {
    pub fs: Arc<FakeFileSystem>,
    pub api: Arc<FakeApi>,
    pub volumes: Arc<StaticVolumeManager>,
    pub metadata: Arc<MetadataCache>,
    pub store: Arc<Store>,
    pub ui: Arc<RecordingUi>,
    pub metrics: Arc<Metrics>,
    pub shortcuts: Arc<FolderShortcuts>,
    pub local_store: Arc<MemoryLocalStore>,
    pub drag: Arc<DragSession>,
    pub file_list: SharedFileList,
    pub config: Config,
}

impl TestEnv {
    pub fn new() -> Self {
        let config = Config::default();
        let volumes = Arc::new(StaticVolumeManager::new());
        volumes.mount(
            VolumeInfo::new("downloads", VolumeType::Downloads, "downloads", "My files").with_trash(),
        );
        volumes.mount(VolumeInfo::new("drive", VolumeType::Drive, "drive", "Google Drive"));

        let fs = Arc::new(FakeFileSystem::default());
        fs.add_dir(&downloads_root(), Vec::new());

        let local_store = Arc::new(MemoryLocalStore::new());
        let drag = Arc::new(DragSession::new(
            config.transfer.app_id.as_str(),
            local_store.clone(),
        ));

        Self {
            fs,
            api: Arc::new(FakeApi::default()),
            volumes,
            metadata: Arc::new(MetadataCache::new(&config.cache, Arc::new(FakeMetadataSource))),
            store: Arc::new(Store::new()),
            ui: Arc::new(RecordingUi::default()),
            metrics: Arc::new(Metrics::new()),
            shortcuts: Arc::new(FolderShortcuts::new()),
            local_store,
            drag,
            file_list: FileListModel::shared(),
            config,
        }
    }

    pub fn mount_removable(&self, id: &str) -> Arc<VolumeInfo> {
        self.volumes
            .mount(VolumeInfo::new(id, VolumeType::Removable, id, id))
    }

    pub fn deps(&self) -> ScannerDeps {
        ScannerDeps {
            fs: self.fs.clone(),
            api: self.api.clone(),
            volume_manager: self.volumes.clone(),
            store: self.store.clone(),
            search: self.config.search.clone(),
        }
    }

    pub fn context(&self) -> FileListContext {
        FileListContext {
            file_list: self.file_list.clone(),
            metadata: self.metadata.clone(),
            volume_manager: self.volumes.clone(),
            filter: Arc::new(FileFilter::new(self.config.features.show_hidden)),
            batch_size: self.config.scan.batch_size,
        }
    }

    /// Must be called inside a Tokio runtime.
    pub fn directory_model(&self) -> Arc<DirectoryModel> {
        DirectoryModel::new(DirectoryModelDeps {
            scanners: self.deps(),
            metadata: self.metadata.clone(),
            metrics: self.metrics.clone(),
            scan: self.config.scan.clone(),
            features: self.config.features,
        })
    }

    pub fn actions_deps(&self) -> ActionsDeps {
        ActionsDeps {
            volume_manager: self.volumes.clone(),
            metadata: self.metadata.clone(),
            api: self.api.clone(),
            shortcuts: self.shortcuts.clone(),
            ui: self.ui.clone(),
            metrics: self.metrics.clone(),
            features: self.config.features,
        }
    }

    pub fn transfer_deps(&self, model: &Arc<DirectoryModel>) -> TransferDeps {
        TransferDeps {
            fs: self.fs.clone(),
            api: self.api.clone(),
            volume_manager: self.volumes.clone(),
            metadata: self.metadata.clone(),
            ui: self.ui.clone(),
            directory_model: model.clone(),
            drag: self.drag.clone(),
            features: self.config.features,
            transfer: self.config.transfer.clone(),
        }
    }

    /// Fresh directory model, transfer and actions controllers.
    pub fn command_context(&self) -> CommandContext {
        let model = self.directory_model();
        let transfer = Arc::new(FileTransferController::new(self.transfer_deps(&model)));
        let actions = Arc::new(ActionsController::new(self.actions_deps()));
        CommandContext {
            directory_model: model,
            transfer,
            actions,
            fs: self.fs.clone(),
            api: self.api.clone(),
            volume_manager: self.volumes.clone(),
            ui: self.ui.clone(),
            features: self.config.features,
        }
    }

    pub fn services(&self) -> Services {
        Services {
            fs: self.fs.clone(),
            api: self.api.clone(),
            volume_manager: self.volumes.clone(),
            volume_events: Some(self.volumes.subscribe()),
            metadata_source: Arc::new(FakeMetadataSource),
            ui: self.ui.clone(),
            local_store: self.local_store.clone(),
        }
    }
}
