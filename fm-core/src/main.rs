//! src/main.rs
//! ============================================================================
//! # Headless file manager shell
//!
//! Serves one local directory as the "downloads" volume and drives the core
//! from the keyboard: the keymap's shortcuts run commands, arrow keys move
//! the selection, Enter opens a folder, Backspace goes up and `q` quits.

use std::{
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use fm_clip::FileLocalStore;
use futures::StreamExt;
use smallvec::SmallVec;
use tracing::{info, warn};

use fm_core::{
    FileManager, Services,
    Logger,
    cache::metadata_cache::{Metadata, MetadataProperty, MetadataSource},
    config::Config,
    error::{AppError, FsError, FsErrorKind},
    fs::{
        Entry, NavTarget,
        file_system::{NativeFileSystem, parse_url},
        volume::{StaticVolumeManager, VolumeInfo, VolumeType},
    },
    services::private_api::{
        CustomActionInfo, DriveSearchQuery, GuestTarget, IoTaskParams, IoTaskType, PrivateApi,
        RecentQuery,
    },
    transfer::confirmation::ConfirmationType,
    ui::delegate::{ProgressItem, Toast, UiDelegate},
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().await.unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {e}");
        Config::default()
    });
    let _guard = Logger::init(&config.logging)
        .await
        .context("Failed to initialize logging")?;

    let root = match std::env::args().nth(1) {
        Some(arg) => PathBuf::from(arg),
        None => std::env::current_dir().context("No current directory")?,
    };
    info!(marker = "APP_START", root = %root.display(), "Starting headless shell");

    let fs = Arc::new(NativeFileSystem::new());
    fs.add_root("downloads", &root);

    let volumes = Arc::new(StaticVolumeManager::new());
    let volume_events = volumes.subscribe();
    volumes.mount(VolumeInfo::new("downloads", VolumeType::Downloads, "downloads", "My files").with_trash());

    let local_store = Arc::new(
        FileLocalStore::open(Config::data_dir()?.join("local_store.mpk"))
            .await
            .context("Failed to open local store")?,
    );

    let manager = FileManager::new(
        config,
        Services {
            fs,
            api: Arc::new(HeadlessApi),
            volume_manager: volumes,
            volume_events: Some(volume_events),
            metadata_source: Arc::new(EmptyMetadata),
            ui: Arc::new(ConsoleUi),
            local_store: local_store.clone(),
        },
    );

    manager.start(None).await.context("Failed to open start directory")?;
    print_listing(&manager);

    enable_raw_mode().context("Failed to enable raw mode")?;
    let result = run(&manager).await;
    disable_raw_mode().context("Failed to restore terminal")?;

    if let Err(e) = local_store.flush().await {
        warn!(error = %e, "Local store not saved");
    }
    info!(marker = "APP_EXIT", "Headless shell exited");
    result
}

async fn run(manager: &FileManager) -> Result<()> {
    let mut events = EventStream::new();

    while let Some(event) = events.next().await {
        let Event::Key(key) = event? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => break,
            KeyCode::Up => move_selection(manager, -1).await,
            KeyCode::Down => move_selection(manager, 1).await,
            KeyCode::Enter if key.modifiers.is_empty() => open_selected(manager).await,
            KeyCode::Backspace if key.modifiers.is_empty() => open_parent(manager).await,
            _ => run_shortcut(manager, key).await,
        }
    }

    Ok(())
}

async fn run_shortcut(manager: &FileManager, key: KeyEvent) {
    match manager.handle_key(key).await {
        Ok(Some(command)) => {
            say(&format!("ran {command}"));
            print_listing(manager);
        }
        Ok(None) => {}
        Err(e) => say(&format!("error: {e}")),
    }
}

async fn move_selection(manager: &FileManager, step: isize) {
    let model = manager.directory_model();
    let next = {
        let list = model.file_list();
        let list = list.lock();
        if list.is_empty() {
            return;
        }
        let lead = model.selection().lead_index();
        let index = match lead {
            Some(i) => i.saturating_add_signed(step).min(list.len() - 1),
            None => 0,
        };
        list.item(index).map(|e| e.url().to_string())
    };
    if let Some(url) = next {
        model.select_entry(&url);
        manager.on_selection_changed().await;
        say(&format!("> {url}"));
    }
}

async fn open_selected(manager: &FileManager) {
    let selected = manager.directory_model().selected_entries();
    let [entry] = selected.as_slice() else {
        return;
    };
    if entry.is_directory() {
        navigate(manager, entry.clone()).await;
    }
}

async fn open_parent(manager: &FileManager) {
    let parent = manager
        .directory_model()
        .current_entry()
        .and_then(|e| e.parent_url())
        .and_then(|url| parse_url(&url).map(|(fs, path)| Entry::directory(fs, &path)));
    if let Some(parent) = parent {
        navigate(manager, parent).await;
    }
}

async fn navigate(manager: &FileManager, entry: Entry) {
    let change = manager
        .directory_model()
        .change_directory_entry(NavTarget::from_entry(entry));
    if change.await.is_ok() {
        print_listing(manager);
    }
}

fn say(text: &str) {
    let mut out = io::stdout().lock();
    let _ = write!(out, "{text}\r\n");
    let _ = out.flush();
}

fn print_listing(manager: &FileManager) {
    let model = manager.directory_model();
    let location = model
        .current_entry()
        .map(|e| e.url().to_string())
        .unwrap_or_default();
    say(&format!("== {location}"));
    let list = model.file_list();
    for entry in list.lock().entries() {
        let suffix = if entry.is_directory() { "/" } else { "" };
        say(&format!("   {}{suffix}", entry.name()));
    }
}

/// Host services of a plain local session: tasks are logged, Drive and
/// guests are unavailable.
struct HeadlessApi;

#[async_trait]
impl PrivateApi for HeadlessApi {
    fn start_io_task(
        &self,
        task: IoTaskType,
        entries: &[Entry],
        params: IoTaskParams,
    ) -> Result<(), AppError> {
        info!(
            marker = "IO_TASK_QUEUED",
            task = %task,
            count = entries.len(),
            destination = params.destination.as_ref().map(Entry::url),
            "IO task queued"
        );
        say(&format!("queued {task} of {} item(s)", entries.len()));
        Ok(())
    }

    async fn pin_drive_file(&self, _entry: &Entry, _pin: bool) -> Result<(), FsError> {
        Err(FsError::new(FsErrorKind::NotSupported, "Drive is not available"))
    }

    async fn get_custom_actions(&self, _entries: &[Entry]) -> Result<Vec<CustomActionInfo>, AppError> {
        Ok(Vec::new())
    }

    async fn execute_custom_action(&self, _entries: &[Entry], action_id: &str) -> Result<(), AppError> {
        Err(AppError::provider_failed("headless", format!("no action {action_id}")))
    }

    async fn get_recent_files(&self, _query: &RecentQuery) -> Result<Vec<Entry>, FsError> {
        Ok(Vec::new())
    }

    async fn search_drive_metadata(&self, _query: &DriveSearchQuery) -> Result<Vec<Entry>, FsError> {
        Ok(Vec::new())
    }

    async fn mount_guest(&self, _guest: &GuestTarget) -> Result<(), FsError> {
        Err(FsError::guest_connection("no guest environments"))
    }

    async fn get_disallowed_transfers(
        &self,
        _entries: &[Entry],
        _destination: &Entry,
        _is_move: bool,
    ) -> Result<Vec<Entry>, AppError> {
        Ok(Vec::new())
    }

    fn poll_hosted_pin_states(&self) {}

    async fn remove_mount(&self, volume_id: &str) -> Result<(), AppError> {
        say(&format!("unmounted {volume_id}"));
        Ok(())
    }
}

struct EmptyMetadata;

#[async_trait]
impl MetadataSource for EmptyMetadata {
    async fn fetch(
        &self,
        entries: &[Entry],
        _properties: &[MetadataProperty],
    ) -> Result<Vec<Metadata>, AppError> {
        Ok(vec![Metadata::default(); entries.len()])
    }
}

/// Prints to the terminal; questions are declined since raw input belongs
/// to the key loop.
struct ConsoleUi;

#[async_trait]
impl UiDelegate for ConsoleUi {
    fn alert(&self, message: &str) {
        say(&format!("! {message}"));
    }

    async fn confirm(&self, message: &str) -> bool {
        say(&format!("? {message} (declined)"));
        false
    }

    async fn confirm_transfer(
        &self,
        _confirmation: ConfirmationType,
        messages: &SmallVec<[String; 2]>,
    ) -> bool {
        for message in messages {
            say(&format!("? {message} (declined)"));
        }
        false
    }

    async fn prompt_name(&self, title: &str, _default_name: &str) -> Option<String> {
        say(&format!("? {title} (no input in headless mode)"));
        None
    }

    fn show_toast(&self, toast: Toast) {
        say(&format!("* {}", toast.text));
    }

    fn open_url(&self, url: &str) {
        say(&format!("open {url}"));
    }

    fn refresh_list(&self) {}

    fn update_progress(&self, item: ProgressItem) {
        say(&format!("[{:?}] {}", item.state, item.message));
    }
}
