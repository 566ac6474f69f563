//! ``src/model/directory_model.rs``
//! ============================================================================
//! # DirectoryModel: current directory, its listing and the scan state machine
//!
//! * Directory changes and searches run one at a time through a FIFO
//!   [`AsyncQueue`], in call order.
//! * Every change, search or cancelling rescan advances a [`Generation`];
//!   async continuations compare the value they captured after each await and
//!   stop without touching shared state once it moved on.
//! * `rescan` while a scan runs is coalesced into one pending rescan.
//! * Partial updates arriving during a scan wait for it and are then applied.
//!
//! Lock order: `state` → `selection` → contents state → file list. No lock is
//! held across an `.await`.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::cache::metadata_cache::MetadataCache;
use crate::config::{FeatureFlags, ScanConfig};
use crate::error::AppError;
use crate::fs::entry::{Entry, FileKey, NavTarget, RootType};
use crate::fs::entry::{FAKE_ENTRY_SCHEME, FILESYSTEM_SCHEME};
use crate::fs::volume::{LocationInfo, VolumeEvent};
use crate::model::directory_contents::{DirectoryContents, FileListContext, ScanOutcome};
use crate::model::file_filter::FileFilter;
use crate::model::file_list::{FileListModel, ListSelectionModel, SharedFileList};
use crate::model::store::{PropStatus, StoreAction};
use crate::scan::search_options::SearchOptions;
use crate::scan::selection::{ScannerDeps, plan_scanner};
use crate::util::async_queue::AsyncQueue;
use crate::util::debounce::{Aggregator, DeadlineTimer};
use crate::util::generation::{Generation, GenerationCounter};
use crate::util::metrics::Metrics;

#[derive(Debug, Clone)]
pub enum DirectoryModelEvent {
    DirectoryChanged {
        previous: Option<NavTarget>,
        new: NavTarget,
        volume_changed: bool,
    },
    ScanStarted,
    ScanUpdated,
    ScanCompleted,
    ScanFailed(AppError),
    ScanCancelled,
    RescanCompleted,
    BeginUpdateFiles,
    EndUpdateFiles,
    SelectionChanged,
}

/// Result of one queued directory change or search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// Applied; `listed` is false when the scan failed or was cancelled.
    Changed { listed: bool },
    /// A newer request took over before this one finished.
    Superseded,
    /// Nothing to do.
    Unchanged,
}

/// File-watcher notification for the watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// These URLs were created, modified or deleted.
    Changed(Vec<String>),
    /// Something changed; details unknown.
    Unspecified,
    /// The watched directory itself is gone.
    DirectoryDeleted,
}

/// Watcher delta held back until the scan it raced with completes.
struct DeferredUpdate {
    generation: Generation,
    scan_id: u64,
    contents_id: Option<u64>,
    changed: Vec<Entry>,
    removed_urls: Vec<String>,
}

#[derive(Default)]
struct ModelState {
    current: Option<DirectoryContents>,
    running_scan: Option<DirectoryContents>,
    pending_rescan: bool,
    pending_scan: bool,
    scan_failures: u32,
    /// Key of the most recent change request, for store echo detection.
    requested_key: Option<FileKey>,
    search_query: String,
    search_options: SearchOptions,
    watched: Option<Entry>,
    ignore_current_directory_deletion: bool,
    deferred_updates: Vec<DeferredUpdate>,
}

/// Collaborators of a [`DirectoryModel`].
#[derive(Clone)]
pub struct DirectoryModelDeps {
    pub scanners: ScannerDeps,
    pub metadata: Arc<MetadataCache>,
    pub metrics: Arc<Metrics>,
    pub scan: ScanConfig,
    pub features: FeatureFlags,
}

pub struct DirectoryModel {
    weak_self: Weak<DirectoryModel>,
    deps: DirectoryModelDeps,
    file_list: SharedFileList,
    empty_file_list: SharedFileList,
    selection: Mutex<ListSelectionModel>,
    filter: Arc<FileFilter>,
    generation: GenerationCounter,
    queue: AsyncQueue,
    state: Mutex<ModelState>,
    rescan_timer: DeadlineTimer,
    rescan_aggregator: Aggregator,
    trackers: Mutex<Vec<Arc<AtomicBool>>>,
    events: broadcast::Sender<DirectoryModelEvent>,
    subscriptions: Mutex<Vec<JoinHandle<()>>>,
}

impl DirectoryModel {
    /// Must be called inside a Tokio runtime.
    pub fn new(deps: DirectoryModelDeps) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let aggregate_delay = deps.scan.watcher_aggregate_delay;
        let show_hidden = deps.features.show_hidden;

        Arc::new_cyclic(|weak: &Weak<Self>| {
            let aggregated = weak.clone();
            Self {
                weak_self: weak.clone(),
                deps,
                file_list: FileListModel::shared(),
                empty_file_list: FileListModel::shared(),
                selection: Mutex::new(ListSelectionModel::default()),
                filter: Arc::new(FileFilter::new(show_hidden)),
                generation: GenerationCounter::new(),
                queue: AsyncQueue::new("directory_change"),
                state: Mutex::new(ModelState::default()),
                rescan_timer: DeadlineTimer::new(),
                rescan_aggregator: Aggregator::new(aggregate_delay, move || {
                    if let Some(model) = aggregated.upgrade() {
                        model.rescan_soon(true);
                    }
                }),
                trackers: Mutex::new(Vec::new()),
                events,
                subscriptions: Mutex::new(Vec::new()),
            }
        })
    }

    fn arc(&self) -> Option<Arc<Self>> {
        self.weak_self.upgrade()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DirectoryModelEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: DirectoryModelEvent) {
        trace!(?event, "Directory model event");
        let _ = self.events.send(event);
    }

    fn is_current(&self, generation: Generation) -> bool {
        self.generation.is_current(generation)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn file_list(&self) -> SharedFileList {
        self.file_list.clone()
    }

    /// Placeholder list for inactive views; never mutated.
    pub fn empty_file_list(&self) -> SharedFileList {
        self.empty_file_list.clone()
    }

    pub fn filter(&self) -> &FileFilter {
        &self.filter
    }

    pub fn current_contents(&self) -> Option<DirectoryContents> {
        self.state.lock().current.clone()
    }

    pub fn current_target(&self) -> Option<NavTarget> {
        self.state.lock().current.as_ref().map(|c| c.target().clone())
    }

    pub fn current_entry(&self) -> Option<Entry> {
        self.state
            .lock()
            .current
            .as_ref()
            .and_then(|c| c.entry().cloned())
    }

    pub fn current_location(&self) -> Option<LocationInfo> {
        let entry = self.current_entry()?;
        self.deps.scanners.volume_manager.location_info(&entry)
    }

    pub fn current_root_type(&self) -> Option<RootType> {
        self.current_target()
            .and_then(|t| t.fake_root_type())
            .or_else(|| self.current_location().map(|l| l.root_type))
    }

    pub fn is_scanning(&self) -> bool {
        self.state.lock().running_scan.is_some()
    }

    pub fn is_searching(&self) -> bool {
        self.state
            .lock()
            .current
            .as_ref()
            .is_some_and(DirectoryContents::is_search)
    }

    pub fn search_query(&self) -> String {
        self.state.lock().search_query.clone()
    }

    pub fn generation(&self) -> Generation {
        self.generation.current()
    }

    pub fn set_ignore_current_directory_deletion(&self, ignore: bool) {
        self.state.lock().ignore_current_directory_deletion = ignore;
    }

    // ------------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------------

    pub fn selection(&self) -> ListSelectionModel {
        self.selection.lock().clone()
    }

    pub fn selected_entries(&self) -> Vec<Entry> {
        let selection = self.selection.lock();
        let list = self.file_list.lock();
        selection
            .selected_indexes()
            .into_iter()
            .filter_map(|i| list.item(i).cloned())
            .collect()
    }

    pub fn select_entry(&self, url: &str) -> bool {
        let selected = {
            let mut selection = self.selection.lock();
            let index = self.file_list.lock().index_of_url(url);
            if let Some(index) = index {
                selection.select_index(index);
            }
            index.is_some()
        };
        if selected {
            self.emit(DirectoryModelEvent::SelectionChanged);
        }
        selected
    }

    pub fn select_urls(&self, urls: &[String]) {
        {
            let mut selection = self.selection.lock();
            let list = self.file_list.lock();
            let indexes: Vec<usize> = urls.iter().filter_map(|u| list.index_of_url(u)).collect();
            selection.set_lead_index(indexes.last().copied());
            selection.set_selected_indexes(indexes);
        }
        self.emit(DirectoryModelEvent::SelectionChanged);
    }

    pub fn select_all(&self) {
        {
            let mut selection = self.selection.lock();
            let len = self.file_list.lock().len();
            selection.select_range(len);
        }
        self.emit(DirectoryModelEvent::SelectionChanged);
    }

    pub fn clear_selection(&self) {
        self.selection.lock().clear();
        self.emit(DirectoryModelEvent::SelectionChanged);
    }

    // ------------------------------------------------------------------------
    // Contents construction
    // ------------------------------------------------------------------------

    fn context(&self) -> FileListContext {
        FileListContext {
            file_list: self.file_list.clone(),
            metadata: self.deps.metadata.clone(),
            volume_manager: self.deps.scanners.volume_manager.clone(),
            filter: self.filter.clone(),
            batch_size: self.deps.scan.batch_size,
        }
    }

    fn create_contents(&self, target: &NavTarget, query: &str, options: SearchOptions) -> DirectoryContents {
        let plan = plan_scanner(&self.deps.scanners, target, query, options);
        debug!(location = %target, kind = ?plan.kind, is_search = plan.is_search, "Contents created");
        DirectoryContents::new(self.context(), target.clone(), plan.is_search, plan.factory)
    }

    // ------------------------------------------------------------------------
    // Directory change
    // ------------------------------------------------------------------------

    /// Queues a change to `target`. The receiver resolves once the turn
    /// finished, after `DirectoryChanged` was emitted.
    pub fn change_directory_entry(&self, target: NavTarget) -> oneshot::Receiver<ChangeOutcome> {
        let (tx, rx) = oneshot::channel();
        let Some(this) = self.arc() else {
            let _ = tx.send(ChangeOutcome::Superseded);
            return rx;
        };

        let generation = self.generation.advance();
        let key = target.key();
        {
            let mut state = self.state.lock();
            state.requested_key = Some(key.clone());
            if let Some(current) = &state.current
                && current.is_scanning()
            {
                current.cancel_scan();
            }
            if let Some(running) = &state.running_scan {
                running.cancel_scan();
            }
        }
        info!(location = %target, generation = generation.value(), "Directory change requested");
        self.deps.scanners.store.dispatch(StoreAction::ChangeDirectory {
            key,
            status: PropStatus::Started,
        });

        self.queue.run(async move {
            let outcome = this.change_directory_turn(generation, target).await;
            let _ = tx.send(outcome);
        });
        rx
    }

    async fn change_directory_turn(self: Arc<Self>, generation: Generation, target: NavTarget) -> ChangeOutcome {
        if !self.is_current(generation) {
            return ChangeOutcome::Superseded;
        }

        let previous = self.current_target();
        self.attach_watcher(&target).await;
        if !self.is_current(generation) {
            debug!(location = %target, "Directory change superseded during watcher attach");
            return ChangeOutcome::Superseded;
        }

        let contents = self.create_contents(&target, "", SearchOptions::default());
        let (done_tx, done_rx) = oneshot::channel();
        self.clear_and_scan(contents, generation, move |listed| {
            let _ = done_tx.send(listed);
        });
        let listed = done_rx.await.unwrap_or(false);
        if !self.is_current(generation) {
            return ChangeOutcome::Superseded;
        }

        let volume_changed = self.volume_id(previous.as_ref()) != self.volume_id(Some(&target));
        self.notify_directory_changed(DirectoryModelEvent::DirectoryChanged {
            previous,
            new: target.clone(),
            volume_changed,
        });

        let had_search = {
            let mut state = self.state.lock();
            state.search_options = SearchOptions::default();
            !std::mem::take(&mut state.search_query).is_empty()
        };
        let store = &self.deps.scanners.store;
        if had_search || store.state().search.is_some() {
            store.dispatch(StoreAction::ClearSearch);
        }
        store.dispatch(StoreAction::ChangeDirectory {
            key: target.key(),
            status: PropStatus::Success,
        });

        ChangeOutcome::Changed { listed }
    }

    fn volume_id(&self, target: Option<&NavTarget>) -> Option<compact_str::CompactString> {
        let entry = target?.entry()?;
        self.deps
            .scanners
            .volume_manager
            .volume_info(entry)
            .map(|v| v.volume_id.clone())
    }

    async fn attach_watcher(&self, target: &NavTarget) {
        let previous = self.state.lock().watched.take();
        let fs = &self.deps.scanners.fs;
        if let Some(previous) = previous
            && let Err(e) = fs.unwatch(&previous).await
        {
            debug!(url = previous.url(), error = %e, "Unwatch failed");
        }

        if let NavTarget::Directory(entry) = target {
            match fs.watch(entry).await {
                Ok(()) => self.state.lock().watched = Some(entry.clone()),
                Err(e) => warn!(url = entry.url(), error = %e, "Watch failed"),
            }
        }
    }

    fn notify_directory_changed(&self, event: DirectoryModelEvent) {
        for flag in self.trackers.lock().iter() {
            flag.store(true, Ordering::Release);
        }
        self.emit(event);
    }

    /// Makes `contents` current right away, clears the list and scans.
    /// `callback(true)` on success, `callback(false)` on failure or cancel.
    fn clear_and_scan<F>(&self, contents: DirectoryContents, generation: Generation, callback: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let Some(this) = self.arc() else {
            return;
        };

        let stale_urls = {
            let mut state = self.state.lock();
            if let Some(current) = &state.current
                && current.is_scanning()
            {
                current.cancel_scan();
            }
            state.current = Some(contents.clone());
            state.running_scan = Some(contents.clone());
            state.pending_rescan = false;
            state.pending_scan = false;
            self.file_list.lock().urls()
        };
        self.rescan_timer.cancel();
        self.deps.metadata.notify_entries_removed(&stale_urls);

        if let Some(entry) = contents.entry().cloned() {
            let metadata = self.deps.metadata.clone();
            let properties = contents.prefetch_properties();
            let prefetched = entry.clone();
            tokio::spawn(async move {
                metadata.get(std::slice::from_ref(&prefetched), properties).await;
            });

            let drive_based = self
                .deps
                .scanners
                .volume_manager
                .location_info(&entry)
                .is_some_and(|l| l.is_drive_based);
            if drive_based && !self.deps.features.drive_bulk_pinning {
                self.deps.scanners.api.poll_hosted_pin_states();
            }
        }

        self.emit(DirectoryModelEvent::BeginUpdateFiles);
        self.file_list.lock().clear();
        self.selection.lock().clear();
        self.emit(DirectoryModelEvent::EndUpdateFiles);
        self.emit(DirectoryModelEvent::ScanStarted);

        let updates = this.clone();
        self.run_scan(
            contents,
            false,
            false,
            move |_| {
                if updates.is_current(generation) {
                    updates.emit(DirectoryModelEvent::ScanUpdated);
                }
            },
            move |model, outcome| {
                let current = model.is_current(generation);
                match outcome {
                    ScanOutcome::Completed => {
                        if current {
                            model.emit(DirectoryModelEvent::ScanCompleted);
                        }
                        callback(true);
                    }
                    ScanOutcome::Failed(e) => {
                        if current {
                            model.emit(DirectoryModelEvent::ScanFailed(e.clone()));
                        }
                        callback(false);
                    }
                    ScanOutcome::Cancelled => {
                        if current {
                            model.emit(DirectoryModelEvent::ScanCancelled);
                        }
                        callback(false);
                    }
                }
            },
        );
    }

    /// Runs `contents`'s scan with the shared bookkeeping. The caller has
    /// already registered `contents` as the running scan.
    fn run_scan<U, D>(&self, contents: DirectoryContents, refresh: bool, invalidate_cache: bool, on_update: U, on_done: D)
    where
        U: FnMut(usize) + Send + 'static,
        D: FnOnce(&Arc<Self>, &ScanOutcome) + Send + 'static,
    {
        let Some(this) = self.arc() else {
            return;
        };
        let scan = contents.scan(refresh, invalidate_cache, on_update);

        tokio::spawn(async move {
            let outcome = scan.await;
            this.clear_running_scan(&contents);
            let deferred = this.take_deferred_updates(&contents);

            match &outcome {
                ScanOutcome::Completed => {
                    this.record_downloads_scan(&contents);
                    on_done(&this, &outcome);
                    this.replay_deferred_updates(deferred);
                    let (pending_rescan, pending_scan) = {
                        let mut state = this.state.lock();
                        state.scan_failures = 0;
                        (
                            std::mem::take(&mut state.pending_rescan),
                            std::mem::take(&mut state.pending_scan),
                        )
                    };
                    if pending_rescan {
                        this.rescan_soon(refresh);
                    } else if pending_scan {
                        this.rescan_soon(false);
                    }
                }
                ScanOutcome::Failed(error) => {
                    let (failures, pending_rescan) = {
                        let mut state = this.state.lock();
                        state.scan_failures += 1;
                        (state.scan_failures, std::mem::take(&mut state.pending_rescan))
                    };
                    warn!(location = %contents.target(), error = %error, failures, "Scan failed");
                    on_done(&this, &outcome);

                    if pending_rescan {
                        this.rescan_soon(refresh);
                    } else if error.is_guest_connection_error() {
                        info!(location = %contents.target(), "Guest connection failed, not retrying");
                    } else if failures <= this.deps.scan.max_scan_retries {
                        this.rescan_later(refresh);
                    }
                }
                ScanOutcome::Cancelled => on_done(&this, &outcome),
            }
        });
    }

    fn take_deferred_updates(&self, contents: &DirectoryContents) -> Vec<DeferredUpdate> {
        let mut state = self.state.lock();
        let (taken, kept) = std::mem::take(&mut state.deferred_updates)
            .into_iter()
            .partition(|u| u.scan_id == contents.id());
        state.deferred_updates = kept;
        taken
    }

    /// Reapplies deltas held back during a completed scan, dropping those
    /// whose directory is no longer shown.
    fn replay_deferred_updates(&self, deferred: Vec<DeferredUpdate>) {
        for update in deferred {
            let current_id = self.state.lock().current.as_ref().map(DirectoryContents::id);
            let same_contents = current_id.is_some()
                && (current_id == update.contents_id || current_id == Some(update.scan_id));
            if !self.is_current(update.generation) || !same_contents {
                debug!(
                    changed = update.changed.len(),
                    removed = update.removed_urls.len(),
                    "Deferred partial update dropped"
                );
                continue;
            }
            self.partial_update(update.changed, update.removed_urls);
        }
    }

    fn clear_running_scan(&self, contents: &DirectoryContents) {
        let mut state = self.state.lock();
        if state.running_scan.as_ref().is_some_and(|r| r.id() == contents.id()) {
            state.running_scan = None;
        }
    }

    fn record_downloads_scan(&self, contents: &DirectoryContents) {
        let Some(entry) = contents.entry() else {
            return;
        };
        let is_downloads_root = self
            .deps
            .scanners
            .volume_manager
            .location_info(entry)
            .is_some_and(|l| l.root_type == RootType::Downloads && l.is_root_entry);
        if is_downloads_root {
            info!(marker = "DOWNLOADS_SCAN_COMPLETED", url = entry.url(), "Downloads scanned");
            self.deps.metrics.record("DownloadsScan");
        }
    }

    // ------------------------------------------------------------------------
    // Rescan
    // ------------------------------------------------------------------------

    /// Rescans into a shadow copy and swaps it in on success. Coalesced into
    /// one pending rescan while another scan runs.
    pub fn rescan(&self, refresh: bool, invalidate_cache: bool) {
        let (current, shadow) = {
            let mut state = self.state.lock();
            if state.running_scan.is_some() {
                trace!("Rescan coalesced");
                state.pending_rescan = true;
                return;
            }
            let Some(current) = state.current.clone() else {
                return;
            };
            let shadow = current.clone_contents();
            state.running_scan = Some(shadow.clone());
            (current, shadow)
        };
        self.rescan_timer.cancel();

        let generation = self.generation.current();
        debug!(location = %current.target(), "Rescan started");
        let swapped = shadow.clone();

        self.run_scan(shadow, refresh, invalidate_cache, |_| {}, move |model, outcome| {
            if !model.is_current(generation) {
                return;
            }
            let still_current = model
                .state
                .lock()
                .current
                .as_ref()
                .is_some_and(|c| c.id() == current.id());
            if !still_current {
                return;
            }
            match outcome {
                ScanOutcome::Completed => {
                    model.replace_directory_contents(swapped);
                    model.emit(DirectoryModelEvent::RescanCompleted);
                }
                ScanOutcome::Failed(e) => model.emit(DirectoryModelEvent::ScanFailed(e.clone())),
                ScanOutcome::Cancelled => {}
            }
        });
    }

    pub fn rescan_soon(&self, refresh: bool) {
        self.schedule_rescan(self.deps.scan.rescan_soon_delay, refresh);
    }

    pub fn rescan_later(&self, refresh: bool) {
        self.schedule_rescan(self.deps.scan.rescan_later_delay, refresh);
    }

    fn schedule_rescan(&self, delay: std::time::Duration, refresh: bool) {
        let weak = self.weak_self.clone();
        let armed = self.rescan_timer.schedule_earliest(delay, move || {
            if let Some(model) = weak.upgrade() {
                model.rescan(refresh, false);
            }
        });
        trace!(?delay, armed, "Rescan scheduled");
    }

    /// Swaps in a freshly scanned shadow, keeping selection by URL.
    fn replace_directory_contents(&self, shadow: DirectoryContents) {
        self.emit(DirectoryModelEvent::BeginUpdateFiles);
        {
            let mut state = self.state.lock();
            let mut selection = self.selection.lock();

            let (selected_urls, lead_url, max_index) = {
                let list = self.file_list.lock();
                let indexes = selection.selected_indexes();
                let urls: Vec<String> = indexes
                    .iter()
                    .filter_map(|&i| list.item(i).map(|e| e.url().to_string()))
                    .collect();
                let lead = selection
                    .lead_index()
                    .and_then(|i| list.item(i))
                    .map(|e| e.url().to_string());
                (urls, lead, indexes.last().copied())
            };

            state.current = Some(shadow.clone());
            shadow.replace_context_file_list();

            let list = self.file_list.lock();
            let restored: Vec<usize> = selected_urls
                .iter()
                .filter_map(|url| list.index_of_url(url))
                .collect();
            selection.clear();

            if restored.is_empty() {
                if let Some(max_index) = max_index
                    && !list.is_empty()
                {
                    // Everything selected is gone: select the item that took
                    // the place of the old selection.
                    let base = (max_index + 1).saturating_sub(selected_urls.len());
                    let index = base.min(list.len() - 1);
                    selection.select_index(index);
                }
            } else {
                selection.set_selected_indexes(restored.iter().copied());
                let lead = lead_url.and_then(|url| list.index_of_url(&url));
                selection.set_lead_index(lead.or_else(|| restored.last().copied()));
            }
        }
        self.emit(DirectoryModelEvent::EndUpdateFiles);
        self.emit(DirectoryModelEvent::SelectionChanged);
    }

    /// Cancels the current scan and lists the current directory again
    /// through the change queue.
    pub fn clear_current_dir_and_scan(&self) -> oneshot::Receiver<ChangeOutcome> {
        let (tx, rx) = oneshot::channel();
        let (Some(this), Some(current)) = (self.arc(), self.current_contents()) else {
            let _ = tx.send(ChangeOutcome::Unchanged);
            return rx;
        };

        let generation = self.generation.advance();
        current.cancel_scan();
        if let Some(running) = self.state.lock().running_scan.clone() {
            running.cancel_scan();
        }

        self.queue.run(async move {
            if !this.is_current(generation) {
                let _ = tx.send(ChangeOutcome::Superseded);
                return;
            }
            let (done_tx, done_rx) = oneshot::channel();
            this.clear_and_scan(current.clone_contents(), generation, move |listed| {
                let _ = done_tx.send(listed);
            });
            let listed = done_rx.await.unwrap_or(false);
            let outcome = if this.is_current(generation) {
                ChangeOutcome::Changed { listed }
            } else {
                ChangeOutcome::Superseded
            };
            let _ = tx.send(outcome);
        });
        rx
    }

    // ------------------------------------------------------------------------
    // Incremental updates
    // ------------------------------------------------------------------------

    /// Applies a delta to the current contents, after any running scan.
    pub fn partial_update(&self, changed: Vec<Entry>, removed_urls: Vec<String>) {
        let Some(this) = self.arc() else {
            return;
        };
        let generation = self.generation.current();
        let current = {
            let mut state = self.state.lock();
            let current_id = state.current.as_ref().map(DirectoryContents::id);
            if let Some(scan_id) = state.running_scan.as_ref().map(DirectoryContents::id) {
                debug!(changed = changed.len(), removed = removed_urls.len(), "Partial update deferred");
                state.deferred_updates.push(DeferredUpdate {
                    generation,
                    scan_id,
                    contents_id: current_id,
                    changed,
                    removed_urls,
                });
                return;
            }
            state.current.clone()
        };

        let Some(current) = current else {
            return;
        };
        tokio::spawn(async move {
            this.deps.metadata.notify_entries_removed(&removed_urls);
            this.deps.metadata.notify_entries_changed(&changed);
            current.update(changed, removed_urls).await;
            if this.is_current(generation) {
                this.emit(DirectoryModelEvent::ScanUpdated);
            }
        });
    }

    /// Lists a new entry and selects it.
    pub async fn add_and_select_entry(&self, entry: Entry) {
        let Some(current) = self.current_contents() else {
            return;
        };
        let generation = self.generation.current();
        self.deps.metadata.notify_entries_created(std::slice::from_ref(&entry));
        current.update(vec![entry.clone()], Vec::new()).await;
        if self.is_current(generation) {
            self.emit(DirectoryModelEvent::ScanUpdated);
            self.select_entry(entry.url());
        }
    }

    /// Follows a rename: navigates when the current directory itself was
    /// renamed, otherwise swaps the entry in the list and selects it.
    pub async fn on_rename_entry(&self, old: &Entry, renamed: Entry) {
        self.deps.metadata.notify_entries_removed(&[old.url().to_string()]);

        if self.current_entry().as_ref() == Some(old) {
            let _ = self.change_directory_entry(NavTarget::Directory(renamed)).await;
            return;
        }

        let Some(current) = self.current_contents() else {
            return;
        };
        let generation = self.generation.current();
        current
            .update(vec![renamed.clone()], vec![old.url().to_string()])
            .await;
        if self.is_current(generation) {
            self.emit(DirectoryModelEvent::ScanUpdated);
            self.select_entry(renamed.url());
        }
    }

    // ------------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------------

    /// Queues a search in the current directory. An empty query while not
    /// searching does nothing; while searching it restores the plain listing.
    pub fn search(&self, query: &str, options: SearchOptions) -> oneshot::Receiver<ChangeOutcome> {
        let (tx, rx) = oneshot::channel();
        let query = query.trim().to_string();
        let (Some(this), Some(current)) = (self.arc(), self.current_contents()) else {
            let _ = tx.send(ChangeOutcome::Unchanged);
            return rx;
        };

        {
            let mut state = self.state.lock();
            let searching = !state.search_query.is_empty() || current.is_search();
            if query.is_empty() && !searching {
                let _ = tx.send(ChangeOutcome::Unchanged);
                return rx;
            }
            state.search_query.clone_from(&query);
            state.search_options = options;
        }

        let generation = self.generation.advance();
        if current.is_scanning() {
            current.cancel_scan();
        }
        let target = current.target().clone();
        info!(query = %query, ?options, generation = generation.value(), "Search requested");

        self.queue.run(async move {
            let outcome = this.search_turn(generation, target, query, options).await;
            let _ = tx.send(outcome);
        });
        rx
    }

    async fn search_turn(
        self: Arc<Self>,
        generation: Generation,
        target: NavTarget,
        query: String,
        options: SearchOptions,
    ) -> ChangeOutcome {
        if !self.is_current(generation) {
            return ChangeOutcome::Superseded;
        }
        let store = self.deps.scanners.store.clone();

        if !query.is_empty() {
            store.dispatch(StoreAction::UpdateSearch {
                query: query.clone(),
                options,
                status: PropStatus::Started,
            });
        }

        let contents = self.create_contents(&target, &query, options);
        let (done_tx, done_rx) = oneshot::channel();
        self.clear_and_scan(contents, generation, move |listed| {
            let _ = done_tx.send(listed);
        });
        let listed = done_rx.await.unwrap_or(false);
        if !self.is_current(generation) {
            return ChangeOutcome::Superseded;
        }

        if query.is_empty() {
            store.dispatch(StoreAction::ClearSearch);
        } else {
            store.dispatch(StoreAction::UpdateSearch {
                query,
                options,
                status: if listed {
                    PropStatus::Success
                } else {
                    PropStatus::Error
                },
            });
        }
        ChangeOutcome::Changed { listed }
    }

    // ------------------------------------------------------------------------
    // Filter, watcher, volumes, store
    // ------------------------------------------------------------------------

    pub fn set_show_hidden(&self, show: bool) {
        if self.filter.set_show_hidden(show) {
            self.on_filter_changed();
        }
    }

    pub fn on_filter_changed(&self) {
        let mut state = self.state.lock();
        if state.running_scan.is_some() {
            state.pending_scan = true;
            return;
        }
        drop(state);
        self.rescan_soon(false);
    }

    pub async fn on_watcher_changed(&self, event: WatchEvent) {
        match event {
            WatchEvent::Unspecified => self.rescan_aggregator.run(),
            WatchEvent::DirectoryDeleted => {
                let (ignore, current) = {
                    let state = self.state.lock();
                    (state.ignore_current_directory_deletion, state.current.clone())
                };
                if ignore {
                    return;
                }
                let Some(entry) = current.as_ref().and_then(|c| c.entry().cloned()) else {
                    return;
                };
                let volume_manager = &self.deps.scanners.volume_manager;
                let fallback = volume_manager
                    .volume_info(&entry)
                    .map(|v| v.display_root())
                    .or_else(|| volume_manager.default_display_root());
                if let Some(root) = fallback {
                    info!(deleted = entry.url(), root = root.url(), "Current directory deleted");
                    let _ = self.change_directory_entry(NavTarget::Directory(root));
                }
            }
            WatchEvent::Changed(urls) => {
                let generation = self.generation.current();
                let mut changed = Vec::new();
                let mut removed = Vec::new();
                for url in urls {
                    match self.deps.scanners.fs.resolve_url(&url).await {
                        Ok(entry) => changed.push(entry),
                        Err(_) => removed.push(url),
                    }
                }
                if self.is_current(generation) {
                    self.partial_update(changed, removed);
                }
            }
        }
    }

    /// Leaves a directory whose volume went away, unless a tracker runs.
    pub fn on_volume_list_changed(&self) {
        if self.trackers_running() > 0 {
            debug!("Volume list changed while trackers run; staying");
            return;
        }
        let Some(NavTarget::Directory(entry)) = self.current_target() else {
            return;
        };
        let volume_manager = &self.deps.scanners.volume_manager;
        if volume_manager.volume_info(&entry).is_some() {
            return;
        }
        if let Some(root) = volume_manager.default_display_root() {
            info!(gone = entry.url(), root = root.url(), "Volume of current directory removed");
            let _ = self.change_directory_entry(NavTarget::Directory(root));
        }
    }

    /// Enters a guest volume once it mounts while its placeholder is shown.
    pub fn on_volume_mounted(&self, volume_id: &str) {
        let Some(NavTarget::FakeRoot { root_type, .. }) = self.current_target() else {
            return;
        };
        if !matches!(root_type, RootType::Crostini | RootType::GuestOs) {
            return;
        }
        let volume = self
            .deps
            .scanners
            .volume_manager
            .volume_list()
            .into_iter()
            .find(|v| v.volume_id == volume_id && v.volume_type.root_type() == root_type);
        if let Some(volume) = volume {
            let root = volume.display_root();
            info!(volume_id, root = root.url(), "Guest volume mounted, entering it");
            let _ = self.change_directory_entry(NavTarget::Directory(root));
        }
    }

    pub fn attach_volume_events(&self, mut events: broadcast::Receiver<VolumeEvent>) {
        let weak = self.weak_self.clone();
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(VolumeEvent::Mounted(volume_id)) => {
                        let Some(model) = weak.upgrade() else { break };
                        model.on_volume_mounted(&volume_id);
                        model.on_volume_list_changed();
                    }
                    Ok(VolumeEvent::Unmounted(_)) => {
                        let Some(model) = weak.upgrade() else { break };
                        model.on_volume_list_changed();
                    }
                    Ok(VolumeEvent::DriveConnectionChanged(_)) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.subscriptions.lock().push(handle);
    }

    /// Follows navigation and search requests made through the store.
    pub fn attach_store(&self) {
        let mut updates = self.deps.scanners.store.subscribe();
        let weak = self.weak_self.clone();
        let handle = tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                let Some(model) = weak.upgrade() else { break };
                model.on_store_changed().await;
            }
        });
        self.subscriptions.lock().push(handle);
    }

    async fn on_store_changed(&self) {
        // Always act on the latest snapshot, never on a stale one.
        let snapshot = self.deps.scanners.store.state();

        if let Some(requested) = &snapshot.current_directory
            && requested.status == PropStatus::Started
        {
            let known = self.state.lock().requested_key.as_ref() == Some(&requested.key);
            if !known {
                match self.resolve_key(&requested.key).await {
                    Some(target) => {
                        let _ = self.change_directory_entry(target);
                    }
                    None => warn!(key = requested.key.as_str(), "Unresolvable navigation request"),
                }
                return;
            }
        }

        let (query, options) = snapshot
            .search
            .as_ref()
            .map(|s| (s.query.trim().to_string(), s.options))
            .unwrap_or_default();
        let differs = {
            let state = self.state.lock();
            state.search_query != query || (!query.is_empty() && state.search_options != options)
        };
        if differs {
            let _ = self.search(&query, options);
        }
    }

    async fn resolve_key(&self, key: &FileKey) -> Option<NavTarget> {
        let key = key.as_str();
        if key.starts_with(FILESYSTEM_SCHEME) {
            let entry = self.deps.scanners.fs.resolve_url(key).await.ok()?;
            return Some(NavTarget::from_entry(entry));
        }
        if key.starts_with(FAKE_ENTRY_SCHEME) || key.starts_with("entry-list://") {
            return self
                .deps
                .scanners
                .volume_manager
                .fake_entries()
                .into_iter()
                .find(|e| e.url() == key)
                .map(NavTarget::from_entry);
        }
        Some(NavTarget::StoreView(FileKey::new(key)))
    }

    // ------------------------------------------------------------------------
    // Trackers
    // ------------------------------------------------------------------------

    pub fn trackers_running(&self) -> usize {
        self.trackers.lock().len()
    }

    pub fn change_tracker(&self) -> DirectoryChangeTracker {
        DirectoryChangeTracker {
            model: self.weak_self.clone(),
            flag: Arc::new(AtomicBool::new(false)),
            active: false,
        }
    }
}

impl Drop for DirectoryModel {
    fn drop(&mut self) {
        for handle in self.subscriptions.lock().drain(..) {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for DirectoryModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryModel")
            .field("generation", &self.generation.current())
            .field("current", &self.current_target())
            .finish_non_exhaustive()
    }
}

/// Detects "the directory changed under me" for long-running operations.
#[derive(Debug)]
pub struct DirectoryChangeTracker {
    model: Weak<DirectoryModel>,
    flag: Arc<AtomicBool>,
    active: bool,
}

impl DirectoryChangeTracker {
    pub fn start(&mut self) {
        if self.active {
            return;
        }
        if let Some(model) = self.model.upgrade() {
            model.trackers.lock().push(self.flag.clone());
            self.active = true;
        }
    }

    pub fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(model) = self.model.upgrade() {
            model.trackers.lock().retain(|f| !Arc::ptr_eq(f, &self.flag));
        }
    }

    pub fn has_changed(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl Drop for DirectoryChangeTracker {
    fn drop(&mut self) {
        self.stop();
    }
}
