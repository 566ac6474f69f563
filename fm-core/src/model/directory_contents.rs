//! ``src/model/directory_contents.rs``
//!
//! # `DirectoryContents`: one scan of one target into one file list
//!
//! Lifecycle: `Idle → Scanning → {Completed | Failed | Cancelled}`.
//! [`DirectoryContents::update`] applies an incremental delta after the fact,
//! briefly re-entering `Scanning`. [`DirectoryContents::clone_contents`] builds
//! a detached copy with its own file list so a rescan can run while the
//! current list stays on screen; [`DirectoryContents::replace_context_file_list`]
//! moves the copy's entries into the shared list once it becomes current.

use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace};

use crate::cache::metadata_cache::{DRIVE_PROPERTIES, LIST_PROPERTIES, MetadataCache, MetadataProperty};
use crate::error::AppError;
use crate::fs::entry::{Entry, NavTarget};
use crate::fs::volume::VolumeManager;
use crate::model::file_filter::FileFilter;
use crate::model::file_list::{FileListModel, SharedFileList};
use crate::scan::content_scanner::{ContentScanner, ScanEvent, ScanOptions, run_scanner};
use crate::scan::selection::ScannerFactory;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Idle,
    Scanning,
    Completed,
    Failed,
    Cancelled,
}

/// Terminal result of one scan.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Completed,
    Failed(AppError),
    Cancelled,
}

#[derive(Debug, Clone)]
pub enum ContentsEvent {
    Started,
    /// Entries were added, replaced or removed.
    Updated,
    Completed,
    Failed(AppError),
    Cancelled,
}

/// What every contents of one directory model shares.
#[derive(Clone)]
pub struct FileListContext {
    /// The list the UI observes.
    pub file_list: SharedFileList,
    pub metadata: Arc<MetadataCache>,
    pub volume_manager: Arc<dyn VolumeManager>,
    pub filter: Arc<FileFilter>,
    pub batch_size: usize,
}

impl fmt::Debug for FileListContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileListContext")
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

struct ContentsState {
    status: ScanStatus,
    scanner: Option<Arc<dyn ContentScanner>>,
    file_list: SharedFileList,
    cancel_requested: bool,
}

struct Inner {
    id: u64,
    context: FileListContext,
    target: NavTarget,
    is_search: bool,
    factory: ScannerFactory,
    state: Mutex<ContentsState>,
    events: broadcast::Sender<ContentsEvent>,
}

/// Cheap to clone; clones share one scan. See [`Self::clone_contents`] for a
/// detached copy.
#[derive(Clone)]
pub struct DirectoryContents {
    inner: Arc<Inner>,
}

impl DirectoryContents {
    /// Contents that write straight into the context's shared list.
    pub fn new(
        context: FileListContext,
        target: NavTarget,
        is_search: bool,
        factory: ScannerFactory,
    ) -> Self {
        let file_list = context.file_list.clone();
        Self::with_file_list(context, target, is_search, factory, file_list)
    }

    fn with_file_list(
        context: FileListContext,
        target: NavTarget,
        is_search: bool,
        factory: ScannerFactory,
        file_list: SharedFileList,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                context,
                target,
                is_search,
                factory,
                state: Mutex::new(ContentsState {
                    status: ScanStatus::Idle,
                    scanner: None,
                    file_list,
                    cancel_requested: false,
                }),
                events,
            }),
        }
    }

    /// Same target, scanner factory and context, with its own empty list.
    pub fn clone_contents(&self) -> Self {
        Self::with_file_list(
            self.inner.context.clone(),
            self.inner.target.clone(),
            self.inner.is_search,
            self.inner.factory.clone(),
            FileListModel::shared(),
        )
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn target(&self) -> &NavTarget {
        &self.inner.target
    }

    pub fn entry(&self) -> Option<&Entry> {
        self.inner.target.entry()
    }

    pub fn is_search(&self) -> bool {
        self.inner.is_search
    }

    pub fn context(&self) -> &FileListContext {
        &self.inner.context
    }

    pub fn status(&self) -> ScanStatus {
        self.inner.state.lock().status
    }

    pub fn is_scanning(&self) -> bool {
        self.status() == ScanStatus::Scanning
    }

    pub fn file_list(&self) -> SharedFileList {
        self.inner.state.lock().file_list.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ContentsEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: ContentsEvent) {
        let _ = self.inner.events.send(event);
    }

    /// Metadata loaded alongside each batch.
    pub fn prefetch_properties(&self) -> &'static [MetadataProperty] {
        let drive_based = self
            .entry()
            .and_then(|entry| self.inner.context.volume_manager.location_info(entry))
            .is_some_and(|location| location.is_drive_based);
        if drive_based {
            DRIVE_PROPERTIES
        } else {
            LIST_PROPERTIES
        }
    }

    /// Starts scanning. The status becomes `Scanning` before this returns;
    /// the returned future drives the scan to its terminal outcome and calls
    /// `on_update` with the number of entries after every applied batch.
    pub fn scan<F>(
        &self,
        refresh: bool,
        invalidate_cache: bool,
        mut on_update: F,
    ) -> impl Future<Output = ScanOutcome> + Send + 'static
    where
        F: FnMut(usize) + Send + 'static,
    {
        let scanner = (self.inner.factory)();
        {
            let mut state = self.inner.state.lock();
            state.status = ScanStatus::Scanning;
            state.scanner = Some(scanner.clone());
            if state.cancel_requested {
                scanner.cancel();
            }
        }
        self.emit(ContentsEvent::Started);
        debug!(contents = self.id(), location = %self.inner.target, scanner = scanner.name(), "Scan started");

        let options = ScanOptions {
            refresh,
            invalidate_cache,
            batch_size: self.inner.context.batch_size,
        };
        let this = self.clone();

        async move {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let producer = run_scanner(scanner.clone(), tx, options);

            let consumer = async {
                loop {
                    match rx.recv().await {
                        Some(ScanEvent::Updated(batch)) => {
                            if let Some(count) = this.apply_batch(batch, scanner.as_ref()).await {
                                on_update(count);
                                this.emit(ContentsEvent::Updated);
                            }
                        }
                        Some(ScanEvent::Completed) => break ScanOutcome::Completed,
                        Some(ScanEvent::Failed(e)) => break ScanOutcome::Failed(e),
                        Some(ScanEvent::Cancelled) | None => break ScanOutcome::Cancelled,
                    }
                }
            };

            let ((), outcome) = tokio::join!(producer, consumer);
            this.finish(&outcome);
            outcome
        }
    }

    /// Filters, prefetches metadata and inserts one batch. `None` when the
    /// scan was cancelled meanwhile.
    async fn apply_batch(&self, batch: Vec<Entry>, scanner: &dyn ContentScanner) -> Option<usize> {
        let filter = &self.inner.context.filter;
        let batch: Vec<Entry> = batch.into_iter().filter(|e| filter.accepts(e)).collect();
        if !batch.is_empty() {
            self.inner
                .context
                .metadata
                .get(&batch, self.prefetch_properties())
                .await;
        }

        if scanner.is_cancelled() {
            trace!(contents = self.id(), "Dropping batch of a cancelled scan");
            return None;
        }

        let list = self.file_list();
        let mut list = list.lock();
        list.add_sorted(batch);
        Some(list.len())
    }

    fn finish(&self, outcome: &ScanOutcome) {
        let (status, event) = match outcome {
            ScanOutcome::Completed => (ScanStatus::Completed, ContentsEvent::Completed),
            ScanOutcome::Failed(e) => (ScanStatus::Failed, ContentsEvent::Failed(e.clone())),
            ScanOutcome::Cancelled => (ScanStatus::Cancelled, ContentsEvent::Cancelled),
        };
        {
            let mut state = self.inner.state.lock();
            state.status = status;
            state.scanner = None;
        }
        debug!(contents = self.id(), ?status, "Scan finished");
        self.emit(event);
    }

    /// Cancels the running scan, or the next one if none is running yet.
    /// Idempotent; a no-op once the scan finished.
    pub fn cancel_scan(&self) {
        let scanner = {
            let mut state = self.inner.state.lock();
            match state.status {
                ScanStatus::Idle => {
                    state.cancel_requested = true;
                    None
                }
                ScanStatus::Scanning => {
                    state.cancel_requested = true;
                    state.scanner.clone()
                }
                ScanStatus::Completed | ScanStatus::Failed | ScanStatus::Cancelled => None,
            }
        };
        if let Some(scanner) = scanner {
            scanner.cancel();
        }
    }

    /// Applies a delta without listing the directory again.
    pub async fn update(&self, changed: Vec<Entry>, removed_urls: Vec<String>) {
        let previous = {
            let mut state = self.inner.state.lock();
            std::mem::replace(&mut state.status, ScanStatus::Scanning)
        };

        let filter = &self.inner.context.filter;
        let changed: Vec<Entry> = changed.into_iter().filter(|e| filter.accepts(e)).collect();
        if !changed.is_empty() {
            self.inner
                .context
                .metadata
                .get(&changed, self.prefetch_properties())
                .await;
        }

        {
            let list = self.file_list();
            let mut list = list.lock();
            list.remove_urls(&removed_urls);
            list.add_sorted(changed);
        }

        {
            let mut state = self.inner.state.lock();
            if state.status == ScanStatus::Scanning && state.scanner.is_none() {
                state.status = previous;
            }
        }
        self.emit(ContentsEvent::Updated);
    }

    /// Moves this contents' entries into the shared list and writes there
    /// from now on.
    pub fn replace_context_file_list(&self) {
        let shared = self.inner.context.file_list.clone();
        let mut state = self.inner.state.lock();
        if Arc::ptr_eq(&state.file_list, &shared) {
            return;
        }
        let entries = state.file_list.lock().entries().to_vec();
        shared.lock().replace_all(entries);
        state.file_list = shared;
    }
}

impl fmt::Debug for DirectoryContents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryContents")
            .field("id", &self.inner.id)
            .field("target", &self.inner.target)
            .field("is_search", &self.inner.is_search)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::search_options::SearchOptions;
    use crate::scan::selection::plan_scanner;
    use crate::test_support::{TestEnv, downloads_root};
    use std::time::Duration;

    fn contents_for(env: &TestEnv, dir: &Entry) -> DirectoryContents {
        let target = NavTarget::Directory(dir.clone());
        let plan = plan_scanner(&env.deps(), &target, "", SearchOptions::default());
        DirectoryContents::new(env.context(), target, plan.is_search, plan.factory)
    }

    #[tokio::test]
    async fn test_scan_fills_shared_list_sorted_and_filtered() {
        let env = TestEnv::new();
        let root = downloads_root();
        env.fs.add_dir(
            &root,
            vec![
                root.child("b.txt", false),
                root.child(".hidden", false),
                root.child("photos", true),
                root.child("a.txt", false),
            ],
        );

        let contents = contents_for(&env, &root);
        let outcome = contents.scan(false, false, |_| {}).await;

        assert!(matches!(outcome, ScanOutcome::Completed));
        assert_eq!(contents.status(), ScanStatus::Completed);
        let names: Vec<String> = env
            .file_list
            .lock()
            .entries()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, vec!["photos", "a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_cancel_before_and_during_scan() {
        let env = TestEnv::new();
        let root = downloads_root();
        env.fs.add_dir(&root, vec![root.child("a.txt", false)]);

        let early = contents_for(&env, &root);
        early.cancel_scan();
        early.cancel_scan();
        assert!(matches!(early.scan(false, false, |_| {}).await, ScanOutcome::Cancelled));

        env.fs.set_delay(Duration::from_millis(50));
        let running = contents_for(&env, &root);
        let scan = tokio::spawn(running.scan(false, false, |_| {}));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(running.is_scanning());
        running.cancel_scan();

        assert!(matches!(scan.await.unwrap(), ScanOutcome::Cancelled));
        assert!(env.file_list.lock().is_empty());

        // Cancelling after the fact changes nothing.
        running.cancel_scan();
        assert_eq!(running.status(), ScanStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_clone_scans_into_own_list_until_replaced() {
        let env = TestEnv::new();
        let root = downloads_root();
        env.fs.add_dir(&root, vec![root.child("a.txt", false)]);

        let current = contents_for(&env, &root);
        current.scan(false, false, |_| {}).await;

        env.fs.add_dir(&root, vec![root.child("a.txt", false), root.child("b.txt", false)]);
        let shadow = current.clone_contents();
        let mut updates = Vec::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = shadow
            .scan(false, false, move |count| {
                let _ = tx.send(count);
            })
            .await;
        while let Ok(count) = rx.try_recv() {
            updates.push(count);
        }

        assert!(matches!(outcome, ScanOutcome::Completed));
        assert_eq!(updates, vec![2]);
        assert_eq!(env.file_list.lock().len(), 1);

        shadow.replace_context_file_list();
        assert_eq!(env.file_list.lock().len(), 2);
        assert!(Arc::ptr_eq(&shadow.file_list(), &env.file_list));
    }

    #[tokio::test]
    async fn test_update_applies_delta() {
        let env = TestEnv::new();
        let root = downloads_root();
        let a = root.child("a.txt", false);
        env.fs.add_dir(&root, vec![a.clone(), root.child("b.txt", false)]);

        let contents = contents_for(&env, &root);
        contents.scan(false, false, |_| {}).await;

        let mut events = contents.subscribe();
        contents
            .update(vec![root.child("c.txt", false)], vec![a.url().to_string()])
            .await;

        assert!(matches!(events.recv().await.unwrap(), ContentsEvent::Updated));
        assert_eq!(contents.status(), ScanStatus::Completed);
        assert_eq!(env.file_list.lock().urls(), vec![
            root.child("b.txt", false).url().to_string(),
            root.child("c.txt", false).url().to_string(),
        ]);
    }
}
