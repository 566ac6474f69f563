//! Explicit drag-session context.
//!
//! One [`DragSession`] is shared by reference between the drag source and all
//! drop targets. `start` mirrors the fields a protected drop target needs into
//! the [`LocalStore`]; `end` clears them again.

use crate::payload::{DataTransfer, MISSING_FILE_CONTENTS, SOURCE_ROOT_URL, TransferPayload};
use crate::store::LocalStore;
use compact_str::{CompactString, format_compact};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

const SOURCE_ROOT_URL_KEY: &str = "drag-and-drop-source-root-url";
const MISSING_FILE_CONTENTS_KEY: &str = "drag-and-drop-missing-file-contents";
const ENCRYPTED_KEY: &str = "drag-and-drop-encrypted";

/// Fields of the active drag visible even when the transfer is protected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragGlobals {
    pub source_root_url: String,
    pub missing_file_contents: bool,
    pub encrypted: bool,
}

#[derive(Debug)]
struct ActiveDrag {
    payload: TransferPayload,
    started_at: Instant,
}

pub struct DragSession {
    app_id: CompactString,
    store: Arc<dyn LocalStore>,
    active: Mutex<Option<ActiveDrag>>,
}

impl DragSession {
    pub fn new(app_id: impl Into<CompactString>, store: Arc<dyn LocalStore>) -> Self {
        Self {
            app_id: app_id.into(),
            store,
            active: Mutex::new(None),
        }
    }

    fn key(&self, name: &str) -> String {
        format_compact!("{}.{}", self.app_id, name).into()
    }

    /// Begins a drag carrying `payload`.
    pub fn start(&self, payload: TransferPayload) {
        self.store.set(
            &self.key(SOURCE_ROOT_URL_KEY),
            payload.source_root_url.clone().unwrap_or_default(),
        );
        self.store.set(
            &self.key(MISSING_FILE_CONTENTS_KEY),
            payload.missing_file_contents.to_string(),
        );
        self.store
            .set(&self.key(ENCRYPTED_KEY), payload.encrypted.to_string());

        debug!(sources = payload.source_urls.len(), "Drag session started");

        *self.active.lock() = Some(ActiveDrag {
            payload,
            started_at: Instant::now(),
        });
    }

    /// Ends the drag and removes the mirrored keys.
    pub fn end(&self) {
        if let Some(drag) = self.active.lock().take() {
            debug!(elapsed = ?drag.started_at.elapsed(), "Drag session ended");
        }
        self.store.remove(&self.key(SOURCE_ROOT_URL_KEY));
        self.store.remove(&self.key(MISSING_FILE_CONTENTS_KEY));
        self.store.remove(&self.key(ENCRYPTED_KEY));
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Payload of the drag started in this window, if any.
    pub fn payload(&self) -> Option<TransferPayload> {
        self.active.lock().as_ref().map(|drag| drag.payload.clone())
    }

    /// Mirrored fields, readable from any window sharing the store.
    pub fn globals(&self) -> Option<DragGlobals> {
        let source_root_url = self.store.get(&self.key(SOURCE_ROOT_URL_KEY))?;
        let missing = self.store.get(&self.key(MISSING_FILE_CONTENTS_KEY))?;
        let encrypted = self.store.get(&self.key(ENCRYPTED_KEY));

        Some(DragGlobals {
            source_root_url,
            missing_file_contents: missing == "true",
            encrypted: encrypted.as_deref() == Some("true"),
        })
    }

    /// Source root URL from the transfer, falling back to the session.
    pub fn source_root_url(&self, transfer: &DataTransfer) -> String {
        if let Some(url) = transfer.get_data(SOURCE_ROOT_URL)
            && !url.is_empty()
        {
            return url.to_owned();
        }
        self.globals()
            .map(|globals| globals.source_root_url)
            .unwrap_or_default()
    }

    /// Whether the dragged file bytes are unavailable (offline Drive files).
    pub fn missing_file_contents(&self, transfer: &DataTransfer) -> bool {
        if let Some(value) = transfer.get_data(MISSING_FILE_CONTENTS) {
            return value == "true";
        }
        self.globals()
            .is_some_and(|globals| globals.missing_file_contents)
    }

    pub fn encrypted(&self, transfer: &DataTransfer) -> bool {
        if let Some(value) = transfer.get_data(crate::payload::ENCRYPTED) {
            return value == "true";
        }
        self.globals().is_some_and(|globals| globals.encrypted)
    }
}

impl std::fmt::Debug for DragSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DragSession")
            .field("app_id", &self.app_id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::EffectAllowed;
    use crate::store::MemoryLocalStore;

    fn payload() -> TransferPayload {
        TransferPayload {
            source_urls: vec!["filesystem:drive/root/a".to_string()],
            source_root_url: Some("filesystem:drive/".to_string()),
            effect_allowed: EffectAllowed::CopyMove,
            encrypted: false,
            missing_file_contents: true,
        }
    }

    #[test]
    fn test_protected_transfer_falls_back_to_session() {
        let store = Arc::new(MemoryLocalStore::new());
        let session = DragSession::new("files", store.clone());
        let mut transfer = DataTransfer::new();
        payload().write_to(&mut transfer);

        session.start(payload());
        let protected = transfer.protected_view();

        assert_eq!(session.source_root_url(&protected), "filesystem:drive/");
        assert!(session.missing_file_contents(&protected));
        assert!(!session.encrypted(&protected));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_end_clears_mirrored_keys() {
        let store = Arc::new(MemoryLocalStore::new());
        let session = DragSession::new("files", store.clone());

        session.start(payload());
        session.end();

        assert!(!session.is_active());
        assert!(store.is_empty());
        assert_eq!(session.source_root_url(&DataTransfer::new().protected_view()), "");
    }

    #[test]
    fn test_second_window_reads_globals_through_shared_store() {
        let store: Arc<MemoryLocalStore> = Arc::new(MemoryLocalStore::new());
        let source = DragSession::new("files", store.clone());
        let target = DragSession::new("files", store);

        source.start(payload());

        assert!(target.payload().is_none());
        assert_eq!(
            target.globals().map(|g| g.source_root_url),
            Some("filesystem:drive/".to_string())
        );
    }
}
