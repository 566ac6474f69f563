//! # fm-clip - Clipboard and drag-and-drop payloads for the file manager
//!
//! - `fs/*` payload keys and the typed [`TransferPayload`] view
//! - an in-memory [`DataTransfer`] with protected-mode semantics
//! - the explicit [`DragSession`] shared by drag sources and drop targets
//! - [`LocalStore`] backends the session mirrors its fields into

pub mod error;
pub mod payload;
pub mod session;
pub mod store;

pub use error::{ClipError, ClipResult};
pub use payload::{DataTransfer, DropEffect, EffectAllowed, TransferPayload};
pub use session::{DragGlobals, DragSession};
pub use store::{FileLocalStore, LocalStore, MemoryLocalStore};
