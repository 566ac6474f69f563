//! lib.rs: file manager core
//! -----------------------------------------------
//! Directory model, scanners, transfer and actions controllers and the
//! command layer of the file manager. Hosts plug in the file system,
//! volume, task and UI services through the traits under `fs`, `services`
//! and `ui`.

/// --- Error handling (unified error type for the core) ---
pub mod error;

/// --- Configuration: scan timing, search limits, feature flags ---
pub mod config;

/// --- Structured JSON-lines logging ---
pub mod logging;
pub use logging::Logger;

/// --- Metadata cache (read-through, per property) ---
pub mod cache {
    pub mod metadata_cache;
}

/// --- Entries, volumes and file system access ---
pub mod fs {
    pub mod entry;
    pub use entry::{Entry, NavTarget, RootType};

    pub mod file_name;
    pub mod file_system;
    pub mod predicates;
    pub mod volume;
}

/// --- Directory model and the lists it drives ---
pub mod model {
    pub mod directory_contents;
    pub mod directory_model;
    pub use directory_model::{ChangeOutcome, DirectoryModel, DirectoryModelEvent};

    pub mod file_filter;
    pub mod file_list;
    pub mod store;
}

/// --- Content scanners and scanner selection ---
pub mod scan {
    pub mod content_scanner;
    pub mod scanners;
    pub mod search_options;
    pub mod selection;
}

/// --- Host services (IO tasks, Drive, providers, policy) ---
pub mod services {
    pub mod private_api;
}

/// --- Context-menu actions for the selection ---
pub mod actions {
    pub mod action;
    pub use action::{Action, ActionId};

    pub mod actions_controller;
    pub mod actions_model;
    pub mod custom_action;
    pub mod drive_actions;
    pub mod folder_shortcuts;
}

/// --- Clipboard, drag and drop, paste ---
pub mod transfer {
    pub mod confirmation;
    pub mod file_transfer_controller;
    pub use file_transfer_controller::FileTransferController;

    pub mod paste_plan;
}

/// --- Presentation-layer delegate ---
pub mod ui {
    pub mod delegate;
}

/// --- Commands, shortcuts and the composition root ---
pub mod controller {
    pub mod commands;
    pub mod file_manager;
    pub use file_manager::{FileManager, Services};

    pub mod keymap;
}
pub use controller::{FileManager, Services};

/// --- Timers, queues and counters ---
pub mod util {
    pub mod async_queue;
    pub mod debounce;
    pub mod generation;
    pub mod metrics;
}

#[cfg(test)]
mod test_support;
