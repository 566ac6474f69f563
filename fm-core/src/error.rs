//! src/error.rs
//! ============================================================================
//! # `AppError`: Unified Error Type for the File Manager Core
//!
//! Every component returns `Result<T, AppError>`. Errors reported by the
//! file-system collaborators arrive as [`FsError`] and keep their kind so the
//! scan retry policy can tell guest connection failures apart.

use fm_clip::ClipError;
use std::{fmt, io, path::PathBuf};
use thiserror::Error;

/// Classification of a file-system collaborator failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsErrorKind {
    NotFound,
    Security,
    InvalidModification,
    PathExists,
    /// The guest environment (Linux container, VM) could not be reached.
    GuestConnection,
    Abort,
    NotSupported,
    Io,
}

impl fmt::Display for FsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "NotFoundError",
            Self::Security => "SecurityError",
            Self::InvalidModification => "InvalidModificationError",
            Self::PathExists => "PathExistsError",
            Self::GuestConnection => "GuestConnectionError",
            Self::Abort => "AbortError",
            Self::NotSupported => "NotSupportedError",
            Self::Io => "IoError",
        };
        f.write_str(s)
    }
}

/// Error reported by a file-system collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FsError {
    pub kind: FsErrorKind,
    pub message: String,
}

impl FsError {
    pub fn new(kind: FsErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl fmt::Display) -> Self {
        Self::new(FsErrorKind::NotFound, format!("{what} not found"))
    }

    pub fn guest_connection(message: impl Into<String>) -> Self {
        Self::new(FsErrorKind::GuestConnection, message)
    }
}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        let kind = match e.kind() {
            io::ErrorKind::NotFound => FsErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => FsErrorKind::Security,
            io::ErrorKind::AlreadyExists => FsErrorKind::PathExists,
            io::ErrorKind::Unsupported => FsErrorKind::NotSupported,
            _ => FsErrorKind::Io,
        };
        Self::new(kind, e.to_string())
    }
}

/// Unified error type for all file manager core operations.
#[derive(Debug, Error)]
pub enum AppError {
    /// Standard IO error, auto-converted from `io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error reported by the file-system or task collaborators.
    #[error("File system error: {0}")]
    Fs(#[from] FsError),

    /// An entry URL could not be resolved.
    #[error("Entry not found: {0}")]
    NotFound(String),

    /// TOML config parsing error.
    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// Config file I/O error with path.
    #[error("Failed to read config file {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Serialization or deserialization error (e.g., JSON).
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Clipboard or drag payload error.
    #[error("Clipboard error: {0}")]
    Clipboard(#[from] ClipError),

    /// Directory scan failure
    #[error("Scan of {target} failed: {reason}")]
    ScanFailed { target: String, reason: String },

    /// Directory navigation errors
    #[error("Navigation failed: cannot open {target}: {reason}")]
    NavigationFailed { target: String, reason: String },

    /// Rejected file or folder name
    #[error("Invalid name '{name}': {reason}")]
    InvalidFileName { name: String, reason: String },

    /// Custom-action provider failure
    #[error("Provider {provider} failed: {reason}")]
    ProviderFailed { provider: String, reason: String },

    /// IO task could not be dispatched
    #[error("Could not start {task} task: {reason}")]
    TaskDispatch { task: String, reason: String },

    /// Transfer blocked by data-loss-prevention policy
    #[error("{count} item(s) blocked by policy")]
    PolicyBlocked { count: usize },

    /// Command executed while disabled
    #[error("Command '{0}' is not available")]
    CommandDisabled(String),

    /// A newer directory change superseded this operation.
    #[error("Operation superseded by a newer request")]
    Superseded,

    /// Operation cancelled by user or system.
    #[error("Operation was cancelled")]
    Cancelled,

    /// Any other error, with description.
    #[error("Unexpected error: {0}")]
    Other(String),
}

impl AppError {
    #[must_use]
    /// Attach extra context to an error.
    pub fn with_context<S: Into<String>>(self, ctx: S) -> Self {
        Self::Other(format!("{}: {}", ctx.into(), self))
    }

    pub fn not_found<S: Into<String>>(url: S) -> Self {
        Self::NotFound(url.into())
    }

    pub fn scan_failed<S1: Into<String>, S2: Into<String>>(target: S1, reason: S2) -> Self {
        Self::ScanFailed {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub fn navigation_failed<S1: Into<String>, S2: Into<String>>(target: S1, reason: S2) -> Self {
        Self::NavigationFailed {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_file_name<S1: Into<String>, S2: Into<String>>(name: S1, reason: S2) -> Self {
        Self::InvalidFileName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn provider_failed<S1: Into<String>, S2: Into<String>>(provider: S1, reason: S2) -> Self {
        Self::ProviderFailed {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub fn task_dispatch<S1: Into<String>, S2: Into<String>>(task: S1, reason: S2) -> Self {
        Self::TaskDispatch {
            task: task.into(),
            reason: reason.into(),
        }
    }

    /// Failures reaching a guest environment are never retried automatically.
    pub fn is_guest_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Fs(FsError {
                kind: FsErrorKind::GuestConnection,
                ..
            })
        )
    }

    pub fn fs_kind(&self) -> Option<FsErrorKind> {
        match self {
            Self::Fs(e) => Some(e.kind),
            Self::NotFound(_) => Some(FsErrorKind::NotFound),
            _ => None,
        }
    }
}

// Manual Clone implementation to handle non-Clone fields
impl Clone for AppError {
    fn clone(&self) -> Self {
        match self {
            Self::Io(e) => Self::Io(io::Error::new(e.kind(), e.to_string())),
            Self::Fs(e) => Self::Fs(e.clone()),
            Self::NotFound(url) => Self::NotFound(url.clone()),
            Self::Config(e) => Self::Other(format!("Config error: {e}")),
            Self::ConfigIo { path, source } => Self::ConfigIo {
                path: path.clone(),
                source: io::Error::new(source.kind(), source.to_string()),
            },
            Self::Serde(e) => Self::Other(format!("Serde error: {e}")),
            Self::Clipboard(e) => Self::Clipboard(e.clone()),
            Self::ScanFailed { target, reason } => Self::ScanFailed {
                target: target.clone(),
                reason: reason.clone(),
            },
            Self::NavigationFailed { target, reason } => Self::NavigationFailed {
                target: target.clone(),
                reason: reason.clone(),
            },
            Self::InvalidFileName { name, reason } => Self::InvalidFileName {
                name: name.clone(),
                reason: reason.clone(),
            },
            Self::ProviderFailed { provider, reason } => Self::ProviderFailed {
                provider: provider.clone(),
                reason: reason.clone(),
            },
            Self::TaskDispatch { task, reason } => Self::TaskDispatch {
                task: task.clone(),
                reason: reason.clone(),
            },
            Self::PolicyBlocked { count } => Self::PolicyBlocked { count: *count },
            Self::CommandDisabled(id) => Self::CommandDisabled(id.clone()),
            Self::Superseded => Self::Superseded,
            Self::Cancelled => Self::Cancelled,
            Self::Other(msg) => Self::Other(msg.clone()),
        }
    }
}

// Allow conversion from `anyhow::Error` as fallback.
impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        Self::Other(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guest_connection_classification() {
        let guest: AppError = FsError::guest_connection("vm not reachable").into();
        let other: AppError = FsError::not_found("filesystem:downloads/x").into();

        assert!(guest.is_guest_connection_error());
        assert!(!other.is_guest_connection_error());
        assert_eq!(other.fs_kind(), Some(FsErrorKind::NotFound));
    }

    #[test]
    fn test_io_error_maps_to_fs_kind() {
        let e: FsError = io::Error::new(io::ErrorKind::AlreadyExists, "exists").into();
        assert_eq!(e.kind, FsErrorKind::PathExists);
    }

    #[test]
    fn test_clone_preserves_io_kind() {
        let e = AppError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        match e.clone() {
            AppError::Io(inner) => assert_eq!(inner.kind(), io::ErrorKind::PermissionDenied),
            other => panic!("unexpected clone: {other:?}"),
        }
    }
}
