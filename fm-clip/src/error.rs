//! Errors raised while reading a transfer or persisting the local store

use compact_str::CompactString;
use std::io;
use std::path::Path;
use thiserror::Error;

pub type ClipResult<T> = Result<T, ClipError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClipError {
    #[error("Transfer was not written by the file manager")]
    MissingTag,

    #[error("Unknown effectAllowed value: {0}")]
    InvalidEffect(CompactString),

    #[error("'{key}' is hidden while the transfer is protected")]
    ProtectedData { key: CompactString },

    #[error("Local store I/O failed ({kind:?}): {context}")]
    StoreIo {
        kind: io::ErrorKind,
        context: CompactString,
    },

    #[error("Local store {path} is not valid MessagePack")]
    StoreCorrupted { path: CompactString },

    #[error("Local store format {found} is not supported (expected {expected})")]
    StoreFormat { expected: u32, found: u32 },

    #[error("Could not encode local store: {0}")]
    Encode(CompactString),
}

impl ClipError {
    /// A drop target treats the payload as absent on these.
    pub fn is_unreadable_payload(&self) -> bool {
        matches!(self, Self::MissingTag | Self::ProtectedData { .. })
    }

    /// Store contents that can be discarded and rebuilt from scratch.
    pub fn is_stale_store(&self) -> bool {
        matches!(
            self,
            Self::StoreCorrupted { .. } | Self::StoreFormat { .. } | Self::StoreIo { .. }
        )
    }

    pub fn store_io(err: &io::Error, context: &str) -> Self {
        Self::StoreIo {
            kind: err.kind(),
            context: CompactString::from(context),
        }
    }

    pub fn store_corrupted(path: &Path) -> Self {
        Self::StoreCorrupted {
            path: CompactString::from(path.to_string_lossy()),
        }
    }
}

impl From<rmp_serde::encode::Error> for ClipError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Encode(CompactString::from(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(ClipError::MissingTag.is_unreadable_payload());
        assert!(!ClipError::MissingTag.is_stale_store());

        let corrupted = ClipError::store_corrupted(Path::new("/tmp/store.mpk"));
        assert!(corrupted.is_stale_store());
        assert_eq!(corrupted.to_string(), "Local store /tmp/store.mpk is not valid MessagePack");

        let io = ClipError::store_io(&io::Error::from(io::ErrorKind::PermissionDenied), "read");
        assert!(matches!(io, ClipError::StoreIo { kind: io::ErrorKind::PermissionDenied, .. }));
    }
}
