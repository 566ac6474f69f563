//! The `fs/*` clipboard and drag payload format.
//!
//! A cut, copy or drag started inside the file manager writes its sources into
//! a [`DataTransfer`] under a fixed set of MIME-like keys. Drop targets and the
//! paste path read them back through [`TransferPayload`].

use crate::error::{ClipError, ClipResult};
use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marker key identifying a payload produced by the file manager.
pub const TAG: &str = "fs/tag";
pub const TAG_VALUE: &str = "filemanager-data";
/// Newline-joined source URLs.
pub const SOURCES: &str = "fs/sources";
pub const SOURCE_ROOT_URL: &str = "fs/sourceRootURL";
pub const EFFECT_ALLOWED: &str = "fs/effectallowed";
pub const ENCRYPTED: &str = "fs/encrypted";
pub const MISSING_FILE_CONTENTS: &str = "fs/missingFileContents";
pub const URI_LIST: &str = "text/uri-list";
/// Generic type reported for native file drops.
pub const FILES: &str = "Files";

/// Operation a drop target would perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DropEffect {
    #[default]
    None,
    Copy,
    Move,
    Link,
}

impl DropEffect {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Copy => "copy",
            Self::Move => "move",
            Self::Link => "link",
        }
    }
}

/// Operations the drag source permits, mirroring `DataTransfer.effectAllowed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EffectAllowed {
    #[default]
    Uninitialized,
    None,
    Copy,
    Move,
    Link,
    CopyMove,
    CopyLink,
    LinkMove,
    All,
}

impl EffectAllowed {
    /// True when `effect` is one of the permitted operations.
    pub fn allows(self, effect: DropEffect) -> bool {
        if self == Self::All {
            return effect != DropEffect::None;
        }
        // Same rule as a case-insensitive substring match on the DOM value.
        effect != DropEffect::None
            && self
                .as_str()
                .to_ascii_lowercase()
                .contains(effect.as_str())
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::None => "none",
            Self::Copy => "copy",
            Self::Move => "move",
            Self::Link => "link",
            Self::CopyMove => "copyMove",
            Self::CopyLink => "copyLink",
            Self::LinkMove => "linkMove",
            Self::All => "all",
        }
    }
}

impl fmt::Display for EffectAllowed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectAllowed {
    type Err = ClipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = match s.to_ascii_lowercase().as_str() {
            "uninitialized" | "" => Self::Uninitialized,
            "none" => Self::None,
            "copy" => Self::Copy,
            "move" => Self::Move,
            "link" => Self::Link,
            "copymove" => Self::CopyMove,
            "copylink" => Self::CopyLink,
            "linkmove" => Self::LinkMove,
            "all" => Self::All,
            other => return Err(ClipError::InvalidEffect(CompactString::from(other))),
        };

        Ok(value)
    }
}

/// In-memory equivalent of a DOM `DataTransfer`.
///
/// In protected mode (dragenter/dragover) the keys stay visible through
/// [`DataTransfer::types`] but the values cannot be read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataTransfer {
    items: IndexMap<CompactString, String>,
    files: Vec<String>,
    pub effect_allowed: EffectAllowed,
    pub drop_effect: DropEffect,
    protected: bool,
}

impl DataTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload of an external drag that only carries native files.
    pub fn with_files(files: Vec<String>) -> Self {
        Self {
            files,
            ..Self::default()
        }
    }

    pub fn set_data(&mut self, key: &str, value: impl Into<String>) {
        self.items.insert(CompactString::from(key), value.into());
    }

    /// Returns `None` when the key is absent or the transfer is protected.
    pub fn get_data(&self, key: &str) -> Option<&str> {
        if self.protected {
            return None;
        }
        self.items.get(key).map(String::as_str)
    }

    pub fn try_get_data(&self, key: &str) -> ClipResult<Option<&str>> {
        if self.protected && self.items.contains_key(key) {
            return Err(ClipError::ProtectedData {
                key: CompactString::from(key),
            });
        }
        Ok(self.get_data(key))
    }

    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.items.keys().map(CompactString::as_str).collect();
        if !self.files.is_empty() {
            types.push(FILES);
        }
        types
    }

    pub fn has_type(&self, key: &str) -> bool {
        self.types().contains(&key)
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn is_protected(&self) -> bool {
        self.protected
    }

    /// Copy of this transfer as a drop target sees it before the drop.
    pub fn protected_view(&self) -> Self {
        Self {
            protected: true,
            ..self.clone()
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.files.clear();
    }
}

/// Typed view over the `fs/*` keys.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferPayload {
    pub source_urls: Vec<String>,
    pub source_root_url: Option<String>,
    pub effect_allowed: EffectAllowed,
    pub encrypted: bool,
    pub missing_file_contents: bool,
}

impl TransferPayload {
    /// Writes every key of the payload, including the tag and the uri list.
    pub fn write_to(&self, transfer: &mut DataTransfer) {
        let joined = self.source_urls.join("\n");

        transfer.set_data(TAG, TAG_VALUE);
        transfer.set_data(SOURCES, joined.clone());
        transfer.set_data(EFFECT_ALLOWED, self.effect_allowed.as_str());
        if let Some(root) = &self.source_root_url {
            transfer.set_data(SOURCE_ROOT_URL, root.clone());
        }
        transfer.set_data(ENCRYPTED, self.encrypted.to_string());
        transfer.set_data(MISSING_FILE_CONTENTS, self.missing_file_contents.to_string());
        transfer.set_data(URI_LIST, joined);
        transfer.effect_allowed = self.effect_allowed;
    }

    /// Parses a readable transfer. Fails with [`ClipError::MissingTag`] for
    /// payloads that did not originate from the file manager.
    pub fn read_from(transfer: &DataTransfer) -> ClipResult<Self> {
        if !transfer.has_type(TAG) {
            return Err(ClipError::MissingTag);
        }

        let source_urls = transfer
            .try_get_data(SOURCES)?
            .map(split_sources)
            .unwrap_or_default();

        let effect_allowed = match transfer.try_get_data(EFFECT_ALLOWED)? {
            Some(value) => value.parse()?,
            None => transfer.effect_allowed,
        };

        Ok(Self {
            source_urls,
            source_root_url: transfer
                .try_get_data(SOURCE_ROOT_URL)?
                .filter(|s| !s.is_empty())
                .map(str::to_owned),
            effect_allowed,
            encrypted: transfer.try_get_data(ENCRYPTED)? == Some("true"),
            missing_file_contents: transfer.try_get_data(MISSING_FILE_CONTENTS)? == Some("true"),
        })
    }
}

/// Splits the newline-joined `fs/sources` value, dropping blank lines.
pub fn split_sources(value: &str) -> Vec<String> {
    value
        .split('\n')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}
