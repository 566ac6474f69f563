//! Validation of new file and folder names.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use crate::error::{AppError, FsErrorKind};
use crate::fs::entry::Entry;
use crate::fs::file_system::FileSystem;

pub const MAX_NAME_BYTES: usize = 255;

static FAT_RESERVED_CHARS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"[\\/:*?"<>|\x00-\x1f]"#).ok());

static FAT_RESERVED_NAMES: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^(CON|PRN|AUX|NUL|COM[1-9]|LPT[1-9])(\..*)?$").ok());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileNameError {
    Empty,
    DotName,
    ContainsSlash,
    ReservedCharacter(char),
    ReservedName,
    TooLong,
    AlreadyExists,
}

impl fmt::Display for FileNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("name is empty"),
            Self::DotName => f.write_str("'.' and '..' are not allowed"),
            Self::ContainsSlash => f.write_str("name contains '/'"),
            Self::ReservedCharacter(c) => write!(f, "character {c:?} is not allowed on this drive"),
            Self::ReservedName => f.write_str("name is reserved on this drive"),
            Self::TooLong => write!(f, "name is longer than {MAX_NAME_BYTES} bytes"),
            Self::AlreadyExists => f.write_str("an item with this name already exists"),
        }
    }
}

fn is_fat_like(disk_fs_type: Option<&str>) -> bool {
    matches!(disk_fs_type, Some("vfat" | "exfat" | "ntfs"))
}

/// Checks `name` against generic rules and, for FAT-family drives, the
/// stricter character set and reserved device names.
pub fn validate_file_name(name: &str, disk_fs_type: Option<&str>) -> Result<(), FileNameError> {
    if name.trim().is_empty() {
        return Err(FileNameError::Empty);
    }
    if name == "." || name == ".." {
        return Err(FileNameError::DotName);
    }
    if name.contains('/') {
        return Err(FileNameError::ContainsSlash);
    }
    if name.len() > MAX_NAME_BYTES {
        return Err(FileNameError::TooLong);
    }

    if is_fat_like(disk_fs_type) {
        if let Some(re) = FAT_RESERVED_CHARS.as_ref()
            && let Some(m) = re.find(name)
        {
            let c = m.as_str().chars().next().unwrap_or('?');
            return Err(FileNameError::ReservedCharacter(c));
        }
        if FAT_RESERVED_NAMES
            .as_ref()
            .is_some_and(|re| re.is_match(name))
        {
            return Err(FileNameError::ReservedName);
        }
    }

    Ok(())
}

/// Full validation of a name about to be created in `parent`.
pub async fn validate_new_name(
    fs: &dyn FileSystem,
    parent: &Entry,
    name: &str,
    disk_fs_type: Option<&str>,
) -> Result<(), AppError> {
    validate_file_name(name, disk_fs_type)
        .map_err(|e| AppError::invalid_file_name(name, e.to_string()))?;

    match fs.resolve_child(parent, name).await {
        Ok(_) => Err(AppError::invalid_file_name(
            name,
            FileNameError::AlreadyExists.to_string(),
        )),
        Err(e) if e.kind == FsErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_rules() {
        assert_eq!(validate_file_name("  ", None), Err(FileNameError::Empty));
        assert_eq!(validate_file_name("..", None), Err(FileNameError::DotName));
        assert_eq!(validate_file_name("a/b", None), Err(FileNameError::ContainsSlash));
        assert_eq!(
            validate_file_name(&"x".repeat(256), None),
            Err(FileNameError::TooLong)
        );
        assert_eq!(validate_file_name("report: final?.txt", None), Ok(()));
    }

    #[test]
    fn test_fat_rules() {
        assert_eq!(
            validate_file_name("report: final.txt", Some("vfat")),
            Err(FileNameError::ReservedCharacter(':'))
        );
        assert_eq!(
            validate_file_name("con.txt", Some("exfat")),
            Err(FileNameError::ReservedName)
        );
        assert_eq!(validate_file_name("console.txt", Some("ntfs")), Ok(()));
        assert_eq!(validate_file_name("con.txt", Some("ext4")), Ok(()));
    }
}
