//! ``src/fs/file_system.rs``
//!
//! # `FileSystem`: entry-level file system access
//!
//! Scanners and commands only talk to the [`FileSystem`] trait.
//! [`NativeFileSystem`] serves `filesystem:<volume>/<path>` URLs from local
//! directories registered per volume, using `tokio::fs` for single calls and
//! `walkdir` on a blocking thread for recursive search.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use compact_str::CompactString;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{FsError, FsErrorKind};
use crate::fs::entry::{Entry, FILESYSTEM_SCHEME, TrashInfo};
use crate::fs::volume::VolumeInfo;

const TRASH_DIR: &str = ".Trash";

/// Coarse file type buckets used by search filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FileCategory {
    #[default]
    All,
    Audio,
    Image,
    Video,
    Document,
}

impl FileCategory {
    pub fn matches(self, name: &str) -> bool {
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        let ext = ext.as_str();

        match self {
            Self::All => true,
            Self::Audio => matches!(ext, "mp3" | "m4a" | "ogg" | "oga" | "wav" | "flac" | "opus"),
            Self::Image => matches!(
                ext,
                "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" | "svg" | "avif" | "raw"
            ),
            Self::Video => matches!(ext, "mp4" | "m4v" | "mkv" | "webm" | "mov" | "avi" | "3gp"),
            Self::Document => matches!(
                ext,
                "pdf" | "txt" | "doc" | "docx" | "odt" | "rtf" | "xls" | "xlsx" | "ods" | "ppt"
                    | "pptx" | "odp" | "csv" | "md"
            ),
        }
    }
}

/// Parameters of a name search under one root.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchQuery {
    pub query: String,
    pub category: FileCategory,
    pub max_results: usize,
    pub modified_after: Option<DateTime<Utc>>,
}

impl SearchQuery {
    pub fn matches_name(&self, name: &str) -> bool {
        name.to_lowercase().contains(&self.query.to_lowercase()) && self.category.matches(name)
    }
}

#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn read_directory(&self, dir: &Entry) -> Result<Vec<Entry>, FsError>;

    async fn resolve_url(&self, url: &str) -> Result<Entry, FsError>;

    async fn resolve_child(&self, parent: &Entry, name: &str) -> Result<Entry, FsError>;

    async fn create_directory(&self, parent: &Entry, name: &str) -> Result<Entry, FsError>;

    /// Renames in place; fails with `PathExists` when the name is taken.
    async fn rename(&self, entry: &Entry, new_name: &str) -> Result<Entry, FsError>;

    /// Files and directories below `root` whose name matches `query`.
    async fn search(&self, root: &Entry, query: &SearchQuery) -> Result<Vec<Entry>, FsError>;

    /// Items in the trash of `volume`.
    async fn read_trash(&self, volume: &VolumeInfo) -> Result<Vec<Entry>, FsError>;

    /// Starts delivering change notifications for `dir`.
    async fn watch(&self, dir: &Entry) -> Result<(), FsError>;

    async fn unwatch(&self, dir: &Entry) -> Result<(), FsError>;
}

/// Splits `filesystem:<name>/<path>` into its name and full path.
pub fn parse_url(url: &str) -> Option<(&str, String)> {
    let rest = url.strip_prefix(FILESYSTEM_SCHEME)?;
    match rest.find('/') {
        Some(cut) => Some((&rest[..cut], rest[cut..].to_string())),
        None => Some((rest, "/".to_string())),
    }
}

/// Local-disk file system; each volume maps onto one directory.
#[derive(Debug, Default)]
pub struct NativeFileSystem {
    roots: RwLock<HashMap<CompactString, PathBuf>>,
    watched: RwLock<HashSet<String>>,
}

impl NativeFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_root(&self, filesystem: &str, path: impl Into<PathBuf>) {
        self.roots
            .write()
            .insert(CompactString::new(filesystem), path.into());
    }

    pub fn is_watched(&self, dir: &Entry) -> bool {
        self.watched.read().contains(dir.url())
    }

    fn root_of(&self, filesystem: &str) -> Result<PathBuf, FsError> {
        self.roots
            .read()
            .get(filesystem)
            .cloned()
            .ok_or_else(|| FsError::not_found(format!("volume {filesystem}")))
    }

    fn local_path(&self, filesystem: &str, full_path: &str) -> Result<PathBuf, FsError> {
        let root = self.root_of(filesystem)?;
        let relative = full_path.trim_start_matches('/');
        if relative.split('/').any(|segment| segment == "..") {
            return Err(FsError::new(FsErrorKind::Security, "path escapes volume root"));
        }
        Ok(if relative.is_empty() {
            root
        } else {
            root.join(relative)
        })
    }

    fn entry_path(&self, entry: &Entry) -> Result<PathBuf, FsError> {
        if entry.is_fake() {
            return Err(FsError::new(
                FsErrorKind::NotSupported,
                format!("{} has no backing directory", entry.url()),
            ));
        }
        self.local_path(entry.filesystem_name(), entry.full_path())
    }

    async fn entry_at(filesystem: &str, full_path: &str, path: &Path) -> Result<Entry, FsError> {
        let meta = fs::metadata(path).await?;
        Ok(if meta.is_dir() {
            Entry::directory(filesystem, full_path)
        } else {
            Entry::file(filesystem, full_path)
        })
    }
}

fn relative_full_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let joined = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    Some(format!("/{joined}"))
}

fn parse_trash_info(text: &str) -> (Option<String>, Option<DateTime<Utc>>) {
    let mut path = None;
    let mut date = None;
    for line in text.lines() {
        if let Some(value) = line.strip_prefix("Path=") {
            path = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("DeletionDate=") {
            date = NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc());
        }
    }
    (path, date)
}

#[async_trait]
impl FileSystem for NativeFileSystem {
    async fn read_directory(&self, dir: &Entry) -> Result<Vec<Entry>, FsError> {
        let path = self.entry_path(dir)?;
        let mut read_dir = fs::read_dir(&path).await?;
        let mut entries = Vec::new();

        while let Some(item) = read_dir.next_entry().await? {
            let name = item.file_name().to_string_lossy().into_owned();
            match item.file_type().await {
                Ok(file_type) => entries.push(dir.child(&name, file_type.is_dir())),
                Err(e) => {
                    // Keep listing the rest of the directory
                    debug!("Skipping {:?}: {}", item.path(), e);
                }
            }
        }

        Ok(entries)
    }

    async fn resolve_url(&self, url: &str) -> Result<Entry, FsError> {
        let (filesystem, full_path) =
            parse_url(url).ok_or_else(|| FsError::not_found(url))?;
        let path = self.local_path(filesystem, &full_path)?;
        Self::entry_at(filesystem, &full_path, &path).await
    }

    async fn resolve_child(&self, parent: &Entry, name: &str) -> Result<Entry, FsError> {
        let path = self.entry_path(parent)?.join(name);
        let child = parent.child(name, false);
        Self::entry_at(parent.filesystem_name(), child.full_path(), &path).await
    }

    async fn create_directory(&self, parent: &Entry, name: &str) -> Result<Entry, FsError> {
        let path = self.entry_path(parent)?.join(name);
        fs::create_dir(&path).await?;
        info!(marker = "DIRECTORY_CREATED", path = %path.display(), "Directory created");
        Ok(parent.child(name, true))
    }

    async fn rename(&self, entry: &Entry, new_name: &str) -> Result<Entry, FsError> {
        let from = self.entry_path(entry)?;
        let to = from.with_file_name(new_name);
        if fs::try_exists(&to).await? {
            return Err(FsError::new(
                FsErrorKind::PathExists,
                format!("{new_name} already exists"),
            ));
        }
        fs::rename(&from, &to).await?;

        let parent_path = entry
            .parent_url()
            .and_then(|url| parse_url(&url).map(|(_, path)| path))
            .unwrap_or_else(|| "/".to_string());
        let parent = Entry::directory(entry.filesystem_name(), &parent_path);
        Ok(parent.child(new_name, entry.is_directory()))
    }

    async fn search(&self, root: &Entry, query: &SearchQuery) -> Result<Vec<Entry>, FsError> {
        let volume_root = self.root_of(root.filesystem_name())?;
        let start = self.entry_path(root)?;
        let filesystem = root.filesystem_name().to_string();
        let query = query.clone();

        let found = tokio::task::spawn_blocking(move || {
            let mut found = Vec::new();
            let walker = WalkDir::new(&start)
                .min_depth(1)
                .into_iter()
                .filter_entry(|e| e.file_name() != TRASH_DIR);

            for item in walker.filter_map(Result::ok) {
                if query.max_results > 0 && found.len() >= query.max_results {
                    break;
                }
                let name = item.file_name().to_string_lossy();
                if !query.matches_name(&name) {
                    continue;
                }
                if let Some(after) = query.modified_after {
                    let modified = item
                        .metadata()
                        .ok()
                        .and_then(|m| m.modified().ok())
                        .map(DateTime::<Utc>::from)
                        .unwrap_or_else(|| DateTime::<Utc>::from(SystemTime::UNIX_EPOCH));
                    if modified < after {
                        continue;
                    }
                }
                if let Some(full_path) = relative_full_path(&volume_root, item.path()) {
                    found.push(if item.file_type().is_dir() {
                        Entry::directory(&filesystem, &full_path)
                    } else {
                        Entry::file(&filesystem, &full_path)
                    });
                }
            }
            found
        })
        .await
        .map_err(|e| FsError::new(FsErrorKind::Abort, e.to_string()))?;

        Ok(found)
    }

    async fn read_trash(&self, volume: &VolumeInfo) -> Result<Vec<Entry>, FsError> {
        let root = self.root_of(&volume.filesystem)?;
        let files_dir = root.join(TRASH_DIR).join("files");
        let info_dir = root.join(TRASH_DIR).join("info");

        if !fs::try_exists(&files_dir).await? {
            return Ok(Vec::new());
        }

        let mut read_dir = fs::read_dir(&files_dir).await?;
        let mut entries = Vec::new();

        while let Some(item) = read_dir.next_entry().await? {
            let name = item.file_name().to_string_lossy().into_owned();
            let info_path = info_dir.join(format!("{name}.trashinfo"));
            let (restore_path, deletion_date) = match fs::read_to_string(&info_path).await {
                Ok(text) => parse_trash_info(&text),
                Err(e) => {
                    warn!("Trash item {} has no readable info file: {}", name, e);
                    (None, None)
                }
            };
            let is_dir = item.file_type().await.map(|t| t.is_dir()).unwrap_or(false);

            entries.push(Entry::trashed(
                &volume.filesystem,
                &format!("/{TRASH_DIR}/files/{name}"),
                is_dir,
                TrashInfo {
                    restore_path: restore_path.unwrap_or_else(|| format!("/{name}")),
                    deletion_date,
                },
            ));
        }

        Ok(entries)
    }

    async fn watch(&self, dir: &Entry) -> Result<(), FsError> {
        self.entry_path(dir)?;
        self.watched.write().insert(dir.url().to_string());
        debug!(url = dir.url(), "Watching directory");
        Ok(())
    }

    async fn unwatch(&self, dir: &Entry) -> Result<(), FsError> {
        self.watched.write().remove(dir.url());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::volume::VolumeType;
    use tempfile::TempDir;

    async fn fixture() -> (TempDir, NativeFileSystem) {
        let dir = TempDir::new().unwrap();
        tokio::fs::create_dir_all(dir.path().join("photos/2024")).await.unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), "n").await.unwrap();
        tokio::fs::write(dir.path().join("photos/beach.jpg"), "j").await.unwrap();
        tokio::fs::write(dir.path().join("photos/2024/notes-old.txt"), "o").await.unwrap();

        let native = NativeFileSystem::new();
        native.add_root("downloads", dir.path());
        (dir, native)
    }

    #[tokio::test]
    async fn test_read_and_resolve() {
        let (_dir, native) = fixture().await;
        let root = native.resolve_url("filesystem:downloads/").await.unwrap();
        assert!(root.is_directory());

        let mut names: Vec<String> = native
            .read_directory(&root)
            .await
            .unwrap()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["notes.txt", "photos"]);

        let missing = native.resolve_url("filesystem:downloads/nope").await;
        assert_eq!(missing.unwrap_err().kind, FsErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_search_matches_names_and_categories() {
        let (_dir, native) = fixture().await;
        let root = Entry::directory("downloads", "/");

        let query = SearchQuery {
            query: "NOTES".to_string(),
            max_results: 10,
            ..SearchQuery::default()
        };
        assert_eq!(native.search(&root, &query).await.unwrap().len(), 2);

        let images = SearchQuery {
            query: String::new(),
            category: FileCategory::Image,
            max_results: 10,
            modified_after: None,
        };
        let found = native.search(&root, &images).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url(), "filesystem:downloads/photos/beach.jpg");
    }

    #[tokio::test]
    async fn test_rename_rejects_existing_name() {
        let (_dir, native) = fixture().await;
        let notes = Entry::file("downloads", "/notes.txt");

        let err = native.rename(&notes, "photos").await.unwrap_err();
        assert_eq!(err.kind, FsErrorKind::PathExists);

        let renamed = native.rename(&notes, "todo.txt").await.unwrap();
        assert_eq!(renamed.url(), "filesystem:downloads/todo.txt");
    }

    #[tokio::test]
    async fn test_read_trash_parses_info_files() {
        let (dir, native) = fixture().await;
        let trash = dir.path().join(".Trash");
        tokio::fs::create_dir_all(trash.join("files")).await.unwrap();
        tokio::fs::create_dir_all(trash.join("info")).await.unwrap();
        tokio::fs::write(trash.join("files/old.txt"), "x").await.unwrap();
        tokio::fs::write(
            trash.join("info/old.txt.trashinfo"),
            "[Trash Info]\nPath=/photos/old.txt\nDeletionDate=2024-05-01T10:00:00\n",
        )
        .await
        .unwrap();

        let volume = VolumeInfo::new("downloads", VolumeType::Downloads, "downloads", "My files");
        let items = native.read_trash(&volume).await.unwrap();

        assert_eq!(items.len(), 1);
        let info = items[0].trash_info().unwrap();
        assert_eq!(info.restore_path, "/photos/old.txt");
        assert!(info.deletion_date.is_some());
    }
}
