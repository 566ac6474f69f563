//! Entry classification helpers shared by actions, commands and transfers.

use crate::fs::entry::{Entry, RootType};
use crate::fs::volume::VolumeManager;

const TEAM_DRIVES_DIR: &str = "/team_drives";
const COMPUTERS_DIR: &str = "/Computers";

pub fn is_fake_entry(entry: &Entry) -> bool {
    entry.is_fake()
}

pub fn is_shared_drives_grand_root(entry: &Entry) -> bool {
    !entry.is_fake() && entry.full_path() == TEAM_DRIVES_DIR
}

/// `/team_drives/<name>` itself.
pub fn is_shared_drive_root(entry: &Entry) -> bool {
    let parts: Vec<&str> = entry.full_path().split('/').collect();
    !entry.is_fake() && parts.len() == 3 && parts[1] == "team_drives" && !parts[2].is_empty()
}

/// Anything under `/team_drives`, including the grand root.
pub fn is_shared_drive_entry(entry: &Entry) -> bool {
    let path = entry.full_path();
    !entry.is_fake()
        && (path == TEAM_DRIVES_DIR || path.starts_with(&format!("{TEAM_DRIVES_DIR}/")))
}

pub fn shared_drive_name(entry: &Entry) -> Option<&str> {
    if !is_shared_drive_entry(entry) {
        return None;
    }
    entry
        .full_path()
        .split('/')
        .nth(2)
        .filter(|name| !name.is_empty())
}

pub fn is_computers_grand_root(entry: &Entry) -> bool {
    !entry.is_fake() && entry.full_path() == COMPUTERS_DIR
}

pub fn is_computers_root(entry: &Entry) -> bool {
    let parts: Vec<&str> = entry.full_path().split('/').collect();
    !entry.is_fake() && parts.len() == 3 && parts[1] == "Computers" && !parts[2].is_empty()
}

pub fn is_grand_root(entry: &Entry) -> bool {
    is_shared_drives_grand_root(entry) || is_computers_grand_root(entry)
}

pub fn is_trash_root(entry: &Entry) -> bool {
    entry.fake_root_type() == Some(RootType::Trash)
}

pub fn is_recent_root(entry: &Entry) -> bool {
    entry.fake_root_type() == Some(RootType::Recent)
}

/// Entries the user can never rename, move or delete.
pub fn is_non_modifiable(volume_manager: &dyn VolumeManager, entry: &Entry) -> bool {
    if entry.is_fake() || is_grand_root(entry) {
        return true;
    }

    let Some(location) = volume_manager.location_info(entry) else {
        return false;
    };

    if location.is_root_entry && !is_shared_drive_root(entry) {
        return true;
    }

    location.root_type == RootType::Downloads
        && matches!(entry.full_path(), "/Downloads" | "/PvmDefault" | "/Camera")
}

/// True when `url` is `ancestor_url` or lies below it.
pub fn is_descendant_or_same(ancestor_url: &str, url: &str) -> bool {
    let ancestor = ancestor_url.trim_end_matches('/');
    let url = url.trim_end_matches('/');
    url == ancestor
        || url
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Whether context-menu actions should be offered for `entry`.
pub fn should_show_menu_items(volume_manager: &dyn VolumeManager, entry: &Entry) -> bool {
    if entry.is_fake() || is_grand_root(entry) {
        return false;
    }
    volume_manager
        .location_info(entry)
        .is_some_and(|location| !location.is_root_entry || is_shared_drive_root(entry))
}
