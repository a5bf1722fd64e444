//! Path arithmetic for both sides of a sync. Nothing here touches the disk.

use std::path::{Path, PathBuf};

use super::models::Disk;
use super::slug::slug;

/// Where macOS mounts volumes by name.
pub const DEFAULT_VOLUMES_ROOT: &str = "/Volumes";

/// Backup folder for `disk` under `sync_root`: `<root>/<slug(name)>/`.
///
/// Returns `None` when no sync root is configured. The path is rebuilt on
/// every call, so renaming a disk or changing the root applies immediately.
pub fn resolve_backup_path(sync_root: &str, disk: &Disk) -> Option<PathBuf> {
    if sync_root.is_empty() {
        return None;
    }

    let root = sync_root.trim_end_matches('/');
    Some(PathBuf::from(format!("{}/{}/", root, slug(&disk.name))))
}

/// Live mount point of a volume: `<volumes_root>/<volume_name>/`.
pub fn volume_mount_path(volumes_root: &Path, volume_name: &str) -> PathBuf {
    let mut path = volumes_root.as_os_str().to_os_string();
    if !path.as_encoded_bytes().ends_with(b"/") {
        path.push("/");
    }
    path.push(volume_name);
    path.push("/");
    PathBuf::from(path)
}
