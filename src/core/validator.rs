use std::path::Path;

/// True when `path` exists and is a directory (symlinks are followed).
///
/// A regular file and a missing path both yield `false`.
pub fn is_usable_directory(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_dir())
}
