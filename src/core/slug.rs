//! Folder-name encoding for disk names.
//!
//! A disk's backup folder is named after the disk, so the name has to be
//! turned into something every filesystem accepts. The result must not change
//! between runs or machines, otherwise a disk would lose track of its backup.

use deunicode::deunicode_with_tofu;

/// Joins the safe runs of a slug.
pub const SLUG_SEPARATOR: &str = "_";

const SAFE_CHARACTERS: &str = "0123456789abcdefghijklmnopqrstuvwxyz";

/// Convert a free-form disk name into a lowercase, filesystem-safe token.
///
/// The name is transliterated to ASCII (`æ` becomes `ae`, `é` becomes `e`,
/// `Проект` becomes `proekt`), lowercased, split on every character outside
/// `[0-9a-z]`, and the non-empty pieces are joined with `_`.
///
/// Characters without a transliteration are dropped, so a name made only of
/// them yields an empty slug. That is a valid result: all such disks share
/// the same backup folder.
pub fn slug(name: &str) -> String {
    let ascii = deunicode_with_tofu(name, "").to_ascii_lowercase();

    ascii
        .split(|c: char| !SAFE_CHARACTERS.contains(c))
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join(SLUG_SEPARATOR)
}
