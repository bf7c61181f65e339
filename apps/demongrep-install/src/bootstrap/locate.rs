//! Locating the binary inside an unpacked release.
//!
//! Release archives have shipped with the binary at the root, under `bin/`,
//! and inside a versioned top-level folder. The locator checks the two fixed
//! locations first and only then walks the tree, bounded in depth.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::errors::InstallError;

/// Finds `file_name` under `root`.
///
/// Order: `root/<file_name>`, `root/bin/<file_name>`, then any regular file
/// of that name at most `max_depth` levels below `root` (files directly in
/// `root` are depth 1). Symlinks, and files reached through a symlinked
/// directory, never match. Among search hits the shallowest wins, ties broken by
/// path order.
///
/// # Errors
///
/// Returns `BinaryNotFound` listing the locations that were checked.
pub fn locate_binary(
    root: &Path,
    file_name: &str,
    max_depth: usize,
) -> Result<PathBuf, InstallError> {
    let top_level = root.join(file_name);
    let in_bin = root.join("bin").join(file_name);
    let canonical_root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());

    for candidate in [&top_level, &in_bin] {
        if is_regular_file_within(candidate, &canonical_root) {
            log::debug!("found binary at {}", candidate.display());
            return Ok(candidate.clone());
        }
    }

    let found = WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::debug!("skipping unreadable entry: {e}");
                None
            }
        })
        .filter(|entry| {
            entry.file_name() == file_name
                && is_regular_file_within(entry.path(), &canonical_root)
        })
        .min_by(|a, b| a.depth().cmp(&b.depth()).then_with(|| a.path().cmp(b.path())))
        .map(walkdir::DirEntry::into_path);

    if let Some(path) = found {
        log::debug!("found binary by search at {}", path.display());
        return Ok(path);
    }

    Err(InstallError::BinaryNotFound {
        binary: file_name.to_string(),
        searched: vec![top_level, in_bin, root.to_path_buf()],
    })
}

/// A regular file, not a symlink, whose real location is under `root`.
///
/// `root` must already be canonical. A symlinked parent directory such as
/// `bin -> /usr/bin` fails the containment check.
fn is_regular_file_within(path: &Path, root: &Path) -> bool {
    let regular = fs::symlink_metadata(path).is_ok_and(|meta| meta.is_file());
    if !regular {
        return false;
    }
    match path.canonicalize() {
        Ok(real) if real.starts_with(root) => true,
        Ok(real) => {
            log::debug!("ignoring {}: resolves to {}", path.display(), real.display());
            false
        }
        Err(_) => false,
    }
}
