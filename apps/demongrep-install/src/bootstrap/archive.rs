//! Extraction of verified release archives.
//!
//! Unpacks a tar.gz into an existing scratch directory, entry by entry. Entry
//! names and link targets are checked before anything is written, and every
//! write goes through `tar`'s `unpack_in`, which refuses to follow a symlink
//! out of the destination. A crafted archive cannot place files outside it.

use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

use crate::errors::InstallError;

/// Extracts `archive_path` into `dest_dir`, returning the number of entries.
///
/// Paths are preserved as they appear in the archive; no leading directory is
/// stripped. The binary locator copes with nested layouts.
///
/// # Errors
///
/// Returns `ExtractionFailed` if the destination does not exist, an entry has
/// an absolute path or a `..` component, a link points outside the
/// destination, or any file cannot be written.
pub fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<usize, InstallError> {
    if !dest_dir.is_dir() {
        return Err(InstallError::extraction_failed(format!(
            "destination is not a directory: {}",
            dest_dir.display()
        )));
    }

    let file = File::open(archive_path).map_err(|e| {
        InstallError::extraction_failed(format!(
            "failed to open archive {}: {e}",
            archive_path.display()
        ))
    })?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));

    let entries = archive
        .entries()
        .map_err(|e| InstallError::extraction_failed(format!("failed to read tar entries: {e}")))?;

    let mut count = 0;
    for entry in entries {
        let mut entry = entry
            .map_err(|e| InstallError::extraction_failed(format!("failed to read tar entry: {e}")))?;

        let entry_path = entry
            .path()
            .map_err(|e| InstallError::extraction_failed(format!("invalid entry path: {e}")))?
            .into_owned();

        if !is_contained(&entry_path) {
            return Err(InstallError::extraction_failed(format!(
                "refusing to extract path with parent directory or absolute reference: {}",
                entry_path.display()
            )));
        }

        let entry_type = entry.header().entry_type();
        if matches!(entry_type, EntryType::Symlink | EntryType::Link) {
            let target = entry
                .link_name()
                .map_err(|e| InstallError::extraction_failed(format!("invalid link target: {e}")))?
                .ok_or_else(|| {
                    InstallError::extraction_failed(format!(
                        "link without target: {}",
                        entry_path.display()
                    ))
                })?
                .into_owned();
            // Symlinks resolve from the link's own directory, hard links from
            // the archive root.
            let base = match entry_type {
                EntryType::Symlink => entry_path.parent().unwrap_or_else(|| Path::new("")),
                _ => Path::new(""),
            };
            if !link_stays_inside(base, &target) {
                return Err(InstallError::extraction_failed(format!(
                    "refusing to extract link leaving the archive: {} -> {}",
                    entry_path.display(),
                    target.display()
                )));
            }
        }

        let unpacked = entry.unpack_in(dest_dir).map_err(|e| {
            InstallError::extraction_failed(format!(
                "failed to extract {}: {e}",
                entry_path.display()
            ))
        })?;
        if !unpacked {
            return Err(InstallError::extraction_failed(format!(
                "entry skipped as unsafe: {}",
                entry_path.display()
            )));
        }
        count += 1;
    }

    log::debug!("extracted {count} entries into {}", dest_dir.display());
    Ok(count)
}

/// Whether a relative entry path stays inside the directory it is joined to.
fn is_contained(path: &Path) -> bool {
    !path.is_absolute()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Whether `target`, resolved lexically from `base`, stays under the root.
fn link_stays_inside(base: &Path, target: &Path) -> bool {
    if target.is_absolute() {
        return false;
    }
    let mut depth: usize = 0;
    for component in base.components().chain(target.components()) {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(up) => depth = up,
                None => return false,
            },
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::testing::{write_tar_gz, write_tar_gz_with_raw_name, write_tar_gz_with_symlink};

    #[test]
    fn extracts_nested_layout_without_stripping() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("release.tar.gz");
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();

        write_tar_gz(
            &archive,
            &[
                ("demongrep-1.0.0/bin/demongrep", b"binary content".as_slice(), 0o755),
                ("demongrep-1.0.0/README.md", b"docs".as_slice(), 0o644),
            ],
        );

        let count = extract_tar_gz(&archive, &out).unwrap();
        assert_eq!(count, 2);
        assert_eq!(
            std::fs::read(out.join("demongrep-1.0.0/bin/demongrep")).unwrap(),
            b"binary content"
        );
        assert!(out.join("demongrep-1.0.0/README.md").is_file());
    }

    #[test]
    fn dot_prefixed_entries_land_at_root() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("release.tar.gz");
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();

        write_tar_gz(&archive, &[("./demongrep", b"bin".as_slice(), 0o755)]);

        extract_tar_gz(&archive, &out).unwrap();
        assert!(out.join("demongrep").is_file());
    }

    #[test]
    fn missing_destination_is_extraction_failure() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("release.tar.gz");
        write_tar_gz(&archive, &[("demongrep", b"bin".as_slice(), 0o755)]);

        let err = extract_tar_gz(&archive, &dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, InstallError::ExtractionFailed { .. }));
    }

    #[test]
    fn parent_directory_entries_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil.tar.gz");
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();

        write_tar_gz_with_raw_name(&archive, "../escaped", b"payload");

        let err = extract_tar_gz(&archive, &out).unwrap_err();
        assert!(matches!(err, InstallError::ExtractionFailed { .. }));
        assert!(!dir.path().join("escaped").exists());
    }

    #[test]
    fn is_contained_accepts_relative_paths_only() {
        assert!(is_contained(Path::new("demongrep")));
        assert!(is_contained(Path::new("./bin/demongrep")));
        assert!(!is_contained(Path::new("../demongrep")));
        assert!(!is_contained(Path::new("bin/../../demongrep")));
        assert!(!is_contained(Path::new("/usr/bin/demongrep")));
    }

    #[cfg(unix)]
    #[test]
    fn executable_mode_survives_extraction() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("release.tar.gz");
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();

        write_tar_gz(&archive, &[("demongrep", b"bin".as_slice(), 0o755)]);
        extract_tar_gz(&archive, &out).unwrap();

        let mode = std::fs::metadata(out.join("demongrep")).unwrap().permissions().mode();
        assert_ne!(mode & 0o111, 0);
    }

    #[test]
    fn link_targets_are_resolved_from_their_directory() {
        assert!(link_stays_inside(Path::new("bin"), Path::new("../libexec/demongrep")));
        assert!(link_stays_inside(Path::new(""), Path::new("demongrep-1.0.0/demongrep")));
        assert!(!link_stays_inside(Path::new(""), Path::new("../outside")));
        assert!(!link_stays_inside(Path::new("bin"), Path::new("../../outside")));
        assert!(!link_stays_inside(Path::new("bin"), Path::new("/bin/sh")));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_leaving_destination_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil.tar.gz");
        let out = dir.path().join("out");
        let outside = dir.path().join("outside");
        std::fs::create_dir(&out).unwrap();
        std::fs::create_dir(&outside).unwrap();

        write_tar_gz_with_symlink(&archive, "link", &outside, "link/pwned", b"payload");

        let err = extract_tar_gz(&archive, &out).unwrap_err();
        assert!(matches!(err, InstallError::ExtractionFailed { .. }));
        assert!(!outside.join("pwned").exists());
    }

    #[cfg(unix)]
    #[test]
    fn writes_through_existing_symlink_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("release.tar.gz");
        let out = dir.path().join("out");
        let outside = dir.path().join("outside");
        std::fs::create_dir(&out).unwrap();
        std::fs::create_dir(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, out.join("link")).unwrap();

        write_tar_gz(&archive, &[("link/pwned", b"payload".as_slice(), 0o644)]);

        let err = extract_tar_gz(&archive, &out).unwrap_err();
        assert!(matches!(err, InstallError::ExtractionFailed { .. }));
        assert!(!outside.join("pwned").exists());
    }

    #[cfg(unix)]
    #[test]
    fn relative_symlink_inside_archive_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("release.tar.gz");
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();

        write_tar_gz_with_symlink(
            &archive,
            "bin/demongrep",
            Path::new("../libexec/demongrep"),
            "libexec/demongrep",
            b"bin",
        );

        assert_eq!(extract_tar_gz(&archive, &out).unwrap(), 2);
        let meta = std::fs::symlink_metadata(out.join("bin/demongrep")).unwrap();
        assert!(meta.file_type().is_symlink());
        assert_eq!(std::fs::read(out.join("bin/demongrep")).unwrap(), b"bin");
    }
}
