//! PATH membership and shadowing checks for the installed binary.
//!
//! Both checks work on the `PATH` snapshot taken at startup. A fresh install
//! is only useful if its directory is on `PATH` and no other executable of the
//! same name is found first.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Where the installed binary stands relative to the search path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PathStatus {
    /// Whether the install directory is a `PATH` entry.
    pub on_path: bool,
    /// Other executables of the same name that a shell would run instead,
    /// in `PATH` order.
    pub shadowed_by: Vec<PathBuf>,
}

/// Checks `installed` against the `PATH` snapshot.
#[must_use]
pub fn check_path(installed: &Path, search_path: Option<&OsStr>) -> PathStatus {
    let Some(dir) = installed.parent() else {
        return PathStatus::default();
    };
    let Some(file_name) = installed.file_name() else {
        return PathStatus::default();
    };

    PathStatus {
        on_path: is_dir_on_path(dir, search_path),
        shadowed_by: detect_shadowing(file_name, installed, search_path),
    }
}

/// Whether `dir` appears in `search_path`.
///
/// Entries are compared after canonicalisation when both sides exist, so
/// symlinked or trailing-slash spellings still match.
#[must_use]
pub fn is_dir_on_path(dir: &Path, search_path: Option<&OsStr>) -> bool {
    let Some(search_path) = search_path else {
        return false;
    };
    std::env::split_paths(search_path).any(|entry| same_path(&entry, dir))
}

/// Executables named `file_name` that resolve before `installed`.
///
/// When `installed` is not reachable through `search_path` at all, every
/// match is returned, since any of them would run instead.
#[must_use]
pub fn detect_shadowing(
    file_name: &OsStr,
    installed: &Path,
    search_path: Option<&OsStr>,
) -> Vec<PathBuf> {
    let Some(search_path) = search_path else {
        return Vec::new();
    };
    let cwd = std::env::current_dir().unwrap_or_default();

    let Ok(found) = which::which_in_all(file_name, Some(search_path), cwd) else {
        return Vec::new();
    };

    found
        .take_while(|candidate| !same_path(candidate, installed))
        .collect()
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a.components().eq(b.components()),
    }
}

/// Shell command that puts `dir` on `PATH`.
///
/// On Windows this appends to the user `Path` only, leaving the machine
/// entries out of it.
#[must_use]
pub fn path_remediation(dir: &Path) -> String {
    if cfg!(windows) {
        windows_path_remediation(dir)
    } else {
        format!("export PATH=\"{}:$PATH\"", dir.display())
    }
}

fn windows_path_remediation(dir: &Path) -> String {
    format!(
        "[Environment]::SetEnvironmentVariable('Path', [Environment]::GetEnvironmentVariable('Path', 'User') + ';{}', 'User')",
        dir.display()
    )
}

/// Formats the shadowing warning, one line per entry.
#[must_use]
pub fn format_shadowing_warning(installed: &Path, shadowed_by: &[PathBuf]) -> Vec<String> {
    if shadowed_by.is_empty() {
        return Vec::new();
    }

    let mut lines = Vec::with_capacity(shadowed_by.len() + 2);
    lines.push(format!(
        "another copy is found first on PATH; {} may not be the one that runs:",
        installed.display()
    ));
    for other in shadowed_by {
        lines.push(format!("  {}", other.display()));
    }
    if let Some(dir) = installed.parent() {
        lines.push(format!(
            "  Fix: remove the other copies or move {} earlier in PATH",
            dir.display()
        ));
    }
    lines
}
