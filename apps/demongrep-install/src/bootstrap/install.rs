//! Final installation of the located binary.
//!
//! The binary is staged as a hidden temporary file inside the install
//! directory and renamed over the canonical name. Any existing file of that
//! name is replaced without a backup. The rename also works while the old
//! binary is running.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::paths::{InstallTarget, is_writable_dir};
use crate::errors::InstallError;

/// Flags tried, in order, when asking the installed binary for its version.
pub const VERSION_FLAGS: [&str; 2] = ["--version", "-V"];

/// Reported when the installed binary does not answer either version flag.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Copies `source` into `target.directory` as `file_name` and verifies it.
///
/// Returns the installed path.
///
/// # Errors
///
/// - `PermissionDenied` if the directory cannot be created or written
/// - `CopyFailed` for any other I/O error while writing
/// - `InstalledFileNotExecutable` if the result is not an executable file
pub fn install_binary(
    source: &Path,
    target: &InstallTarget,
    file_name: &str,
) -> Result<PathBuf, InstallError> {
    let dir = &target.directory;

    if let Err(e) = fs::create_dir_all(dir) {
        log::debug!("cannot create {}: {e}", dir.display());
        return Err(InstallError::permission_denied(dir));
    }
    if !is_writable_dir(dir) {
        return Err(InstallError::permission_denied(dir));
    }

    let destination = dir.join(file_name);
    let io_error = |e: io::Error| {
        if e.kind() == io::ErrorKind::PermissionDenied {
            InstallError::permission_denied(dir)
        } else {
            InstallError::CopyFailed {
                destination: destination.clone(),
                source: e,
            }
        }
    };

    set_executable(source).map_err(io_error)?;

    let mut staged = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(io_error)?;
    let mut input = File::open(source).map_err(io_error)?;
    io::copy(&mut input, staged.as_file_mut()).map_err(io_error)?;
    staged.as_file().sync_all().map_err(io_error)?;
    set_executable(staged.path()).map_err(io_error)?;

    staged
        .persist(&destination)
        .map_err(|e| io_error(e.error))?;
    log::debug!("installed {} -> {}", source.display(), destination.display());

    verify_installed(&destination)?;
    Ok(destination)
}

/// Checks that `path` is a regular file the current platform can execute.
///
/// # Errors
///
/// Returns `InstalledFileNotExecutable` otherwise.
pub fn verify_installed(path: &Path) -> Result<(), InstallError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() && is_executable(&meta) => Ok(()),
        _ => Err(InstallError::InstalledFileNotExecutable {
            path: path.to_path_buf(),
        }),
    }
}

/// Asks the installed binary for its version.
///
/// Tries each of [`VERSION_FLAGS`] and returns the first non-empty stdout
/// line of a successful run, or [`UNKNOWN_VERSION`].
#[must_use]
pub fn query_installed_version(path: &Path) -> String {
    for flag in VERSION_FLAGS {
        let output = Command::new(path)
            .arg(flag)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();
        match output {
            Ok(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                if let Some(line) = stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
                    return line.to_string();
                }
            }
            Ok(output) => log::debug!("{} {flag} exited with {}", path.display(), output.status),
            Err(e) => log::debug!("failed to run {} {flag}: {e}", path.display()),
        }
    }
    UNKNOWN_VERSION.to_string()
}

#[cfg(unix)]
fn set_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn set_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(meta: &fs::Metadata) -> bool {
    meta.is_file()
}
