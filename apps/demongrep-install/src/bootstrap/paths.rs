//! Install directory resolution.
//!
//! Decision order:
//!
//! 1. `INSTALL_DIR`, used verbatim. Its writability is only checked by the
//!    installer.
//! 2. The system-wide directory, if writable right now.
//! 3. The per-user directory, created when missing, if writable.
//!
//! Nothing is written outside the per-user directory creation until a
//! writable location is confirmed.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::InstallConfig;
use crate::errors::InstallError;

/// How the install directory was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    Explicit,
    SystemWide,
    UserFallback,
}

impl fmt::Display for ResolvedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Explicit => "INSTALL_DIR",
            Self::SystemWide => "system-wide",
            Self::UserFallback => "per-user",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallTarget {
    pub directory: PathBuf,
    pub resolved_by: ResolvedBy,
    /// Writability observed at resolution time.
    pub writable: bool,
}

/// Whether files can be created in `dir`.
///
/// Probes by creating an anonymous temporary file, which checks the effective
/// permissions (ACLs, read-only mounts) rather than just the mode bits.
#[must_use]
pub fn is_writable_dir(dir: &Path) -> bool {
    dir.is_dir() && tempfile::tempfile_in(dir).is_ok()
}

/// Chooses the install directory.
///
/// # Errors
///
/// Returns `NoWritableInstallDirectory` if there is no override and neither
/// the system-wide nor the per-user directory can be written.
pub fn resolve_install_dir(config: &InstallConfig) -> Result<InstallTarget, InstallError> {
    if let Some(dir) = &config.install_dir {
        return Ok(InstallTarget {
            directory: dir.clone(),
            resolved_by: ResolvedBy::Explicit,
            writable: is_writable_dir(dir),
        });
    }

    if is_writable_dir(&config.system_dir) {
        return Ok(InstallTarget {
            directory: config.system_dir.clone(),
            resolved_by: ResolvedBy::SystemWide,
            writable: true,
        });
    }
    log::debug!("{} is not writable", config.system_dir.display());

    let user_dir = &config.user_dir;
    if !user_dir.exists() {
        match std::fs::create_dir_all(user_dir) {
            Ok(()) => log::debug!("created {}", user_dir.display()),
            Err(e) => log::debug!("cannot create {}: {e}", user_dir.display()),
        }
    }

    if is_writable_dir(user_dir) {
        return Ok(InstallTarget {
            directory: user_dir.clone(),
            resolved_by: ResolvedBy::UserFallback,
            writable: true,
        });
    }

    Err(InstallError::NoWritableInstallDirectory {
        candidates: vec![config.system_dir.clone(), user_dir.clone()],
    })
}
