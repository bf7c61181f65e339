//! Error types for the demongrep installer.
//!
//! Every stage of the bootstrap pipeline either succeeds or fails with one of
//! the variants below. Apart from [`InstallError::MetadataUnavailable`], which
//! the version resolver recovers from locally, every variant is terminal for
//! the run.

use std::path::PathBuf;
use thiserror::Error;

/// Consolidated error type for the bootstrap pipeline.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The host kernel name is not one the release matrix knows about.
    #[error("unsupported platform: {kernel}")]
    UnsupportedPlatform {
        /// Kernel name as reported by the host (e.g. `FreeBSD`).
        kernel: String,
    },

    /// The host machine type is not one the release matrix knows about.
    #[error("unsupported architecture: {machine}")]
    UnsupportedArchitecture {
        /// Machine type as reported by the host (e.g. `armv7l`).
        machine: String,
    },

    /// The OS and architecture are known, but no release is built for the pair.
    #[error("no prebuilt release for {os} on {arch}")]
    UnsupportedCombination {
        /// Normalized OS name.
        os: String,
        /// Normalized architecture name.
        arch: String,
    },

    /// Release metadata could not be fetched or parsed.
    #[error("release metadata unavailable: {message}")]
    MetadataUnavailable {
        /// What went wrong while querying the metadata endpoint.
        message: String,
    },

    /// Every download attempt failed.
    #[error("download failed after {attempts} attempts: {url}: {last_error}")]
    DownloadExhausted {
        /// The artifact URL.
        url: String,
        /// Number of attempts made before giving up.
        attempts: u32,
        /// Description of the final attempt's failure.
        last_error: String,
    },

    /// The downloaded file is not a structurally valid archive.
    #[error("archive is corrupted: {path}: {reason}")]
    ArchiveCorrupted {
        /// The archive that failed verification.
        path: PathBuf,
        /// What the verifier found.
        reason: String,
    },

    /// Unpacking a verified archive failed.
    #[error("extraction failed: {message}")]
    ExtractionFailed {
        /// Description of the extraction failure.
        message: String,
    },

    /// No executable with the expected name exists in the unpacked tree.
    #[error("binary '{binary}' not found in archive (searched: {})", display_paths(.searched))]
    BinaryNotFound {
        /// Expected file name.
        binary: String,
        /// Locations that were checked.
        searched: Vec<PathBuf>,
    },

    /// Neither the system-wide nor the per-user directory is writable.
    #[error(
        "no writable install directory (tried: {}); set INSTALL_DIR to a writable directory or re-run with elevated privileges",
        display_paths(.candidates)
    )]
    NoWritableInstallDirectory {
        /// Directories that were considered.
        candidates: Vec<PathBuf>,
    },

    /// The resolved install directory cannot be written.
    #[error("permission denied: cannot write to {directory}; {remediation}")]
    PermissionDenied {
        /// The install directory.
        directory: PathBuf,
        /// What the operator can do about it.
        remediation: String,
    },

    /// Writing the binary into the install directory failed.
    #[error("failed to install binary to {destination}")]
    CopyFailed {
        /// Canonical path the binary was being written to.
        destination: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The installed file is missing or lacks the executable bit.
    #[error("installed file is not executable: {path}")]
    InstalledFileNotExecutable {
        /// Path of the installed binary.
        path: PathBuf,
    },

    /// The run-exclusive scratch directory could not be created.
    #[error("failed to create scratch directory under {root}")]
    ScratchSetup {
        /// Parent directory for scratch space.
        root: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The run was cancelled by a signal.
    #[error("installation interrupted")]
    Interrupted,
}

impl InstallError {
    /// Creates a new `ArchiveCorrupted` error.
    #[must_use]
    pub fn archive_corrupted(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ArchiveCorrupted {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `ExtractionFailed` error.
    #[must_use]
    pub fn extraction_failed(message: impl Into<String>) -> Self {
        Self::ExtractionFailed {
            message: message.into(),
        }
    }

    /// Creates a new `MetadataUnavailable` error.
    #[must_use]
    pub fn metadata_unavailable(message: impl Into<String>) -> Self {
        Self::MetadataUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `PermissionDenied` error with the standard remediation text.
    #[must_use]
    pub fn permission_denied(directory: impl Into<PathBuf>) -> Self {
        Self::PermissionDenied {
            directory: directory.into(),
            remediation: "set INSTALL_DIR to a directory you own or re-run with elevated privileges"
                .to_string(),
        }
    }

    /// Process exit code for this failure.
    ///
    /// Interrupted runs follow the shell convention for SIGINT.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Interrupted => 130,
            _ => 1,
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
