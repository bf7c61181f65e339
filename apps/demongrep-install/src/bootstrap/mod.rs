//! The installation pipeline.
//!
//! A run moves through a fixed sequence of stages:
//!
//! ```text
//! Start -> PlatformDetected -> VersionResolved -> UrlConstructed -> Downloaded
//!       -> Verified -> Extracted -> BinaryFound -> InstallDirResolved
//!       -> Installed -> Reported
//! ```
//!
//! Each stage returns a `Result`; the first error ends the run. The only
//! retry lives in [`download`], and the only local recovery in [`version`].
//!
//! All intermediate files live in a scratch directory created when the run
//! starts. It is removed when the last handle to it is dropped, whether the
//! run succeeded, failed, or was cancelled mid-stage.

pub mod archive;
pub mod artifact;
pub mod conflict;
pub mod download;
pub mod install;
pub mod locate;
pub mod paths;
pub mod platform;
pub mod verify;
pub mod version;

#[cfg(test)]
mod testing;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::config::{DOWNLOAD_TIMEOUT, InstallConfig};
use crate::errors::InstallError;
use crate::report::Reporter;
use download::DownloadJob;
use platform::{HostInfo, PlatformTarget};
use verify::PublishedChecksum;
use version::ReleaseVersion;

/// Prefix of every scratch directory name.
pub const SCRATCH_PREFIX: &str = "demongrep-install-";

/// Pipeline progress marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Start,
    PlatformDetected,
    VersionResolved,
    UrlConstructed,
    Downloaded,
    Verified,
    Extracted,
    BinaryFound,
    InstallDirResolved,
    Installed,
    Reported,
}

impl Stage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::PlatformDetected => "platform-detected",
            Self::VersionResolved => "version-resolved",
            Self::UrlConstructed => "url-constructed",
            Self::Downloaded => "downloaded",
            Self::Verified => "verified",
            Self::Extracted => "extracted",
            Self::BinaryFound => "binary-found",
            Self::InstallDirResolved => "install-dir-resolved",
            Self::Installed => "installed",
            Self::Reported => "reported",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallResult {
    pub installed_path: PathBuf,
    /// First line of the installed binary's version output, or `unknown`.
    pub reported_version: String,
    /// Whether the install directory is on the `PATH` snapshot.
    pub on_path: bool,
}

/// Drives the pipeline for one configuration.
pub struct Installer {
    config: InstallConfig,
    reporter: Arc<Reporter>,
    client: reqwest::Client,
}

impl Installer {
    /// Creates an installer with its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: InstallConfig, reporter: Arc<Reporter>) -> anyhow::Result<Self> {
        let client = download::http_client(DOWNLOAD_TIMEOUT)?;
        Ok(Self {
            config,
            reporter,
            client,
        })
    }

    #[must_use]
    pub fn config(&self) -> &InstallConfig {
        &self.config
    }

    /// Runs every stage for `host`.
    ///
    /// # Errors
    ///
    /// Returns the error of the first stage that failed. The scratch
    /// directory is gone by the time the error is observed, unless a blocking
    /// stage is still finishing after cancellation, in which case that stage
    /// removes it when done.
    pub async fn run(&self, host: &HostInfo) -> Result<InstallResult, InstallError> {
        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&self.config.scratch_root)
            .map_err(|source| InstallError::ScratchSetup {
                root: self.config.scratch_root.clone(),
                source,
            })?;
        log::debug!("scratch directory: {}", scratch.path().display());

        let mut run = Run {
            installer: self,
            scratch: Arc::new(scratch),
            stage: Stage::Start,
        };
        let result = run.execute(host).await;
        if let Err(e) = &result {
            log::debug!("run failed after stage {}: {e}", run.stage);
        }
        result
    }
}

/// State of one pipeline run.
struct Run<'a> {
    installer: &'a Installer,
    scratch: Arc<TempDir>,
    stage: Stage,
}

impl Run<'_> {
    fn advance(&mut self, next: Stage) {
        log::debug!("stage {} -> {next}", self.stage);
        self.stage = next;
    }

    fn scratch_path(&self, name: &str) -> PathBuf {
        self.scratch.path().join(name)
    }

    async fn execute(&mut self, host: &HostInfo) -> Result<InstallResult, InstallError> {
        let installer = self.installer;
        let config = &installer.config;
        let reporter = Arc::clone(&installer.reporter);
        let client = &installer.client;

        let target = PlatformTarget::identify(host)?;
        reporter.info(format!("Detected platform: {target}"));
        self.advance(Stage::PlatformDetected);

        let resolution = version::resolve_version(client, config).await;
        if let Some(reason) = &resolution.fallback_reason {
            reporter.warn(format!(
                "Could not determine the latest version ({reason}); using the latest-release alias"
            ));
        }
        let release = resolution.version;
        match &release {
            ReleaseVersion::Explicit(v) => reporter.info(format!("Using requested version {v}")),
            ReleaseVersion::Latest(v) => reporter.info(format!("Latest version: {v}")),
            ReleaseVersion::LatestAlias => {}
        }
        self.advance(Stage::VersionResolved);

        let url = artifact::artifact_url(config, &release, target);
        reporter.info(format!("Downloading {url}"));
        self.advance(Stage::UrlConstructed);

        let archive_path = self.scratch_path(&artifact::archive_file_name(&config.repo, target));
        let mut job = DownloadJob::new(url, &archive_path, config.retry);
        download::download(client, &mut job, config.retry.delay, &reporter.progress_callback())
            .await?;
        self.advance(Stage::Downloaded);

        self.verify(&archive_path, &job.url).await?;
        self.advance(Stage::Verified);

        let extract_dir = self.scratch_path("extracted");
        std::fs::create_dir(&extract_dir).map_err(|e| {
            InstallError::extraction_failed(format!(
                "failed to create {}: {e}",
                extract_dir.display()
            ))
        })?;
        let entries = {
            let (source, dest) = (archive_path.clone(), extract_dir.clone());
            self.blocking(move || archive::extract_tar_gz(&source, &dest))
                .await?
        };
        reporter.success(format!("Extracted {entries} entries"));
        self.advance(Stage::Extracted);

        let file_name = target.binary_file_name(&config.binary_name);
        let binary = locate::locate_binary(&extract_dir, &file_name, config.search_depth)?;
        reporter.info(format!(
            "Found {}",
            binary
                .strip_prefix(&extract_dir)
                .unwrap_or(binary.as_path())
                .display()
        ));
        self.advance(Stage::BinaryFound);

        let install_target = paths::resolve_install_dir(config)?;
        reporter.info(format!(
            "Install directory: {} ({})",
            install_target.directory.display(),
            install_target.resolved_by
        ));
        self.advance(Stage::InstallDirResolved);

        let (installed_path, reported_version) = self
            .blocking(move || {
                let installed = install::install_binary(&binary, &install_target, &file_name)?;
                let version = install::query_installed_version(&installed);
                Ok((installed, version))
            })
            .await?;
        self.advance(Stage::Installed);

        let path_status = conflict::check_path(&installed_path, config.search_path.as_deref());
        let result = InstallResult {
            installed_path,
            reported_version,
            on_path: path_status.on_path,
        };
        reporter.summary(&result, &path_status);
        self.advance(Stage::Reported);

        Ok(result)
    }

    /// Structural validation, then the optional published-checksum comparison.
    async fn verify(&self, archive_path: &Path, url: &str) -> Result<(), InstallError> {
        let reporter = &self.installer.reporter;

        let (summary, digest) = {
            let archive = archive_path.to_path_buf();
            self.blocking(move || {
                let summary = verify::validate_archive(&archive)?;
                let digest = verify::compute_sha256(&archive)
                    .map_err(|e| InstallError::archive_corrupted(&archive, format!("{e:#}")))?;
                Ok((summary, digest))
            })
            .await?
        };
        reporter.info(format!("SHA-256: {digest}"));

        match verify::fetch_published_checksum(&self.installer.client, url).await {
            PublishedChecksum::Found(expected) => {
                verify::verify_checksum(archive_path, &digest, &expected)?;
                reporter.success("Checksum matches published value");
            }
            PublishedChecksum::Unavailable(reason) => {
                reporter.warn(format!("No published checksum ({reason}); skipping comparison"));
            }
        }

        reporter.success(format!("Archive verified ({} entries)", summary.entries));
        Ok(())
    }

    /// Runs filesystem work off the async workers.
    ///
    /// The closure keeps the scratch directory alive, so a cancelled run does
    /// not delete it underneath a task that is still writing to it.
    async fn blocking<T, F>(&self, f: F) -> Result<T, InstallError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, InstallError> + Send + 'static,
    {
        let scratch = Arc::clone(&self.scratch);
        let task = tokio::task::spawn_blocking(move || {
            let result = f();
            drop(scratch);
            result
        });
        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(InstallError::Interrupted),
        }
    }
}
