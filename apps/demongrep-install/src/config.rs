//! Run configuration for the installer.
//!
//! The process environment is read exactly once, by [`InstallConfig::from_env`],
//! at startup. Every pipeline stage receives the resulting struct by reference
//! and never consults the environment itself.
//!
//! ## Environment Variables
//!
//! - `VERSION`: explicit release version (skips the metadata query)
//! - `INSTALL_DIR`: explicit install directory
//! - `DEMONGREP_RELEASES_URL`: artifact base URL override (mirrors, testing)
//! - `DEMONGREP_API_URL`: release metadata API base override
//! - `GITHUB_TOKEN`: optional token sent with the metadata query
//! - `PATH`: snapshot used for the post-install PATH checks

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding an explicit release version.
pub const VERSION_ENV: &str = "VERSION";

/// Environment variable holding an explicit install directory.
pub const INSTALL_DIR_ENV: &str = "INSTALL_DIR";

/// Environment variable overriding the artifact base URL.
pub const RELEASES_URL_ENV: &str = "DEMONGREP_RELEASES_URL";

/// Environment variable overriding the metadata API base URL.
pub const API_URL_ENV: &str = "DEMONGREP_API_URL";

/// Environment variable holding an optional GitHub token.
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Repository owner publishing the releases.
pub const DEFAULT_OWNER: &str = "nahuelcio";

/// Repository (and artifact prefix) name.
pub const DEFAULT_REPO: &str = "demongrep";

/// Canonical name of the installed binary, without platform extension.
pub const DEFAULT_BINARY_NAME: &str = "demongrep";

/// Default metadata API base.
const DEFAULT_API_URL: &str = "https://api.github.com";

/// Default number of download attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default fixed delay between download attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Default maximum depth of the fallback binary search.
pub const DEFAULT_SEARCH_DEPTH: usize = 2;

/// Timeout applied to the release metadata query.
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout applied to a single download attempt.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Bounded retry policy for network downloads.
///
/// The delay is fixed between attempts (no exponential growth).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Pause between a failed attempt and the next one.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Everything one installer run needs to know about its environment.
#[derive(Debug, Clone)]
pub struct InstallConfig {
    /// Repository owner.
    pub owner: String,
    /// Repository name, also the artifact file prefix.
    pub repo: String,
    /// Canonical binary name without extension.
    pub binary_name: String,
    /// Explicit release version, if the operator pinned one.
    pub version: Option<String>,
    /// Explicit install directory, if the operator chose one.
    pub install_dir: Option<PathBuf>,
    /// Base URL releases are downloaded from, without trailing slash.
    pub release_base_url: String,
    /// Base URL of the metadata API, without trailing slash.
    pub api_base_url: String,
    /// Token sent as a bearer credential with the metadata query.
    pub github_token: Option<String>,
    /// Preferred system-wide install directory.
    pub system_dir: PathBuf,
    /// Per-user fallback install directory, created on demand.
    pub user_dir: PathBuf,
    /// Parent directory for the run's scratch space.
    pub scratch_root: PathBuf,
    /// Download retry policy.
    pub retry: RetryPolicy,
    /// Maximum depth of the fallback binary search.
    pub search_depth: usize,
    /// `PATH` as it was when the run started.
    pub search_path: Option<OsString>,
}

impl InstallConfig {
    /// Builds a configuration from the process environment.
    ///
    /// Empty or whitespace-only values count as unset. Other values are kept
    /// verbatim; only the token and the URL overrides are trimmed.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::defaults();

        config.version = non_empty_env(VERSION_ENV);
        config.install_dir = non_empty_env(INSTALL_DIR_ENV).map(PathBuf::from);
        config.github_token = non_empty_env(GITHUB_TOKEN_ENV).map(|t| t.trim().to_string());
        config.search_path = std::env::var_os("PATH");

        if let Some(url) = non_empty_env(RELEASES_URL_ENV) {
            config.release_base_url = trim_base_url(&url);
        }
        if let Some(url) = non_empty_env(API_URL_ENV) {
            config.api_base_url = trim_base_url(&url);
        }

        config
    }

    /// Configuration with built-in defaults and no operator overrides.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            owner: DEFAULT_OWNER.to_string(),
            repo: DEFAULT_REPO.to_string(),
            binary_name: DEFAULT_BINARY_NAME.to_string(),
            version: None,
            install_dir: None,
            release_base_url: default_release_base_url(DEFAULT_OWNER, DEFAULT_REPO),
            api_base_url: DEFAULT_API_URL.to_string(),
            github_token: None,
            system_dir: default_system_dir(),
            user_dir: default_user_dir(),
            scratch_root: std::env::temp_dir(),
            retry: RetryPolicy::default(),
            search_depth: DEFAULT_SEARCH_DEPTH,
            search_path: None,
        }
    }

    /// Returns whether the artifact base URL is the stock GitHub one.
    ///
    /// The latest-alias URL shape depends on this.
    #[must_use]
    pub fn uses_default_release_host(&self) -> bool {
        self.release_base_url == default_release_base_url(&self.owner, &self.repo)
    }

    /// URL of the "latest release" metadata document.
    #[must_use]
    pub fn latest_release_metadata_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base_url, self.owner, self.repo
        )
    }
}

/// User-Agent sent with every HTTP request.
#[must_use]
pub fn user_agent() -> String {
    format!("demongrep-install/{}", env!("CARGO_PKG_VERSION"))
}

fn default_release_base_url(owner: &str, repo: &str) -> String {
    format!("https://github.com/{owner}/{repo}/releases/download")
}

fn non_empty_env(name: &str) -> Option<String> {
    non_empty(std::env::var(name).ok())
}

/// Drops blank values and keeps everything else exactly as given.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn trim_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[cfg(not(windows))]
fn default_system_dir() -> PathBuf {
    PathBuf::from("/usr/local/bin")
}

#[cfg(windows)]
fn default_system_dir() -> PathBuf {
    std::env::var_os("ProgramFiles")
        .map_or_else(|| PathBuf::from(r"C:\Program Files"), PathBuf::from)
        .join(DEFAULT_REPO)
}

#[cfg(not(windows))]
fn default_user_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".local")
        .join("bin")
}

#[cfg(windows)]
fn default_user_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(DEFAULT_REPO)
        .join("bin")
}
