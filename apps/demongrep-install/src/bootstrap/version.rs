//! Release version resolution.
//!
//! An explicit version from the configuration wins outright. Otherwise the
//! latest published release is looked up once through the metadata API. A
//! failed lookup is not fatal: the run falls back to the provider's
//! latest-release alias, which still resolves to a download without knowing
//! the version number.

use std::fmt;

use serde::Deserialize;

use crate::config::{InstallConfig, METADATA_TIMEOUT};
use crate::errors::InstallError;

/// The release to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseVersion {
    /// Supplied by the operator, used verbatim.
    Explicit(String),
    /// Discovered through the metadata API, tag prefix removed.
    Latest(String),
    /// Metadata was unavailable; download through the latest-release alias.
    LatestAlias,
}

impl ReleaseVersion {
    /// The concrete version number, if one is known.
    #[must_use]
    pub fn number(&self) -> Option<&str> {
        match self {
            Self::Explicit(v) | Self::Latest(v) => Some(v),
            Self::LatestAlias => None,
        }
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit(v) | Self::Latest(v) => write!(f, "{v}"),
            Self::LatestAlias => write!(f, "latest"),
        }
    }
}

/// Outcome of version resolution.
#[derive(Debug)]
pub struct VersionResolution {
    pub version: ReleaseVersion,
    /// Why the metadata lookup failed, when the alias was used instead.
    pub fallback_reason: Option<InstallError>,
}

/// Subset of the release metadata document that matters here.
#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: Option<String>,
}

/// Strips every leading non-digit character from a release tag.
///
/// Returns `None` when nothing is left.
#[must_use]
pub fn normalize_tag(tag: &str) -> Option<String> {
    let version = tag.trim().trim_start_matches(|c: char| !c.is_ascii_digit());
    (!version.is_empty()).then(|| version.to_string())
}

/// Extracts the normalized version from a metadata response body.
///
/// # Errors
///
/// Returns `MetadataUnavailable` if the body is not JSON, has no `tag_name`,
/// or the tag contains no digits.
pub fn parse_latest_tag(body: &str) -> Result<String, InstallError> {
    let release: LatestRelease = serde_json::from_str(body)
        .map_err(|e| InstallError::metadata_unavailable(format!("malformed response: {e}")))?;
    let tag = release
        .tag_name
        .ok_or_else(|| InstallError::metadata_unavailable("response has no tag_name"))?;
    normalize_tag(&tag).ok_or_else(|| {
        InstallError::metadata_unavailable(format!("tag '{tag}' contains no version number"))
    })
}

/// Queries the metadata API for the latest published version.
///
/// # Errors
///
/// Returns `MetadataUnavailable` on any network, status, or parse failure.
pub async fn fetch_latest_version(
    client: &reqwest::Client,
    config: &InstallConfig,
) -> Result<String, InstallError> {
    let url = config.latest_release_metadata_url();
    let mut request = client
        .get(&url)
        .timeout(METADATA_TIMEOUT)
        .header(reqwest::header::ACCEPT, "application/vnd.github+json");
    if let Some(token) = &config.github_token {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .map_err(|e| InstallError::metadata_unavailable(format!("request to {url} failed: {e}")))?;

    let status = response.status();
    log::debug!("GET {url} -> {status}");
    if !status.is_success() {
        return Err(InstallError::metadata_unavailable(format!(
            "{url} returned HTTP {status}"
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| InstallError::metadata_unavailable(format!("failed to read response: {e}")))?;
    parse_latest_tag(&body)
}

/// Determines which release to install. Never fails.
pub async fn resolve_version(
    client: &reqwest::Client,
    config: &InstallConfig,
) -> VersionResolution {
    if let Some(version) = &config.version {
        return VersionResolution {
            version: ReleaseVersion::Explicit(version.clone()),
            fallback_reason: None,
        };
    }

    match fetch_latest_version(client, config).await {
        Ok(version) => VersionResolution {
            version: ReleaseVersion::Latest(version),
            fallback_reason: None,
        },
        Err(e) => {
            log::debug!("falling back to latest-release alias: {e}");
            VersionResolution {
                version: ReleaseVersion::LatestAlias,
                fallback_reason: Some(e),
            }
        }
    }
}
