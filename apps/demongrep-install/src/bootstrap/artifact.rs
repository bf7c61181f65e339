//! Release artifact naming.
//!
//! Artifacts follow one naming convention:
//!
//! ```text
//! <base>/v<version>/<repo>-<version>-<triple>.tar.gz
//! ```
//!
//! When no version number is known the provider's latest alias is used, whose
//! asset name carries no version:
//!
//! ```text
//! https://github.com/<owner>/<repo>/releases/latest/download/<repo>-<triple>.tar.gz
//! <base>/latest/<repo>-<triple>.tar.gz        (overridden base)
//! ```

use super::platform::PlatformTarget;
use super::version::ReleaseVersion;
use crate::config::InstallConfig;

/// File extension of every release archive.
pub const ARCHIVE_EXTENSION: &str = "tar.gz";

/// Download URL for a concrete version. Pure; does not touch the network.
#[must_use]
pub fn versioned_url(base: &str, repo: &str, version: &str, triple: &str) -> String {
    format!("{base}/v{version}/{repo}-{version}-{triple}.{ARCHIVE_EXTENSION}")
}

/// Download URL for the artifact described by `config`, `version` and `target`.
#[must_use]
pub fn artifact_url(
    config: &InstallConfig,
    version: &ReleaseVersion,
    target: PlatformTarget,
) -> String {
    let repo = &config.repo;
    let triple = target.triple;
    match version.number() {
        Some(number) => versioned_url(&config.release_base_url, repo, number, triple),
        None if config.uses_default_release_host() => format!(
            "https://github.com/{}/{repo}/releases/latest/download/{repo}-{triple}.{ARCHIVE_EXTENSION}",
            config.owner
        ),
        None => format!(
            "{}/latest/{repo}-{triple}.{ARCHIVE_EXTENSION}",
            config.release_base_url
        ),
    }
}

/// File name the artifact is stored under in the scratch directory.
#[must_use]
pub fn archive_file_name(repo: &str, target: PlatformTarget) -> String {
    format!("{repo}-{}.{ARCHIVE_EXTENSION}", target.triple)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::platform::{Arch, Os};

    fn linux() -> PlatformTarget {
        PlatformTarget::from_parts(Os::Linux, Arch::X86_64).unwrap()
    }

    #[test]
    fn versioned_url_follows_naming_convention() {
        assert_eq!(
            versioned_url("https://base", "demongrep", "1.0.0", "x86_64-unknown-linux-gnu"),
            "https://base/v1.0.0/demongrep-1.0.0-x86_64-unknown-linux-gnu.tar.gz"
        );
    }

    #[test]
    fn versioned_url_is_deterministic() {
        let a = versioned_url("b", "r", "2.1.0", "aarch64-apple-darwin");
        let b = versioned_url("b", "r", "2.1.0", "aarch64-apple-darwin");
        assert_eq!(a, b);
    }

    #[test]
    fn default_host_uses_github_release_path() {
        let config = InstallConfig::defaults();
        let url = artifact_url(&config, &ReleaseVersion::Latest("2.0.0".into()), linux());
        assert_eq!(
            url,
            "https://github.com/nahuelcio/demongrep/releases/download/v2.0.0/demongrep-2.0.0-x86_64-unknown-linux-gnu.tar.gz"
        );
    }

    #[test]
    fn alias_on_default_host_uses_latest_download_path() {
        let config = InstallConfig::defaults();
        let url = artifact_url(&config, &ReleaseVersion::LatestAlias, linux());
        assert_eq!(
            url,
            "https://github.com/nahuelcio/demongrep/releases/latest/download/demongrep-x86_64-unknown-linux-gnu.tar.gz"
        );
    }

    #[test]
    fn alias_on_overridden_host_uses_latest_segment() {
        let mut config = InstallConfig::defaults();
        config.release_base_url = "http://mirror.local/demongrep".to_string();
        let url = artifact_url(&config, &ReleaseVersion::LatestAlias, linux());
        assert_eq!(
            url,
            "http://mirror.local/demongrep/latest/demongrep-x86_64-unknown-linux-gnu.tar.gz"
        );
    }

    #[test]
    fn explicit_version_is_embedded_verbatim() {
        let config = InstallConfig::defaults();
        let url = artifact_url(&config, &ReleaseVersion::Explicit("1.2.3".into()), linux());
        assert!(url.ends_with("/v1.2.3/demongrep-1.2.3-x86_64-unknown-linux-gnu.tar.gz"));
    }

    #[test]
    fn archive_file_name_includes_triple() {
        assert_eq!(
            archive_file_name("demongrep", linux()),
            "demongrep-x86_64-unknown-linux-gnu.tar.gz"
        );
    }
}
