//! Platform detection for the installer.
//!
//! The host is described by its kernel name and machine type (the values
//! `uname -s` and `uname -m` print). Both are normalized and then looked up
//! in a fixed release matrix to obtain the target triple naming the artifact.
//!
//! ## Supported Targets
//!
//! - Linux `x86_64` (`x86_64-unknown-linux-gnu`)
//! - macOS `x86_64` (`x86_64-apple-darwin`)
//! - macOS ARM64 (`aarch64-apple-darwin`)
//! - Windows `x86_64` (`x86_64-pc-windows-msvc`)
//!
//! Linux and Windows on ARM64 are recognized but have no published build.

use std::fmt;
use std::process::Command;

use crate::errors::InstallError;

/// Normalized operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    Macos,
    Windows,
}

impl Os {
    /// Maps a kernel name to an OS.
    ///
    /// Matching is by prefix, so `Linux`, `Darwin`, `MINGW64_NT-10.0`,
    /// `MSYS_NT-10.0` and `CYGWIN_NT-10.0` are all recognized.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedPlatform` for any other kernel name.
    pub fn from_kernel(kernel: &str) -> Result<Self, InstallError> {
        let kernel = kernel.trim();
        if kernel.starts_with("Linux") {
            Ok(Self::Linux)
        } else if kernel.starts_with("Darwin") {
            Ok(Self::Macos)
        } else if ["MINGW", "MSYS", "CYGWIN"]
            .iter()
            .any(|prefix| kernel.starts_with(prefix))
        {
            Ok(Self::Windows)
        } else {
            Err(InstallError::UnsupportedPlatform {
                kernel: kernel.to_string(),
            })
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Macos => "macos",
            Self::Windows => "windows",
        }
    }
}

/// Normalized CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    Aarch64,
}

impl Arch {
    /// Maps a machine type to an architecture.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedArchitecture` for anything but `x86_64`/`amd64`
    /// and `aarch64`/`arm64`.
    pub fn from_machine(machine: &str) -> Result<Self, InstallError> {
        match machine.trim() {
            "x86_64" | "amd64" => Ok(Self::X86_64),
            "aarch64" | "arm64" => Ok(Self::Aarch64),
            other => Err(InstallError::UnsupportedArchitecture {
                machine: other.to_string(),
            }),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
        }
    }
}

/// Release matrix: every (OS, architecture) pair with a published build.
const TARGETS: &[(Os, Arch, &str)] = &[
    (Os::Linux, Arch::X86_64, "x86_64-unknown-linux-gnu"),
    (Os::Macos, Arch::X86_64, "x86_64-apple-darwin"),
    (Os::Macos, Arch::Aarch64, "aarch64-apple-darwin"),
    (Os::Windows, Arch::X86_64, "x86_64-pc-windows-msvc"),
];

/// Raw host identification strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    /// Kernel name, as printed by `uname -s`.
    pub kernel: String,
    /// Machine type, as printed by `uname -m`.
    pub machine: String,
}

impl HostInfo {
    #[must_use]
    pub fn new(kernel: impl Into<String>, machine: impl Into<String>) -> Self {
        Self {
            kernel: kernel.into(),
            machine: machine.into(),
        }
    }

    /// Reads the running host's kernel name and machine type.
    ///
    /// Queries `uname`. Where it is unavailable (native Windows), the values
    /// are derived from the build target in the same vocabulary.
    #[must_use]
    pub fn current() -> Self {
        match (uname("-s"), uname("-m")) {
            (Some(kernel), Some(machine)) => Self::new(kernel, machine),
            _ => Self::from_build_target(),
        }
    }

    fn from_build_target() -> Self {
        let kernel = match std::env::consts::OS {
            "linux" => "Linux",
            "macos" => "Darwin",
            "windows" => "MINGW64_NT",
            other => other,
        };
        Self::new(kernel, std::env::consts::ARCH)
    }
}

fn uname(flag: &str) -> Option<String> {
    let output = Command::new("uname").arg(flag).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!value.is_empty()).then_some(value)
}

/// A supported release target.
///
/// Derived once per run and never modified afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlatformTarget {
    pub os: Os,
    pub arch: Arch,
    pub triple: &'static str,
}

impl PlatformTarget {
    /// Resolves the target for the given host.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedPlatform` or `UnsupportedArchitecture` when either
    /// string is unknown, and `UnsupportedCombination` when both are known
    /// but the pair has no published build.
    pub fn identify(host: &HostInfo) -> Result<Self, InstallError> {
        let os = Os::from_kernel(&host.kernel)?;
        let arch = Arch::from_machine(&host.machine)?;
        Self::from_parts(os, arch)
    }

    /// Looks up the triple for a normalized pair.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedCombination` for pairs outside the release matrix.
    pub fn from_parts(os: Os, arch: Arch) -> Result<Self, InstallError> {
        TARGETS
            .iter()
            .find(|(o, a, _)| *o == os && *a == arch)
            .map(|&(os, arch, triple)| Self { os, arch, triple })
            .ok_or_else(|| InstallError::UnsupportedCombination {
                os: os.as_str().to_string(),
                arch: arch.as_str().to_string(),
            })
    }

    /// Returns the executable file extension for this target.
    #[must_use]
    pub fn executable_extension(self) -> &'static str {
        match self.os {
            Os::Windows => ".exe",
            Os::Linux | Os::Macos => "",
        }
    }

    /// File name of the binary on this target.
    #[must_use]
    pub fn binary_file_name(self, binary_name: &str) -> String {
        format!("{binary_name}{}", self.executable_extension())
    }
}

impl fmt::Display for PlatformTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.triple)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_hosts_map_to_documented_triples() {
        let cases = [
            ("Linux", "x86_64", "x86_64-unknown-linux-gnu"),
            ("Linux", "amd64", "x86_64-unknown-linux-gnu"),
            ("Darwin", "x86_64", "x86_64-apple-darwin"),
            ("Darwin", "arm64", "aarch64-apple-darwin"),
            ("Darwin", "aarch64", "aarch64-apple-darwin"),
            ("MINGW64_NT-10.0-19045", "x86_64", "x86_64-pc-windows-msvc"),
            ("MSYS_NT-10.0", "x86_64", "x86_64-pc-windows-msvc"),
            ("CYGWIN_NT-10.0", "amd64", "x86_64-pc-windows-msvc"),
        ];

        for (kernel, machine, triple) in cases {
            let target = PlatformTarget::identify(&HostInfo::new(kernel, machine))
                .unwrap_or_else(|e| panic!("{kernel}/{machine} should be supported: {e}"));
            assert_eq!(target.triple, triple, "{kernel}/{machine}");
        }
    }

    #[test]
    fn unknown_kernel_is_unsupported_platform() {
        let err = PlatformTarget::identify(&HostInfo::new("FreeBSD", "x86_64")).unwrap_err();
        assert!(matches!(err, InstallError::UnsupportedPlatform { kernel } if kernel == "FreeBSD"));
    }

    #[test]
    fn unknown_machine_is_unsupported_architecture() {
        let err = PlatformTarget::identify(&HostInfo::new("Linux", "armv7l")).unwrap_err();
        assert!(
            matches!(err, InstallError::UnsupportedArchitecture { machine } if machine == "armv7l")
        );
    }

    #[test]
    fn pairs_outside_matrix_are_unsupported_combinations() {
        for (kernel, machine) in [("Linux", "aarch64"), ("MINGW64_NT", "arm64")] {
            let err = PlatformTarget::identify(&HostInfo::new(kernel, machine)).unwrap_err();
            assert!(
                matches!(err, InstallError::UnsupportedCombination { .. }),
                "{kernel}/{machine} should not have a triple"
            );
        }
    }

    #[test]
    fn kernel_check_runs_before_machine_check() {
        let err = PlatformTarget::identify(&HostInfo::new("SunOS", "sparc")).unwrap_err();
        assert!(matches!(err, InstallError::UnsupportedPlatform { .. }));
    }

    #[test]
    fn binary_file_name_has_exe_suffix_only_on_windows() {
        let linux = PlatformTarget::from_parts(Os::Linux, Arch::X86_64).unwrap();
        let windows = PlatformTarget::from_parts(Os::Windows, Arch::X86_64).unwrap();
        assert_eq!(linux.binary_file_name("demongrep"), "demongrep");
        assert_eq!(windows.binary_file_name("demongrep"), "demongrep.exe");
    }

    #[test]
    fn display_matches_triple() {
        let target = PlatformTarget::from_parts(Os::Macos, Arch::Aarch64).unwrap();
        assert_eq!(target.to_string(), "aarch64-apple-darwin");
    }

    #[test]
    fn current_host_reports_non_empty_strings() {
        let host = HostInfo::current();
        assert!(!host.kernel.is_empty());
        assert!(!host.machine.is_empty());
    }
}
