//! Bootstrap installer for prebuilt demongrep releases.
//!
//! Detects the host platform, picks a release, downloads and verifies the
//! matching archive, and installs the binary into a writable directory. See
//! [`bootstrap`] for the pipeline and [`config`] for the inputs it reads.

pub mod bootstrap;
pub mod config;
pub mod errors;
pub mod report;

pub use bootstrap::{InstallResult, Installer, Stage};
pub use config::InstallConfig;
pub use errors::InstallError;
pub use report::Reporter;
