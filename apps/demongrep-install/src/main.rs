#![warn(clippy::pedantic)]

//! # demongrep installer
//!
//! Installs the prebuilt `demongrep` binary for the current platform.
//!
//! The installer takes no arguments beyond `--help` and `--version`. It is
//! configured through the environment:
//!
//! ```bash
//! # Latest release into /usr/local/bin, or ~/.local/bin when that is not writable
//! demongrep-install
//!
//! # A pinned release into a directory of your choice
//! VERSION=1.2.0 INSTALL_DIR="$HOME/bin" demongrep-install
//! ```
//!
//! Set `RUST_LOG=debug` for diagnostic output.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use demongrep_install::bootstrap::platform::HostInfo;
use demongrep_install::{InstallConfig, InstallError, Installer, Reporter};

/// Installer version with the build's git commit.
const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("DEMONGREP_INSTALL_GIT_COMMIT"),
    ")"
);

/// Install the prebuilt demongrep binary for this platform.
#[derive(Parser)]
#[command(
    name = "demongrep-install",
    version,
    long_version = LONG_VERSION,
    about = "Install the prebuilt demongrep binary for this platform",
    after_help = "\
ENVIRONMENT VARIABLES:
    VERSION                 Release to install (default: latest)
    INSTALL_DIR             Install directory (default: /usr/local/bin if writable,
                            else ~/.local/bin)
    DEMONGREP_RELEASES_URL  Base URL of release downloads (mirrors, testing)
    DEMONGREP_API_URL       Base URL of the release metadata API
    GITHUB_TOKEN            Token for the release metadata API
    RUST_LOG                Diagnostic log filter (default: warn)"
)]
struct Cli {}

#[tokio::main]
async fn main() -> ExitCode {
    Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let reporter = Arc::new(Reporter::terminal());
    match run(Arc::clone(&reporter)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = handle_error(&reporter, &e);
            ExitCode::from(code)
        }
    }
}

/// Prints the single diagnostic line for `e` and returns the exit code.
fn handle_error(reporter: &Reporter, e: &anyhow::Error) -> u8 {
    reporter.error(format!("{e:#}"));
    e.downcast_ref::<InstallError>()
        .map_or(1, InstallError::exit_code)
}

async fn run(reporter: Arc<Reporter>) -> Result<()> {
    let config = InstallConfig::from_env();
    let installer = Installer::new(config, reporter)?;
    let host = HostInfo::current();
    log::debug!("host: {} {}", host.kernel, host.machine);

    tokio::select! {
        result = installer.run(&host) => {
            result?;
        }
        () = shutdown_signal() => {
            return Err(InstallError::Interrupted.into());
        }
    }
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::debug!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::debug!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
