//! User-facing progress and summary output.
//!
//! Every line the installer prints for the operator goes through a
//! [`Reporter`]. Lines carry a severity prefix:
//!
//! ```text
//! [INFO] Detected platform: x86_64-unknown-linux-gnu
//! [OK]   Archive verified (3 entries)
//! [WARN] /home/user/.local/bin is not on PATH
//! [FAIL] download failed after 3 attempts: ...
//! ```
//!
//! Info and success lines go to stdout, warnings and errors to stderr. The
//! in-memory sink records lines instead of printing them.

use std::io::{IsTerminal, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::bootstrap::InstallResult;
use crate::bootstrap::conflict::{PathStatus, format_shadowing_warning, path_remediation};
use crate::bootstrap::download::{ProgressCallback, ProgressEvent, format_bytes, format_speed};

/// Severity of a report line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    /// Returns the CLI prefix for this severity.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Info => "[INFO]",
            Self::Success => "[OK]",
            Self::Warning => "[WARN]",
            Self::Error => "[FAIL]",
        }
    }

    fn to_stderr(self) -> bool {
        matches!(self, Self::Warning | Self::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLine {
    pub severity: Severity,
    pub message: String,
}

impl ReportLine {
    /// The line as printed, prefix included.
    #[must_use]
    pub fn render(&self) -> String {
        format!("{:<6} {}", self.severity.prefix(), self.message)
    }
}

#[derive(Debug)]
enum Sink {
    Terminal {
        /// Whether stdout can take in-place progress updates.
        interactive: bool,
        /// A `\r` progress line is open and needs a newline before the next line.
        progress_open: AtomicBool,
    },
    Memory(Mutex<Vec<ReportLine>>),
}

/// Writes progress lines and the final summary.
#[derive(Debug)]
pub struct Reporter {
    sink: Sink,
}

impl Reporter {
    /// Reporter printing to the process's stdout and stderr.
    #[must_use]
    pub fn terminal() -> Self {
        Self {
            sink: Sink::Terminal {
                interactive: std::io::stdout().is_terminal(),
                progress_open: AtomicBool::new(false),
            },
        }
    }

    /// Reporter that records lines for later inspection.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            sink: Sink::Memory(Mutex::new(Vec::new())),
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(Severity::Info, message.into());
    }

    pub fn success(&self, message: impl Into<String>) {
        self.emit(Severity::Success, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(Severity::Warning, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(Severity::Error, message.into());
    }

    /// Lines recorded so far. Always empty for the terminal reporter.
    #[must_use]
    pub fn lines(&self) -> Vec<ReportLine> {
        match &self.sink {
            Sink::Memory(lines) => lines
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            Sink::Terminal { .. } => Vec::new(),
        }
    }

    fn emit(&self, severity: Severity, message: String) {
        let line = ReportLine { severity, message };
        match &self.sink {
            Sink::Memory(lines) => lines
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(line),
            Sink::Terminal { progress_open, .. } => {
                if progress_open.swap(false, Ordering::Relaxed) {
                    println!();
                }
                if severity.to_stderr() {
                    eprintln!("{}", line.render());
                } else {
                    println!("{}", line.render());
                }
            }
        }
    }

    /// Renders a download progress line in place. Terminal-only.
    fn progress(&self, downloaded: u64, total: Option<u64>, speed: u64) {
        let Sink::Terminal {
            interactive: true,
            progress_open,
        } = &self.sink
        else {
            return;
        };

        let line = match total {
            Some(total) if total > 0 => format!(
                "{}/{} ({}%) {}",
                format_bytes(downloaded),
                format_bytes(total),
                percent(downloaded, total),
                format_speed(speed)
            ),
            _ => format!("{} {}", format_bytes(downloaded), format_speed(speed)),
        };
        print!("\r       {line}     ");
        let _ = std::io::stdout().flush();
        progress_open.store(true, Ordering::Relaxed);
    }

    /// Turns download progress events into report lines.
    pub fn handle_progress(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::AttemptStarted {
                attempt,
                max_attempts,
            } => self.info(format!("Download attempt {attempt}/{max_attempts}")),
            ProgressEvent::Started { total } => {
                if let Some(total) = total {
                    log::debug!("artifact size: {total} bytes");
                }
            }
            ProgressEvent::Progress {
                downloaded,
                total,
                speed,
            } => self.progress(downloaded, total, speed),
            ProgressEvent::AttemptFailed {
                attempt,
                max_attempts,
                error,
                will_retry,
            } => {
                let next = if will_retry { "retrying" } else { "giving up" };
                self.warn(format!(
                    "Attempt {attempt}/{max_attempts} failed: {error}; {next}"
                ));
            }
            ProgressEvent::Completed { attempts, bytes } => self.success(format!(
                "Downloaded {} ({attempts} attempt{})",
                format_bytes(bytes),
                if attempts == 1 { "" } else { "s" }
            )),
        }
    }

    /// A progress callback feeding this reporter.
    #[must_use]
    pub fn progress_callback(self: &Arc<Self>) -> ProgressCallback {
        let reporter = Arc::clone(self);
        Arc::new(move |event| reporter.handle_progress(event))
    }

    /// Prints the closing summary of a successful run.
    pub fn summary(&self, result: &InstallResult, path_status: &PathStatus) {
        self.success(format!(
            "Installed {} to {}",
            result.reported_version,
            result.installed_path.display()
        ));

        let dir = result
            .installed_path
            .parent()
            .unwrap_or_else(|| Path::new("."));
        if result.on_path {
            self.success(format!("{} is on PATH", dir.display()));
        } else {
            self.warn(format!("{} is not on PATH", dir.display()));
            self.warn(format!("Add it with: {}", path_remediation(dir)));
        }

        for line in format_shadowing_warning(&result.installed_path, &path_status.shadowed_by) {
            self.warn(line);
        }

        if let Some(name) = result.installed_path.file_stem() {
            self.info(format!(
                "Run '{} --help' to get started",
                name.to_string_lossy()
            ));
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn percent(downloaded: u64, total: u64) -> u8 {
    (u128::from(downloaded.min(total)) * 100 / u128::from(total)) as u8
}
