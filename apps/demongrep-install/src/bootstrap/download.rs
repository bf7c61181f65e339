//! Artifact download with bounded retry.
//!
//! Each attempt streams the response body into `<destination>.part` and the
//! file is renamed to its final name only once the transfer completed. A
//! failed attempt removes its partial file, waits the policy's fixed delay
//! and starts over from byte zero.
//!
//! This is the only stage that retries. Everything else in the pipeline
//! fails on the first error.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::config::{RetryPolicy, user_agent};
use crate::errors::InstallError;

/// Progress event emitted during a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A new attempt is about to connect.
    AttemptStarted {
        /// 1-based attempt number.
        attempt: u32,
        max_attempts: u32,
    },
    /// The server answered and the body is being received.
    Started {
        /// Body size from `Content-Length`, when the server sent one.
        total: Option<u64>,
    },
    /// Bytes received so far in the current attempt.
    Progress {
        downloaded: u64,
        total: Option<u64>,
        /// Average speed of the current attempt in bytes per second.
        speed: u64,
    },
    /// The current attempt failed.
    AttemptFailed {
        attempt: u32,
        max_attempts: u32,
        error: String,
        /// Whether another attempt follows after the retry delay.
        will_retry: bool,
    },
    /// The artifact is complete at its destination.
    Completed {
        /// Attempts it took, including the successful one.
        attempts: u32,
        bytes: u64,
    },
}

/// Callback type for receiving progress updates during downloads.
///
/// Wrapped in `Arc` so it can be shared with the reporter across await points.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Minimum interval between `Progress` events.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// One artifact transfer.
///
/// Only `attempts_made` changes once the job is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub url: String,
    pub destination: PathBuf,
    pub attempts_made: u32,
    pub max_attempts: u32,
}

impl DownloadJob {
    #[must_use]
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            attempts_made: 0,
            max_attempts: retry.max_attempts.max(1),
        }
    }

    /// Whether the attempt budget is used up.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }

    /// Path the in-flight attempt writes to.
    #[must_use]
    pub fn partial_path(&self) -> PathBuf {
        partial_path(&self.destination)
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

/// Builds the HTTP client used for downloads and metadata queries.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent())
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// Downloads `job.url` to `job.destination`, retrying failed attempts.
///
/// On success the destination holds the complete body and
/// `job.attempts_made` counts the attempts it took.
///
/// # Errors
///
/// Returns `DownloadExhausted` with the URL, the number of attempts and the
/// last failure once every attempt failed. No partial file is left behind.
pub async fn download(
    client: &reqwest::Client,
    job: &mut DownloadJob,
    delay: Duration,
    on_progress: &ProgressCallback,
) -> Result<(), InstallError> {
    let partial = job.partial_path();
    let mut last_error = String::new();

    while !job.is_exhausted() {
        if job.attempts_made > 0 {
            log::debug!("waiting {delay:?} before retrying {}", job.url);
            tokio::time::sleep(delay).await;
        }
        job.attempts_made += 1;

        on_progress(ProgressEvent::AttemptStarted {
            attempt: job.attempts_made,
            max_attempts: job.max_attempts,
        });

        let outcome = match fetch_once(client, &job.url, &partial, on_progress).await {
            Ok(bytes) => tokio::fs::rename(&partial, &job.destination)
                .await
                .with_context(|| {
                    format!(
                        "Failed to rename {} to {}",
                        partial.display(),
                        job.destination.display()
                    )
                })
                .map(|()| bytes),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(bytes) => {
                log::debug!(
                    "downloaded {bytes} bytes from {} in {} attempt(s)",
                    job.url,
                    job.attempts_made
                );
                on_progress(ProgressEvent::Completed {
                    attempts: job.attempts_made,
                    bytes,
                });
                return Ok(());
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                last_error = format!("{e:#}");
                log::debug!("attempt {} failed: {last_error}", job.attempts_made);
                on_progress(ProgressEvent::AttemptFailed {
                    attempt: job.attempts_made,
                    max_attempts: job.max_attempts,
                    error: last_error.clone(),
                    will_retry: !job.is_exhausted(),
                });
            }
        }
    }

    Err(InstallError::DownloadExhausted {
        url: job.url.clone(),
        attempts: job.attempts_made,
        last_error,
    })
}

/// Performs a single attempt, returning the number of bytes written.
async fn fetch_once(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    on_progress: &ProgressCallback,
) -> Result<u64> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to connect to {url}"))?;

    let status = response.status();
    log::debug!("GET {url} -> {status}");
    if !status.is_success() {
        bail!("HTTP error {status}");
    }

    let total = response.content_length();
    on_progress(ProgressEvent::Started { total });

    let mut file = tokio::fs::File::create(dest)
        .await
        .with_context(|| format!("Failed to create file: {}", dest.display()))?;

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    let start = Instant::now();
    let mut last_update = start;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Connection interrupted while receiving body")?;
        file.write_all(&chunk)
            .await
            .with_context(|| format!("Failed to write to {}", dest.display()))?;
        downloaded += chunk.len() as u64;

        let now = Instant::now();
        if now.duration_since(last_update) >= PROGRESS_INTERVAL {
            on_progress(ProgressEvent::Progress {
                downloaded,
                total,
                speed: average_speed(downloaded, start.elapsed()),
            });
            last_update = now;
        }
    }

    file.flush()
        .await
        .with_context(|| format!("Failed to flush {}", dest.display()))?;

    if let Some(expected) = total
        && downloaded != expected
    {
        bail!("Incomplete transfer: received {downloaded} of {expected} bytes");
    }

    on_progress(ProgressEvent::Progress {
        downloaded,
        total,
        speed: average_speed(downloaded, start.elapsed()),
    });

    Ok(downloaded)
}

#[allow(clippy::cast_precision_loss)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
fn average_speed(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        0
    }
}

/// Formats bytes into a human-readable string (KB, MB, GB).
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    #[allow(clippy::cast_precision_loss)]
    let bytes_f = bytes as f64;

    if bytes_f >= GB {
        format!("{:.2} GB", bytes_f / GB)
    } else if bytes_f >= MB {
        format!("{:.2} MB", bytes_f / MB)
    } else if bytes_f >= KB {
        format!("{:.2} KB", bytes_f / KB)
    } else {
        format!("{bytes} B")
    }
}

/// Formats speed (bytes/sec) into a human-readable string.
#[must_use]
pub fn format_speed(speed: u64) -> String {
    format!("{}/s", format_bytes(speed))
}
