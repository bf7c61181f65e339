//! Integrity verification for downloaded release archives.
//!
//! Verification has two layers:
//!
//! 1. A structural pass over the gzip stream and every tar entry, reading
//!    payloads into a sink. Nothing is written to disk. Truncated or corrupted
//!    downloads fail here, before any extraction.
//! 2. An optional SHA-256 comparison against a `<artifact>.sha256` file
//!    published next to the archive.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use tar::Archive;

use crate::errors::InstallError;

/// Leading bytes of every gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Result of a successful structural pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Number of tar entries, directories included.
    pub entries: usize,
    /// Total uncompressed payload size.
    pub payload_bytes: u64,
}

/// Checks that `archive_path` is a complete, readable tar.gz.
///
/// # Errors
///
/// Returns `ArchiveCorrupted` when the file is not gzip, the gzip stream is
/// truncated or fails its CRC, a tar header is malformed, or the archive has
/// no entries.
pub fn validate_archive(archive_path: &Path) -> Result<ArchiveSummary, InstallError> {
    let corrupted = |reason: String| InstallError::archive_corrupted(archive_path, reason);

    let mut file = File::open(archive_path)
        .map_err(|e| corrupted(format!("cannot open archive: {e}")))?;

    let mut magic = [0u8; 2];
    if file.read_exact(&mut magic).is_err() || magic != GZIP_MAGIC {
        return Err(corrupted("not a gzip stream".to_string()));
    }
    drop(file);

    let file = File::open(archive_path)
        .map_err(|e| corrupted(format!("cannot open archive: {e}")))?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));

    let mut summary = ArchiveSummary {
        entries: 0,
        payload_bytes: 0,
    };

    let entries = archive
        .entries()
        .map_err(|e| corrupted(format!("unreadable tar stream: {e}")))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| corrupted(format!("bad tar entry: {e}")))?;
        let path = entry
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "<invalid path>".to_string());
        let expected = entry.size();
        let read = io::copy(&mut entry, &mut io::sink())
            .map_err(|e| corrupted(format!("truncated entry {path}: {e}")))?;
        if read != expected {
            return Err(corrupted(format!(
                "truncated entry {path}: {read} of {expected} bytes"
            )));
        }
        summary.payload_bytes += read;
        summary.entries += 1;
    }

    // The tar reader stops at the end-of-archive marker. Draining the rest of
    // the gzip stream makes the decoder check the CRC trailer.
    let mut decoder = archive.into_inner();
    io::copy(&mut decoder, &mut io::sink())
        .map_err(|e| corrupted(format!("gzip stream incomplete: {e}")))?;

    if summary.entries == 0 {
        return Err(corrupted("archive contains no entries".to_string()));
    }

    log::debug!(
        "{} is valid: {} entries, {} payload bytes",
        archive_path.display(),
        summary.entries,
        summary.payload_bytes
    );
    Ok(summary)
}

/// Computes the SHA256 hash of a file as a lowercase hex string.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn compute_sha256(file_path: &Path) -> Result<String> {
    let mut file = File::open(file_path)
        .with_context(|| format!("Failed to open file for checksum: {}", file_path.display()))?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer).with_context(|| {
            format!("Failed to read file for checksum: {}", file_path.display())
        })?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compares a computed digest against the one published for the archive.
///
/// # Errors
///
/// Returns `ArchiveCorrupted` on mismatch.
pub fn verify_checksum(
    archive_path: &Path,
    computed: &str,
    expected: &str,
) -> Result<(), InstallError> {
    if computed.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(InstallError::archive_corrupted(
            archive_path,
            format!("checksum mismatch: expected {expected}, got {computed}"),
        ))
    }
}

/// Extracts the digest from a `.sha256` file body.
///
/// Accepts both a bare digest and the `sha256sum` format (`<digest>  <name>`).
/// Returns `None` when the first token is not 64 hex characters.
#[must_use]
pub fn parse_checksum_file(body: &str) -> Option<String> {
    let token = body.split_whitespace().next()?;
    (token.len() == 64 && token.chars().all(|c| c.is_ascii_hexdigit()))
        .then(|| token.to_ascii_lowercase())
}

/// URL of the checksum file published next to an artifact.
#[must_use]
pub fn checksum_url(artifact_url: &str) -> String {
    format!("{artifact_url}.sha256")
}

/// Outcome of looking for a published checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishedChecksum {
    /// A well-formed digest was published.
    Found(String),
    /// Nothing usable was found; the reason is reported as a warning.
    Unavailable(String),
}

/// Fetches `<artifact>.sha256`. Never retried and never fatal.
pub async fn fetch_published_checksum(
    client: &reqwest::Client,
    artifact_url: &str,
) -> PublishedChecksum {
    let url = checksum_url(artifact_url);
    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(e) => return PublishedChecksum::Unavailable(format!("request failed: {e}")),
    };

    let status = response.status();
    log::debug!("GET {url} -> {status}");
    if !status.is_success() {
        return PublishedChecksum::Unavailable(format!("HTTP {status}"));
    }

    match response.text().await {
        Ok(body) => parse_checksum_file(&body).map_or_else(
            || PublishedChecksum::Unavailable("malformed checksum file".to_string()),
            PublishedChecksum::Found,
        ),
        Err(e) => PublishedChecksum::Unavailable(format!("unreadable body: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::testing::write_tar_gz;

    const HELLO_SHA256: &str = "a948904f2f0f479b8f8197694b30184b0d2ed1c1cd2a1ec0fb85d299a192a447";

    #[test]
    fn accepts_well_formed_archive_without_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("ok.tar.gz");
        write_tar_gz(
            &archive,
            &[
                ("demongrep", b"binary content".as_slice(), 0o755),
                ("README.md", b"docs".as_slice(), 0o644),
            ],
        );

        let summary = validate_archive(&archive).unwrap();
        assert_eq!(summary.entries, 2);
        assert_eq!(summary.payload_bytes, 18);

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("ok.tar.gz")]);
    }

    #[test]
    fn rejects_non_gzip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(&path, "<html>Not Found</html>").unwrap();

        let err = validate_archive(&path).unwrap_err();
        assert!(matches!(err, InstallError::ArchiveCorrupted { .. }));
        assert!(err.to_string().contains("not a gzip stream"));
    }

    #[test]
    fn rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.tar.gz");
        std::fs::write(&path, b"").unwrap();
        assert!(matches!(
            validate_archive(&path),
            Err(InstallError::ArchiveCorrupted { .. })
        ));
    }

    #[test]
    fn rejects_truncated_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("full.tar.gz");
        // Pseudo-random bytes so the compressed size tracks the payload size.
        let mut state: u32 = 0x2545_f491;
        let payload: Vec<u8> = (0..64 * 1024)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state.to_le_bytes()[0]
            })
            .collect();
        write_tar_gz(&archive, &[("demongrep", payload.as_slice(), 0o755)]);

        let bytes = std::fs::read(&archive).unwrap();
        let truncated = dir.path().join("truncated.tar.gz");
        std::fs::write(&truncated, &bytes[..bytes.len() / 2]).unwrap();

        assert!(matches!(
            validate_archive(&truncated),
            Err(InstallError::ArchiveCorrupted { .. })
        ));
    }

    #[test]
    fn rejects_gzip_of_non_tar_data() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("text.tar.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(&[b'z'; 1024]).unwrap();
        encoder.finish().unwrap();

        assert!(matches!(
            validate_archive(&path),
            Err(InstallError::ArchiveCorrupted { .. })
        ));
    }

    #[test]
    fn rejects_archive_with_no_entries() {
        use flate2::Compression;
        use flate2::write::GzEncoder;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.tar.gz");
        let encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        let builder = tar::Builder::new(encoder);
        builder.into_inner().unwrap().finish().unwrap();

        let err = validate_archive(&path).unwrap_err();
        assert!(err.to_string().contains("no entries"));
    }

    #[test]
    fn compute_sha256_produces_correct_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello world\n").unwrap();

        assert_eq!(compute_sha256(&path).unwrap(), HELLO_SHA256);
    }

    #[test]
    fn compute_sha256_fails_for_nonexistent_file() {
        assert!(compute_sha256(Path::new("/nonexistent/file/path")).is_err());
    }

    #[test]
    fn verify_checksum_ignores_case() {
        let upper = HELLO_SHA256.to_ascii_uppercase();
        assert!(verify_checksum(Path::new("a.tar.gz"), HELLO_SHA256, &upper).is_ok());
    }

    #[test]
    fn verify_checksum_mismatch_is_corruption() {
        let err = verify_checksum(Path::new("a.tar.gz"), HELLO_SHA256, &"0".repeat(64))
            .unwrap_err();
        assert!(matches!(err, InstallError::ArchiveCorrupted { .. }));
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn parse_checksum_file_accepts_sha256sum_format() {
        let body = format!("{}  demongrep-1.0.0-x86_64-apple-darwin.tar.gz\n", HELLO_SHA256.to_uppercase());
        assert_eq!(parse_checksum_file(&body).as_deref(), Some(HELLO_SHA256));
        assert_eq!(parse_checksum_file(HELLO_SHA256).as_deref(), Some(HELLO_SHA256));
    }

    #[test]
    fn parse_checksum_file_rejects_garbage() {
        assert_eq!(parse_checksum_file(""), None);
        assert_eq!(parse_checksum_file("<html>404</html>"), None);
        assert_eq!(parse_checksum_file("abc123"), None);
    }

    #[test]
    fn checksum_url_appends_suffix() {
        assert_eq!(
            checksum_url("https://x/v1/demongrep.tar.gz"),
            "https://x/v1/demongrep.tar.gz.sha256"
        );
    }
}
