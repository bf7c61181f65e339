//! Archive fixtures shared by the unit tests.

use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::Builder;

/// Writes a tar.gz at `archive_path` containing regular files.
///
/// Each entry is `(path inside the archive, contents, mode)`.
pub fn write_tar_gz(archive_path: &Path, entries: &[(&str, &[u8], u32)]) {
    let file = std::fs::File::create(archive_path).expect("Should create file");
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    for (path, contents, mode) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(*mode);
        header.set_cksum();
        builder
            .append_data(&mut header, path, *contents)
            .expect("Should append file");
    }

    builder
        .into_inner()
        .expect("Should finish tar")
        .finish()
        .expect("Should finish gzip");
}

/// Writes a tar.gz whose single entry has a raw, unvalidated name.
///
/// `tar::Builder::append_data` refuses `..` and absolute names, so the name
/// is written straight into the header bytes.
pub fn write_tar_gz_with_raw_name(archive_path: &Path, name: &str, contents: &[u8]) {
    let file = std::fs::File::create(archive_path).expect("Should create file");
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    let mut header = tar::Header::new_gnu();
    {
        let gnu = header.as_gnu_mut().expect("GNU header");
        gnu.name[..name.len()].copy_from_slice(name.as_bytes());
    }
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, contents).expect("Should append entry");

    builder
        .into_inner()
        .expect("Should finish tar")
        .finish()
        .expect("Should finish gzip");
}

/// Writes a tar.gz holding a symlink `link -> target` followed by a regular
/// file at `file_path`.
///
/// The link target is stored as given, absolute or not.
pub fn write_tar_gz_with_symlink(
    archive_path: &Path,
    link: &str,
    target: &Path,
    file_path: &str,
    contents: &[u8],
) {
    let file = std::fs::File::create(archive_path).expect("Should create file");
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Symlink);
    header.set_size(0);
    header.set_mode(0o777);
    builder
        .append_link(&mut header, link, target)
        .expect("Should append symlink");

    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, file_path, contents)
        .expect("Should append file");

    builder
        .into_inner()
        .expect("Should finish tar")
        .finish()
        .expect("Should finish gzip");
}
