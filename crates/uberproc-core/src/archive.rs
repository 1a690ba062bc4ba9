//! Tar archival of the files a run keeps.
//!
//! The archive is written to a temporary file next to the destination and
//! renamed into place once complete. Paths ending in `.tar.gz` or `.tgz` are
//! gzip-compressed. Entries are stored by file name only.

use crate::error::{Result, UberError};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub fn is_gzip(path: &Path) -> bool {
    let name = path.to_string_lossy().to_lowercase();
    name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

/// Archive `files` into `dest`. Returns the number of entries written.
pub fn write_archive(dest: &Path, files: &[PathBuf]) -> Result<usize> {
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let tmp = NamedTempFile::new_in(dir)?;

    let count = if is_gzip(dest) {
        let gz = GzEncoder::new(tmp.as_file(), Compression::default());
        let mut tar = tar::Builder::new(gz);
        let count = append_all(&mut tar, files)?;
        tar.into_inner()?.finish()?.flush()?;
        count
    } else {
        let mut tar = tar::Builder::new(tmp.as_file());
        let count = append_all(&mut tar, files)?;
        tar.into_inner()?.flush()?;
        count
    };

    tmp.persist(dest).map_err(|e| e.error)?;
    tracing::info!(archive = %dest.display(), files = count, "archived kept files");
    Ok(count)
}

fn append_all<W: Write>(tar: &mut tar::Builder<W>, files: &[PathBuf]) -> Result<usize> {
    let mut count = 0;
    for file in files {
        if !file.is_file() {
            tracing::warn!(file = %file.display(), "not archiving missing file");
            continue;
        }
        let name = file
            .file_name()
            .ok_or_else(|| UberError::MissingInput(file.clone()))?;
        tar.append_path_with_name(file, name)?;
        count += 1;
    }
    Ok(count)
}
