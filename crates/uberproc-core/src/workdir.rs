//! The hidden working directory holding generated parameter files, batch
//! file lists and debug logs. Files are named by creation time and purged
//! once they are older than the configured maximum age.

use crate::error::Result;
use chrono::Local;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;

#[derive(Debug, Clone)]
pub struct WorkDir {
    path: PathBuf,
}

impl WorkDir {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A fresh `<prefix>_<timestamp>.<ext>` path that does not exist yet.
    pub fn timestamped_path(&self, prefix: &str, ext: &str) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d%H%M%S%6f");
        let first = self.path.join(format!("{prefix}_{stamp}.{ext}"));
        if !first.exists() {
            return first;
        }
        (1..)
            .map(|n| self.path.join(format!("{prefix}_{stamp}_{n}.{ext}")))
            .find(|p| !p.exists())
            .unwrap_or(first)
    }

    /// Write a parameter file or file list under a fresh timestamped name.
    /// The contents are staged in a sibling tempfile and renamed into place,
    /// so a program started on the path never reads a partial file.
    pub fn write_timestamped(&self, prefix: &str, ext: &str, contents: &str) -> Result<PathBuf> {
        let path = self.timestamped_path(prefix, ext);
        let mut staged = NamedTempFile::new_in(&self.path)?;
        staged.write_all(contents.as_bytes())?;
        staged.persist(&path).map_err(|e| e.error)?;
        Ok(path)
    }

    /// Delete regular files last modified more than `max_age` ago.
    pub fn purge_older_than(&self, max_age: Duration) -> Result<Vec<PathBuf>> {
        let now = SystemTime::now();
        let mut purged = Vec::new();
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let age = now
                .duration_since(meta.modified()?)
                .unwrap_or(Duration::ZERO);
            if age > max_age && remove_if_present(&entry.path())? {
                purged.push(entry.path());
            }
        }
        Ok(purged)
    }
}

/// Delete a product or working file. `false` when it was already gone.
pub fn remove_if_present(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
