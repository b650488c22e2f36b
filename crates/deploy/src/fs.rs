//! File system utils.

use std::{
    fs::{File, OpenOptions},
    path::Path,
};

use anyhow::Context;
use fs2::FileExt;

pub struct FsHandler;

impl FsHandler {
    // Create a directory (and its parents) if it doesn't exist.
    pub fn create_directory(path: &Path) -> anyhow::Result<()> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory {}", path.display()))?;
        tracing::trace!("Ensured directory exists: {}", path.display());
        Ok(())
    }

    /// Take an exclusive advisory lock on `path`, creating it if needed.
    ///
    /// The lock is released when the returned file is dropped.
    pub fn lock_exclusive(path: &Path) -> anyhow::Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;

        FileExt::lock_exclusive(&file)
            .with_context(|| format!("Failed to lock {}", path.display()))?;

        Ok(file)
    }

    /// Write `contents` to a sibling temporary file, then rename it over `path`.
    pub fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
        let file_name = path
            .file_name()
            .context("File path must have a file name")?
            .to_string_lossy();
        let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

        std::fs::write(&tmp_path, contents)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path).with_context(|| {
            format!("Failed to move {} to {}", tmp_path.display(), path.display())
        })?;

        Ok(())
    }
}
