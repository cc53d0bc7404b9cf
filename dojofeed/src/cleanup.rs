//! Scratch file cleanup for exported reports
use log::warn;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Owns one exported CSV on disk and removes it when dropped.
///
/// Every exported report is wrapped in one of these the moment its file is
/// written, so early aborts and per-report skips release the scratch file
/// through the same path as successful imports.
#[derive(Debug)]
pub struct CsvArtifact {
    path: PathBuf,
}

impl CsvArtifact {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CsvArtifact {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            // Already gone is fine
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete {}: {}", self.path.display(), e),
        }
    }
}
