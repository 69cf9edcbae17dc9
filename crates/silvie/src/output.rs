//! Staged output files.
//!
//! Artifacts are written next to their destination under a `.part` name and
//! only renamed into place once the whole conversion has succeeded. A staged
//! file that is dropped without being committed is removed.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Suffix appended to the destination name while a file is being written.
pub const STAGING_SUFFIX: &str = ".part";

#[derive(Debug)]
pub struct StagedFile {
    target: PathBuf,
    staging: PathBuf,
    committed: bool,
}

impl StagedFile {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        let target = target.into();
        let staging = with_suffix(&target, STAGING_SUFFIX);
        Self {
            target,
            staging,
            committed: false,
        }
    }

    /// Final destination.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Where writers should put the data until commit.
    #[must_use]
    pub fn staging_path(&self) -> &Path {
        &self.staging
    }

    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        fs::write(&self.staging, bytes).map_err(|e| Error::io(&self.staging, e))
    }

    /// Move the staged data to its destination.
    pub fn commit(mut self) -> Result<PathBuf> {
        fs::rename(&self.staging, &self.target).map_err(|e| Error::io(&self.target, e))?;
        self.committed = true;
        tracing::debug!(path = %self.target.display(), "committed output");
        Ok(std::mem::take(&mut self.target))
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed && self.staging.exists() {
            if let Err(e) = fs::remove_file(&self.staging) {
                tracing::warn!(path = %self.staging.display(), "failed to remove staged file: {e}");
            }
        }
    }
}

/// `path` with `suffix` appended to its final component, keeping any dots
/// already in it.
#[must_use]
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
