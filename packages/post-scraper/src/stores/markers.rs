//! Resumability marker.
//!
//! Present only while a job has failed resumably and nobody has resumed it
//! yet. Claiming the marker is the precondition for a manual resume.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

#[derive(Debug, Clone)]
pub struct ResumableMarker {
    path: PathBuf,
}

impl ResumableMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_set(&self) -> bool {
        self.path.exists()
    }

    pub fn set(&self) -> io::Result<()> {
        fs::write(&self.path, b"")?;
        debug!(path = %self.path.display(), "Resumable marker set");
        Ok(())
    }

    /// Remove the marker. Returns `false` when it was already gone, so only
    /// one of two racing resumes can claim it.
    pub fn claim(&self) -> io::Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
