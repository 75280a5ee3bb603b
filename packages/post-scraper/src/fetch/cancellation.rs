//! Cooperative cancellation.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{FetchError, FetchResult};

/// Polls a job-scoped marker file created by whoever wants the job stopped.
#[derive(Debug, Clone)]
pub struct CancellationWatcher {
    marker: Option<PathBuf>,
}

impl CancellationWatcher {
    pub fn new(marker: impl Into<PathBuf>) -> Self {
        Self {
            marker: Some(marker.into()),
        }
    }

    /// A watcher that never reports cancellation.
    pub fn disabled() -> Self {
        Self { marker: None }
    }

    pub fn marker(&self) -> Option<&Path> {
        self.marker.as_deref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.marker.as_deref().is_some_and(Path::exists)
    }

    /// `Err(FetchError::Cancelled)` once the marker exists.
    pub fn check(&self) -> FetchResult<()> {
        if self.is_cancelled() {
            info!(marker = ?self.marker, "Cancellation requested");
            return Err(FetchError::Cancelled);
        }
        Ok(())
    }
}

/// Create the cancellation marker for a job.
pub fn request_cancellation(marker: &Path) -> std::io::Result<()> {
    std::fs::write(marker, b"cancel\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_presence() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("job.cancel");
        let watcher = CancellationWatcher::new(&marker);

        assert!(watcher.check().is_ok());
        request_cancellation(&marker).unwrap();
        assert!(matches!(watcher.check(), Err(FetchError::Cancelled)));
    }

    #[test]
    fn test_disabled_never_cancels() {
        assert!(CancellationWatcher::disabled().check().is_ok());
    }
}
