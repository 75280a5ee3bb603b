//! Output handoff.

use std::path::Path;

use crate::error::OutputResult;
use crate::types::state::JobState;

/// Writes the finished job to its output location.
///
/// Called once per job, after every collecting stage has completed.
pub trait OutputWriter: Send + Sync {
    fn write(&self, state: &JobState, path: &Path) -> OutputResult<()>;
}
