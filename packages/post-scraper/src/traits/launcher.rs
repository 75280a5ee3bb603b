//! Continuation process launching.

use std::path::Path;

use crate::error::ChainError;

/// Starts a continuation process and returns without waiting for it.
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, program: &Path, args: &[String]) -> Result<(), ChainError>;
}
