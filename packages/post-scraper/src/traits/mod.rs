//! Collaborator traits for the job engine.
//!
//! These traits are the seams where a job hands work to the outside world:
//! - `OutputWriter` - receives the finished JobState
//! - `Notifier` - receives fatal and non-fatal escalations
//! - `ProcessLauncher` - starts continuation processes

pub mod launcher;
pub mod notifier;
pub mod output;

pub use launcher::ProcessLauncher;
pub use notifier::{Escalation, LogNotifier, Notifier, Severity};
pub use output::OutputWriter;
