//! Durable per-job files.
//!
//! - `Checkpointer` - versioned JobState snapshots
//! - `StatusSink` - status, error and admin-error text files
//! - `ResumableMarker` - presence file gating manual resumes
//! - `JsonOutputWriter` - default output writer

pub mod checkpoint;
pub mod json_output;
pub mod markers;
pub mod status;

pub use checkpoint::{Checkpointer, CHECKPOINT_FORMAT, CHECKPOINT_VERSION};
pub use json_output::{JsonOutputWriter, OutputDocument};
pub use markers::ResumableMarker;
pub use status::{format_elapsed, StatusSink, Terminal};
