//! Human-readable status and error files polled by whoever submitted the job.
//!
//! Writes here never fail the job: an unwritable status file is logged and
//! otherwise ignored.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::types::paths::JobPaths;

/// Marks lines of the error file that ended a process.
const FATAL_PREFIX: &str = "[fatal] ";

/// Final status line of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Done,
    Cancelled,
    Failed,
    FailedResumable,
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Terminal::Done => "DONE",
            Terminal::Cancelled => "CANCELLED",
            Terminal::Failed => "FAILED",
            Terminal::FailedResumable => "FAILED (resumable)",
        })
    }
}

/// Render seconds as `1h2m3s`, omitting leading zero units.
pub fn format_elapsed(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if mins > 0 {
        out.push_str(&format!("{}m", mins));
    }
    out.push_str(&format!("{}s", secs));
    out
}

/// Append-only status, error and admin-error files for one job.
#[derive(Debug, Clone)]
pub struct StatusSink {
    status: PathBuf,
    errors: PathBuf,
    admin_errors: PathBuf,
    job_start: DateTime<Utc>,

    /// Suppress progress lines (terminal lines are always written)
    quiet: bool,
}

impl StatusSink {
    pub fn new(paths: &JobPaths, job_start: DateTime<Utc>) -> Self {
        Self {
            status: paths.status.clone(),
            errors: paths.errors.clone(),
            admin_errors: paths.admin_errors.clone(),
            job_start,
            quiet: false,
        }
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    fn append(path: &Path, line: &str) {
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{}", line));
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to write status file");
        }
    }

    fn stamped(&self, message: &str) -> String {
        let elapsed = (Utc::now() - self.job_start).num_seconds();
        format!("{} {}", format_elapsed(elapsed), message)
    }

    /// Record progress.
    pub fn progress(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!(status = message, "Progress");
        if !self.quiet {
            Self::append(&self.status, &self.stamped(message));
        }
    }

    /// Record a non-fatal error; the job carries on.
    pub fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        warn!(error = message, "Non-fatal error");
        Self::append(&self.errors, message);
    }

    /// Record the error that ended this process.
    ///
    /// The line stays visible in the error file but is left out of
    /// [`Self::read_errors`], so a resumed job does not report it again.
    pub fn fatal(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        error!(error = message, "Fatal error");
        let line = format!("{}{}", FATAL_PREFIX, message.replace('\n', " "));
        Self::append(&self.errors, &line);
    }

    /// Record a full escalation report for the administrator.
    pub fn admin(&self, report: &str) {
        Self::append(&self.admin_errors, report);
    }

    /// Write the final status line for this process.
    pub fn terminal(&self, outcome: Terminal) {
        info!(outcome = %outcome, "Job process ending");
        Self::append(&self.status, &self.stamped(&outcome.to_string()));
    }

    /// Accumulated non-fatal errors, empty when there were none.
    pub fn read_errors(&self) -> String {
        fs::read_to_string(&self.errors)
            .unwrap_or_default()
            .lines()
            .filter(|line| !line.starts_with(FATAL_PREFIX))
            .map(|line| format!("{}\n", line))
            .collect()
    }
}
