//! Pretty-printed JSON output.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::info;

use crate::error::{OutputError, OutputResult};
use crate::traits::output::OutputWriter;
use crate::types::state::{Counters, JobState};
use crate::types::thread::{ForumProgress, Thread};

/// The document written at the end of a job.
#[derive(Debug, Serialize)]
pub struct OutputDocument<'a> {
    pub job_id: &'a str,
    pub settings: String,
    pub board_title: Option<&'a str>,
    pub user: Option<&'a str>,
    pub threads: &'a IndexMap<String, Thread>,
    pub forums: &'a IndexMap<String, ForumProgress>,
    pub not_found: Vec<&'a str>,
    pub counters: &'a Counters,
}

impl<'a> OutputDocument<'a> {
    pub fn from_state(state: &'a JobState) -> Self {
        Self {
            job_id: &state.job_id,
            settings: state.settings.redacted_summary(),
            board_title: state.settings.board_title.as_deref(),
            user: state.settings.extract_user.as_deref(),
            threads: &state.threads,
            forums: &state.forums,
            not_found: state.not_found.iter().map(String::as_str).collect(),
            counters: &state.counters,
        }
    }
}

/// Writes [`OutputDocument`] as pretty JSON.
#[derive(Debug, Default, Clone)]
pub struct JsonOutputWriter;

impl JsonOutputWriter {
    pub fn new() -> Self {
        Self
    }
}

impl OutputWriter for JsonOutputWriter {
    fn write(&self, state: &JobState, path: &Path) -> OutputResult<()> {
        let json = serde_json::to_string_pretty(&OutputDocument::from_state(state))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| OutputError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, json).map_err(|source| OutputError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), threads = state.threads.len(), "Output written");
        Ok(())
    }
}
