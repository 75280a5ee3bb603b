//! Versioned checkpoint files.
//!
//! A checkpoint is a JSON envelope around [`JobState`]:
//!
//! ```json
//! { "format": "post-scraper-checkpoint", "version": 1, "saved_at": "...", "state": { ... } }
//! ```
//!
//! Network handles are not part of `JobState`, so nothing transient can be
//! written. The cookie jar is persisted separately by the fetch client.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CheckpointError, CheckpointResult};
use crate::types::state::JobState;

pub const CHECKPOINT_FORMAT: &str = "post-scraper-checkpoint";
pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    format: &'a str,
    version: u32,
    saved_at: DateTime<Utc>,
    state: &'a JobState,
}

#[derive(Deserialize)]
struct Header {
    format: String,
    version: u32,
}

#[derive(Deserialize)]
struct Envelope {
    state: JobState,
}

/// Saves and restores the checkpoint of one job.
#[derive(Debug, Clone)]
pub struct Checkpointer {
    path: PathBuf,
}

impl Checkpointer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Persist a snapshot, replacing any previous one atomically.
    pub fn save(&self, state: &JobState) -> CheckpointResult<&Path> {
        let envelope = EnvelopeRef {
            format: CHECKPOINT_FORMAT,
            version: CHECKPOINT_VERSION,
            saved_at: Utc::now(),
            state,
        };
        let json = serde_json::to_vec(&envelope)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = fs::File::create(&tmp).map_err(|e| self.io_error(&tmp, e))?;
        file.write_all(&json).map_err(|e| self.io_error(&tmp, e))?;
        file.sync_all().map_err(|e| self.io_error(&tmp, e))?;
        drop(file);
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(&self.path, e))?;

        debug!(
            path = %self.path.display(),
            stage = %state.stage,
            bytes = json.len(),
            "Checkpoint saved"
        );
        Ok(&self.path)
    }

    /// Restore a snapshot.
    ///
    /// `started_at` is reset to now so the chain budget is measured from
    /// this process's start.
    pub fn load(&self) -> CheckpointResult<JobState> {
        if !self.exists() {
            return Err(CheckpointError::Missing {
                path: self.path.clone(),
            });
        }
        let bytes = fs::read(&self.path).map_err(|e| self.io_error(&self.path, e))?;

        let header: Header = serde_json::from_slice(&bytes)?;
        if header.format != CHECKPOINT_FORMAT || header.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::VersionMismatch {
                format: header.format,
                version: header.version,
            });
        }

        let Envelope { mut state } = serde_json::from_slice(&bytes)?;
        state.started_at = Utc::now();
        info!(
            path = %self.path.display(),
            job_id = %state.job_id,
            stage = %state.stage,
            "Checkpoint loaded"
        );
        Ok(state)
    }

    /// Delete the checkpoint, if any.
    pub fn remove(&self) -> CheckpointResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(&self.path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::UrlValidator;
    use crate::types::settings::Settings;
    use crate::types::state::{SearchCursor, Stage};
    use crate::types::thread::{Post, Thread};
    use chrono::TimeZone;

    fn state() -> JobState {
        let settings = Settings::parse(
            "base_url=https://forum.example.com\nforum_type=phpbb\nextract_user_id=2\nlogin_user=bob\nlogin_password=hunter2",
            &UrlValidator::new(),
        )
        .unwrap();
        let mut state = JobState::new("job", settings, "/data/job.cookies.json", 240);
        state.stage = Stage::PostsRetrieval;
        state.add_post(
            Thread::new("10", "Hello", "General", "1"),
            Post::new("100", "Re: Hello", "Mon Sep 28, 2015 6:05 pm")
                .with_timestamp(Utc.with_ymd_and_hms(2015, 9, 28, 18, 5, 0).single())
                .with_content("<img src=\"a.png\">"),
        );
        state.threads["10"].posts["100"].attachments = vec!["https://forum.example.com/a.png".into()];
        state.not_found.insert("7".into());
        state.counters.search_page_num = 3;
        state.search_cursor = Some(SearchCursor {
            search_id: Some("55".into()),
            position: 50,
        });
        state.downloads.files.insert("https://forum.example.com/a.png".into(), "abc.png".into());
        state
    }

    #[test]
    fn test_round_trip_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let checkpointer = Checkpointer::new(dir.path().join("job.checkpoint.json"));
        let original = state();
        checkpointer.save(&original).unwrap();

        let loaded = checkpointer.load().unwrap();
        assert_eq!(loaded.stage, Stage::PostsRetrieval);
        assert_eq!(loaded.threads, original.threads);
        assert_eq!(loaded.counters, original.counters);
        assert_eq!(loaded.search_cursor, original.search_cursor);
        assert_eq!(loaded.not_found, original.not_found);
        assert_eq!(loaded.downloads, original.downloads);
        assert_eq!(loaded.cookie_store_ref, original.cookie_store_ref);
        assert_eq!(loaded.created_at, original.created_at);
        assert_eq!(
            loaded
                .settings
                .credentials
                .as_ref()
                .map(|c| c.password.expose().to_string()),
            Some("hunter2".to_string())
        );
    }

    #[test]
    fn test_load_resets_started_at() {
        let dir = tempfile::tempdir().unwrap();
        let checkpointer = Checkpointer::new(dir.path().join("c.json"));
        let mut original = state();
        original.started_at = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
        checkpointer.save(&original).unwrap();

        let loaded = checkpointer.load().unwrap();
        assert!(loaded.started_at > original.started_at);
        assert_eq!(loaded.created_at, original.created_at);
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let checkpointer = Checkpointer::new(dir.path().join("c.json"));
        checkpointer.save(&state()).unwrap();
        checkpointer.save(&state()).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["c.json".to_string()]);
    }

    #[test]
    fn test_version_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        fs::write(&path, r#"{"format":"post-scraper-checkpoint","version":99,"state":{}}"#).unwrap();
        let err = Checkpointer::new(&path).load().unwrap_err();
        assert!(matches!(err, CheckpointError::VersionMismatch { version: 99, .. }));
    }

    #[test]
    fn test_missing_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let checkpointer = Checkpointer::new(dir.path().join("c.json"));
        assert!(matches!(checkpointer.load(), Err(CheckpointError::Missing { .. })));
        assert!(checkpointer.remove().is_ok());

        checkpointer.save(&state()).unwrap();
        assert!(checkpointer.exists());
        checkpointer.remove().unwrap();
        assert!(!checkpointer.exists());
    }
}
