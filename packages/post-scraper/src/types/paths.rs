//! Per-job file layout.

use std::path::{Path, PathBuf};

use crate::error::{SettingsError, SettingsResult};

/// How a job is identified on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobTarget {
    /// Job submitted through the data directory, named by token
    Token(String),

    /// Job driven by an explicit settings file and output directory
    Files {
        settings: PathBuf,
        output_dir: PathBuf,
    },
}

/// Every path a job reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub job_id: String,
    pub settings: PathBuf,
    pub output: PathBuf,
    pub status: PathBuf,
    pub errors: PathBuf,
    pub admin_errors: PathBuf,
    pub checkpoint: PathBuf,
    pub cookies: PathBuf,
    pub cancel_marker: PathBuf,
    pub resumable_marker: PathBuf,
    pub assets_dir: PathBuf,
}

fn valid_token(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= 64
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

impl JobPaths {
    /// Derive the layout for a job target.
    pub fn resolve(target: &JobTarget, data_dir: &Path) -> SettingsResult<Self> {
        match target {
            JobTarget::Token(token) => {
                if !valid_token(token) {
                    return Err(SettingsError::invalid(
                        "token",
                        "tokens may only contain letters, digits, '-' and '_'",
                    ));
                }
                Ok(Self::layout(token, data_dir, data_dir, data_dir.join(format!("{}.settings.txt", token))))
            }
            JobTarget::Files {
                settings,
                output_dir,
            } => {
                let file_name = settings
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| SettingsError::invalid("settings", "not a file path"))?;
                let stem = file_name
                    .strip_suffix(".settings.txt")
                    .or_else(|| file_name.strip_suffix(".txt"))
                    .unwrap_or(file_name);
                let beside = settings
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default();
                Ok(Self::layout(stem, &beside, output_dir, settings.clone()))
            }
        }
    }

    fn layout(id: &str, state_dir: &Path, output_dir: &Path, settings: PathBuf) -> Self {
        let state = |suffix: &str| state_dir.join(format!("{}.{}", id, suffix));
        let out = |suffix: &str| output_dir.join(format!("{}.{}", id, suffix));
        Self {
            job_id: id.to_string(),
            settings,
            output: out("output.json"),
            status: out("status.txt"),
            errors: out("errs.txt"),
            admin_errors: out("errs.admin.txt"),
            checkpoint: state("checkpoint.json"),
            cookies: state("cookies.json"),
            cancel_marker: state("cancel"),
            resumable_marker: state("resumable"),
            assets_dir: out("files"),
        }
    }

    /// Directory name of the asset directory, as referenced from output.
    pub fn assets_dir_name(&self) -> String {
        self.assets_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.files", self.job_id))
    }
}
