//! Job settings.
//!
//! Settings arrive as a `key=value` text file written by whatever submitted
//! the job. They are parsed and validated once, before any stage runs; a
//! validation failure is fatal.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{SettingsError, SettingsResult};
use crate::security::{LoginCredentials, UrlValidator};
use crate::types::timestamp::{parse_forum_timestamp, parse_utc_offset};

/// Default courteous delay between requests.
pub const DEFAULT_DELAY_SECONDS: u64 = 5;

/// Courteous delay floor.
pub const MIN_DELAY_SECONDS: u64 = 1;

/// Forum software the job targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForumKind {
    PhpBb,
    XenForo,
}

impl FromStr for ForumKind {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "phpbb" => Ok(ForumKind::PhpBb),
            "xenforo" => Ok(ForumKind::XenForo),
            other => Err(SettingsError::invalid(
                "forum_type",
                format!("unknown forum type '{}'", other),
            )),
        }
    }
}

impl fmt::Display for ForumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForumKind::PhpBb => f.write_str("phpbb"),
            ForumKind::XenForo => f.write_str("xenforo"),
        }
    }
}

/// Validated job settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Forum root, without a trailing slash
    pub base_url: String,

    /// Forum software
    pub forum_type: ForumKind,

    /// User whose posts are scraped (user mode)
    pub extract_user_id: Option<String>,

    /// Username; resolved in stage 0 when absent
    pub extract_user: Option<String>,

    /// Optional forum login
    pub credentials: Option<LoginCredentials>,

    /// Raw `start_from_date` as supplied
    pub start_from_date: Option<String>,

    /// Derived cutoff: posts before this instant are dropped
    pub earliest: Option<DateTime<Utc>>,

    /// Fixed UTC offset that forum timestamps are printed in
    pub utc_offset_seconds: i32,

    /// Forum prints numeric dates day-first
    pub non_us_date_format: bool,

    /// Courteous delay between requests
    pub delay_seconds: u64,

    /// Verbose status output
    pub debug: bool,

    /// Fetch referenced images and attachments (stage 6)
    pub download_files: bool,

    /// Sub-forums scraped whole (forum mode)
    pub forum_ids: Vec<String>,

    /// Board title; discovered on fetched pages when absent
    pub board_title: Option<String>,
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Numeric suffix of an id such as `member-name.123`.
pub fn trailing_digits(value: &str) -> &str {
    let digits = value.chars().rev().take_while(char::is_ascii_digit).count();
    &value[value.len() - digits..]
}

fn is_integer(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

impl Settings {
    /// Read and validate a settings file.
    pub fn from_file(path: &Path, validator: &UrlValidator) -> SettingsResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, validator)
    }

    /// Parse and validate settings text.
    pub fn parse(text: &str, validator: &UrlValidator) -> SettingsResult<Self> {
        let mut base_url = None;
        let mut forum_type = None;
        let mut extract_user_id = None;
        let mut extract_user = None;
        let mut login_user = None;
        let mut login_password = None;
        let mut start_from_date = None;
        let mut timezone = None;
        let mut non_us_date_format = false;
        let mut delay = None;
        let mut debug = false;
        let mut download_files = false;
        let mut forum_ids = Vec::new();
        let mut board_title = None;

        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or(SettingsError::Syntax { line: index + 1 })?;
            let key = key.trim();
            match key {
                "base_url" => base_url = non_empty(value),
                "forum_type" => forum_type = non_empty(value),
                "extract_user_id" => extract_user_id = non_empty(value),
                "extract_user" => extract_user = non_empty(value),
                "login_user" => login_user = non_empty(value),
                // Kept verbatim
                "login_password" => {
                    login_password = (!value.is_empty()).then(|| value.to_string())
                }
                "start_from_date" => start_from_date = non_empty(value),
                "timezone" => timezone = non_empty(value),
                "non_us_date_format" => non_us_date_format = parse_bool(value),
                "delay" => delay = non_empty(value),
                "debug" => debug = parse_bool(value),
                "download_files" => download_files = parse_bool(value),
                "forum_ids" => {
                    forum_ids = value
                        .split(',')
                        .filter_map(non_empty)
                        .collect::<Vec<_>>()
                }
                "board_title" => board_title = non_empty(value),
                other => warn!(key = %other, "Ignoring unknown setting"),
            }
        }

        let base_url = base_url
            .ok_or(SettingsError::Missing("base_url"))?
            .trim_end_matches('/')
            .to_string();
        validator.validate(&base_url)?;

        let forum_type: ForumKind = forum_type
            .ok_or(SettingsError::Missing("forum_type"))?
            .parse()?;

        if extract_user_id.is_none() && forum_ids.is_empty() {
            return Err(SettingsError::Missing("extract_user_id"));
        }
        match forum_type {
            ForumKind::PhpBb => {
                if let Some(id) = extract_user_id.as_ref().filter(|id| !is_integer(id)) {
                    return Err(SettingsError::invalid(
                        "extract_user_id",
                        format!("'{}' is not an integer", id),
                    ));
                }
                if let Some(bad) = forum_ids.iter().find(|id| !is_integer(id)) {
                    return Err(SettingsError::invalid(
                        "forum_ids",
                        format!("'{}' is not an integer", bad),
                    ));
                }
            }
            // XenForo member ids look like `name.123`; the numeric suffix is what search needs.
            ForumKind::XenForo => {
                if let Some(id) = extract_user_id.as_ref().filter(|id| trailing_digits(id).is_empty()) {
                    return Err(SettingsError::invalid(
                        "extract_user_id",
                        format!("'{}' does not end in a numeric id", id),
                    ));
                }
            }
        }

        let offset = match timezone {
            Some(tz) => parse_utc_offset(&tz).ok_or_else(|| {
                SettingsError::invalid("timezone", format!("'{}' is not a UTC offset", tz))
            })?,
            None => Utc.fix(),
        };

        let earliest = match &start_from_date {
            Some(raw) => Some(
                parse_forum_timestamp(raw, non_us_date_format, offset).ok_or_else(|| {
                    SettingsError::invalid(
                        "start_from_date",
                        format!("'{}' is not a recognised date", raw),
                    )
                })?,
            ),
            None => None,
        };

        let delay_seconds = match delay {
            Some(raw) => {
                let parsed: u64 = raw.parse().map_err(|_| {
                    SettingsError::invalid("delay", format!("'{}' is not a number of seconds", raw))
                })?;
                if parsed < MIN_DELAY_SECONDS {
                    warn!(
                        requested = parsed,
                        floor = MIN_DELAY_SECONDS,
                        "Delay below floor; raising it"
                    );
                }
                parsed.max(MIN_DELAY_SECONDS)
            }
            None => DEFAULT_DELAY_SECONDS,
        };

        let credentials = match (login_user, login_password) {
            (Some(user), Some(password)) => Some(LoginCredentials::new(user, password)),
            (None, None) => None,
            (Some(_), None) => return Err(SettingsError::Missing("login_password")),
            (None, Some(_)) => return Err(SettingsError::Missing("login_user")),
        };

        Ok(Self {
            base_url,
            forum_type,
            extract_user_id,
            extract_user,
            credentials,
            start_from_date,
            earliest,
            utc_offset_seconds: offset.local_minus_utc(),
            non_us_date_format,
            delay_seconds,
            debug,
            download_files,
            forum_ids,
            board_title,
        })
    }

    /// Fixed offset forum timestamps are printed in.
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_seconds).unwrap_or(Utc.fix())
    }

    /// Parse a forum timestamp with this job's locale settings.
    pub fn parse_timestamp(&self, raw: &str) -> Option<DateTime<Utc>> {
        parse_forum_timestamp(raw, self.non_us_date_format, self.offset())
    }

    /// Whether the job scrapes a single user's posts.
    pub fn is_user_mode(&self) -> bool {
        self.extract_user_id.is_some()
    }

    /// Whether the job scrapes whole sub-forums.
    pub fn is_forum_mode(&self) -> bool {
        !self.forum_ids.is_empty()
    }

    /// Settings as `key = value` lines with credentials redacted.
    pub fn redacted_summary(&self) -> String {
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        let mut lines = vec![
            format!("base_url = {}", self.base_url),
            format!("forum_type = {}", self.forum_type),
            format!("extract_user_id = {}", opt(&self.extract_user_id)),
            format!("extract_user = {}", opt(&self.extract_user)),
        ];
        if let Some(creds) = &self.credentials {
            lines.push(format!("login_user = {}", creds.user));
            lines.push(format!("login_password = {}", creds.password));
        }
        lines.extend([
            format!("start_from_date = {}", opt(&self.start_from_date)),
            format!("timezone = {}", self.offset()),
            format!("non_us_date_format = {}", self.non_us_date_format),
            format!("delay = {}", self.delay_seconds),
            format!("debug = {}", self.debug),
            format!("download_files = {}", self.download_files),
            format!("forum_ids = {}", self.forum_ids.join(",")),
            format!("board_title = {}", opt(&self.board_title)),
        ]);
        lines.join("\n")
    }
}
