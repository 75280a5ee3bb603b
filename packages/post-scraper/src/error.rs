//! Typed errors for the scraping engine.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. Only [`JobError`] crosses the
//! stage runner boundary; everything else is folded into it with a stage and
//! a source location attached.

use std::fmt;
use std::panic::Location;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::state::Stage;

/// Boxed error for collaborator failures (output writers, notifiers, transports).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Security-related errors, primarily for SSRF protection.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// URL scheme not allowed (e.g., file://, ftp://)
    #[error("disallowed URL scheme: {0}")]
    DisallowedScheme(String),

    /// Host is blocked (e.g., localhost, internal IPs)
    #[error("blocked host: {0}")]
    BlockedHost(String),

    /// IP in blocked CIDR range (e.g., 10.0.0.0/8)
    #[error("blocked IP range: {0}")]
    BlockedCidr(String),

    /// URL has no host
    #[error("URL has no host")]
    NoHost,

    /// DNS resolution failed
    #[error("DNS resolution failed: {0}")]
    DnsResolution(String),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Errors raised while fetching a page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// URL (or a redirect target) failed validation
    #[error("security error: {0}")]
    Security(#[from] SecurityError),

    /// Transport-level failure (connection, timeout, TLS)
    #[error("HTTP error fetching {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: BoxError,
    },

    /// Server answered with a non-success, non-redirect status
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// Redirect chain exceeded the configured bound
    #[error("too many redirects starting from {url}")]
    TooManyRedirects { url: String },

    /// Redirect carried a Location that cannot be resolved
    #[error("unusable redirect from {url} to {location}")]
    BadRedirect { url: String, location: String },

    /// Cancellation marker was found before the request went out
    #[error("cancelled by request")]
    Cancelled,

    /// Cookie jar could not be loaded or persisted
    #[error("cookie jar error: {0}")]
    CookieJar(#[source] BoxError),

    /// HTTP client could not be built
    #[error("failed to initialise HTTP client: {0}")]
    Client(#[source] BoxError),
}

impl FetchError {
    /// Whether this error is the cancellation signal rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Http { .. } | FetchError::Status { .. })
    }
}

/// Errors raised while reading or validating job settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Settings file could not be read
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line was neither blank, a comment, nor `key=value`
    #[error("settings line {line}: expected key=value")]
    Syntax { line: usize },

    /// A required setting is absent or empty
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    /// A setting has a value that cannot be used
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    /// Base URL failed SSRF validation
    #[error("base_url rejected: {0}")]
    UnsafeBaseUrl(#[from] SecurityError),
}

impl SettingsError {
    pub(crate) fn invalid(key: &str, reason: impl Into<String>) -> Self {
        SettingsError::Invalid {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while saving or loading checkpoints.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Filesystem failure
    #[error("checkpoint I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Checkpoint is not valid JSON for the current state model
    #[error("checkpoint JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Checkpoint was written by an incompatible format version
    #[error("checkpoint format {format} v{version} is not supported")]
    VersionMismatch { format: String, version: u32 },

    /// No checkpoint exists for this job
    #[error("no checkpoint at {path}")]
    Missing { path: PathBuf },
}

/// Errors raised while writing the job output.
#[derive(Debug, Error)]
pub enum OutputError {
    /// Filesystem failure
    #[error("output I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Output document could not be serialized
    #[error("output JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while chaining into a continuation process.
#[derive(Debug, Error)]
pub enum ChainError {
    /// State could not be persisted before handing off
    #[error("failed to persist state before chaining: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Cookie jar could not be persisted before handing off
    #[error("failed to persist cookies before chaining: {0}")]
    Cookies(#[source] FetchError),

    /// Continuation process could not be started
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by forum adapters.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// A built-in extraction rule failed to compile
    #[error("rule {rule} ({skin}) failed to compile: {source}")]
    InvalidRule {
        rule: &'static str,
        skin: &'static str,
        #[source]
        source: regex::Error,
    },

    /// Login page did not contain a recognisable form
    #[error("could not find a login form on {url}")]
    LoginFormNotFound { url: String },

    /// Forum did not accept the supplied credentials
    #[error("login rejected for user {user}")]
    LoginRejected { user: String },
}

/// Errors raised before a job's first stage can run.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    /// A job marker file could not be read or written
    #[error("marker file {path}: {source}")]
    Marker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where a job-level error was raised.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Stage that was running
    pub stage: Stage,

    /// Source file of the raise site
    pub file: &'static str,

    /// Source line of the raise site
    pub line: u32,

    /// Human-readable description
    pub message: String,
}

impl ErrorContext {
    #[track_caller]
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        let location = Location::caller();
        Self {
            stage,
            file: location.file(),
            line: location.line(),
            message: message.into(),
        }
    }

    /// `file:line` of the raise site.
    pub fn location(&self) -> String {
        format!("{}:{}", self.file, self.line)
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stage {} ({}:{}): {}",
            self.stage, self.file, self.line, self.message
        )
    }
}

/// Errors that end the current process.
#[derive(Debug, Error)]
pub enum JobError {
    /// Unrecoverable; the job is abandoned
    #[error("fatal error in {0}")]
    Fatal(ErrorContext),

    /// State was checkpointed and the job can be resumed
    #[error("resumable error in {0}")]
    ResumableFatal(ErrorContext),

    /// Cancellation marker observed
    #[error("job cancelled")]
    Cancelled,
}

impl JobError {
    #[track_caller]
    pub fn fatal(stage: Stage, message: impl Into<String>) -> Self {
        JobError::Fatal(ErrorContext::new(stage, message))
    }

    #[track_caller]
    pub fn resumable(stage: Stage, message: impl Into<String>) -> Self {
        JobError::ResumableFatal(ErrorContext::new(stage, message))
    }

    /// Map a fetch failure inside a loop that can be picked up again later.
    #[track_caller]
    pub fn from_fetch(stage: Stage, err: FetchError) -> Self {
        match err {
            FetchError::Cancelled => JobError::Cancelled,
            other => JobError::resumable(stage, other.to_string()),
        }
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            JobError::Fatal(ctx) | JobError::ResumableFatal(ctx) => Some(ctx),
            JobError::Cancelled => None,
        }
    }

    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            JobError::Fatal(_) => 1,
            JobError::ResumableFatal(_) => 2,
            JobError::Cancelled => 0,
        }
    }
}

/// Result type alias for security operations.
pub type SecurityResult<T> = std::result::Result<T, SecurityError>;

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for settings parsing.
pub type SettingsResult<T> = std::result::Result<T, SettingsError>;

/// Result type alias for checkpoint operations.
pub type CheckpointResult<T> = std::result::Result<T, CheckpointError>;

/// Result type alias for output writers.
pub type OutputResult<T> = std::result::Result<T, OutputError>;

/// Result type alias for job setup.
pub type SetupResult<T> = std::result::Result<T, SetupError>;

/// Result type alias for stage execution.
pub type JobResult<T> = std::result::Result<T, JobError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_records_caller_location() {
        let err = JobError::fatal(Stage::PostsRetrieval, "boom");
        let ctx = err.context().unwrap();
        assert!(ctx.file.ends_with("error.rs"));
        assert!(ctx.line > 0);
        assert_eq!(ctx.stage, Stage::PostsRetrieval);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(JobError::fatal(Stage::InitUserSearch, "x").exit_code(), 1);
        assert_eq!(JobError::resumable(Stage::InitUserSearch, "x").exit_code(), 2);
        assert_eq!(JobError::Cancelled.exit_code(), 0);
    }

    #[test]
    fn test_cancelled_fetch_maps_to_cancelled_job() {
        let err = JobError::from_fetch(Stage::UserPostSearch, FetchError::Cancelled);
        assert!(matches!(err, JobError::Cancelled));

        let err = JobError::from_fetch(
            Stage::UserPostSearch,
            FetchError::Status {
                url: "https://forum.example.com/".into(),
                status: 500,
            },
        );
        assert!(matches!(err, JobError::ResumableFatal(_)));
    }
}
