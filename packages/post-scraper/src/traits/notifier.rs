//! Error escalation to the job owner.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::JobError;
use crate::types::state::Stage;

/// Upper bound on the error text carried by a non-fatal summary.
pub const MAX_ERROR_SUMMARY_BYTES: usize = 10_000;

/// How bad an escalated problem is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Fatal,
    ResumableFatal,
    NonFatal,
}

/// Everything the job owner needs to act on a problem.
#[derive(Debug, Clone, Serialize)]
pub struct Escalation {
    pub severity: Severity,
    pub job_id: String,
    pub stage: Option<String>,

    /// `file:line` of the raise site
    pub location: Option<String>,

    pub message: String,

    /// Settings with credentials redacted
    pub settings: String,

    /// Start of the page being processed, when there was one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_excerpt: Option<String>,
}

impl Escalation {
    /// Escalation for an error that ended the process.
    ///
    /// Returns `None` for cancellation, which is not a failure.
    pub fn from_job_error(err: &JobError, job_id: &str, settings: String) -> Option<Self> {
        let (severity, ctx) = match err {
            JobError::Fatal(ctx) => (Severity::Fatal, ctx),
            JobError::ResumableFatal(ctx) => (Severity::ResumableFatal, ctx),
            JobError::Cancelled => return None,
        };
        Some(Self {
            severity,
            job_id: job_id.to_string(),
            stage: Some(ctx.stage.to_string()),
            location: Some(ctx.location()),
            message: ctx.message.clone(),
            settings,
            html_excerpt: None,
        })
    }

    /// Summary of the non-fatal errors a finished job accumulated.
    pub fn non_fatal_summary(job_id: &str, stage: Stage, errors: &str, settings: String) -> Self {
        Self {
            severity: Severity::NonFatal,
            job_id: job_id.to_string(),
            stage: Some(stage.to_string()),
            location: None,
            message: truncate_utf8(errors, MAX_ERROR_SUMMARY_BYTES).to_string(),
            settings,
            html_excerpt: None,
        }
    }

    pub fn with_html_excerpt(mut self, html: Option<String>) -> Self {
        self.html_excerpt = html;
        self
    }

    /// Plain-text rendering for the admin error file.
    pub fn render(&self) -> String {
        let mut out = format!("[{:?}] job {}", self.severity, self.job_id);
        if let Some(stage) = &self.stage {
            out.push_str(&format!(" stage {}", stage));
        }
        if let Some(location) = &self.location {
            out.push_str(&format!(" at {}", location));
        }
        out.push_str(&format!("\n{}\n\nSettings:\n{}\n", self.message, self.settings));
        if let Some(html) = &self.html_excerpt {
            out.push_str(&format!("\nPage excerpt:\n{}\n", html));
        }
        out
    }
}

/// Longest prefix of `text` within `max` bytes that ends on a char boundary.
pub fn truncate_utf8(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Delivers escalations to whoever owns the job.
///
/// Delivery failures are the notifier's problem; they never affect the job.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, escalation: &Escalation);
}

/// Notifier that writes escalations to the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, escalation: &Escalation) {
        match escalation.severity {
            Severity::NonFatal => tracing::warn!(
                job_id = %escalation.job_id,
                errors = %escalation.message,
                "Job finished with non-fatal errors"
            ),
            _ => tracing::error!(
                job_id = %escalation.job_id,
                severity = ?escalation.severity,
                stage = escalation.stage.as_deref().unwrap_or("-"),
                location = escalation.location.as_deref().unwrap_or("-"),
                message = %escalation.message,
                "Job failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_utf8("héllo", 2), "h");
        assert_eq!(truncate_utf8("héllo", 3), "hé");
        assert_eq!(truncate_utf8("abc", 10), "abc");
    }

    #[test]
    fn test_non_fatal_summary_is_truncated() {
        let errors = "x".repeat(MAX_ERROR_SUMMARY_BYTES + 50);
        let escalation =
            Escalation::non_fatal_summary("job", Stage::ErrorSummaryNotification, &errors, String::new());
        assert_eq!(escalation.message.len(), MAX_ERROR_SUMMARY_BYTES);
        assert_eq!(escalation.severity, Severity::NonFatal);
    }

    #[test]
    fn test_from_job_error() {
        let err = JobError::resumable(Stage::PostsRetrieval, "page failed");
        let escalation = Escalation::from_job_error(&err, "job", "base_url = x".into()).unwrap();
        assert_eq!(escalation.severity, Severity::ResumableFatal);
        assert!(escalation.location.as_deref().unwrap().contains("notifier.rs"));
        assert!(escalation.render().contains("page failed"));

        assert!(Escalation::from_job_error(&JobError::Cancelled, "job", String::new()).is_none());
    }
}
