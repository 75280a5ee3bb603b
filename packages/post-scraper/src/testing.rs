//! Testing utilities including mock implementations.
//!
//! These are useful for driving jobs against scripted forum pages without
//! making network requests or spawning processes.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{ChainError, FetchError, FetchResult, OutputResult};
use crate::fetch::transport::{HttpRequest, RawResponse, Transport};
use crate::traits::{
    launcher::ProcessLauncher,
    notifier::{Escalation, Notifier},
    output::OutputWriter,
};
use crate::types::state::JobState;

/// A mock transport for testing.
///
/// Serves scripted responses by exact URL. Clones share their script and
/// request log, so a test can keep a handle after boxing one into a client.
#[derive(Default, Clone)]
pub struct MockTransport {
    /// Responses served every time a URL is requested
    pages: Arc<RwLock<HashMap<String, RawResponse>>>,

    /// Responses served once each, in order, before falling back to `pages`
    sequences: Arc<RwLock<HashMap<String, VecDeque<RawResponse>>>>,

    /// URLs that fail with a transport error
    fail_urls: Arc<RwLock<Vec<String>>>,

    /// Virtual time each request takes
    latency: Arc<RwLock<Duration>>,

    /// Create this file once this many requests have been served
    cancel_after: Arc<RwLock<Option<(usize, PathBuf)>>>,

    /// Request log
    requests: Arc<RwLock<Vec<HttpRequest>>>,
}

impl MockTransport {
    /// Create a new mock transport. Unknown URLs answer 404.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with status 200 for `url`.
    pub fn with_page(self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.with_response(url, RawResponse::ok(body))
    }

    /// Serve a fixed response for `url`.
    pub fn with_response(self, url: impl Into<String>, response: RawResponse) -> Self {
        self.pages.write().unwrap().insert(url.into(), response);
        self
    }

    /// Serve `responses` for `url`, one per request.
    pub fn with_sequence(self, url: impl Into<String>, responses: Vec<RawResponse>) -> Self {
        self.sequences
            .write()
            .unwrap()
            .insert(url.into(), responses.into());
        self
    }

    /// Mark a URL as failing.
    pub fn fail_url(self, url: impl Into<String>) -> Self {
        self.fail_urls.write().unwrap().push(url.into());
        self
    }

    /// Make every request take `latency` of (virtual) time.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.write().unwrap() = latency;
        self
    }

    /// Create `marker` right after the `count`th request is served.
    pub fn cancel_after(self, count: usize, marker: impl Into<PathBuf>) -> Self {
        *self.cancel_after.write().unwrap() = Some((count, marker.into()));
        self
    }

    /// Number of requests sent, counting retries and redirect hops.
    pub fn request_count(&self) -> usize {
        self.requests.read().unwrap().len()
    }

    /// Every request sent, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.read().unwrap().clone()
    }

    /// How many times `url` was requested.
    pub fn count_for(&self, url: &str) -> usize {
        self.requests
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .count()
    }

    fn respond(&self, url: &str) -> FetchResult<RawResponse> {
        if self.fail_urls.read().unwrap().iter().any(|u| u == url) {
            return Err(FetchError::Http {
                url: url.to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "Mock connection refused",
                )),
            });
        }
        if let Some(queue) = self.sequences.write().unwrap().get_mut(url) {
            if let Some(response) = queue.pop_front() {
                return Ok(response);
            }
        }
        Ok(self
            .pages
            .read()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| RawResponse::status(404)))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &HttpRequest) -> FetchResult<RawResponse> {
        self.requests.write().unwrap().push(request.clone());

        let latency = *self.latency.read().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let result = self.respond(&request.url);

        if let Some((count, marker)) = self.cancel_after.read().unwrap().as_ref() {
            if self.request_count() >= *count {
                let _ = std::fs::write(marker, b"");
            }
        }
        result
    }
}

/// Notifier that keeps every escalation.
#[derive(Default, Clone)]
pub struct RecordingNotifier {
    escalations: Arc<RwLock<Vec<Escalation>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn escalations(&self) -> Vec<Escalation> {
        self.escalations.read().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, escalation: &Escalation) {
        self.escalations.write().unwrap().push(escalation.clone());
    }
}

/// Output writer that keeps the written states in memory.
#[derive(Default, Clone)]
pub struct MemoryOutputWriter {
    written: Arc<RwLock<Vec<(PathBuf, JobState)>>>,
}

impl MemoryOutputWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> Vec<(PathBuf, JobState)> {
        self.written.read().unwrap().clone()
    }

    /// The last state written, if any.
    pub fn last(&self) -> Option<JobState> {
        self.written.read().unwrap().last().map(|(_, s)| s.clone())
    }
}

impl OutputWriter for MemoryOutputWriter {
    fn write(&self, state: &JobState, path: &Path) -> OutputResult<()> {
        self.written
            .write()
            .unwrap()
            .push((path.to_path_buf(), state.clone()));
        Ok(())
    }
}

/// Launcher that records continuation commands instead of spawning them.
#[derive(Default, Clone)]
pub struct RecordingLauncher {
    launches: Arc<RwLock<Vec<(PathBuf, Vec<String>)>>>,
    fail: bool,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A launcher whose every launch fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn launches(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.launches.read().unwrap().clone()
    }
}

impl ProcessLauncher for RecordingLauncher {
    fn launch(&self, program: &Path, args: &[String]) -> Result<(), ChainError> {
        self.launches
            .write()
            .unwrap()
            .push((program.to_path_buf(), args.to_vec()));
        if self.fail {
            return Err(ChainError::Launch {
                program: program.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "Mock launch failure"),
            });
        }
        Ok(())
    }
}
