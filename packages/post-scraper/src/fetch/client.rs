//! Rate-limited fetching with retries and manual redirects.

use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

use crate::error::{FetchError, FetchResult};
use crate::fetch::cancellation::CancellationWatcher;
use crate::fetch::rate_limiter::RateLimiter;
use crate::fetch::transport::{HttpRequest, RawResponse, Transport};
use crate::security::UrlValidator;

/// Default backoff before each attempt: immediately, then twice after 5s.
pub const DEFAULT_RETRY_DELAYS: [Duration; 3] = [
    Duration::ZERO,
    Duration::from_secs(5),
    Duration::from_secs(5),
];

/// Bound on redirect hops for a single fetch.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// A successful response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// URL that produced the body
    pub url: String,

    /// Last redirect target followed, if any
    pub redirected_to: Option<String>,

    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

fn resolve_location(current: &str, location: &str) -> FetchResult<String> {
    let bad = || FetchError::BadRedirect {
        url: current.to_string(),
        location: location.to_string(),
    };
    let base = Url::parse(current).map_err(|_| bad())?;
    let mut next = base.join(location.trim()).map_err(|_| bad())?;
    next.set_fragment(None);
    Ok(next.into())
}

/// Fetches pages for one job.
///
/// Every request is gated by the cancellation check and the courteous
/// delay, validated against SSRF rules (including each redirect target),
/// and retried on transport errors or error statuses.
pub struct FetchClient {
    transport: Box<dyn Transport>,
    validator: UrlValidator,
    rate_limiter: RateLimiter,
    cancellation: CancellationWatcher,
    retry_delays: Vec<Duration>,
    max_redirects: usize,
    requests: u64,
}

impl FetchClient {
    /// Create a client with the default retry schedule.
    pub fn new(
        transport: Box<dyn Transport>,
        validator: UrlValidator,
        rate_limiter: RateLimiter,
        cancellation: CancellationWatcher,
    ) -> Self {
        Self {
            transport,
            validator,
            rate_limiter,
            cancellation,
            retry_delays: DEFAULT_RETRY_DELAYS.to_vec(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            requests: 0,
        }
    }

    /// Set the per-attempt backoff schedule (one entry per attempt).
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = if delays.is_empty() {
            vec![Duration::ZERO]
        } else {
            delays
        };
        self
    }

    /// Set the redirect bound.
    pub fn with_max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    pub fn retry_delays(&self) -> &[Duration] {
        &self.retry_delays
    }

    /// Requests issued by this process (not counting retries and redirects).
    pub fn request_count(&self) -> u64 {
        self.requests
    }

    pub fn validator(&self) -> &UrlValidator {
        &self.validator
    }

    /// GET a URL.
    pub async fn fetch(&mut self, url: &str) -> FetchResult<FetchResponse> {
        self.send(HttpRequest::get(url)).await
    }

    /// POST a URL-encoded form.
    pub async fn post_form(
        &mut self,
        url: &str,
        fields: Vec<(String, String)>,
    ) -> FetchResult<FetchResponse> {
        self.send(HttpRequest::post_form(url, fields)).await
    }

    /// Flush the cookie jar so a successor process can reuse the session.
    pub fn persist_cookies(&self) -> FetchResult<()> {
        self.transport.persist_cookies()
    }

    async fn send(&mut self, request: HttpRequest) -> FetchResult<FetchResponse> {
        self.cancellation.check()?;
        self.rate_limiter.wait().await;

        self.requests += 1;
        let result = self.send_with_retries(request).await;
        self.rate_limiter.mark();
        result
    }

    async fn send_with_retries(&self, mut request: HttpRequest) -> FetchResult<FetchResponse> {
        let mut redirected_to = None;
        let mut redirects = 0;
        let mut last_error = None;
        let mut attempt = 0;

        while attempt < self.retry_delays.len() {
            let delay = self.retry_delays[attempt];
            if !delay.is_zero() {
                debug!(url = %request.url, attempt, delay_secs = delay.as_secs(), "Backing off before retry");
                tokio::time::sleep(delay).await;
            }

            self.validator.validate_with_dns(&request.url).await?;
            debug!(url = %request.url, attempt, "HTTP fetch starting");

            let response: RawResponse = match self.transport.send(&request).await {
                Ok(response) => response,
                Err(e) if e.is_retryable() => {
                    warn!(url = %request.url, attempt, error = %e, "HTTP request failed");
                    last_error = Some(e);
                    attempt += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if is_redirect(response.status) {
                if let Some(location) = response.location.as_deref() {
                    redirects += 1;
                    if redirects > self.max_redirects {
                        return Err(FetchError::TooManyRedirects {
                            url: request.url.clone(),
                        });
                    }
                    let next = resolve_location(&request.url, location)?;
                    debug!(from = %request.url, to = %next, status = response.status, "Following redirect");
                    redirected_to = Some(next.clone());
                    // Redirect hops do not consume an attempt
                    request = HttpRequest::get(next);
                    continue;
                }
            }

            if (200..300).contains(&response.status) {
                info!(url = %request.url, status = response.status, bytes = response.body.len(), "Fetched");
                return Ok(FetchResponse {
                    url: request.url,
                    redirected_to,
                    status: response.status,
                    body: response.body,
                });
            }

            warn!(url = %request.url, attempt, status = response.status, "Unexpected HTTP status");
            last_error = Some(FetchError::Status {
                url: request.url.clone(),
                status: response.status,
            });
            attempt += 1;
        }

        Err(last_error.unwrap_or_else(|| FetchError::Http {
            url: request.url,
            source: "no attempts were made".into(),
        }))
    }
}
