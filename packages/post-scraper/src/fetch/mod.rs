//! Fetching: transport, retries, redirects, courteous delay, cancellation.

pub mod cancellation;
pub mod client;
pub mod rate_limiter;
pub mod transport;

pub use cancellation::{request_cancellation, CancellationWatcher};
pub use client::{FetchClient, FetchResponse, DEFAULT_RETRY_DELAYS};
pub use rate_limiter::RateLimiter;
pub use transport::{HttpRequest, Method, RawResponse, ReqwestTransport, Transport};
