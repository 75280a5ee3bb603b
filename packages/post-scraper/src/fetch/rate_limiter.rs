//! Courteous delay between requests.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::types::settings::MIN_DELAY_SECONDS;

/// Enforces a fixed minimum pause between consecutive requests.
///
/// The first request of a process goes out immediately.
#[derive(Debug)]
pub struct RateLimiter {
    delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    /// Create a limiter; delays below the floor are raised to it.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay: delay.max(Duration::from_secs(MIN_DELAY_SECONDS)),
            last_request: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Whether no request has been made by this process yet.
    pub fn is_first(&self) -> bool {
        self.last_request.is_none()
    }

    /// Sleep until the delay since the previous request has elapsed.
    pub async fn wait(&self) {
        if let Some(last) = self.last_request {
            let ready_at = last + self.delay;
            if ready_at > Instant::now() {
                debug!(delay_ms = self.delay.as_millis() as u64, "Waiting courteously");
                tokio::time::sleep_until(ready_at).await;
            }
        }
    }

    /// Record that a request just finished.
    pub fn mark(&mut self) {
        self.last_request = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_floor() {
        assert_eq!(RateLimiter::new(Duration::ZERO).delay(), Duration::from_secs(1));
        assert_eq!(RateLimiter::new(Duration::from_secs(7)).delay(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_request_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(5));
        let start = Instant::now();
        limiter.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_between_requests() {
        let mut limiter = RateLimiter::new(Duration::from_secs(5));
        limiter.mark();
        let start = Instant::now();
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_time_counts_toward_delay() {
        let mut limiter = RateLimiter::new(Duration::from_secs(5));
        limiter.mark();
        tokio::time::sleep(Duration::from_secs(3)).await;
        let start = Instant::now();
        limiter.wait().await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(2) && waited < Duration::from_secs(3));
    }
}
