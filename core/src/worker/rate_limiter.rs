//! Phase-wide request rate limiting

use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use std::time::Duration;

/// Token bucket shared by every worker of a phase
///
/// Permits are released one per `1 / rate` seconds with no burst, so a
/// phase that starts all workers at once is still paced evenly.
pub struct RequestRateLimiter {
    limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    rate_limit: Option<f64>,
}

impl RequestRateLimiter {
    /// Create a limiter; `None` or a non-positive rate disables it
    ///
    /// ```
    /// use serverbench_core::worker::RequestRateLimiter;
    ///
    /// let limited = RequestRateLimiter::new(Some(250.0));
    /// assert!(limited.is_enabled());
    /// assert!(!RequestRateLimiter::new(None).is_enabled());
    /// ```
    pub fn new(rate_limit: Option<f64>) -> Self {
        let limiter = rate_limit.and_then(|rps| {
            if !rps.is_finite() || rps <= 0.0 {
                return None;
            }
            let period = Duration::try_from_secs_f64(1.0 / rps).ok()?;
            Some(RateLimiter::direct(Quota::with_period(period)?))
        });

        Self {
            limiter,
            rate_limit,
        }
    }

    /// No limiting
    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// Wait until the next request is allowed
    pub async fn wait(&self) {
        if let Some(ref limiter) = self.limiter {
            limiter.until_ready().await;
        }
    }

    /// Whether limiting is active
    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    /// Configured rate (requests per second)
    pub fn rate_limit(&self) -> Option<f64> {
        self.rate_limit
    }
}

impl Default for RequestRateLimiter {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl std::fmt::Debug for RequestRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRateLimiter")
            .field("rate_limit", &self.rate_limit)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
