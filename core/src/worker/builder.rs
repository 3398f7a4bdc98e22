//! Builder pattern for Worker construction

use crate::error::{BenchError, BenchResult};
use crate::metrics::Record;
use crate::traits::{Sampler, StopCondition, TargetClient};

use super::executor::Worker;
use super::rate_limiter::RequestRateLimiter;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Builder for creating Worker instances
///
/// # Example
/// ```ignore
/// let worker = WorkerBuilder::new(0)
///     .target(target)
///     .sampler(sampler)
///     .base_url("http://127.0.0.1:8080")
///     .record_tx(tx)
///     .stop_condition(StopCondition::RequestCount(100))
///     .build()?;
/// ```
pub struct WorkerBuilder {
    id: usize,
    target: Option<Arc<dyn TargetClient>>,
    sampler: Option<Arc<dyn Sampler>>,
    base_url: Option<Arc<str>>,
    record_tx: Option<mpsc::Sender<Record>>,
    rate_limiter: Option<Arc<RequestRateLimiter>>,
    stop_condition: Option<StopCondition>,
    request_timeout: Duration,
    request_counter: Option<Arc<AtomicUsize>>,
}

impl WorkerBuilder {
    /// Create a new builder with the given worker ID
    pub fn new(id: usize) -> Self {
        Self {
            id,
            target: None,
            sampler: None,
            base_url: None,
            record_tx: None,
            rate_limiter: None,
            stop_condition: None,
            request_timeout: Duration::from_secs(5),
            request_counter: None,
        }
    }

    /// Set the target client
    pub fn target(mut self, target: Arc<dyn TargetClient>) -> Self {
        self.target = Some(target);
        self
    }

    /// Set the sampler
    pub fn sampler(mut self, sampler: Arc<dyn Sampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Set the server base URL
    pub fn base_url(mut self, base_url: impl Into<Arc<str>>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Emit a record per attempt on this channel
    pub fn record_tx(mut self, tx: mpsc::Sender<Record>) -> Self {
        self.record_tx = Some(tx);
        self
    }

    /// Share a phase-wide rate limiter
    pub fn rate_limiter(mut self, limiter: Arc<RequestRateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Set the stop condition
    pub fn stop_condition(mut self, condition: StopCondition) -> Self {
        self.stop_condition = Some(condition);
        self
    }

    /// Set the per-request deadline
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set a shared attempt counter
    pub fn request_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.request_counter = Some(counter);
        self
    }

    /// Build the Worker
    ///
    /// # Errors
    /// Returns an error if any required field is missing.
    pub fn build(self) -> BenchResult<Worker> {
        let target = self.target.ok_or_else(|| BenchError::missing_config("target"))?;
        let sampler = self
            .sampler
            .ok_or_else(|| BenchError::missing_config("sampler"))?;
        let base_url = self
            .base_url
            .ok_or_else(|| BenchError::missing_config("base_url"))?;
        let stop_condition = self
            .stop_condition
            .ok_or_else(|| BenchError::missing_config("stop_condition"))?;
        let rate_limiter = self
            .rate_limiter
            .unwrap_or_else(|| Arc::new(RequestRateLimiter::unlimited()));

        let mut worker = Worker::new(
            self.id,
            target,
            sampler,
            base_url,
            self.record_tx,
            rate_limiter,
            stop_condition,
            self.request_timeout,
        );

        if let Some(counter) = self.request_counter {
            worker = worker.with_request_counter(counter);
        }

        Ok(worker)
    }
}
