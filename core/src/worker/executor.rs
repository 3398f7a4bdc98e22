//! Worker execution loop

use crate::error::{BenchError, BenchResult};
use crate::metrics::Record;
use crate::response::ErrorKind;
use crate::traits::{Sampler, StopCondition, TargetClient};

use super::rate_limiter::RequestRateLimiter;
use super::stats::WorkerStats;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Worker executes requests in a loop: sample -> send -> record -> repeat
///
/// Workers are short-lived tokio tasks owned by one phase. They share the
/// target client, sampler and rate limiter via Arc. During measuring each
/// attempt produces a [`Record`] on the channel; during warmup no channel is
/// attached and only counts are kept.
pub struct Worker {
    id: usize,
    target: Arc<dyn TargetClient>,
    sampler: Arc<dyn Sampler>,
    base_url: Arc<str>,
    record_tx: Option<mpsc::Sender<Record>>,
    rate_limiter: Arc<RequestRateLimiter>,
    stop_condition: StopCondition,
    request_timeout: Duration,
    request_counter: Option<Arc<AtomicUsize>>,
}

impl Worker {
    /// Create a new worker
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        target: Arc<dyn TargetClient>,
        sampler: Arc<dyn Sampler>,
        base_url: Arc<str>,
        record_tx: Option<mpsc::Sender<Record>>,
        rate_limiter: Arc<RequestRateLimiter>,
        stop_condition: StopCondition,
        request_timeout: Duration,
    ) -> Self {
        Self {
            id,
            target,
            sampler,
            base_url,
            record_tx,
            rate_limiter,
            stop_condition,
            request_timeout,
            request_counter: None,
        }
    }

    /// Share an attempt counter with the other workers of the phase
    ///
    /// With `StopCondition::RequestCount(n)` the workers together issue
    /// exactly `n` attempts, whatever the split between them.
    pub fn with_request_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.request_counter = Some(counter);
        self
    }

    /// Run until the stop condition is met or `cancel` fires
    ///
    /// Cancellation is checked before each attempt; an attempt in flight
    /// when the token fires is abandoned and leaves no record.
    pub async fn run(self, cancel: CancellationToken) -> BenchResult<WorkerStats> {
        let mut stats = WorkerStats::new();
        stats.start();

        tracing::debug!(worker_id = self.id, "Worker started");

        loop {
            if cancel.is_cancelled() {
                tracing::debug!(worker_id = self.id, "Worker cancelled");
                break;
            }

            if self.should_stop(&stats) {
                break;
            }

            if !self.try_claim_request() {
                tracing::debug!(worker_id = self.id, "No more requests to claim");
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::debug!(worker_id = self.id, "Worker cancelled mid-request");
                    break;
                }

                result = self.execute_one() => {
                    let record = result?;
                    stats.record(record.error_kind);
                    if let Some(tx) = &self.record_tx {
                        if tx.send(record).await.is_err() {
                            tracing::debug!(worker_id = self.id, "Record channel closed");
                            break;
                        }
                    }
                }
            }
        }

        stats.stop();
        tracing::debug!(
            worker_id = self.id,
            completed = stats.completed,
            errors = stats.errors,
            elapsed_ms = ?stats.elapsed().map(|d| d.as_millis()),
            "Worker finished"
        );

        Ok(stats)
    }

    /// Perform one attempt and classify it
    async fn execute_one(&self) -> BenchResult<Record> {
        self.rate_limiter.wait().await;

        let route = self
            .sampler
            .sample()
            .map_err(|e| BenchError::sampler(e.to_string()))?;
        let request = route.bind(&self.base_url, self.request_timeout);

        let started_at = chrono::Utc::now();
        let start = Instant::now();
        let outcome = self.target.send(&request).await;
        let duration_nanos = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);

        let (status, error_kind) = match outcome {
            Ok(reply) => (reply.status, ErrorKind::from_status(reply.status)),
            Err(e) => {
                tracing::trace!(worker_id = self.id, error = %e, "Request failed");
                (0, e.to_error_kind())
            }
        };

        Ok(Record {
            started_at,
            duration_nanos,
            status,
            error_kind,
            path: route.path,
        })
    }

    /// Claim the next attempt from the shared counter
    ///
    /// Always true without a counter.
    fn try_claim_request(&self) -> bool {
        match (&self.request_counter, self.stop_condition) {
            (Some(counter), StopCondition::RequestCount(total)) => {
                let claimed = counter.fetch_add(1, Ordering::SeqCst);
                if claimed >= total {
                    // over-claimed near the limit; keep the counter exact
                    counter.fetch_sub(1, Ordering::SeqCst);
                    return false;
                }
                true
            }
            _ => true,
        }
    }

    fn should_stop(&self, stats: &WorkerStats) -> bool {
        match self.stop_condition {
            // enforced by try_claim_request when a counter is shared
            StopCondition::RequestCount(total) => {
                self.request_counter.is_none() && stats.total_requests() >= total
            }
            StopCondition::Duration(duration) => stats
                .started_at
                .map(|start| start.elapsed() >= duration)
                .unwrap_or(false),
        }
    }

    /// Get the worker ID
    pub fn id(&self) -> usize {
        self.id
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("target", &self.target.name())
            .field("sampler", &self.sampler.name())
            .field("base_url", &self.base_url)
            .field("records", &self.record_tx.is_some())
            .field("rate_limiter", &self.rate_limiter)
            .field("stop_condition", &self.stop_condition)
            .finish()
    }
}
