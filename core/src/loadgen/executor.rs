//! Phase execution logic

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{BenchError, BenchResult};
use crate::metrics::Record;
use crate::traits::{Sampler, StopCondition, TargetClient};
use crate::worker::{RequestRateLimiter, WorkerBuilder, WorkerStats};

use super::aggregator::{aggregate_worker_stats, AggregatedStats};

/// Settings for one phase
#[derive(Debug, Clone)]
pub struct PhaseConfig {
    /// Label for logs ("warmup", "measure")
    pub name: &'static str,
    /// Exactly this many workers are spawned
    pub concurrency: usize,
    /// When the phase ends
    pub stop_condition: StopCondition,
    /// Optional phase-wide requests-per-second ceiling
    pub rate_limit: Option<f64>,
    /// Per-request deadline
    pub request_timeout: Duration,
    /// Whether workers emit records
    pub emit_records: bool,
}

impl PhaseConfig {
    /// Defaults: one worker, default stop condition, 5s request deadline
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            concurrency: 1,
            stop_condition: StopCondition::default(),
            rate_limit: None,
            request_timeout: Duration::from_secs(5),
            emit_records: false,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> BenchResult<()> {
        if self.concurrency == 0 {
            return Err(BenchError::config("concurrency must be at least 1"));
        }
        if let Some(rps) = self.rate_limit {
            if rps.is_nan() || rps <= 0.0 {
                return Err(BenchError::config("rate limit must be positive"));
            }
        }
        match self.stop_condition {
            StopCondition::RequestCount(0) => {
                Err(BenchError::config("request count must be at least 1"))
            }
            StopCondition::Duration(d) if d.is_zero() => {
                Err(BenchError::config("duration must be positive"))
            }
            _ => Ok(()),
        }
    }
}

/// One load phase: a fixed pool of workers against one server
///
/// Use [`PhaseBuilder`](super::PhaseBuilder) to construct.
pub struct Phase {
    config: PhaseConfig,
    target: Arc<dyn TargetClient>,
    sampler: Arc<dyn Sampler>,
    base_url: Arc<str>,
    records_tx: mpsc::Sender<Record>,
    rate_limiter: Arc<RequestRateLimiter>,
    request_counter: Arc<AtomicUsize>,
}

impl Phase {
    pub(crate) fn new(
        config: PhaseConfig,
        target: Arc<dyn TargetClient>,
        sampler: Arc<dyn Sampler>,
        base_url: Arc<str>,
        records_tx: mpsc::Sender<Record>,
    ) -> Self {
        let rate_limiter = Arc::new(RequestRateLimiter::new(config.rate_limit));
        Self {
            config,
            target,
            sampler,
            base_url,
            records_tx,
            rate_limiter,
            request_counter: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Get the phase configuration
    pub fn config(&self) -> &PhaseConfig {
        &self.config
    }

    /// Run the phase to completion or cancellation
    ///
    /// Consumes the phase so the record channel closes when the last
    /// worker exits. No work outlives the call.
    pub async fn run(self, cancel: &CancellationToken) -> BenchResult<AggregatedStats> {
        let start = Instant::now();
        let mut handles = Vec::with_capacity(self.config.concurrency);

        tracing::debug!(
            phase = self.config.name,
            concurrency = self.config.concurrency,
            stop_condition = ?self.config.stop_condition,
            rate_limit = ?self.config.rate_limit,
            "Starting phase"
        );

        for worker_id in 0..self.config.concurrency {
            let mut builder = WorkerBuilder::new(worker_id)
                .target(Arc::clone(&self.target))
                .sampler(Arc::clone(&self.sampler))
                .base_url(Arc::clone(&self.base_url))
                .rate_limiter(Arc::clone(&self.rate_limiter))
                .stop_condition(self.config.stop_condition)
                .request_timeout(self.config.request_timeout)
                .request_counter(Arc::clone(&self.request_counter));

            if self.config.emit_records {
                builder = builder.record_tx(self.records_tx.clone());
            }

            let worker = builder.build()?;
            handles.push(tokio::spawn(worker.run(cancel.clone())));
        }
        drop(self.records_tx);

        let mut results: Vec<WorkerStats> = Vec::with_capacity(handles.len());
        let mut worker_failures = 0;
        let mut first_error = None;
        for (idx, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(Ok(stats)) => results.push(stats),
                Ok(Err(e)) => {
                    worker_failures += 1;
                    tracing::error!(worker_id = idx, error = %e, "Worker returned error");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    worker_failures += 1;
                    tracing::error!(worker_id = idx, error = %e, "Worker task panicked");
                }
            }
        }

        if results.is_empty() && worker_failures > 0 {
            return Err(first_error.unwrap_or_else(|| {
                BenchError::internal(format!("all {} workers failed", worker_failures))
            }));
        }

        let aggregated = aggregate_worker_stats(&results, start.elapsed());
        tracing::debug!(
            phase = self.config.name,
            elapsed_ms = aggregated.total_duration.as_millis() as u64,
            completed = aggregated.total_completed,
            errors = aggregated.total_errors,
            rps = aggregated.requests_per_second,
            "Phase finished"
        );

        Ok(aggregated)
    }
}

impl std::fmt::Debug for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Phase")
            .field("config", &self.config)
            .field("target", &self.target.name())
            .field("sampler", &self.sampler.name())
            .field("base_url", &self.base_url)
            .finish()
    }
}
