//! Warmup and measuring phases for one server

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::channel::ChannelConfig;
use crate::config::{MeasurementSpec, Warmup};
use crate::error::BenchResult;
use crate::metrics::Record;
use crate::traits::{Sampler, StopCondition, TargetClient};

use super::aggregator::AggregatedStats;
use super::builder::PhaseBuilder;

/// Output of one measuring phase
#[derive(Debug)]
pub struct Measurement {
    /// Every record emitted, in arrival order
    pub records: Vec<Record>,
    /// Worker counters
    pub stats: AggregatedStats,
    /// Phase start
    pub started_at: DateTime<Utc>,
    /// MEASURING wall clock
    pub elapsed: Duration,
    /// The token fired before the stop condition was met
    pub interrupted: bool,
}

/// Drives warmup and measuring phases against one target
#[derive(Clone)]
pub struct LoadGenerator {
    target: Arc<dyn TargetClient>,
    request_timeout: Duration,
    channel_config: ChannelConfig,
}

impl LoadGenerator {
    /// Create a generator with the given per-request deadline
    pub fn new(target: Arc<dyn TargetClient>, request_timeout: Duration) -> Self {
        Self {
            target,
            request_timeout,
            channel_config: ChannelConfig::default(),
        }
    }

    /// Override the record channel sizing
    pub fn with_channel_config(mut self, config: ChannelConfig) -> Self {
        self.channel_config = config;
        self
    }

    /// WARMING: exactly `warmup.requests` attempts from
    /// `warmup.concurrency` workers; no records are kept
    ///
    /// A disabled warmup returns empty stats without sending anything.
    pub async fn warmup(
        &self,
        base_url: &str,
        sampler: Arc<dyn Sampler>,
        warmup: Warmup,
        cancel: &CancellationToken,
    ) -> BenchResult<AggregatedStats> {
        if !warmup.is_enabled() {
            return Ok(AggregatedStats::default());
        }

        let (phase, _records) = PhaseBuilder::new("warmup")
            .concurrency(warmup.concurrency)
            .stop_condition(StopCondition::RequestCount(warmup.requests))
            .request_timeout(self.request_timeout)
            .target(Arc::clone(&self.target))
            .sampler(sampler)
            .base_url(base_url)
            .emit_records(false)
            .channel_config(self.channel_config.clone())
            .build()?;

        phase.run(cancel).await
    }

    /// MEASURING: exactly `capacity` workers until the class's stop
    /// condition is met or `cancel` fires
    ///
    /// Records are drained while the workers run so the bounded channel
    /// never stalls them.
    pub async fn measure(
        &self,
        base_url: &str,
        sampler: Arc<dyn Sampler>,
        capacity: usize,
        spec: &MeasurementSpec,
        cancel: &CancellationToken,
    ) -> BenchResult<Measurement> {
        let (phase, mut records_rx) = PhaseBuilder::new("measure")
            .concurrency(capacity)
            .stop_condition(spec.stop_condition())
            .rate_limit(spec.rate_limit)
            .request_timeout(self.request_timeout)
            .target(Arc::clone(&self.target))
            .sampler(sampler)
            .base_url(base_url)
            .emit_records(true)
            .channel_config(self.channel_config.clone())
            .build()?;

        let started_at = Utc::now();
        let start = Instant::now();

        let drain = async {
            let mut records = Vec::new();
            while let Some(record) = records_rx.recv().await {
                records.push(record);
            }
            records
        };
        let (stats, records) = tokio::join!(phase.run(cancel), drain);
        let stats = stats?;

        Ok(Measurement {
            records,
            stats,
            started_at,
            elapsed: start.elapsed(),
            interrupted: cancel.is_cancelled(),
        })
    }
}

impl std::fmt::Debug for LoadGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadGenerator")
            .field("target", &self.target.name())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
