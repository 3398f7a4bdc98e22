//! Builder pattern for Phase construction

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::channel::ChannelConfig;
use crate::error::{BenchError, BenchResult};
use crate::metrics::Record;
use crate::traits::{Sampler, StopCondition, TargetClient};

use super::executor::{Phase, PhaseConfig};

/// Builder for one load phase
///
/// # Example
///
/// ```ignore
/// let (phase, records_rx) = PhaseBuilder::new("measure")
///     .concurrency(16)
///     .stop_condition(StopCondition::RequestCount(1000))
///     .target(target)
///     .sampler(sampler)
///     .base_url("http://127.0.0.1:8080")
///     .emit_records(true)
///     .build()?;
/// ```
pub struct PhaseBuilder {
    config: PhaseConfig,
    target: Option<Arc<dyn TargetClient>>,
    sampler: Option<Arc<dyn Sampler>>,
    base_url: Option<String>,
    channel_config: ChannelConfig,
}

impl PhaseBuilder {
    /// Create a builder for a phase labelled `name` in logs
    pub fn new(name: &'static str) -> Self {
        Self {
            config: PhaseConfig::new(name),
            target: None,
            sampler: None,
            base_url: None,
            channel_config: ChannelConfig::default(),
        }
    }

    /// Set the number of workers
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    /// Set the stop condition
    pub fn stop_condition(mut self, stop: StopCondition) -> Self {
        self.config.stop_condition = stop;
        self
    }

    /// Set the phase-wide rate limit (requests per second)
    pub fn rate_limit(mut self, rps: Option<f64>) -> Self {
        self.config.rate_limit = rps;
        self
    }

    /// Set the per-request deadline
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Emit a record per attempt
    pub fn emit_records(mut self, emit: bool) -> Self {
        self.config.emit_records = emit;
        self
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
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the channel configuration
    pub fn channel_config(mut self, config: ChannelConfig) -> Self {
        self.channel_config = config;
        self
    }

    /// Build the phase and return it along with the record receiver
    ///
    /// The receiver closes once the phase has finished and every worker
    /// has dropped its sender.
    ///
    /// # Errors
    ///
    /// Returns an error if target, sampler or base URL are not set, or if
    /// the configuration is invalid.
    pub fn build(self) -> BenchResult<(Phase, mpsc::Receiver<Record>)> {
        let target = self
            .target
            .ok_or_else(|| BenchError::missing_config("target"))?;
        let sampler = self
            .sampler
            .ok_or_else(|| BenchError::missing_config("sampler"))?;
        let base_url = self
            .base_url
            .ok_or_else(|| BenchError::missing_config("base_url"))?;

        self.config.validate()?;

        let (records_tx, records_rx) = mpsc::channel(self.channel_config.records_buffer);
        let phase = Phase::new(self.config, target, sampler, base_url.into(), records_tx);

        Ok((phase, records_rx))
    }
}
