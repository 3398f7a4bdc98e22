//! Builder pattern for Orchestrator construction

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::channel::ChannelConfig;
use crate::config::RunPlan;
use crate::error::{BenchError, BenchResult};
use crate::traits::{ContainerDriver, ResultSink, SamplerProvider, TargetClient};

use super::executor::Orchestrator;

/// Builder for creating an Orchestrator
///
/// # Example
///
/// ```ignore
/// let orchestrator = OrchestratorBuilder::new()
///     .plan(plan)
///     .driver(Arc::new(DockerDriver::new(DockerConfig::default())))
///     .target(Arc::new(HttpTarget::new(&HttpConfig::default())?))
///     .samplers(Arc::new(RouteSamplers::new(&plan.settings)))
///     .sink(Arc::new(LocalResultSink::new(&plan.results_root, Utc::now())))
///     .cancel(root_token.clone())
///     .build()?;
/// ```
pub struct OrchestratorBuilder {
    plan: Option<RunPlan>,
    driver: Option<Arc<dyn ContainerDriver>>,
    target: Option<Arc<dyn TargetClient>>,
    samplers: Option<Arc<dyn SamplerProvider>>,
    sink: Option<Arc<dyn ResultSink>>,
    cancel: CancellationToken,
    channel_config: ChannelConfig,
}

impl OrchestratorBuilder {
    /// Create a new builder with a fresh root token
    pub fn new() -> Self {
        Self {
            plan: None,
            driver: None,
            target: None,
            samplers: None,
            sink: None,
            cancel: CancellationToken::new(),
            channel_config: ChannelConfig::default(),
        }
    }

    /// Set the validated run plan
    pub fn plan(mut self, plan: RunPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    /// Set the container driver
    pub fn driver(mut self, driver: Arc<dyn ContainerDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Set the HTTP client used against servers
    pub fn target(mut self, target: Arc<dyn TargetClient>) -> Self {
        self.target = Some(target);
        self
    }

    /// Set the sampler provider
    pub fn samplers(mut self, samplers: Arc<dyn SamplerProvider>) -> Self {
        self.samplers = Some(samplers);
        self
    }

    /// Set the result sink
    pub fn sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Set the root cancellation token
    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Set the record channel configuration
    pub fn channel_config(mut self, config: ChannelConfig) -> Self {
        self.channel_config = config;
        self
    }

    /// Build the orchestrator
    ///
    /// # Errors
    ///
    /// Returns an error if any collaborator or the plan is missing, or the
    /// plan has no server.
    pub fn build(self) -> BenchResult<Orchestrator> {
        let plan = self.plan.ok_or_else(|| BenchError::missing_config("plan"))?;
        let driver = self
            .driver
            .ok_or_else(|| BenchError::missing_config("driver"))?;
        let target = self
            .target
            .ok_or_else(|| BenchError::missing_config("target"))?;
        let samplers = self
            .samplers
            .ok_or_else(|| BenchError::missing_config("samplers"))?;
        let sink = self.sink.ok_or_else(|| BenchError::missing_config("sink"))?;

        if plan.servers.is_empty() {
            return Err(BenchError::new(
                crate::error::FailureKind::ConfigEmpty,
                "run plan has no server",
            ));
        }

        Ok(Orchestrator::new(
            plan,
            driver,
            target,
            samplers,
            sink,
            self.cancel,
            self.channel_config,
        ))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
