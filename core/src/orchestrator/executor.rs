//! Orchestrator execution logic

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::cancel::{sleep_or_cancel, Deadline};
use crate::channel::ChannelConfig;
use crate::config::RunPlan;
use crate::error::FailureKind;
use crate::loadgen::LoadGenerator;
use crate::manifest::{Manifest, RunOutcome, ServerReport};
use crate::probe::{wait_stack_healthy, ProbeError, ProbeSettings};
use crate::traits::{ContainerDriver, DriverError, ResultSink, SamplerProvider, TargetClient};

use super::server::ServerRun;
use super::state::{RunSummary, Stage};

/// Orchestrator drives one benchmark run end to end
///
/// INIT → STACK_UP → PER_SERVER_LOOP → STACK_DOWN → EXIT. The stack is
/// torn down on every path that can still run code, and each server's
/// container is killed before the next one starts.
pub struct Orchestrator {
    pub(crate) plan: RunPlan,
    pub(crate) driver: Arc<dyn ContainerDriver>,
    pub(crate) target: Arc<dyn TargetClient>,
    pub(crate) samplers: Arc<dyn SamplerProvider>,
    pub(crate) sink: Arc<dyn ResultSink>,
    pub(crate) cancel: CancellationToken,
    pub(crate) loadgen: LoadGenerator,
}

impl Orchestrator {
    /// Create a new orchestrator
    ///
    /// Use `OrchestratorBuilder` for a more ergonomic construction.
    pub fn new(
        plan: RunPlan,
        driver: Arc<dyn ContainerDriver>,
        target: Arc<dyn TargetClient>,
        samplers: Arc<dyn SamplerProvider>,
        sink: Arc<dyn ResultSink>,
        cancel: CancellationToken,
        channel_config: ChannelConfig,
    ) -> Self {
        let loadgen = LoadGenerator::new(Arc::clone(&target), plan.settings.request_timeout())
            .with_channel_config(channel_config);
        Self {
            plan,
            driver,
            target,
            samplers,
            sink,
            cancel,
            loadgen,
        }
    }

    /// Get the run plan
    pub fn plan(&self) -> &RunPlan {
        &self.plan
    }

    /// Root cancellation token
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run every stage and write the manifest
    ///
    /// Never returns an error: every failure is folded into the summary's
    /// outcome and per-server reports.
    pub async fn run(&self) -> RunSummary {
        let started_at = Utc::now();
        let mut reports: Vec<ServerReport> = self
            .plan
            .servers
            .iter()
            .map(|s| ServerReport::skipped(&s.name))
            .collect();

        tracing::info!(
            servers = self.plan.servers.len(),
            cells = self.plan.cells().len(),
            engine = self.driver.engine_name(),
            "Starting benchmark run"
        );

        let (mut outcome, engine_version) = self.execute(&mut reports).await;

        self.enter(Stage::StackDown);
        self.stack_down().await;

        if outcome == RunOutcome::Completed && self.cancel.is_cancelled() {
            outcome = RunOutcome::Cancelled;
        }

        let ended_at = Utc::now();
        let manifest = Manifest {
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            engine_version,
            started_at,
            ended_at,
            plan: self.plan.clone(),
            outcome,
            servers: reports.clone(),
        };
        if let Err(e) = self.sink.write_manifest(&manifest).await {
            tracing::error!(error = %e, "Failed to write manifest");
            if outcome == RunOutcome::Completed {
                outcome = RunOutcome::InternalError;
            }
        }

        self.enter(Stage::Exit);
        tracing::info!(
            outcome = ?outcome,
            exit_code = outcome.exit_code(),
            run_dir = %self.sink.run_dir().display(),
            "Benchmark run finished"
        );

        RunSummary {
            outcome,
            servers: reports,
            run_dir: self.sink.run_dir().to_path_buf(),
            started_at,
            ended_at,
        }
    }

    /// Run with Ctrl+C and SIGTERM handling
    ///
    /// Either signal cancels the root token; teardown still runs.
    pub async fn run_with_signal_handling(&self) -> RunSummary {
        let cancel = self.cancel.clone();

        let signal_handle = tokio::spawn(async move {
            wait_for_signal().await;
            tracing::warn!("Received shutdown signal, cancelling run");
            cancel.cancel();
        });

        let summary = self.run().await;

        signal_handle.abort();

        summary
    }

    /// INIT, STACK_UP and PER_SERVER_LOOP
    async fn execute(&self, reports: &mut [ServerReport]) -> (RunOutcome, Option<String>) {
        self.enter(Stage::Init);
        let engine_version = {
            let deadline = Deadline::new(&self.cancel, self.plan.timeouts.stack_command());
            match self.driver.engine_version(deadline.token()).await {
                Ok(version) => version,
                Err(DriverError::Cancelled) if deadline.is_interrupted() => {
                    return (RunOutcome::Cancelled, None);
                }
                Err(e) => {
                    tracing::error!(
                        engine = self.driver.engine_name(),
                        reason = %e.to_failure_kind(),
                        error = %e,
                        "Container engine unavailable"
                    );
                    return (RunOutcome::InternalError, None);
                }
            }
        };
        tracing::info!(
            engine = self.driver.engine_name(),
            version = %engine_version,
            "Container engine ready"
        );
        let engine_version = Some(engine_version);

        if let Some(stack) = &self.plan.stack {
            self.enter(Stage::StackUp);
            if let Err(outcome) = self.stack_up(stack).await {
                return (outcome, engine_version);
            }
        }

        self.enter(Stage::PerServerLoop);
        for (index, spec) in self.plan.servers.iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            if index > 0 {
                let cooldown = self.plan.settings.cooldown();
                tracing::info!(cooldown_ms = cooldown.as_millis() as u64, "Cooling down");
                if !sleep_or_cancel(cooldown, &self.cancel).await {
                    break;
                }
                // the previous server's load may have taken a database down
                if let Some(stack) = &self.plan.stack {
                    tracing::info!(
                        project = %stack.project_name,
                        next = %spec.name,
                        "Verifying database stack"
                    );
                    if let Err(outcome) = self.verify_stack(stack).await {
                        return (outcome, engine_version);
                    }
                }
            }

            reports[index] = ServerRun::new(self, spec).run().await;
        }

        let outcome = if self.cancel.is_cancelled() {
            RunOutcome::Cancelled
        } else {
            RunOutcome::Completed
        };
        (outcome, engine_version)
    }

    async fn stack_up(&self, stack: &crate::config::StackSpec) -> Result<(), RunOutcome> {
        {
            let deadline = Deadline::new(&self.cancel, self.plan.timeouts.stack_command());
            if let Err(e) = self
                .driver
                .start_stack(&stack.compose_file, &stack.project_name, deadline.token())
                .await
            {
                if deadline.is_interrupted() {
                    return Err(RunOutcome::Cancelled);
                }
                tracing::error!(
                    project = %stack.project_name,
                    reason = %e.to_failure_kind(),
                    error = %e,
                    "Failed to start database stack"
                );
                return Err(RunOutcome::StackUnhealthy);
            }
        }

        self.verify_stack(stack).await
    }

    /// Wait until every required service reports UP_HEALTHY
    async fn verify_stack(&self, stack: &crate::config::StackSpec) -> Result<(), RunOutcome> {
        let settings = ProbeSettings::new(
            self.plan.timeouts.stack_healthy(),
            self.plan.settings.poll_interval(),
        );
        match wait_stack_healthy(
            self.driver.as_ref(),
            &stack.project_name,
            &stack.required_services,
            settings,
            &self.cancel,
        )
        .await
        {
            Ok(health) => {
                tracing::info!(services = %health.describe(), "Database stack healthy");
                Ok(())
            }
            Err(ProbeError::Cancelled) => Err(RunOutcome::Cancelled),
            Err(e) => {
                let kind = e.to_failure_kind();
                tracing::error!(
                    project = %stack.project_name,
                    reason = %kind,
                    error = %e,
                    "Database stack unhealthy"
                );
                if kind == FailureKind::EngineUnavailable {
                    return Err(RunOutcome::InternalError);
                }
                Err(RunOutcome::StackUnhealthy)
            }
        }
    }

    /// STACK_DOWN runs under its own token so a cancelled run still cleans up
    async fn stack_down(&self) {
        let Some(stack) = &self.plan.stack else {
            return;
        };
        let fresh = CancellationToken::new();
        let deadline = Deadline::new(&fresh, self.plan.timeouts.teardown());
        match self
            .driver
            .stop_stack(&stack.project_name, deadline.token())
            .await
        {
            Ok(()) => tracing::info!(project = %stack.project_name, "Database stack stopped"),
            Err(e) => tracing::warn!(
                project = %stack.project_name,
                error = %e,
                "Failed to stop database stack"
            ),
        }
    }

    fn enter(&self, stage: Stage) {
        tracing::info!(stage = %stage, "Entering stage");
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    if let Err(e) = res {
                        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                        sigterm.recv().await;
                    }
                }
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for SIGTERM");
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("servers", &self.plan.servers.len())
            .field("driver", &self.driver.engine_name())
            .field("target", &self.target.name())
            .field("run_dir", &self.sink.run_dir())
            .finish()
    }
}
