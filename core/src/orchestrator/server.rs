//! Lifecycle of one server inside PER_SERVER_LOOP

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cancel::Deadline;
use crate::config::{ResourceClass, ServerSpec};
use crate::error::{BenchError, BenchResult, FailureKind};
use crate::manifest::{ServerReport, ServerStatus};
use crate::metrics::{CellMeta, CellRollup, CellStatus, ResourceUsage};
use crate::probe::{wait_http_ready, ProbeError, ProbeSettings};
use crate::request::{RouteRequest, SeededUsers};
use crate::response::{ContainerHandle, ContainerStats};
use crate::traits::{ContainerDriver, DriverError, SinkError};

use super::executor::Orchestrator;
use super::state::RunPhase;

const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// Servers reject seed users whose favoriteNumber exceeds this
const MAX_FAVORITE_NUMBER: usize = 100;

/// One pass through STARTING_CONTAINER … DONE
pub(crate) struct ServerRun<'a> {
    orch: &'a Orchestrator,
    spec: &'a ServerSpec,
    phase: RunPhase,
    handle: Option<ContainerHandle>,
    begun: bool,
    rollups: Vec<CellRollup>,
}

impl<'a> ServerRun<'a> {
    pub(crate) fn new(orch: &'a Orchestrator, spec: &'a ServerSpec) -> Self {
        Self {
            orch,
            spec,
            phase: RunPhase::Pending,
            handle: None,
            begun: false,
            rollups: Vec::new(),
        }
    }

    /// Drive the server to DONE; the container is always killed
    pub(crate) async fn run(mut self) -> ServerReport {
        tracing::info!(server = %self.spec.name, image = %self.spec.image, "Benchmarking server");

        let result = self.drive().await;
        let mut failure = match result {
            Ok(()) => {
                self.enter(RunPhase::Completed);
                None
            }
            Err(e) => {
                self.enter(RunPhase::Failed);
                Some(e)
            }
        };

        self.enter(RunPhase::TearingDown);
        self.teardown().await;

        if self.begun {
            if let Err(e) = self
                .orch
                .sink
                .write_rollups(&self.spec.name, &self.rollups)
                .await
            {
                tracing::error!(server = %self.spec.name, error = %e, "Failed to write rollups");
                if failure.is_none() {
                    failure = Some(sink_error(e));
                }
            }
        }

        self.enter(RunPhase::Done);
        self.report(failure)
    }

    async fn drive(&mut self) -> BenchResult<()> {
        self.start_container().await?;
        self.wait_ready().await?;

        let seeded = self.prepare_backends().await?;

        self.warm().await?;
        self.measure_matrix(&seeded).await
    }

    async fn start_container(&mut self) -> BenchResult<()> {
        self.enter(RunPhase::StartingContainer);
        self.orch
            .sink
            .begin_server(&self.spec.name)
            .await
            .map_err(sink_error)?;
        self.begun = true;

        let network = self.orch.plan.stack.as_ref().and_then(|s| s.network());
        let deadline = Deadline::new(&self.orch.cancel, self.orch.plan.timeouts.container_start());
        match self
            .orch
            .driver
            .start_app(self.spec, network.as_deref(), deadline.token())
            .await
        {
            Ok(handle) => {
                tracing::info!(
                    server = %self.spec.name,
                    container = %handle.id,
                    port = self.spec.host_port,
                    "Container started"
                );
                self.handle = Some(handle);
                Ok(())
            }
            Err(DriverError::Cancelled) => Err(cut_short(&deadline, "container start")),
            Err(e) => Err(BenchError::new(e.to_failure_kind(), e.to_string())),
        }
    }

    async fn wait_ready(&mut self) -> BenchResult<()> {
        self.enter(RunPhase::WaitingReady);
        let settings = ProbeSettings::new(
            self.orch.plan.timeouts.readiness(),
            self.orch.plan.settings.poll_interval(),
        );
        let url = self.spec.readiness_url();
        match wait_http_ready(self.orch.target.as_ref(), &url, settings, &self.orch.cancel).await {
            Ok(waited) => {
                tracing::info!(
                    server = %self.spec.name,
                    waited_ms = waited.as_millis() as u64,
                    "Server ready"
                );
                Ok(())
            }
            Err(ProbeError::Cancelled) => Err(BenchError::cancelled()),
            Err(e) => Err(BenchError::new(e.to_failure_kind(), e.to_string())),
        }
    }

    /// Reset and seed the backends the IO routes will hit
    async fn prepare_backends(&mut self) -> BenchResult<SeededUsers> {
        let mut seeded = SeededUsers::new();
        let orch = self.orch;
        let plan = &orch.plan;
        if !plan.resources.iter().any(ResourceClass::needs_backends) {
            return Ok(seeded);
        }

        let base_url = self.spec.base_url();
        let timeout = plan.settings.request_timeout();

        if plan.settings.reset_databases {
            for backend in &plan.backends {
                self.check_cancel()?;
                let request = RouteRequest::delete(format!("/db/{}/reset", backend))
                    .bind(&base_url, timeout);
                match orch.target.send(&request).await {
                    Ok(reply) if reply.is_2xx() => {
                        tracing::debug!(server = %self.spec.name, backend = %backend, "Backend reset");
                    }
                    Ok(reply) => {
                        return Err(BenchError::new(
                            FailureKind::ResetFailed,
                            format!("reset {} returned HTTP {}", backend, reply.status),
                        ));
                    }
                    Err(e) => {
                        return Err(BenchError::new(
                            FailureKind::ResetFailed,
                            format!("reset {}: {}", backend, e),
                        ));
                    }
                }
            }
        }

        if plan.settings.seed_users > 0 {
            for backend in &plan.backends {
                for n in 0..plan.settings.seed_users {
                    self.check_cancel()?;
                    let body = serde_json::json!({
                        "name": format!("bench-user-{}", n),
                        "email": format!("bench-user-{}@example.com", n),
                        "favoriteNumber": n % (MAX_FAVORITE_NUMBER + 1),
                    });
                    let request = RouteRequest::post_json(format!("/db/{}/users", backend), body)
                        .bind(&base_url, timeout);
                    match orch.target.send(&request).await {
                        Ok(reply) if reply.is_2xx() => {
                            if let Some(id) = parse_user_id(&reply.body) {
                                seeded.push(backend, id);
                            }
                        }
                        Ok(reply) => {
                            tracing::debug!(backend = %backend, status = reply.status, "Seed rejected");
                        }
                        Err(e) => {
                            tracing::debug!(backend = %backend, error = %e, "Seed request failed");
                        }
                    }
                }
                if seeded.ids_for(backend).is_none() {
                    return Err(BenchError::new(
                        FailureKind::SeedFailed,
                        format!("no user could be created on {}", backend),
                    ));
                }
                tracing::info!(
                    server = %self.spec.name,
                    backend = %backend,
                    users = seeded.ids_for(backend).map_or(0, |ids| ids.len()),
                    "Backend seeded"
                );
            }
        }

        Ok(seeded)
    }

    async fn warm(&mut self) -> BenchResult<()> {
        let warmup = self.orch.plan.warmup;
        if !warmup.is_enabled() {
            return Ok(());
        }
        self.enter(RunPhase::Warming);

        let deadline = Deadline::new(&self.orch.cancel, self.orch.plan.timeouts.warmup());
        let stats = self
            .orch
            .loadgen
            .warmup(
                &self.spec.base_url(),
                self.orch.samplers.warmup(),
                warmup,
                deadline.token(),
            )
            .await?;

        if deadline.is_interrupted() {
            return Err(BenchError::cancelled());
        }
        if deadline.is_expired() {
            return Err(BenchError::new(
                FailureKind::WarmupFailed,
                format!("warmup exceeded {:?}", deadline.timeout()),
            ));
        }
        if stats.total_completed == 0 {
            return Err(BenchError::new(
                FailureKind::WarmupFailed,
                format!(
                    "all {} warmup requests failed (connect {}, timeout {}, protocol {}, status {})",
                    stats.total_requests(),
                    stats.errors_by_kind.connect,
                    stats.errors_by_kind.timeout,
                    stats.errors_by_kind.protocol,
                    stats.errors_by_kind.status,
                ),
            ));
        }

        tracing::info!(
            server = %self.spec.name,
            requests = stats.total_requests(),
            errors = stats.total_errors,
            "Warmup complete"
        );
        Ok(())
    }

    async fn measure_matrix(&mut self, seeded: &SeededUsers) -> BenchResult<()> {
        self.enter(RunPhase::Measuring);
        let orch = self.orch;
        let plan = &orch.plan;
        let base_url = self.spec.base_url();

        for (resource, capacity) in plan.cells() {
            self.check_cancel()?;

            let sampler = self
                .orch
                .samplers
                .measurement(resource, &plan.backends, seeded)
                .map_err(|e| BenchError::sampler(e.to_string()))?;

            tracing::info!(
                server = %self.spec.name,
                resource = %resource,
                capacity,
                "Measuring cell"
            );

            let deadline = Deadline::new(&self.orch.cancel, plan.timeouts.cell());
            let sampling = self.start_sampling(deadline.token());
            let measurement = self
                .orch
                .loadgen
                .measure(
                    &base_url,
                    sampler,
                    capacity,
                    plan.measurement.for_class(resource),
                    deadline.token(),
                )
                .await;
            let samples = stop_sampling(sampling).await;
            let measurement = measurement?;

            let status = if deadline.is_interrupted() {
                CellStatus::Interrupted
            } else if deadline.is_expired() {
                CellStatus::TimedOut
            } else {
                CellStatus::Complete
            };

            let file_name = CellRollup::records_file_name(resource, capacity);
            let written = self
                .orch
                .sink
                .write_records(&self.spec.name, &file_name, &measurement.records)
                .await
                .map_err(sink_error)?;

            let meta = CellMeta {
                server: self.spec.name.clone(),
                resource,
                capacity,
                status,
                started_at: measurement.started_at,
                elapsed: measurement.elapsed,
            };
            let mut rollup = CellRollup::from_records(meta, &measurement.records);
            rollup.resources = ResourceUsage::from_samples(&samples);
            debug_assert_eq!(written, rollup.count);

            tracing::info!(
                server = %self.spec.name,
                resource = %resource,
                capacity,
                status = ?status,
                count = rollup.count,
                errors = rollup.errors.total(),
                rps = rollup.requests_per_second,
                p50_ms = rollup.latency_ms.p50,
                p99_ms = rollup.latency_ms.p99,
                "Cell finished"
            );
            self.rollups.push(rollup);

            match status {
                CellStatus::Complete => {}
                CellStatus::Interrupted => return Err(BenchError::cancelled()),
                CellStatus::TimedOut => {
                    return Err(BenchError::timeout(
                        &format!("{} c{}", resource.as_str(), capacity),
                        deadline.timeout(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Poll container usage once a second until `cell` fires or the
    /// returned token is cancelled
    fn start_sampling(
        &self,
        cell: &CancellationToken,
    ) -> Option<(CancellationToken, JoinHandle<Vec<ContainerStats>>)> {
        if !self.orch.plan.settings.sample_resources {
            return None;
        }
        let handle = self.handle.clone()?;
        let token = cell.child_token();
        let driver: Arc<dyn ContainerDriver> = Arc::clone(&self.orch.driver);
        let task_token = token.clone();

        let task = tokio::spawn(async move {
            let mut samples = Vec::new();
            let mut ticker = tokio::time::interval(STATS_INTERVAL);
            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match driver.stats(&handle, &task_token).await {
                    Ok(sample) => samples.push(sample),
                    Err(DriverError::Cancelled) => break,
                    Err(e) => tracing::debug!(container = %handle.id, error = %e, "Stats sample failed"),
                }
            }
            samples
        });
        Some((token, task))
    }

    /// TEARING_DOWN under a fresh token so cancellation cannot skip the kill
    async fn teardown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let fresh = CancellationToken::new();
        let deadline = Deadline::new(&fresh, self.orch.plan.timeouts.teardown());
        match self.orch.driver.kill(&handle, deadline.token()).await {
            Ok(()) => tracing::info!(server = %handle.server, container = %handle.id, "Container stopped"),
            Err(e) => tracing::warn!(
                server = %handle.server,
                container = %handle.id,
                error = %e,
                "Failed to stop container"
            ),
        }
    }

    fn report(&self, failure: Option<BenchError>) -> ServerReport {
        let (status, reason, detail) = match failure {
            None => (ServerStatus::Completed, None, None),
            Some(e) if e.kind == FailureKind::Cancelled => {
                (ServerStatus::Interrupted, Some(e.kind), Some(e.message))
            }
            Some(e) => {
                tracing::error!(
                    server = %self.spec.name,
                    reason = %e.kind,
                    error = %e.message,
                    "Server failed"
                );
                (ServerStatus::Failed, Some(e.kind), Some(e.message))
            }
        };

        ServerReport {
            name: self.spec.name.clone(),
            status,
            reason,
            detail,
            cells: self.rollups.len(),
            requests: self.rollups.iter().map(|r| r.count).sum(),
            errors: self.rollups.iter().map(|r| r.errors.total()).sum(),
            best_rps: self
                .rollups
                .iter()
                .map(|r| r.requests_per_second)
                .fold(0.0, f64::max),
        }
    }

    fn check_cancel(&self) -> BenchResult<()> {
        if self.orch.cancel.is_cancelled() {
            return Err(BenchError::cancelled());
        }
        Ok(())
    }

    fn enter(&mut self, phase: RunPhase) {
        tracing::info!(server = %self.spec.name, from = %self.phase, to = %phase, "Phase transition");
        self.phase = phase;
    }
}

async fn stop_sampling(
    sampling: Option<(CancellationToken, JoinHandle<Vec<ContainerStats>>)>,
) -> Vec<ContainerStats> {
    let Some((token, task)) = sampling else {
        return Vec::new();
    };
    token.cancel();
    match task.await {
        Ok(samples) => samples,
        Err(e) => {
            tracing::warn!(error = %e, "Stats sampler task failed");
            Vec::new()
        }
    }
}

/// Distinguish a parent cancel from an elapsed deadline
fn cut_short(deadline: &Deadline, phase: &str) -> BenchError {
    if deadline.is_interrupted() {
        BenchError::cancelled()
    } else {
        BenchError::timeout(phase, deadline.timeout())
    }
}

fn sink_error(e: SinkError) -> BenchError {
    BenchError::new(FailureKind::Io, e.to_string())
}

/// Extract `id` from a user creation response
///
/// String ids (UUID, ObjectId hex) are kept as-is; numeric ids are
/// rendered in decimal.
pub(crate) fn parse_user_id(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    match value.get("id")? {
        serde_json::Value::String(s) => {
            let id = s.trim();
            (!id.is_empty()).then(|| id.to_string())
        }
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
