//! Health probes
//!
//! [`wait_http_ready`] polls an application's readiness URL;
//! [`wait_stack_healthy`] polls the engine's per-service report for the
//! database stack. Both wake on cancellation within one poll interval.

use crate::cancel::Deadline;
use crate::error::FailureKind;
use crate::request::HttpRequest;
use crate::response::{ServiceState, StackHealth};
use crate::traits::{ContainerDriver, DriverError, TargetClient};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Polling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    /// Give up after this long
    pub timeout: Duration,
    /// Pause between attempts
    pub interval: Duration,
    /// Deadline for a single HTTP attempt
    pub request_timeout: Duration,
}

impl ProbeSettings {
    /// Settings with the default 2s per-attempt deadline
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            request_timeout: Duration::from_secs(2),
        }
    }
}

/// Probe failures
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// Readiness never reached
    #[error("{target} not ready after {waited:?}: {last}")]
    NotReady {
        /// URL or project probed
        target: String,
        /// Time spent polling
        waited: Duration,
        /// Last observed failure
        last: String,
    },

    /// Some required services never appeared
    #[error("stack incomplete, never saw: {}", .missing.join(", "))]
    StackIncomplete {
        /// Services missing in every snapshot
        missing: Vec<String>,
        /// Last snapshot
        snapshot: StackHealth,
    },

    /// Services present but not all healthy at the deadline
    #[error("stack not healthy after {waited:?}: {}", .snapshot.describe())]
    StackUnhealthy {
        /// Time spent polling
        waited: Duration,
        /// Last snapshot
        snapshot: StackHealth,
    },

    /// Cancelled while polling
    #[error("probe cancelled")]
    Cancelled,

    /// Engine failure that retrying cannot fix
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl ProbeError {
    /// Map onto the failure taxonomy
    pub fn to_failure_kind(&self) -> FailureKind {
        match self {
            ProbeError::NotReady { .. } | ProbeError::StackUnhealthy { .. } => {
                FailureKind::NotReady
            }
            ProbeError::StackIncomplete { .. } => FailureKind::StackIncomplete,
            ProbeError::Cancelled => FailureKind::Cancelled,
            ProbeError::Driver(e) => e.to_failure_kind(),
        }
    }
}

/// Poll `url` until it answers 2xx
///
/// Transport errors count as not ready. The client reads every body to the
/// end, so each response is released before the next attempt.
pub async fn wait_http_ready(
    client: &dyn TargetClient,
    url: &str,
    settings: ProbeSettings,
    cancel: &CancellationToken,
) -> Result<Duration, ProbeError> {
    let started = Instant::now();
    let deadline = started + settings.timeout;
    let mut attempts = 0usize;
    let mut last = String::from("no attempt made");

    loop {
        if cancel.is_cancelled() {
            return Err(ProbeError::Cancelled);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let attempt_timeout = settings
            .request_timeout
            .min(remaining.max(Duration::from_millis(1)));
        let request = HttpRequest::get(url, attempt_timeout);
        attempts += 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
            outcome = client.send(&request) => outcome,
        };

        match outcome {
            Ok(reply) if reply.is_2xx() => {
                tracing::debug!(url, attempts, "Readiness probe passed");
                return Ok(started.elapsed());
            }
            Ok(reply) => last = format!("status {}", reply.status),
            Err(e) => last = e.to_string(),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(ProbeError::NotReady {
                target: url.to_string(),
                waited: started.elapsed(),
                last,
            });
        }

        let pause = settings.interval.min(deadline - now);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
            _ = tokio::time::sleep(pause) => {}
        }
    }
}

/// Poll the stack until every required service is UP_HEALTHY
///
/// At the deadline, services that were MISSING in every snapshot yield
/// STACK_INCOMPLETE; otherwise the last snapshot is returned as NOT_READY.
/// An unreachable engine aborts immediately; other engine errors are
/// retried. Each query is bounded by the time left, and one that overruns
/// counts as a failed poll.
pub async fn wait_stack_healthy(
    driver: &dyn ContainerDriver,
    project: &str,
    required: &[String],
    settings: ProbeSettings,
    cancel: &CancellationToken,
) -> Result<StackHealth, ProbeError> {
    let started = Instant::now();
    let deadline = started + settings.timeout;
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut snapshot = StackHealth::all_missing(required);

    loop {
        if cancel.is_cancelled() {
            return Err(ProbeError::Cancelled);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let query = Deadline::new(cancel, remaining.max(Duration::from_millis(1)));
        let outcome = tokio::select! {
            biased;
            _ = query.token().cancelled() => Err(DriverError::Cancelled),
            outcome = driver.query_stack_health(project, required, query.token()) => outcome,
        };

        match outcome {
            Ok(health) => snapshot = health,
            Err(DriverError::Cancelled) if query.is_interrupted() => {
                return Err(ProbeError::Cancelled)
            }
            Err(DriverError::Cancelled) => {
                tracing::warn!(project, timeout = ?query.timeout(), "Stack health query timed out")
            }
            Err(e @ DriverError::EngineUnavailable(_)) => return Err(e.into()),
            Err(e) => tracing::warn!(project, error = %e, "Stack health query failed"),
        }

        for (service, state) in &snapshot.services {
            if *state != ServiceState::Missing {
                seen.insert(service.clone());
            }
        }

        if required.iter().all(|s| snapshot.state(s) == ServiceState::UpHealthy) {
            tracing::info!(
                project,
                waited_ms = started.elapsed().as_millis() as u64,
                "Stack healthy"
            );
            return Ok(snapshot);
        }

        tracing::debug!(project, services = %snapshot.describe(), "Stack not healthy yet");

        let now = Instant::now();
        if now >= deadline {
            let missing: Vec<String> = required
                .iter()
                .filter(|s| !seen.contains(*s))
                .cloned()
                .collect();
            return Err(if missing.is_empty() {
                ProbeError::StackUnhealthy {
                    waited: started.elapsed(),
                    snapshot,
                }
            } else {
                ProbeError::StackIncomplete { missing, snapshot }
            });
        }

        let pause = settings.interval.min(deadline - now);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
            _ = tokio::time::sleep(pause) => {}
        }
    }
}
