//! Core traits for the container engine, the HTTP target, route samplers and
//! the result sink
//!
//! These traits are defined in core so the orchestrator depends only on
//! trait objects. Implementations live in their respective crates
//! (drivers/, samplers/, storage/).

use crate::config::{ResourceClass, ServerSpec};
use crate::error::FailureKind;
use crate::manifest::Manifest;
use crate::metrics::{CellRollup, Record};
use crate::request::{HttpRequest, RouteRequest, SeededUsers};
use crate::response::{ContainerHandle, ContainerStats, ErrorKind, HttpReply, StackHealth};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Container Driver Trait
// ============================================================================

/// Abstract interface over a container engine
///
/// Every operation takes a cancellation token and must return promptly once
/// it fires, after terminating any child process it started.
#[async_trait]
pub trait ContainerDriver: Send + Sync {
    /// Engine identifier (e.g., "docker")
    fn engine_name(&self) -> &str;

    /// Server version of the engine; fails with ENGINE_UNAVAILABLE
    async fn engine_version(&self, cancel: &CancellationToken) -> Result<String, DriverError>;

    /// Run `spec` detached with its port published and auto-removal on exit
    ///
    /// `network` joins the container to an existing engine network.
    async fn start_app(
        &self,
        spec: &ServerSpec,
        network: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ContainerHandle, DriverError>;

    /// Kill a container; a handle that is already gone is not an error
    async fn kill(
        &self,
        handle: &ContainerHandle,
        cancel: &CancellationToken,
    ) -> Result<(), DriverError>;

    /// Bring a declarative multi-service stack up
    async fn start_stack(
        &self,
        compose_file: &Path,
        project: &str,
        cancel: &CancellationToken,
    ) -> Result<(), DriverError>;

    /// Bring a stack down; idempotent, no-op if never started
    async fn stop_stack(&self, project: &str, cancel: &CancellationToken)
        -> Result<(), DriverError>;

    /// Per-service state of `required`
    async fn query_stack_health(
        &self,
        project: &str,
        required: &[String],
        cancel: &CancellationToken,
    ) -> Result<StackHealth, DriverError>;

    /// One CPU/memory sample of a running container
    async fn stats(
        &self,
        handle: &ContainerHandle,
        cancel: &CancellationToken,
    ) -> Result<ContainerStats, DriverError>;
}

/// Container engine errors
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Engine binary missing or daemon unreachable
    #[error("container engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Image not present locally
    #[error("image not found: {0}")]
    ImageMissing(String),

    /// Host port already allocated
    #[error("host port {port} is busy: {detail}")]
    PortBusy {
        /// Port that was requested
        port: u16,
        /// Engine message
        detail: String,
    },

    /// Command exited non-zero
    #[error("`{command}` failed (exit {code:?}): {stderr}")]
    CommandFailed {
        /// Command line, for diagnostics
        command: String,
        /// Exit code if the process exited normally
        code: Option<i32>,
        /// Trimmed stderr
        stderr: String,
    },

    /// Engine output could not be parsed
    #[error("unexpected engine output: {0}")]
    Parse(String),

    /// The token fired while the command ran
    #[error("engine command cancelled")]
    Cancelled,

    /// Spawning or talking to the process failed
    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// Map onto the failure taxonomy
    pub fn to_failure_kind(&self) -> FailureKind {
        match self {
            DriverError::EngineUnavailable(_) => FailureKind::EngineUnavailable,
            DriverError::ImageMissing(_) => FailureKind::ImageMissing,
            DriverError::PortBusy { .. } => FailureKind::PortBusy,
            DriverError::Cancelled => FailureKind::Cancelled,
            DriverError::Io(_) => FailureKind::Io,
            DriverError::CommandFailed { .. } | DriverError::Parse(_) => FailureKind::Internal,
        }
    }
}

// ============================================================================
// Target Client Trait
// ============================================================================

/// HTTP client used against the application-under-test
///
/// `send` must read the response body to the end before returning, so the
/// connection is released back to the pool or closed.
#[async_trait]
pub trait TargetClient: Send + Sync {
    /// Client identifier for logs
    fn name(&self) -> &str;

    /// Perform one exchange bounded by `request.timeout`
    async fn send(&self, request: &HttpRequest) -> Result<HttpReply, TransportError>;
}

/// Transport-level failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Connection refused, reset or unresolved
    #[error("connect error: {0}")]
    Connect(String),

    /// Deadline exceeded
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed response or truncated body
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Record error kind for this failure
    pub fn to_error_kind(&self) -> ErrorKind {
        match self {
            TransportError::Connect(_) => ErrorKind::Connect,
            TransportError::Timeout(_) => ErrorKind::Timeout,
            TransportError::Protocol(_) => ErrorKind::Protocol,
        }
    }
}

// ============================================================================
// Sampler Traits
// ============================================================================

/// Produces the next route to request
pub trait Sampler: Send + Sync {
    /// Sampler identifier
    fn name(&self) -> &str;

    /// Next request; called concurrently by every worker
    fn sample(&self) -> Result<RouteRequest, SamplerError>;
}

/// Builds samplers for each phase of a run
pub trait SamplerProvider: Send + Sync {
    /// Sampler for WARMING (server root)
    fn warmup(&self) -> Arc<dyn Sampler>;

    /// Sampler for one MEASURING cell
    fn measurement(
        &self,
        class: ResourceClass,
        backends: &[String],
        seeded: &SeededUsers,
    ) -> Result<Arc<dyn Sampler>, SamplerError>;
}

/// Sampler errors
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    /// No more samples available
    #[error("sampler exhausted")]
    Exhausted,

    /// An IO route was requested without any backend
    #[error("no database backend configured for {0}")]
    NoBackends(ResourceClass),

    /// Sampler misconfigured
    #[error("invalid sampler configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Result Sink Trait
// ============================================================================

/// Destination for run artifacts
///
/// Each write replaces its file atomically.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Directory of this run
    fn run_dir(&self) -> &Path;

    /// Create the per-server subtree
    async fn begin_server(&self, server: &str) -> Result<(), SinkError>;

    /// Write one cell's records as NDJSON; returns the number of lines
    async fn write_records(
        &self,
        server: &str,
        file_name: &str,
        records: &[Record],
    ) -> Result<usize, SinkError>;

    /// Write the server's `rollup.json`
    async fn write_rollups(&self, server: &str, rollups: &[CellRollup]) -> Result<(), SinkError>;

    /// Write the run's `manifest.json`
    async fn write_manifest(&self, manifest: &Manifest) -> Result<(), SinkError>;
}

/// Result sink errors
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Filesystem failure
    #[error("failed to write {path}: {source}")]
    Io {
        /// Target file
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Serialization failure
    #[error("failed to serialize {what}: {message}")]
    Serialize {
        /// Artifact name
        what: String,
        /// Serializer message
        message: String,
    },
}

// ============================================================================
// Stop Condition
// ============================================================================

/// When a measuring phase ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCondition {
    /// Stop after N attempts shared across all workers
    RequestCount(usize),

    /// Stop once the phase has run for the duration
    Duration(Duration),
}

impl Default for StopCondition {
    fn default() -> Self {
        StopCondition::RequestCount(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_kinds() {
        assert_eq!(
            TransportError::Connect("refused".into()).to_error_kind(),
            ErrorKind::Connect
        );
        assert_eq!(
            TransportError::Timeout(Duration::from_secs(5)).to_error_kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            TransportError::Protocol("truncated".into()).to_error_kind(),
            ErrorKind::Protocol
        );
    }

    #[test]
    fn test_driver_error_kinds() {
        assert_eq!(
            DriverError::ImageMissing("a:1".into()).to_failure_kind(),
            FailureKind::ImageMissing
        );
        assert_eq!(
            DriverError::PortBusy {
                port: 8080,
                detail: String::new()
            }
            .to_failure_kind(),
            FailureKind::PortBusy
        );
        assert_eq!(
            DriverError::Cancelled.to_failure_kind(),
            FailureKind::Cancelled
        );
        assert_eq!(
            DriverError::Parse("x".into()).to_failure_kind(),
            FailureKind::Internal
        );
    }

    #[test]
    fn test_stop_condition_default() {
        assert_eq!(StopCondition::default(), StopCondition::RequestCount(1000));
    }
}
