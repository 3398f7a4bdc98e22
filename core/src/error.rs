//! Error types for serverbench-core
//!
//! Every failure that can reach the console or the manifest is folded into
//! the closed [`FailureKind`] taxonomy. Trait seams keep their own error
//! enums and map onto it via `to_failure_kind()`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Closed set of failure reasons surfaced to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Config file could not be read
    ConfigMissing,
    /// Config file did not parse or failed validation
    ConfigMalformed,
    /// No server left after filtering
    ConfigEmpty,
    /// A command-line flag was rejected
    FlagInvalid,
    /// The container engine could not be reached
    EngineUnavailable,
    /// The image is not present locally
    ImageMissing,
    /// The host port is already taken
    PortBusy,
    /// Readiness never reached before the deadline
    NotReady,
    /// A required stack service never appeared
    StackIncomplete,
    /// Warmup produced no successful request
    WarmupFailed,
    /// A database reset call failed
    ResetFailed,
    /// User seeding produced no ids
    SeedFailed,
    /// A bounded phase ran out of time
    Timeout,
    /// The root cancellation token fired
    Cancelled,
    /// Filesystem or subprocess I/O failed
    Io,
    /// Anything else
    Internal,
}

impl FailureKind {
    /// Stable uppercase name used in logs, manifests and the summary table
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ConfigMissing => "CONFIG_MISSING",
            FailureKind::ConfigMalformed => "CONFIG_MALFORMED",
            FailureKind::ConfigEmpty => "CONFIG_EMPTY",
            FailureKind::FlagInvalid => "FLAG_INVALID",
            FailureKind::EngineUnavailable => "ENGINE_UNAVAILABLE",
            FailureKind::ImageMissing => "IMAGE_MISSING",
            FailureKind::PortBusy => "PORT_BUSY",
            FailureKind::NotReady => "NOT_READY",
            FailureKind::StackIncomplete => "STACK_INCOMPLETE",
            FailureKind::WarmupFailed => "WARMUP_FAILED",
            FailureKind::ResetFailed => "RESET_FAILED",
            FailureKind::SeedFailed => "SEED_FAILED",
            FailureKind::Timeout => "TIMEOUT",
            FailureKind::Cancelled => "CANCELLED",
            FailureKind::Io => "IO",
            FailureKind::Internal => "INTERNAL",
        }
    }

    /// Whether this kind comes from configuration or arguments
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            FailureKind::ConfigMissing
                | FailureKind::ConfigMalformed
                | FailureKind::ConfigEmpty
                | FailureKind::FlagInvalid
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core error type
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct BenchError {
    /// Taxonomy bucket
    pub kind: FailureKind,
    /// Human-readable detail
    pub message: String,
}

impl BenchError {
    /// Create an error of the given kind
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A builder was finished without a required field
    pub fn missing_config(field: &str) -> Self {
        Self::new(
            FailureKind::Internal,
            format!("missing required field: {}", field),
        )
    }

    /// Configuration rejected after parsing
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ConfigMalformed, message)
    }

    /// The root token fired
    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "cancelled by signal")
    }

    /// A bounded phase ran past its deadline
    pub fn timeout(phase: &str, after: Duration) -> Self {
        Self::new(
            FailureKind::Timeout,
            format!("{} exceeded {:?}", phase, after),
        )
    }

    /// Sampler could not produce a request
    pub fn sampler(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Internal, message)
    }

    /// Unexpected orchestration failure
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Internal, message)
    }
}

impl From<std::io::Error> for BenchError {
    fn from(err: std::io::Error) -> Self {
        Self::new(FailureKind::Io, err.to_string())
    }
}

/// Result type alias
pub type BenchResult<T> = std::result::Result<T, BenchError>;
