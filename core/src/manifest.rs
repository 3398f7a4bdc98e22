//! Run manifest: plan snapshot, engine version, timestamps and the final
//! status of every planned server.
//!
//! Field order is fixed and collections follow plan order, so two runs with
//! identical inputs serialize identically apart from timestamps and the
//! engine version.

use crate::config::RunPlan;
use crate::error::FailureKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final status of one server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    /// Every cell measured
    Completed,
    /// A phase failed; the loop moved on
    Failed,
    /// Cancelled by signal while running
    Interrupted,
    /// Never started (cancelled or stack failure before its turn)
    Skipped,
}

impl ServerStatus {
    /// Label used in the summary table
    pub fn label(&self) -> &'static str {
        match self {
            ServerStatus::Completed => "OK",
            ServerStatus::Failed => "FAILED",
            ServerStatus::Interrupted => "INTERRUPTED",
            ServerStatus::Skipped => "SKIPPED",
        }
    }
}

/// How the whole run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunOutcome {
    /// Every server reached a terminal state
    Completed,
    /// The stack never became healthy
    StackUnhealthy,
    /// Cancelled by signal
    Cancelled,
    /// Unexpected failure
    InternalError,
}

impl RunOutcome {
    /// Process exit code
    pub fn exit_code(&self) -> u8 {
        match self {
            RunOutcome::Completed => 0,
            RunOutcome::StackUnhealthy => 2,
            RunOutcome::Cancelled => 3,
            RunOutcome::InternalError => 4,
        }
    }
}

/// Outcome of one server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerReport {
    /// Server name
    pub name: String,
    /// Final status
    pub status: ServerStatus,
    /// Failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureKind>,
    /// Failure detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Cells with a written rollup
    pub cells: usize,
    /// Records across all cells
    pub requests: usize,
    /// Failed records across all cells
    pub errors: usize,
    /// Best requests-per-second across cells
    pub best_rps: f64,
}

impl ServerReport {
    /// Report for a server that never ran
    pub fn skipped(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: ServerStatus::Skipped,
            reason: None,
            detail: None,
            cells: 0,
            requests: 0,
            errors: 0,
            best_rps: 0.0,
        }
    }
}

/// Contents of `manifest.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Version of this tool
    pub tool_version: String,
    /// Engine server version, if it answered
    pub engine_version: Option<String>,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run end
    pub ended_at: DateTime<Utc>,
    /// Plan snapshot
    pub plan: RunPlan,
    /// Overall outcome
    pub outcome: RunOutcome,
    /// Per-server status, in plan order
    pub servers: Vec<ServerReport>,
}
