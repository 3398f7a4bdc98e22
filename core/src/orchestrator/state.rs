//! Orchestrator state machine vocabulary

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::manifest::{RunOutcome, ServerReport, ServerStatus};

/// Top-level stages of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Engine probe
    Init,
    /// Database stack start and health gate
    StackUp,
    /// Servers, one at a time
    PerServerLoop,
    /// Stack teardown, on every path
    StackDown,
    /// Done
    Exit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Init => "INIT",
            Stage::StackUp => "STACK_UP",
            Stage::PerServerLoop => "PER_SERVER_LOOP",
            Stage::StackDown => "STACK_DOWN",
            Stage::Exit => "EXIT",
        })
    }
}

/// Lifecycle of one server within the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Not started
    Pending,
    /// Container being launched
    StartingContainer,
    /// Polling the readiness path
    WaitingReady,
    /// Warmup traffic
    Warming,
    /// Measuring matrix
    Measuring,
    /// All cells measured
    Completed,
    /// A phase failed or was cancelled
    Failed,
    /// Container being killed
    TearingDown,
    /// Terminal
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunPhase::Pending => "PENDING",
            RunPhase::StartingContainer => "STARTING_CONTAINER",
            RunPhase::WaitingReady => "WAITING_READY",
            RunPhase::Warming => "WARMING",
            RunPhase::Measuring => "MEASURING",
            RunPhase::Completed => "COMPLETED",
            RunPhase::Failed => "FAILED",
            RunPhase::TearingDown => "TEARING_DOWN",
            RunPhase::Done => "DONE",
        })
    }
}

/// What a run produced, for the console summary and the exit code
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Overall outcome
    pub outcome: RunOutcome,
    /// Per-server reports in plan order
    pub servers: Vec<ServerReport>,
    /// Directory holding the artifacts
    pub run_dir: PathBuf,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run end
    pub ended_at: DateTime<Utc>,
}

impl RunSummary {
    /// Process exit code
    pub fn exit_code(&self) -> u8 {
        self.outcome.exit_code()
    }

    /// Servers that ended in the given status
    pub fn count(&self, status: ServerStatus) -> usize {
        self.servers.iter().filter(|s| s.status == status).count()
    }
}
