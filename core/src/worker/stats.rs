//! Worker statistics tracking

use crate::metrics::ErrorCounts;
use crate::response::ErrorKind;
use std::time::{Duration, Instant};

/// Statistics tracked by each worker
#[derive(Debug, Default, Clone)]
pub struct WorkerStats {
    /// Attempts that ended with errorKind NONE
    pub completed: usize,

    /// Attempts that ended with any other kind
    pub errors: usize,

    /// `errors` split by kind
    pub by_kind: ErrorCounts,

    /// Worker start time
    pub started_at: Option<Instant>,

    /// Worker end time
    pub ended_at: Option<Instant>,
}

impl WorkerStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking (records start time)
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Stop tracking (records end time)
    pub fn stop(&mut self) {
        self.ended_at = Some(Instant::now());
    }

    /// Get total number of attempts (completed + errors)
    pub fn total_requests(&self) -> usize {
        self.completed + self.errors
    }

    /// Time between `start` and `stop`, or since `start` while running
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|start| {
            self.ended_at
                .map(|end| end.duration_since(start))
                .unwrap_or_else(|| start.elapsed())
        })
    }

    /// Count one attempt
    pub fn record(&mut self, kind: ErrorKind) {
        if kind.is_success() {
            self.completed += 1;
        } else {
            self.errors += 1;
            self.by_kind.add(kind);
        }
    }

    /// Merge stats from another worker
    pub fn merge(&mut self, other: &WorkerStats) {
        self.completed += other.completed;
        self.errors += other.errors;
        self.by_kind.merge(&other.by_kind);
    }
}
