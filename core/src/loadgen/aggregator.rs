//! Result aggregation from multiple workers

use std::time::Duration;

use crate::metrics::ErrorCounts;
use crate::worker::WorkerStats;

/// Aggregated statistics from all workers of a phase
#[derive(Debug, Clone, Default)]
pub struct AggregatedStats {
    /// Number of workers that completed
    pub total_workers: usize,

    /// Successful attempts
    pub total_completed: usize,

    /// Failed attempts
    pub total_errors: usize,

    /// Failed attempts by kind
    pub errors_by_kind: ErrorCounts,

    /// Phase wall clock
    pub total_duration: Duration,

    /// Attempts per second over the phase wall clock
    pub requests_per_second: f64,
}

impl AggregatedStats {
    /// Get the total number of attempts (completed + errors)
    pub fn total_requests(&self) -> usize {
        self.total_completed + self.total_errors
    }

    /// Get the success rate (0.0 - 1.0)
    pub fn success_rate(&self) -> f64 {
        let total = self.total_requests();
        if total > 0 {
            self.total_completed as f64 / total as f64
        } else {
            0.0
        }
    }
}

/// Aggregate statistics from multiple workers over a phase of `elapsed`
pub fn aggregate_worker_stats(stats: &[WorkerStats], elapsed: Duration) -> AggregatedStats {
    if stats.is_empty() {
        return AggregatedStats {
            total_duration: elapsed,
            ..Default::default()
        };
    }

    let total_completed: usize = stats.iter().map(|s| s.completed).sum();
    let total_errors: usize = stats.iter().map(|s| s.errors).sum();
    let mut errors_by_kind = ErrorCounts::default();
    for s in stats {
        errors_by_kind.merge(&s.by_kind);
    }

    let secs = elapsed.as_secs_f64();
    let requests_per_second = if secs > 0.0 {
        (total_completed + total_errors) as f64 / secs
    } else {
        0.0
    };

    AggregatedStats {
        total_workers: stats.len(),
        total_completed,
        total_errors,
        errors_by_kind,
        total_duration: elapsed,
        requests_per_second,
    }
}
