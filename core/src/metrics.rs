//! Per-request records and their aggregation into cell rollups

use crate::config::ResourceClass;
use crate::response::{ContainerStats, ErrorKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One observation from a measuring worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// When the attempt started
    pub started_at: DateTime<Utc>,
    /// Attempt duration
    pub duration_nanos: u64,
    /// HTTP status, or 0 when transport failed
    pub status: u16,
    /// Error classification
    pub error_kind: ErrorKind,
    /// Requested path and query
    pub path: String,
}

impl Record {
    /// Latency in milliseconds
    pub fn latency_ms(&self) -> f64 {
        self.duration_nanos as f64 / 1_000_000.0
    }
}

/// Error counts by kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCounts {
    /// CONNECT
    pub connect: usize,
    /// TIMEOUT
    pub timeout: usize,
    /// PROTOCOL
    pub protocol: usize,
    /// STATUS
    pub status: usize,
}

impl ErrorCounts {
    /// Count one record
    pub fn add(&mut self, kind: ErrorKind) {
        match kind {
            ErrorKind::None => {}
            ErrorKind::Connect => self.connect += 1,
            ErrorKind::Timeout => self.timeout += 1,
            ErrorKind::Protocol => self.protocol += 1,
            ErrorKind::Status => self.status += 1,
        }
    }

    /// Add another set of counts
    pub fn merge(&mut self, other: &ErrorCounts) {
        self.connect += other.connect;
        self.timeout += other.timeout;
        self.protocol += other.protocol;
        self.status += other.status;
    }

    /// Sum over all kinds
    pub fn total(&self) -> usize {
        self.connect + self.timeout + self.protocol + self.status
    }
}

/// Latency percentiles (all values in milliseconds)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct LatencyPercentiles {
    /// Minimum value
    pub min: f64,
    /// Mean value
    pub mean: f64,
    /// 50th percentile (median)
    pub p50: f64,
    /// 75th percentile
    pub p75: f64,
    /// 90th percentile
    pub p90: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
    /// Maximum value
    pub max: f64,
    /// Sample standard deviation
    pub stddev: f64,
}

impl LatencyPercentiles {
    /// Calculate percentiles from a slice of values
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let mut sorted: Vec<f64> = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let len = sorted.len();
        let mean = sorted.iter().sum::<f64>() / len as f64;
        let variance = if len > 1 {
            sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (len - 1) as f64
        } else {
            0.0
        };

        Self {
            min: sorted[0],
            mean,
            p50: percentile(&sorted, 0.50),
            p75: percentile(&sorted, 0.75),
            p90: percentile(&sorted, 0.90),
            p95: percentile(&sorted, 0.95),
            p99: percentile(&sorted, 0.99),
            max: sorted[len - 1],
            stddev: variance.sqrt(),
        }
    }
}

/// Linear interpolation between closest ranks
fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        len => {
            let idx = p * (len - 1) as f64;
            let lower = idx.floor() as usize;
            let upper = (idx.ceil() as usize).min(len - 1);
            let frac = idx - lower as f64;
            sorted[lower] * (1.0 - frac) + sorted[upper] * frac
        }
    }
}

/// Min/avg/max of container usage while a cell was measuring
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsage {
    /// Number of samples taken
    pub samples: usize,
    /// Lowest CPU percentage
    pub cpu_min_percent: f64,
    /// Mean CPU percentage
    pub cpu_avg_percent: f64,
    /// Highest CPU percentage
    pub cpu_max_percent: f64,
    /// Lowest memory use
    pub memory_min_bytes: u64,
    /// Mean memory use
    pub memory_avg_bytes: u64,
    /// Highest memory use
    pub memory_max_bytes: u64,
}

impl ResourceUsage {
    /// Aggregate samples; `None` when nothing was sampled
    pub fn from_samples(samples: &[ContainerStats]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len();
        let cpu = samples.iter().map(|s| s.cpu_percent);
        let mem = samples.iter().map(|s| s.memory_bytes);
        Some(Self {
            samples: n,
            cpu_min_percent: cpu.clone().fold(f64::INFINITY, f64::min),
            cpu_avg_percent: cpu.clone().sum::<f64>() / n as f64,
            cpu_max_percent: cpu.fold(f64::NEG_INFINITY, f64::max),
            memory_min_bytes: mem.clone().min().unwrap_or(0),
            memory_avg_bytes: mem.clone().sum::<u64>() / n as u64,
            memory_max_bytes: mem.max().unwrap_or(0),
        })
    }
}

/// How a measuring cell ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CellStatus {
    /// Stop condition reached
    Complete,
    /// Cancelled by signal
    Interrupted,
    /// Cell deadline elapsed first
    TimedOut,
}

/// Aggregated statistics over one cell's records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellRollup {
    /// Server name
    pub server: String,
    /// Resource class
    pub resource: ResourceClass,
    /// Concurrent workers
    pub capacity: usize,
    /// Completion status
    pub status: CellStatus,
    /// Records written for the cell
    pub count: usize,
    /// Records with errorKind NONE
    pub successes: usize,
    /// Failed records by kind
    pub errors: ErrorCounts,
    /// Latency over successful records
    pub latency_ms: LatencyPercentiles,
    /// MEASURING wall clock
    pub duration_secs: f64,
    /// count / duration
    pub requests_per_second: f64,
    /// Phase start
    pub started_at: DateTime<Utc>,
    /// Phase end
    pub ended_at: DateTime<Utc>,
    /// NDJSON file name relative to the server directory
    pub records_file: String,
    /// Container usage, when sampled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceUsage>,
}

/// Identity and timing of a finished measuring phase
#[derive(Debug, Clone)]
pub struct CellMeta {
    /// Server name
    pub server: String,
    /// Resource class
    pub resource: ResourceClass,
    /// Concurrent workers
    pub capacity: usize,
    /// Completion status
    pub status: CellStatus,
    /// Phase start
    pub started_at: DateTime<Utc>,
    /// MEASURING wall clock
    pub elapsed: Duration,
}

impl CellRollup {
    /// File name for a cell's records
    pub fn records_file_name(resource: ResourceClass, capacity: usize) -> String {
        format!("records-{}-c{}.ndjson", resource.as_str(), capacity)
    }

    /// Aggregate a cell
    pub fn from_records(meta: CellMeta, records: &[Record]) -> Self {
        let mut errors = ErrorCounts::default();
        let mut latencies = Vec::with_capacity(records.len());
        for record in records {
            if record.error_kind.is_success() {
                latencies.push(record.latency_ms());
            } else {
                errors.add(record.error_kind);
            }
        }

        let duration_secs = meta.elapsed.as_secs_f64();
        let requests_per_second = if duration_secs > 0.0 {
            records.len() as f64 / duration_secs
        } else {
            0.0
        };
        let elapsed =
            chrono::Duration::from_std(meta.elapsed).unwrap_or_else(|_| chrono::Duration::zero());

        Self {
            records_file: Self::records_file_name(meta.resource, meta.capacity),
            server: meta.server,
            resource: meta.resource,
            capacity: meta.capacity,
            status: meta.status,
            count: records.len(),
            successes: latencies.len(),
            errors,
            latency_ms: LatencyPercentiles::from_values(&latencies),
            duration_secs,
            requests_per_second,
            started_at: meta.started_at,
            ended_at: meta.started_at + elapsed,
            resources: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ms: u64, status: u16, kind: ErrorKind) -> Record {
        Record {
            started_at: Utc::now(),
            duration_nanos: ms * 1_000_000,
            status,
            error_kind: kind,
            path: "/".into(),
        }
    }

    fn meta(elapsed: Duration) -> CellMeta {
        CellMeta {
            server: "chi".into(),
            resource: ResourceClass::Cpu,
            capacity: 8,
            status: CellStatus::Complete,
            started_at: Utc::now(),
            elapsed,
        }
    }

    #[test]
    fn test_percentile_calculation() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        let percentiles = LatencyPercentiles::from_values(&values);

        assert_eq!(percentiles.min, 1.0);
        assert_eq!(percentiles.max, 10.0);
        assert!((percentiles.p50 - 5.5).abs() < 0.01);
        assert!((percentiles.mean - 5.5).abs() < 0.01);
        assert!((percentiles.p90 - 9.1).abs() < 0.01);
    }

    #[test]
    fn test_percentile_single_value() {
        let percentiles = LatencyPercentiles::from_values(&[42.0]);
        assert_eq!(percentiles.min, 42.0);
        assert_eq!(percentiles.p99, 42.0);
        assert_eq!(percentiles.stddev, 0.0);
    }

    #[test]
    fn test_percentile_empty() {
        let percentiles = LatencyPercentiles::from_values(&[]);
        assert_eq!(percentiles, LatencyPercentiles::default());
    }

    #[test]
    fn test_rollup_counts_and_rps() {
        let records = vec![
            record(10, 200, ErrorKind::None),
            record(20, 200, ErrorKind::None),
            record(5000, 0, ErrorKind::Timeout),
            record(1, 500, ErrorKind::Status),
        ];
        let rollup = CellRollup::from_records(meta(Duration::from_secs(2)), &records);

        assert_eq!(rollup.count, 4);
        assert_eq!(rollup.successes, 2);
        assert_eq!(rollup.errors.timeout, 1);
        assert_eq!(rollup.errors.status, 1);
        assert_eq!(rollup.errors.total(), 2);
        assert!((rollup.requests_per_second - 2.0).abs() < 1e-9);
        // latency covers successful records only
        assert_eq!(rollup.latency_ms.max, 20.0);
        assert_eq!(rollup.records_file, "records-cpu-c8.ndjson");
        assert_eq!(
            rollup.ended_at - rollup.started_at,
            chrono::Duration::seconds(2)
        );
    }

    #[test]
    fn test_rollup_zero_elapsed() {
        let rollup = CellRollup::from_records(meta(Duration::ZERO), &[]);
        assert_eq!(rollup.count, 0);
        assert_eq!(rollup.requests_per_second, 0.0);
    }

    #[test]
    fn test_rollup_json_field_names() {
        let rollup = CellRollup::from_records(meta(Duration::from_secs(1)), &[]);
        let json = serde_json::to_value(&rollup).unwrap();
        assert_eq!(json["resource"], "cpu");
        assert_eq!(json["status"], "COMPLETE");
        assert!(json.get("requestsPerSecond").is_some());
        assert!(json.get("latencyMs").is_some());
        assert!(json.get("resources").is_none());
    }

    #[test]
    fn test_record_json_shape() {
        let json = serde_json::to_value(record(3, 0, ErrorKind::Connect)).unwrap();
        assert_eq!(json["durationNanos"], 3_000_000);
        assert_eq!(json["errorKind"], "CONNECT");
        assert_eq!(json["status"], 0);
    }

    #[test]
    fn test_resource_usage() {
        assert!(ResourceUsage::from_samples(&[]).is_none());
        let usage = ResourceUsage::from_samples(&[
            ContainerStats {
                cpu_percent: 50.0,
                memory_bytes: 100,
            },
            ContainerStats {
                cpu_percent: 150.0,
                memory_bytes: 300,
            },
        ])
        .unwrap();
        assert_eq!(usage.samples, 2);
        assert_eq!(usage.cpu_min_percent, 50.0);
        assert_eq!(usage.cpu_avg_percent, 100.0);
        assert_eq!(usage.cpu_max_percent, 150.0);
        assert_eq!(usage.memory_avg_bytes, 200);
        assert_eq!(usage.memory_max_bytes, 300);
    }
}
