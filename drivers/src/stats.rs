//! Parsing of `docker stats --no-stream --format '{{json .}}'`

use serde::Deserialize;
use serverbench_core::{ContainerStats, DriverError};

#[derive(Debug, Deserialize)]
struct StatsRow {
    #[serde(rename = "CPUPerc", default)]
    cpu_perc: String,
    #[serde(rename = "MemUsage", default)]
    mem_usage: String,
}

/// Parse the first stats line into a sample
pub fn parse_stats_line(raw: &str) -> Result<ContainerStats, DriverError> {
    let line = raw
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| DriverError::Parse("empty stats output".into()))?;

    let row: StatsRow = serde_json::from_str(line)
        .map_err(|e| DriverError::Parse(format!("stats line: {}", e)))?;

    let cpu_percent = parse_percent(&row.cpu_perc)
        .ok_or_else(|| DriverError::Parse(format!("CPUPerc {:?}", row.cpu_perc)))?;
    let used = row.mem_usage.split('/').next().unwrap_or_default();
    let memory_bytes =
        parse_size(used).ok_or_else(|| DriverError::Parse(format!("MemUsage {:?}", row.mem_usage)))?;

    Ok(ContainerStats {
        cpu_percent,
        memory_bytes,
    })
}

/// `"12.50%"` → 12.5; `"--"` while the container starts → 0
fn parse_percent(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw == "--" {
        return Some(0.0);
    }
    raw.trim_end_matches('%').trim().parse().ok()
}

/// Docker's human sizes: `0B`, `512KiB`, `64.5MiB`, `1.2GB`
fn parse_size(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw == "--" {
        return Some(0);
    }
    let split = raw
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);
    let value: f64 = number.trim().parse().ok()?;
    let multiplier: f64 = match unit.trim() {
        "" | "B" => 1.0,
        "kB" | "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some((value * multiplier).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stats_line() {
        let raw = r#"{"BlockIO":"0B / 0B","CPUPerc":"12.50%","Container":"abc","MemPerc":"6.25%","MemUsage":"64MiB / 1GiB","Name":"chi","NetIO":"1kB / 2kB","PIDs":"7"}"#;
        let stats = parse_stats_line(raw).unwrap();
        assert!((stats.cpu_percent - 12.5).abs() < 1e-9);
        assert_eq!(stats.memory_bytes, 64 * 1024 * 1024);
    }

    #[test]
    fn test_parse_sizes() {
        assert_eq!(parse_size("0B"), Some(0));
        assert_eq!(parse_size("512KiB"), Some(512 * 1024));
        assert_eq!(parse_size("1.5GB"), Some(1_500_000_000));
        assert_eq!(parse_size("2kB"), Some(2000));
        assert_eq!(parse_size("3 parsecs"), None);
    }

    #[test]
    fn test_starting_container_placeholders() {
        let raw = r#"{"CPUPerc":"--","MemUsage":"-- / --"}"#;
        let stats = parse_stats_line(raw).unwrap();
        assert_eq!(stats.cpu_percent, 0.0);
        assert_eq!(stats.memory_bytes, 0);
    }

    #[test]
    fn test_empty_output_is_parse_error() {
        assert!(matches!(parse_stats_line("\n"), Err(DriverError::Parse(_))));
    }
}
