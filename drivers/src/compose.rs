//! Parsing of `docker compose ps --format json`

use std::collections::BTreeMap;

use serde::Deserialize;
use serverbench_core::{DriverError, ServiceState, StackHealth};

/// One container row as printed by compose
#[derive(Debug, Clone, Deserialize)]
struct PsRow {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Service", default)]
    service: Option<String>,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Health", default)]
    health: String,
}

/// A service and the state of one of its containers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    /// Compose service name
    pub service: String,
    /// Mapped container state
    pub state: ServiceState,
}

/// Parse compose ps output
///
/// Newer compose releases print one JSON object per line, older ones a
/// single JSON array; both are accepted. Empty output means no container.
pub fn parse_ps_output(raw: &str, project: &str) -> Result<Vec<ServiceEntry>, DriverError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let rows: Vec<PsRow> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed)
            .map_err(|e| DriverError::Parse(format!("compose ps array: {}", e)))?
    } else {
        trimmed
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .map_err(|e| DriverError::Parse(format!("compose ps line: {}", e)))
            })
            .collect::<Result<_, _>>()?
    };

    Ok(rows
        .into_iter()
        .map(|row| {
            let service = match row.service {
                Some(s) if !s.is_empty() => s,
                _ => extract_service_name(&row.name, project),
            };
            ServiceEntry {
                service,
                state: map_state(&row.state, &row.health),
            }
        })
        .collect())
}

/// Map compose State/Health onto a service state
pub fn map_state(state: &str, health: &str) -> ServiceState {
    if !state.eq_ignore_ascii_case("running") {
        return ServiceState::Down;
    }
    match health.trim() {
        "" => ServiceState::UpHealthy,
        h if h.eq_ignore_ascii_case("healthy") => ServiceState::UpHealthy,
        _ => ServiceState::UpUnhealthy,
    }
}

/// Derive a service name from a container name
///
/// Strips the `<project>-` prefix and a trailing `-<replica>` index, and
/// nothing else: `benchmark-dbs-redis-cache-1` is `redis-cache`.
pub fn extract_service_name(container: &str, project: &str) -> String {
    let container = container.trim_start_matches('/');
    let prefix = format!("{}-", project);
    let name = container.strip_prefix(&prefix).unwrap_or(container);
    match name.rsplit_once('-') {
        Some((service, index))
            if !service.is_empty()
                && !index.is_empty()
                && index.bytes().all(|b| b.is_ascii_digit())
                && index.parse::<u32>().map_or(false, |n| n > 0) =>
        {
            service.to_string()
        }
        _ => name.to_string(),
    }
}

/// Snapshot of the required services
///
/// A service with several containers takes its worst state; services with
/// no container are MISSING.
pub fn stack_health(required: &[String], entries: &[ServiceEntry]) -> StackHealth {
    let mut observed: BTreeMap<&str, ServiceState> = BTreeMap::new();
    for entry in entries {
        observed
            .entry(entry.service.as_str())
            .and_modify(|current| {
                if rank(entry.state) < rank(*current) {
                    *current = entry.state;
                }
            })
            .or_insert(entry.state);
    }

    let services = required
        .iter()
        .map(|name| {
            let state = observed
                .get(name.as_str())
                .copied()
                .unwrap_or(ServiceState::Missing);
            (name.clone(), state)
        })
        .collect();
    StackHealth { services }
}

fn rank(state: ServiceState) -> u8 {
    match state {
        ServiceState::Missing => 0,
        ServiceState::Down => 1,
        ServiceState::UpUnhealthy => 2,
        ServiceState::UpHealthy => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = "benchmark-dbs";

    fn required(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extract_service_name() {
        assert_eq!(extract_service_name("benchmark-dbs-postgres-1", PROJECT), "postgres");
        assert_eq!(
            extract_service_name("benchmark-dbs-redis-cache-1", PROJECT),
            "redis-cache"
        );
        assert_eq!(extract_service_name("benchmark-dbs-mongodb", PROJECT), "mongodb");
        assert_eq!(extract_service_name("/other-svc-2", PROJECT), "other-svc");
        assert_eq!(extract_service_name("benchmark-dbs-app-v2", PROJECT), "app-v2");
        assert_eq!(extract_service_name("benchmark-dbs-app-0", PROJECT), "app-0");
    }

    #[test]
    fn test_map_state() {
        assert_eq!(map_state("running", "healthy"), ServiceState::UpHealthy);
        assert_eq!(map_state("running", ""), ServiceState::UpHealthy);
        assert_eq!(map_state("running", "starting"), ServiceState::UpUnhealthy);
        assert_eq!(map_state("running", "unhealthy"), ServiceState::UpUnhealthy);
        assert_eq!(map_state("exited", "healthy"), ServiceState::Down);
        assert_eq!(map_state("restarting", ""), ServiceState::Down);
    }

    #[test]
    fn test_parse_ndjson_lines() {
        let raw = r#"
{"Name":"benchmark-dbs-postgres-1","Service":"postgres","State":"running","Health":"healthy"}
{"Name":"benchmark-dbs-mongodb-1","State":"running","Health":"starting"}
"#;
        let entries = parse_ps_output(raw, PROJECT).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].service, "postgres");
        assert_eq!(entries[1].service, "mongodb");
        assert_eq!(entries[1].state, ServiceState::UpUnhealthy);
    }

    #[test]
    fn test_parse_json_array() {
        let raw = r#"[{"Name":"benchmark-dbs-redis-1","State":"running","Health":""}]"#;
        let entries = parse_ps_output(raw, PROJECT).unwrap();
        assert_eq!(
            entries,
            vec![ServiceEntry {
                service: "redis".into(),
                state: ServiceState::UpHealthy
            }]
        );
    }

    #[test]
    fn test_parse_empty_and_garbage() {
        assert!(parse_ps_output("  \n", PROJECT).unwrap().is_empty());
        assert!(matches!(
            parse_ps_output("not json", PROJECT),
            Err(DriverError::Parse(_))
        ));
    }

    #[test]
    fn test_stack_health_marks_missing_and_worst_replica() {
        let entries = vec![
            ServiceEntry {
                service: "postgres".into(),
                state: ServiceState::UpHealthy,
            },
            ServiceEntry {
                service: "redis".into(),
                state: ServiceState::UpHealthy,
            },
            ServiceEntry {
                service: "redis".into(),
                state: ServiceState::Down,
            },
        ];
        let health = stack_health(&required(&["postgres", "redis", "cassandra"]), &entries);
        assert_eq!(health.state("postgres"), ServiceState::UpHealthy);
        assert_eq!(health.state("redis"), ServiceState::Down);
        assert_eq!(health.state("cassandra"), ServiceState::Missing);
        assert!(!health.is_healthy());
    }
}
