//! Response-side data: HTTP replies, record error kinds, container and
//! stack state reported by the engine.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Error taxonomy for load-generator records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Success
    #[default]
    None,
    /// TCP connection could not be established
    Connect,
    /// Per-request deadline exceeded
    Timeout,
    /// Malformed response or truncated body
    Protocol,
    /// Transport succeeded but the status was outside 200..=399
    Status,
}

impl ErrorKind {
    /// Classify a completed exchange by its status code
    pub fn from_status(status: u16) -> Self {
        if (200..=399).contains(&status) {
            ErrorKind::None
        } else {
            ErrorKind::Status
        }
    }

    /// Whether this represents a successful attempt
    pub fn is_success(&self) -> bool {
        matches!(self, ErrorKind::None)
    }
}

/// A completed HTTP exchange with its body fully read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    /// Status code
    pub status: u16,
    /// Full body
    pub body: Bytes,
}

impl HttpReply {
    /// Create a reply
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 2xx, the readiness criterion
    pub fn is_2xx(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Per-service state reported by the container engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceState {
    /// Running and healthy, or running without a health check
    UpHealthy,
    /// Running but the health check has not passed
    UpUnhealthy,
    /// Exited, created, restarting or otherwise not running
    Down,
    /// No container for this service
    Missing,
}

/// Snapshot of the required services of a stack
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackHealth {
    /// service -> state, sorted by service name
    pub services: BTreeMap<String, ServiceState>,
}

impl StackHealth {
    /// Every required service marked MISSING
    pub fn all_missing(required: &[String]) -> Self {
        Self {
            services: required
                .iter()
                .map(|s| (s.clone(), ServiceState::Missing))
                .collect(),
        }
    }

    /// State of one service; absent entries count as MISSING
    pub fn state(&self, service: &str) -> ServiceState {
        self.services
            .get(service)
            .copied()
            .unwrap_or(ServiceState::Missing)
    }

    /// Whether every service is UP_HEALTHY
    pub fn is_healthy(&self) -> bool {
        !self.services.is_empty()
            && self
                .services
                .values()
                .all(|s| *s == ServiceState::UpHealthy)
    }

    /// Services currently in the given state
    pub fn in_state(&self, state: ServiceState) -> Vec<String> {
        self.services
            .iter()
            .filter(|(_, s)| **s == state)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Compact `name=STATE` rendering for logs and errors
    pub fn describe(&self) -> String {
        self.services
            .iter()
            .map(|(name, state)| {
                let state = serde_json::to_value(state)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default();
                format!("{}={}", name, state)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Handle for a running application container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    /// First 12 characters of the engine id
    pub id: String,
    /// Server the container runs
    pub server: String,
}

impl ContainerHandle {
    /// Build a handle from the engine's full id
    pub fn new(server: impl Into<String>, raw_id: &str) -> Self {
        let id: String = raw_id.trim().chars().take(12).collect();
        Self {
            id,
            server: server.into(),
        }
    }
}

/// One resource usage sample of a container
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStats {
    /// CPU usage in percent of one core
    pub cpu_percent: f64,
    /// Resident memory in bytes
    pub memory_bytes: u64,
}
