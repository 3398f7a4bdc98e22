//! Request data structures
//!
//! Samplers produce [`RouteRequest`]s relative to the server root; workers
//! bind them to a base URL and a per-request deadline to obtain the
//! [`HttpRequest`] that a [`TargetClient`](crate::traits::TargetClient)
//! sends.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// HTTP method subset used by the workloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// GET
    Get,
    /// POST with a JSON body
    Post,
    /// DELETE
    Delete,
}

impl Method {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request relative to the server root, as produced by a sampler
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    /// HTTP method
    pub method: Method,
    /// Path and query, always starting with `/`
    pub path: String,
    /// JSON body for POST requests
    pub body: Option<serde_json::Value>,
}

impl RouteRequest {
    /// GET the given path
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    /// POST a JSON body to the given path
    pub fn post_json(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
        }
    }

    /// DELETE the given path
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            body: None,
        }
    }

    /// Bind to a base URL such as `http://127.0.0.1:8080`
    pub fn bind(&self, base_url: &str, timeout: Duration) -> HttpRequest {
        HttpRequest {
            method: self.method,
            url: join_url(base_url, &self.path),
            body: self.body.clone(),
            timeout,
        }
    }
}

/// A fully resolved request ready to send
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// Optional JSON body
    pub body: Option<serde_json::Value>,
    /// Deadline for the whole exchange, body included
    pub timeout: Duration,
}

impl HttpRequest {
    /// GET an absolute URL
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
            timeout,
        }
    }
}

/// Join a base URL and a path without doubling the slash
pub fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// User ids created per backend before measuring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeededUsers {
    ids: BTreeMap<String, Vec<String>>,
}

impl SeededUsers {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember an id created on `backend`
    ///
    /// Ids are opaque: UUIDs on postgres and redis, ObjectId hex on mongodb.
    pub fn push(&mut self, backend: &str, id: impl Into<String>) {
        self.ids.entry(backend.to_string()).or_default().push(id.into());
    }

    /// Ids created on `backend`, if any
    pub fn ids_for(&self, backend: &str) -> Option<&[String]> {
        self.ids
            .get(backend)
            .filter(|ids| !ids.is_empty())
            .map(|ids| ids.as_slice())
    }

    /// Whether no ids were recorded at all
    pub fn is_empty(&self) -> bool {
        self.ids.values().all(|ids| ids.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://127.0.0.1:8080", "/health"),
            "http://127.0.0.1:8080/health"
        );
        assert_eq!(
            join_url("http://127.0.0.1:8080/", "/health"),
            "http://127.0.0.1:8080/health"
        );
        assert_eq!(join_url("http://h:1", "ready"), "http://h:1/ready");
    }

    #[test]
    fn test_route_bind_keeps_query() {
        let route = RouteRequest::get("/params/search?q=abc&limit=5");
        let req = route.bind("http://localhost:9000", Duration::from_secs(5));
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.url, "http://localhost:9000/params/search?q=abc&limit=5");
        assert_eq!(req.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_seeded_users() {
        let mut seeded = SeededUsers::new();
        assert!(seeded.is_empty());
        seeded.push("postgres", "0190c3d2-7a1b-7c3e-9f00-1234567890ab");
        seeded.push("postgres", "0190c3d2-7a1b-7c3e-9f00-1234567890ac");
        let ids = seeded.ids_for("postgres").unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], "0190c3d2-7a1b-7c3e-9f00-1234567890ab");
        assert!(seeded.ids_for("redis").is_none());
        assert!(!seeded.is_empty());
    }
}
