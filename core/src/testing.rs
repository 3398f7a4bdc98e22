//! In-memory doubles for the trait seams, shared by the unit test suites

use crate::config::{ResourceClass, ServerSpec};
use crate::manifest::Manifest;
use crate::metrics::{CellRollup, Record};
use crate::request::{HttpRequest, Method, RouteRequest, SeededUsers};
use crate::response::{ContainerHandle, ContainerStats, HttpReply, ServiceState, StackHealth};
use crate::traits::{
    ContainerDriver, DriverError, ResultSink, Sampler, SamplerError, SamplerProvider, SinkError,
    TargetClient, TransportError,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Sampler
// ============================================================================

pub struct FixedSampler {
    path: String,
    pub calls: AtomicUsize,
}

impl FixedSampler {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl Sampler for FixedSampler {
    fn name(&self) -> &str {
        "fixed"
    }

    fn sample(&self) -> Result<RouteRequest, SamplerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(RouteRequest::get(self.path.clone()))
    }
}

pub struct FixedProvider;

impl SamplerProvider for FixedProvider {
    fn warmup(&self) -> Arc<dyn Sampler> {
        Arc::new(FixedSampler::new("/"))
    }

    fn measurement(
        &self,
        class: ResourceClass,
        backends: &[String],
        seeded: &SeededUsers,
    ) -> Result<Arc<dyn Sampler>, SamplerError> {
        let path = match class {
            ResourceClass::Cpu => "/params/search?q=a&limit=1".to_string(),
            _ => {
                let backend = backends.first().ok_or(SamplerError::NoBackends(class))?;
                let id = seeded
                    .ids_for(backend)
                    .and_then(|ids| ids.first())
                    .map_or("1", String::as_str);
                format!("/db/{}/users/{}", backend, id)
            }
        };
        Ok(Arc::new(FixedSampler::new(&path)))
    }
}

// ============================================================================
// Target
// ============================================================================

type Handler = dyn Fn(&HttpRequest) -> Result<HttpReply, TransportError> + Send + Sync;

/// Shape of a postgres user id
pub const USER_UUID: &str = "0190c3d2-7a1b-7c3e-9f00-1234567890ab";

pub struct MockTarget {
    handler: Box<Handler>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
    pub urls: Mutex<Vec<String>>,
    pub bodies: Mutex<Vec<serde_json::Value>>,
}

impl MockTarget {
    /// Answers 200 to everything; user creation returns a UUID id
    pub fn ok() -> Self {
        Self::with_handler(|req| {
            if req.method == Method::Post && req.url.ends_with("/users") {
                Ok(HttpReply::new(
                    201,
                    format!(r#"{{"id":"{}","name":"bench"}}"#, USER_UUID),
                ))
            } else {
                Ok(HttpReply::new(200, "ok"))
            }
        })
    }

    pub fn with_handler(
        handler: impl Fn(&HttpRequest) -> Result<HttpReply, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            delay: None,
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
            bodies: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls_to(&self, needle: &str) -> usize {
        self.urls
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.contains(needle))
            .count()
    }
}

#[async_trait]
impl TargetClient for MockTarget {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, request: &HttpRequest) -> Result<HttpReply, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(request.url.clone());
        if let Some(body) = &request.body {
            self.bodies.lock().unwrap().push(body.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(request)
    }
}

// ============================================================================
// Container driver
// ============================================================================

#[derive(Default)]
pub struct MockDriver {
    pub missing_images: HashSet<String>,
    pub unhealthy_services: HashSet<String>,
    pub absent_services: HashSet<String>,
    pub engine_down: bool,
    /// Stack turns DOWN once this many containers were killed
    pub stack_dies_after: Option<usize>,
    pub health_queries: AtomicUsize,
    pub events: Mutex<Vec<String>>,
    pub running: Mutex<HashSet<String>>,
    pub started: AtomicUsize,
    pub stack_stops: AtomicUsize,
    killed: AtomicUsize,
    next_id: AtomicUsize,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn running_count(&self) -> usize {
        self.running.lock().unwrap().len()
    }

    fn log(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl ContainerDriver for MockDriver {
    fn engine_name(&self) -> &str {
        "mock"
    }

    async fn engine_version(&self, _cancel: &CancellationToken) -> Result<String, DriverError> {
        if self.engine_down {
            return Err(DriverError::EngineUnavailable("daemon not running".into()));
        }
        Ok("27.0.0-test".into())
    }

    async fn start_app(
        &self,
        spec: &ServerSpec,
        _network: Option<&str>,
        _cancel: &CancellationToken,
    ) -> Result<ContainerHandle, DriverError> {
        self.log(format!("start_app {}", spec.name));
        if self.missing_images.contains(&spec.image) {
            return Err(DriverError::ImageMissing(spec.image.clone()));
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = ContainerHandle::new(spec.name.clone(), &format!("{:012x}ffffffff", n + 1));
        self.started.fetch_add(1, Ordering::SeqCst);
        self.running.lock().unwrap().insert(handle.id.clone());
        Ok(handle)
    }

    async fn kill(
        &self,
        handle: &ContainerHandle,
        _cancel: &CancellationToken,
    ) -> Result<(), DriverError> {
        self.log(format!("kill {}", handle.server));
        self.running.lock().unwrap().remove(&handle.id);
        self.killed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn start_stack(
        &self,
        _compose_file: &Path,
        project: &str,
        _cancel: &CancellationToken,
    ) -> Result<(), DriverError> {
        self.log(format!("start_stack {}", project));
        Ok(())
    }

    async fn stop_stack(&self, project: &str, _cancel: &CancellationToken) -> Result<(), DriverError> {
        self.log(format!("stop_stack {}", project));
        self.stack_stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn query_stack_health(
        &self,
        _project: &str,
        required: &[String],
        _cancel: &CancellationToken,
    ) -> Result<StackHealth, DriverError> {
        self.health_queries.fetch_add(1, Ordering::SeqCst);
        let dead = self
            .stack_dies_after
            .is_some_and(|n| self.killed.load(Ordering::SeqCst) >= n);
        let services = required
            .iter()
            .map(|s| {
                let state = if self.absent_services.contains(s) {
                    ServiceState::Missing
                } else if dead {
                    ServiceState::Down
                } else if self.unhealthy_services.contains(s) {
                    ServiceState::UpUnhealthy
                } else {
                    ServiceState::UpHealthy
                };
                (s.clone(), state)
            })
            .collect();
        Ok(StackHealth { services })
    }

    async fn stats(
        &self,
        _handle: &ContainerHandle,
        _cancel: &CancellationToken,
    ) -> Result<ContainerStats, DriverError> {
        Ok(ContainerStats {
            cpu_percent: 12.5,
            memory_bytes: 64 << 20,
        })
    }
}

// ============================================================================
// Result sink
// ============================================================================

pub struct MemorySink {
    dir: PathBuf,
    pub servers: Mutex<Vec<String>>,
    pub records: Mutex<BTreeMap<(String, String), usize>>,
    pub rollups: Mutex<BTreeMap<String, Vec<CellRollup>>>,
    pub manifest: Mutex<Option<Manifest>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            dir: PathBuf::from("/tmp/serverbench-test"),
            servers: Mutex::new(Vec::new()),
            records: Mutex::new(BTreeMap::new()),
            rollups: Mutex::new(BTreeMap::new()),
            manifest: Mutex::new(None),
        }
    }

    pub fn rollups_for(&self, server: &str) -> Vec<CellRollup> {
        self.rollups
            .lock()
            .unwrap()
            .get(server)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    fn run_dir(&self) -> &Path {
        &self.dir
    }

    async fn begin_server(&self, server: &str) -> Result<(), SinkError> {
        self.servers.lock().unwrap().push(server.to_string());
        Ok(())
    }

    async fn write_records(
        &self,
        server: &str,
        file_name: &str,
        records: &[Record],
    ) -> Result<usize, SinkError> {
        self.records
            .lock()
            .unwrap()
            .insert((server.to_string(), file_name.to_string()), records.len());
        Ok(records.len())
    }

    async fn write_rollups(&self, server: &str, rollups: &[CellRollup]) -> Result<(), SinkError> {
        self.rollups
            .lock()
            .unwrap()
            .insert(server.to_string(), rollups.to_vec());
        Ok(())
    }

    async fn write_manifest(&self, manifest: &Manifest) -> Result<(), SinkError> {
        *self.manifest.lock().unwrap() = Some(manifest.clone());
        Ok(())
    }
}

pub fn server(name: &str, port: u16) -> ServerSpec {
    ServerSpec {
        name: name.to_string(),
        image: format!("bench/{}:latest", name),
        host_port: port,
        container_port: 8080,
        readiness_path: "/health".to_string(),
        cpu_limit: None,
        memory_limit: None,
    }
}
