//! Configuration types
//!
//! The YAML catalogue is loaded once into immutable values. Runtime options
//! (flags or the interactive prompt) are then merged over its defaults to
//! produce a validated [`RunPlan`].

use crate::error::FailureKind;
use crate::traits::StopCondition;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Database services the IO routes know how to address
pub const KNOWN_BACKENDS: [&str; 4] = ["postgres", "mongodb", "redis", "cassandra"];

// ============================================================================
// Catalogue
// ============================================================================

/// Identifies one application-under-test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSpec {
    /// Short identifier, unique within the catalogue
    pub name: String,

    /// Image reference (name:tag)
    pub image: String,

    /// Port published on the host
    pub host_port: u16,

    /// Port inside the container
    pub container_port: u16,

    /// Path that declares readiness
    #[serde(default = "default_readiness_path")]
    pub readiness_path: String,

    /// CPU quota passed to the engine (`--cpus`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<f64>,

    /// Memory limit passed to the engine (`--memory`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,
}

fn default_readiness_path() -> String {
    "/health".to_string()
}

impl ServerSpec {
    /// Base URL on the host
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.host_port)
    }

    /// Absolute readiness URL
    pub fn readiness_url(&self) -> String {
        crate::request::join_url(&self.base_url(), &self.readiness_path)
    }

    fn validate(&mut self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Malformed("server name must not be empty".into()));
        }
        if self.image.trim().is_empty() {
            return Err(ConfigError::Malformed(format!(
                "server '{}' has no image",
                self.name
            )));
        }
        if self.host_port == 0 || self.container_port == 0 {
            return Err(ConfigError::Malformed(format!(
                "server '{}': ports must be in 1..=65535",
                self.name
            )));
        }
        if self.readiness_path.is_empty() {
            self.readiness_path = default_readiness_path();
        } else if !self.readiness_path.starts_with('/') {
            self.readiness_path = format!("/{}", self.readiness_path);
        }
        if let Some(cpus) = self.cpu_limit {
            if cpus.is_nan() || cpus <= 0.0 {
                return Err(ConfigError::Malformed(format!(
                    "server '{}': cpuLimit must be positive",
                    self.name
                )));
            }
        }
        if let Some(memory) = &self.memory_limit {
            if parse_memory_limit(memory).is_none() {
                return Err(ConfigError::Malformed(format!(
                    "server '{}': invalid memoryLimit '{}'",
                    self.name, memory
                )));
            }
        }
        Ok(())
    }
}

/// Parse an engine memory limit such as `512m`, `1g` or `256mb` into bytes
pub fn parse_memory_limit(raw: &str) -> Option<u64> {
    let lower = raw.trim().to_ascii_lowercase();
    let digits_end = lower
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(lower.len());
    if digits_end == 0 {
        return None;
    }
    let value: u64 = lower[..digits_end].parse().ok()?;
    let multiplier = match &lower[digits_end..] {
        "" | "b" => 1,
        "k" | "kb" => 1 << 10,
        "m" | "mb" => 1 << 20,
        "g" | "gb" => 1 << 30,
        _ => return None,
    };
    let bytes = value.checked_mul(multiplier)?;
    (bytes > 0).then_some(bytes)
}

/// Backing database stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackSpec {
    /// Compose file describing the services
    pub compose_file: PathBuf,

    /// Engine project name
    #[serde(default = "default_project_name")]
    pub project_name: String,

    /// Services that must be healthy before any server starts
    #[serde(default)]
    pub required_services: Vec<String>,

    /// Attach app containers to `<project>_default`
    #[serde(default = "default_true")]
    pub join_network: bool,
}

fn default_project_name() -> String {
    "benchmark-dbs".to_string()
}

fn default_true() -> bool {
    true
}

impl StackSpec {
    /// Required services the IO routes can address, in declaration order
    pub fn backends(&self) -> Vec<String> {
        self.required_services
            .iter()
            .filter(|s| KNOWN_BACKENDS.contains(&s.as_str()))
            .cloned()
            .collect()
    }

    /// Network app containers join, if enabled
    pub fn network(&self) -> Option<String> {
        self.join_network
            .then(|| format!("{}_default", self.project_name))
    }
}

/// Warmup phase settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Warmup {
    /// Requests to the root path; 0 disables warmup
    pub requests: usize,

    /// Workers sharing the warmup queue
    pub concurrency: usize,
}

impl Default for Warmup {
    fn default() -> Self {
        Self {
            requests: 100,
            concurrency: 10,
        }
    }
}

impl Warmup {
    /// Whether WARMING runs at all
    pub fn is_enabled(&self) -> bool {
        self.requests > 0
    }
}

/// Which HTTP routes a cell exercises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceClass {
    /// Parameter echo
    Cpu,
    /// Database lookups
    Io,
    /// Alternates the two
    Mixed,
}

impl ResourceClass {
    /// All classes in canonical order
    pub const ALL: [ResourceClass; 3] = [
        ResourceClass::Cpu,
        ResourceClass::Io,
        ResourceClass::Mixed,
    ];

    /// Short name used in flags and file names
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceClass::Cpu => "cpu",
            ResourceClass::Io => "io",
            ResourceClass::Mixed => "mixed",
        }
    }

    /// Whether the class touches database routes
    pub fn needs_backends(&self) -> bool {
        matches!(self, ResourceClass::Io | ResourceClass::Mixed)
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceClass::Cpu => "CPU_BOUND",
            ResourceClass::Io => "IO_BOUND",
            ResourceClass::Mixed => "MIXED",
        })
    }
}

impl FromStr for ResourceClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" | "cpu_bound" => Ok(ResourceClass::Cpu),
            "io" | "io_bound" => Ok(ResourceClass::Io),
            "mixed" => Ok(ResourceClass::Mixed),
            other => Err(format!(
                "unknown resource class '{}' (expected cpu, io or mixed)",
                other
            )),
        }
    }
}

/// How long one measuring cell runs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementSpec {
    /// Fixed number of attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<usize>,

    /// Fixed wall-clock duration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Optional requests-per-second ceiling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<f64>,
}

impl Default for MeasurementSpec {
    fn default() -> Self {
        Self {
            requests: Some(1000),
            duration_ms: None,
            rate_limit: None,
        }
    }
}

impl MeasurementSpec {
    /// Stop condition for the phase
    pub fn stop_condition(&self) -> StopCondition {
        match (self.requests, self.duration_ms) {
            (_, Some(ms)) => StopCondition::Duration(Duration::from_millis(ms)),
            (Some(n), None) => StopCondition::RequestCount(n),
            (None, None) => StopCondition::default(),
        }
    }

    fn validate(&self, class: ResourceClass) -> Result<(), ConfigError> {
        match (self.requests, self.duration_ms) {
            (Some(_), Some(_)) | (None, None) => {
                return Err(ConfigError::Malformed(format!(
                    "measurement.{}: set exactly one of requests or durationMs",
                    class.as_str()
                )))
            }
            (Some(0), _) | (_, Some(0)) => {
                return Err(ConfigError::Malformed(format!(
                    "measurement.{}: requests and durationMs must be positive",
                    class.as_str()
                )))
            }
            _ => {}
        }
        if let Some(rps) = self.rate_limit {
            if rps.is_nan() || rps <= 0.0 {
                return Err(ConfigError::Malformed(format!(
                    "measurement.{}: rateLimit must be positive",
                    class.as_str()
                )));
            }
        }
        Ok(())
    }
}

/// Measurement settings per resource class
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementTable {
    /// CPU_BOUND cells
    pub cpu: MeasurementSpec,
    /// IO_BOUND cells
    pub io: MeasurementSpec,
    /// MIXED cells
    pub mixed: MeasurementSpec,
}

impl MeasurementTable {
    /// Settings for one class
    pub fn for_class(&self, class: ResourceClass) -> &MeasurementSpec {
        match class {
            ResourceClass::Cpu => &self.cpu,
            ResourceClass::Io => &self.io,
            ResourceClass::Mixed => &self.mixed,
        }
    }
}

/// Benchmark-wide defaults and switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BenchmarkSettings {
    /// Warmup defaults
    pub warmup: Warmup,
    /// Default resource selection
    pub resources: Vec<ResourceClass>,
    /// Default capacity selection
    pub capacity: Vec<usize>,
    /// Pause between servers, clamped to at least one second
    pub cooldown_ms: u64,
    /// Poll interval for probes and cancellation
    pub poll_interval_ms: u64,
    /// Per-request deadline during measuring
    pub request_timeout_ms: u64,
    /// DELETE /db/<backend>/reset before measuring
    pub reset_databases: bool,
    /// Users created per backend before measuring; IO routes look these up
    pub seed_users: usize,
    /// Poll container CPU/memory while measuring
    pub sample_resources: bool,
    /// RNG seed for query terms
    pub seed: u64,
}

impl Default for BenchmarkSettings {
    fn default() -> Self {
        Self {
            warmup: Warmup::default(),
            resources: vec![ResourceClass::Cpu],
            capacity: vec![10],
            cooldown_ms: 1000,
            poll_interval_ms: 200,
            request_timeout_ms: 5000,
            reset_databases: false,
            seed_users: 100,
            sample_resources: false,
            seed: 42,
        }
    }
}

impl BenchmarkSettings {
    /// Inter-server pause, never below one second
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms.max(MIN_COOLDOWN_MS))
    }

    /// Probe and cancellation poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Per-request deadline
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }
}

const MIN_COOLDOWN_MS: u64 = 1000;

/// Deadlines for each bounded phase, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Timeouts {
    /// STARTING_CONTAINER
    pub container_start_ms: u64,
    /// WAITING_READY
    pub readiness_ms: u64,
    /// WARMING
    pub warmup_ms: u64,
    /// One MEASURING cell
    pub cell_ms: u64,
    /// TEARING_DOWN
    pub teardown_ms: u64,
    /// Waiting for the stack to become healthy
    pub stack_healthy_ms: u64,
    /// `up` and `down` of the stack
    pub stack_command_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            container_start_ms: 60_000,
            readiness_ms: 30_000,
            warmup_ms: 120_000,
            cell_ms: 600_000,
            teardown_ms: 30_000,
            stack_healthy_ms: 120_000,
            stack_command_ms: 300_000,
        }
    }
}

impl Timeouts {
    /// STARTING_CONTAINER deadline
    pub fn container_start(&self) -> Duration {
        Duration::from_millis(self.container_start_ms)
    }
    /// WAITING_READY deadline
    pub fn readiness(&self) -> Duration {
        Duration::from_millis(self.readiness_ms)
    }
    /// WARMING deadline
    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }
    /// Per-cell deadline
    pub fn cell(&self) -> Duration {
        Duration::from_millis(self.cell_ms)
    }
    /// TEARING_DOWN deadline
    pub fn teardown(&self) -> Duration {
        Duration::from_millis(self.teardown_ms)
    }
    /// Stack health deadline
    pub fn stack_healthy(&self) -> Duration {
        Duration::from_millis(self.stack_healthy_ms)
    }
    /// Stack up/down deadline
    pub fn stack_command(&self) -> Duration {
        Duration::from_millis(self.stack_command_ms)
    }
}

/// Where results go
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultsSettings {
    /// Root directory; relative paths resolve against the working directory
    pub root: PathBuf,
}

impl Default for ResultsSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("results"),
        }
    }
}

/// Everything read from the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalogue {
    /// Available servers, in file order
    pub servers: Vec<ServerSpec>,
    /// Backing stack, if any
    #[serde(default)]
    pub stack: Option<StackSpec>,
    /// Benchmark defaults
    #[serde(default)]
    pub benchmark: BenchmarkSettings,
    /// Per-class measurement settings
    #[serde(default)]
    pub measurement: MeasurementTable,
    /// Phase deadlines
    #[serde(default)]
    pub timeouts: Timeouts,
    /// Output location
    #[serde(default)]
    pub results: ResultsSettings,
}

impl Catalogue {
    /// Parse and validate YAML text
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let mut catalogue: Catalogue =
            serde_yaml::from_str(text).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        catalogue.validate()?;
        Ok(catalogue)
    }

    /// Server names in file order
    pub fn server_names(&self) -> Vec<&str> {
        self.servers.iter().map(|s| s.name.as_str()).collect()
    }

    /// Database backends derived from the stack
    pub fn backends(&self) -> Vec<String> {
        self.stack.as_ref().map(StackSpec::backends).unwrap_or_default()
    }

    fn validate(&mut self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::Empty("config lists no servers".into()));
        }
        let mut seen = HashSet::new();
        for server in &mut self.servers {
            server.validate()?;
            if !seen.insert(server.name.clone()) {
                return Err(ConfigError::Malformed(format!(
                    "duplicate server name '{}'",
                    server.name
                )));
            }
        }
        if let Some(stack) = &self.stack {
            if stack.project_name.trim().is_empty() {
                return Err(ConfigError::Malformed("stack.projectName is empty".into()));
            }
        }
        if self.benchmark.warmup.concurrency == 0 {
            return Err(ConfigError::Malformed(
                "benchmark.warmup.concurrency must be at least 1".into(),
            ));
        }
        if self.benchmark.resources.is_empty() {
            return Err(ConfigError::Malformed("benchmark.resources is empty".into()));
        }
        validate_capacity(&self.benchmark.capacity).map_err(ConfigError::Malformed)?;
        for class in ResourceClass::ALL {
            self.measurement.for_class(class).validate(class)?;
        }
        Ok(())
    }
}

fn validate_capacity(capacity: &[usize]) -> Result<(), String> {
    if capacity.is_empty() {
        return Err("capacity list is empty".into());
    }
    if capacity.contains(&0) {
        return Err("capacity must be at least 1".into());
    }
    Ok(())
}

/// Read and validate the config file
///
/// The returned catalogue holds the resolved servers (defaults applied).
pub fn load_config(path: &Path) -> Result<Catalogue, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Missing {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let catalogue = Catalogue::from_yaml(&text)?;
    tracing::debug!(
        path = %path.display(),
        servers = catalogue.servers.len(),
        "Loaded config"
    );
    Ok(catalogue)
}

// ============================================================================
// Runtime options and plan
// ============================================================================

/// Options chosen for this invocation, from flags or the prompt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Warmup request override
    pub warmup: Option<usize>,
    /// Resource class override
    pub resources: Option<Vec<ResourceClass>>,
    /// Capacity override
    pub capacity: Option<Vec<usize>>,
    /// Selected server names; empty means all
    pub servers: Vec<String>,
    /// Results root override
    pub results_dir: Option<PathBuf>,
}

impl RuntimeOptions {
    /// Whether no run option was provided
    pub fn is_empty(&self) -> bool {
        self.warmup.is_none()
            && self.resources.is_none()
            && self.capacity.is_none()
            && self.servers.is_empty()
            && self.results_dir.is_none()
    }
}

/// A validated, ordered selection ready to execute
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPlan {
    /// Servers to run, in order
    pub servers: Vec<ServerSpec>,
    /// Warmup settings
    pub warmup: Warmup,
    /// Resource classes, deduplicated in given order
    pub resources: Vec<ResourceClass>,
    /// Capacities, deduplicated in given order
    pub capacity: Vec<usize>,
    /// Absolute results root
    pub results_root: PathBuf,
    /// Backing stack
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<StackSpec>,
    /// Database backends for IO routes
    pub backends: Vec<String>,
    /// Per-class measurement settings
    pub measurement: MeasurementTable,
    /// Benchmark switches
    pub settings: BenchmarkSettings,
    /// Phase deadlines
    pub timeouts: Timeouts,
}

impl RunPlan {
    /// (resource, capacity) cells in execution order
    pub fn cells(&self) -> Vec<(ResourceClass, usize)> {
        self.resources
            .iter()
            .flat_map(|r| self.capacity.iter().map(move |c| (*r, *c)))
            .collect()
    }
}

/// Merge runtime options over the catalogue
///
/// Returns the plan plus the names that matched no server. Unknown names
/// are only fatal when nothing else remains.
pub fn apply_runtime_options(
    catalogue: &Catalogue,
    options: &RuntimeOptions,
) -> Result<(RunPlan, Vec<String>), ConfigError> {
    let mut unknown = Vec::new();
    let servers: Vec<ServerSpec> = if options.servers.is_empty() {
        catalogue.servers.clone()
    } else {
        let mut picked: Vec<ServerSpec> = Vec::new();
        for name in &options.servers {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            match catalogue.servers.iter().find(|s| s.name == name) {
                Some(spec) if !picked.iter().any(|p| p.name == spec.name) => {
                    picked.push(spec.clone())
                }
                Some(_) => {}
                None => unknown.push(name.to_string()),
            }
        }
        if picked.is_empty() && unknown.is_empty() {
            catalogue.servers.clone()
        } else {
            picked
        }
    };

    if servers.is_empty() {
        return Err(ConfigError::Empty(format!(
            "no known server selected (unknown: {})",
            unknown.join(", ")
        )));
    }

    let mut warmup = catalogue.benchmark.warmup;
    if let Some(requests) = options.warmup {
        warmup.requests = requests;
    }

    let resources = dedup(
        options
            .resources
            .clone()
            .unwrap_or_else(|| catalogue.benchmark.resources.clone()),
    );
    if resources.is_empty() {
        return Err(ConfigError::InvalidOption("resources list is empty".into()));
    }

    let capacity = dedup(
        options
            .capacity
            .clone()
            .unwrap_or_else(|| catalogue.benchmark.capacity.clone()),
    );
    validate_capacity(&capacity).map_err(ConfigError::InvalidOption)?;

    let backends = catalogue.backends();
    if let Some(class) = resources.iter().find(|r| r.needs_backends()) {
        if backends.is_empty() {
            return Err(ConfigError::InvalidOption(format!(
                "{} selected but the stack declares none of {}",
                class,
                KNOWN_BACKENDS.join(", ")
            )));
        }
        if catalogue.benchmark.seed_users == 0 {
            return Err(ConfigError::InvalidOption(format!(
                "{} selected but benchmark.seedUsers is 0; user lookups need seeded ids",
                class
            )));
        }
    }

    let root = options
        .results_dir
        .clone()
        .unwrap_or_else(|| catalogue.results.root.clone());
    let results_root = absolutize(&root)?;

    let plan = RunPlan {
        servers,
        warmup,
        resources,
        capacity,
        results_root,
        stack: catalogue.stack.clone(),
        backends,
        measurement: catalogue.measurement,
        settings: catalogue.benchmark.clone(),
        timeouts: catalogue.timeouts,
    };
    Ok((plan, unknown))
}

fn dedup<T: PartialEq + Copy>(items: Vec<T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn absolutize(path: &Path) -> Result<PathBuf, ConfigError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| ConfigError::InvalidOption(format!("cannot resolve results root: {}", e)))?;
    Ok(cwd.join(path))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not readable
    #[error("cannot read config {path}: {reason}")]
    Missing {
        /// Path that was tried
        path: String,
        /// OS error text
        reason: String,
    },

    /// Parse or validation failure
    #[error("invalid config: {0}")]
    Malformed(String),

    /// Nothing to run
    #[error("nothing to run: {0}")]
    Empty(String),

    /// A runtime option was rejected
    #[error("invalid option: {0}")]
    InvalidOption(String),
}

impl ConfigError {
    /// Map onto the failure taxonomy
    pub fn to_failure_kind(&self) -> FailureKind {
        match self {
            ConfigError::Missing { .. } => FailureKind::ConfigMissing,
            ConfigError::Malformed(_) => FailureKind::ConfigMalformed,
            ConfigError::Empty(_) => FailureKind::ConfigEmpty,
            ConfigError::InvalidOption(_) => FailureKind::FlagInvalid,
        }
    }
}
