//! Docker CLI implementation of [`ContainerDriver`]

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serverbench_core::{
    ContainerDriver, ContainerHandle, ContainerStats, DriverError, ServerSpec, StackHealth,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::compose::{parse_ps_output, stack_health};
use crate::process::{classify_failure, render, run_command, CommandOutput};
use crate::stats::parse_stats_line;

/// Budget for cleanup commands issued after the caller's token fired
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Docker driver configuration
#[derive(Debug, Clone)]
pub struct DockerConfig {
    /// CLI binary
    pub binary: String,
    /// Prefix for generated container names
    pub name_prefix: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            name_prefix: "serverbench".to_string(),
        }
    }
}

impl DockerConfig {
    /// Use a different CLI binary (e.g. `podman`)
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }
}

/// Drives containers and compose stacks through the docker CLI
///
/// Application containers get a generated name so a `docker run` that is
/// cancelled after the daemon accepted it can still be removed.
#[derive(Debug)]
pub struct DockerDriver {
    config: DockerConfig,
    stacks: Mutex<HashSet<String>>,
    sequence: AtomicU64,
}

impl DockerDriver {
    /// Create a driver
    pub fn new(config: DockerConfig) -> Self {
        Self {
            config,
            stacks: Mutex::new(HashSet::new()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Create a driver for the `docker` binary on PATH
    pub fn with_defaults() -> Self {
        Self::new(DockerConfig::default())
    }

    async fn docker(
        &self,
        args: Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, DriverError> {
        run_command(&self.config.binary, &args, cancel).await
    }

    /// Run and require a zero exit
    async fn docker_ok(
        &self,
        args: Vec<String>,
        port: Option<u16>,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, DriverError> {
        let output = self.docker(args.clone(), cancel).await?;
        if output.success {
            Ok(output)
        } else {
            Err(classify_failure(
                render(&self.config.binary, &args),
                &output,
                port,
            ))
        }
    }

    fn container_name(&self, server: &str) -> String {
        let n = self.sequence.fetch_add(1, Ordering::Relaxed);
        let server: String = server
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        format!(
            "{}-{}-{}-{}",
            self.config.name_prefix,
            server,
            std::process::id(),
            n
        )
    }

    /// Best-effort `rm -f` of a named container after a cancelled start
    async fn remove_by_name(&self, name: &str) {
        let cmd = args(["rm", "-f", name]);
        match tokio::time::timeout(CLEANUP_TIMEOUT, self.docker(cmd, &CancellationToken::new()))
            .await
        {
            Ok(Ok(output)) if output.success => {
                tracing::debug!(container = name, "Removed abandoned container");
            }
            Ok(Ok(output)) => {
                tracing::debug!(container = name, stderr = %output.stderr, "No container to remove");
            }
            Ok(Err(e)) => tracing::warn!(container = name, error = %e, "Failed to remove container"),
            Err(_) => tracing::warn!(container = name, "Timed out removing container"),
        }
    }
}

impl Default for DockerDriver {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Arguments for `docker run`
pub fn run_args(spec: &ServerSpec, name: &str, network: Option<&str>) -> Vec<String> {
    let mut out = args(["run", "-d", "--rm", "--name", name, "-p"]);
    out.push(format!("{}:{}", spec.host_port, spec.container_port));
    if let Some(cpus) = spec.cpu_limit {
        out.push("--cpus".to_string());
        out.push(cpus.to_string());
    }
    if let Some(memory) = &spec.memory_limit {
        out.push("--memory".to_string());
        out.push(memory.clone());
    }
    if let Some(network) = network {
        out.push("--network".to_string());
        out.push(network.to_string());
    }
    out.push(spec.image.clone());
    out
}

fn is_gone(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("no such container") || lower.contains("is not running")
}

#[async_trait]
impl ContainerDriver for DockerDriver {
    fn engine_name(&self) -> &str {
        &self.config.binary
    }

    async fn engine_version(&self, cancel: &CancellationToken) -> Result<String, DriverError> {
        let output = self
            .docker(args(["version", "--format", "{{.Server.Version}}"]), cancel)
            .await?;
        let version = output.stdout.trim();
        if !output.success || version.is_empty() {
            return Err(DriverError::EngineUnavailable(if output.stderr.is_empty() {
                "engine did not report a server version".to_string()
            } else {
                output.stderr
            }));
        }
        Ok(version.to_string())
    }

    async fn start_app(
        &self,
        spec: &ServerSpec,
        network: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ContainerHandle, DriverError> {
        let inspect = self
            .docker(
                args(["image", "inspect", "--format", "{{.Id}}", spec.image.as_str()]),
                cancel,
            )
            .await?;
        if !inspect.success {
            return Err(
                match classify_failure(format!("image inspect {}", spec.image), &inspect, None) {
                    DriverError::ImageMissing(_) => DriverError::ImageMissing(spec.image.clone()),
                    other => other,
                },
            );
        }

        let name = self.container_name(&spec.name);
        let run = run_args(spec, &name, network);
        let output = match self.docker(run.clone(), cancel).await {
            Ok(output) => output,
            Err(DriverError::Cancelled) => {
                self.remove_by_name(&name).await;
                return Err(DriverError::Cancelled);
            }
            Err(e) => return Err(e),
        };
        if !output.success {
            // a failed run can still leave a created container behind
            self.remove_by_name(&name).await;
            return Err(classify_failure(
                render(&self.config.binary, &run),
                &output,
                Some(spec.host_port),
            ));
        }

        let id = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .ok_or_else(|| DriverError::Parse("docker run printed no container id".into()))?;
        let handle = ContainerHandle::new(spec.name.clone(), id);
        tracing::debug!(server = %spec.name, container = %handle.id, name = %name, "Container running");
        Ok(handle)
    }

    async fn kill(
        &self,
        handle: &ContainerHandle,
        cancel: &CancellationToken,
    ) -> Result<(), DriverError> {
        let kill = args(["kill", handle.id.as_str()]);
        let output = self.docker(kill.clone(), cancel).await?;
        if output.success || is_gone(&output.stderr) {
            return Ok(());
        }
        Err(classify_failure(
            render(&self.config.binary, &kill),
            &output,
            None,
        ))
    }

    async fn start_stack(
        &self,
        compose_file: &Path,
        project: &str,
        cancel: &CancellationToken,
    ) -> Result<(), DriverError> {
        // recorded before `up` so a partial start is still torn down
        self.stacks.lock().await.insert(project.to_string());

        let file = compose_file.to_string_lossy();
        self.docker_ok(
            args(["compose", "-f", file.as_ref(), "-p", project, "up", "-d"]),
            None,
            cancel,
        )
        .await?;
        tracing::debug!(project, compose_file = %file, "Stack up");
        Ok(())
    }

    async fn stop_stack(&self, project: &str, cancel: &CancellationToken) -> Result<(), DriverError> {
        if !self.stacks.lock().await.contains(project) {
            tracing::debug!(project, "Stack never started here, nothing to stop");
            return Ok(());
        }

        self.docker_ok(args(["compose", "-p", project, "down"]), None, cancel)
            .await?;
        self.stacks.lock().await.remove(project);
        Ok(())
    }

    async fn query_stack_health(
        &self,
        project: &str,
        required: &[String],
        cancel: &CancellationToken,
    ) -> Result<StackHealth, DriverError> {
        let output = self
            .docker_ok(
                args(["compose", "-p", project, "ps", "--all", "--format", "json"]),
                None,
                cancel,
            )
            .await?;
        let entries = parse_ps_output(&output.stdout, project)?;
        Ok(stack_health(required, &entries))
    }

    async fn stats(
        &self,
        handle: &ContainerHandle,
        cancel: &CancellationToken,
    ) -> Result<ContainerStats, DriverError> {
        let output = self
            .docker_ok(
                args(["stats", "--no-stream", "--format", "{{json .}}", handle.id.as_str()]),
                None,
                cancel,
            )
            .await?;
        parse_stats_line(&output.stdout)
    }
}
