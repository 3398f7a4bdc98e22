//! Subprocess execution for engine CLIs

use std::process::Stdio;

use serverbench_core::DriverError;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Captured result of one engine command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    /// Whether the command exited zero
    pub success: bool,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr, trimmed
    pub stderr: String,
}

/// Run `program args…` to completion or until `cancel` fires
///
/// Output is drained concurrently so a chatty child cannot block on a full
/// pipe. On cancellation the child is killed and awaited before returning.
/// A missing binary is reported as ENGINE_UNAVAILABLE.
pub async fn run_command(
    program: &str,
    args: &[String],
    cancel: &CancellationToken,
) -> Result<CommandOutput, DriverError> {
    if cancel.is_cancelled() {
        return Err(DriverError::Cancelled);
    }

    tracing::debug!(command = %render(program, args), "Running engine command");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                DriverError::EngineUnavailable(format!("`{}` not found on PATH", program))
            }
            _ => DriverError::Io(e),
        })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        status = child.wait() => Some(status),
    };

    let status = match status {
        Some(Ok(status)) => status,
        Some(Err(e)) => {
            reap(&mut child, program).await;
            stdout.abort();
            stderr.abort();
            return Err(DriverError::Io(e));
        }
        None => {
            tracing::debug!(command = %render(program, args), "Engine command cancelled");
            reap(&mut child, program).await;
            stdout.abort();
            stderr.abort();
            return Err(DriverError::Cancelled);
        }
    };

    let stdout = collect(stdout).await;
    let stderr = collect(stderr).await;
    Ok(CommandOutput {
        code: status.code(),
        success: status.success(),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
    })
}

/// Read a pipe to the end on its own task
fn drain<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf).await {
                tracing::debug!(error = %e, "Failed to read engine output");
            }
        }
        buf
    })
}

async fn collect(task: JoinHandle<Vec<u8>>) -> Vec<u8> {
    match task.await {
        Ok(buf) => buf,
        Err(e) => {
            tracing::debug!(error = %e, "Engine output reader failed");
            Vec::new()
        }
    }
}

/// Kill the child and wait for its exit status
async fn reap(child: &mut Child, program: &str) {
    if let Err(e) = child.start_kill() {
        tracing::debug!(program, error = %e, "Engine command already exited");
    }
    match child.wait().await {
        Ok(status) => tracing::debug!(program, ?status, "Engine command reaped"),
        Err(e) => tracing::warn!(program, error = %e, "Failed to reap engine command"),
    }
}

/// Command line for logs and error messages
pub fn render(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Turn a failed command into the most specific driver error
///
/// `port` is the published host port when the command could bind one.
pub fn classify_failure(command: String, output: &CommandOutput, port: Option<u16>) -> DriverError {
    let stderr = output.stderr.as_str();
    let lower = stderr.to_ascii_lowercase();

    if lower.contains("cannot connect to the docker daemon")
        || lower.contains("error during connect")
        || lower.contains("is the docker daemon running")
    {
        return DriverError::EngineUnavailable(stderr.to_string());
    }
    if let Some(port) = port {
        if lower.contains("port is already allocated") || lower.contains("address already in use")
        {
            return DriverError::PortBusy {
                port,
                detail: stderr.to_string(),
            };
        }
    }
    if lower.contains("no such image")
        || lower.contains("unable to find image")
        || lower.contains("pull access denied")
    {
        return DriverError::ImageMissing(stderr.to_string());
    }

    DriverError::CommandFailed {
        command,
        code: output.code,
        stderr: stderr.to_string(),
    }
}
