//! serverbench - benchmark containerized HTTP servers one at a time

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use serverbench_core::{apply_runtime_options, load_config, ConfigError, OrchestratorBuilder};
use serverbench_drivers::{DockerDriver, HttpConfig, HttpTarget};
use serverbench_samplers::RouteSamplers;
use serverbench_storage::LocalResultSink;
use tokio_util::sync::CancellationToken;

mod cli;

/// Configuration or argument error
const EXIT_CONFIG: u8 = 1;
/// Unexpected failure before the run started
const EXIT_INTERNAL: u8 = 4;

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match cli::Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(EXIT_CONFIG),
            };
        }
    };

    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{:#}", e);
            if e.downcast_ref::<ConfigError>().is_some() {
                ExitCode::from(EXIT_CONFIG)
            } else {
                ExitCode::from(EXIT_INTERNAL)
            }
        }
    }
}

async fn run(cli: cli::Cli) -> Result<u8> {
    tracing::info!("serverbench {} starting", env!("CARGO_PKG_VERSION"));

    let catalogue = load_config(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config.display()))?;

    let options = if !cli.has_run_options() && cli::prompt::stdin_is_terminal() {
        cli::prompt::prompt_options(&catalogue).context("Failed to read interactive answers")?
    } else {
        cli.runtime_options()
    };

    let (plan, unknown) = apply_runtime_options(&catalogue, &options)?;
    for name in &unknown {
        tracing::warn!(server = %name, "Unknown server name ignored");
    }

    println!("{}", serverbench_report::render_plan(&plan));

    let max_capacity = plan
        .capacity
        .iter()
        .copied()
        .max()
        .unwrap_or(1)
        .max(plan.warmup.concurrency);
    let http = HttpConfig::default().with_pool_max_idle(max_capacity);
    let target = HttpTarget::new(&http).context("Failed to build HTTP client")?;

    let sink = LocalResultSink::new(&plan.results_root, chrono::Utc::now());
    let samplers = RouteSamplers::from_settings(&plan.settings);

    let orchestrator = OrchestratorBuilder::new()
        .plan(plan)
        .driver(Arc::new(DockerDriver::with_defaults()))
        .target(Arc::new(target))
        .samplers(Arc::new(samplers))
        .sink(Arc::new(sink))
        .cancel(CancellationToken::new())
        .build()
        .context("Failed to build orchestrator")?;

    let summary = orchestrator.run_with_signal_handling().await;
    println!("{}", serverbench_report::render_summary(&summary));

    tracing::info!(
        outcome = ?summary.outcome,
        exit_code = summary.exit_code(),
        "Run finished"
    );
    Ok(summary.exit_code())
}
