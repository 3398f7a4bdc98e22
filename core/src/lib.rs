//! serverbench-core: Core data structures and run engine for benchmarking
//! HTTP servers in containers
//!
//! This crate provides the pieces every other serverbench component builds on:
//!
//! - Configuration loading and the validated run plan
//! - Core traits (ContainerDriver, TargetClient, Sampler, ResultSink)
//! - Health probes for servers and the database stack
//! - Workers and the load generator
//! - Per-cell metrics, rollups and the run manifest
//! - The orchestrator state machine
//! - Error handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod channel;
pub mod config;
pub mod error;
pub mod loadgen;
pub mod manifest;
pub mod metrics;
pub mod orchestrator;
pub mod probe;
pub mod request;
pub mod response;
pub mod traits;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::{
    apply_runtime_options, load_config, Catalogue, ConfigError, ResourceClass, RunPlan,
    RuntimeOptions, ServerSpec,
};
pub use error::*;
pub use manifest::*;
pub use metrics::*;
pub use orchestrator::{Orchestrator, OrchestratorBuilder, RunSummary};
pub use request::*;
pub use response::*;
pub use traits::*;
pub use worker::{RequestRateLimiter, Worker, WorkerBuilder, WorkerStats};
