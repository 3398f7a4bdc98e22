//! Run orchestration
//!
//! The orchestrator owns a run from engine probe to manifest:
//! - INIT checks the container engine answers
//! - STACK_UP starts the database stack and waits for every required service
//! - PER_SERVER_LOOP runs each server through container start, readiness,
//!   warmup and the measuring matrix, always killing its container
//! - STACK_DOWN stops the stack, including after failures and signals
//!
//! # Example
//!
//! ```ignore
//! use serverbench_core::orchestrator::OrchestratorBuilder;
//!
//! let orchestrator = OrchestratorBuilder::new()
//!     .plan(plan)
//!     .driver(driver)
//!     .target(target)
//!     .samplers(samplers)
//!     .sink(sink)
//!     .build()?;
//!
//! let summary = orchestrator.run_with_signal_handling().await;
//! std::process::exit(summary.exit_code() as i32);
//! ```

mod builder;
mod executor;
mod server;
mod state;

pub use builder::OrchestratorBuilder;
pub use executor::Orchestrator;
pub use state::{RunPhase, RunSummary, Stage};
