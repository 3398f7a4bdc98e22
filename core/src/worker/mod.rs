//! Worker module for issuing load against the application-under-test
//!
//! The Worker is the execution unit of a phase, responsible for the loop
//! **sample -> send -> record -> repeat**. Each Worker is a tokio task that:
//!
//! 1. Waits on the phase-wide rate limiter, if any
//! 2. Samples the next route
//! 3. Sends it through a TargetClient under a per-request deadline
//! 4. Classifies the outcome into an error kind
//! 5. Emits a Record on the phase channel (measuring only)
//! 6. Repeats until the stop condition is met or the token fires
//!
//! # Example
//!
//! ```ignore
//! use serverbench_core::worker::WorkerBuilder;
//! use serverbench_core::traits::StopCondition;
//!
//! let worker = WorkerBuilder::new(0)
//!     .target(target)
//!     .sampler(sampler)
//!     .base_url("http://127.0.0.1:8080")
//!     .stop_condition(StopCondition::RequestCount(100))
//!     .build()?;
//!
//! let stats = worker.run(cancel.clone()).await?;
//! ```

mod builder;
mod executor;
mod rate_limiter;
mod stats;

pub use builder::WorkerBuilder;
pub use executor::Worker;
pub use rate_limiter::RequestRateLimiter;
pub use stats::WorkerStats;

#[cfg(test)]
mod tests;
