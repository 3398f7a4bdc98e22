//! Load generation for one server
//!
//! A [`Phase`] spawns a fixed pool of workers, joins them and aggregates
//! their counters. [`LoadGenerator`] runs the two phases of a run:
//! - WARMING against the server root, counting only
//! - MEASURING with `capacity` workers, collecting every record
//!
//! Both observe a cancellation token; a cancelled measuring phase still
//! returns the records gathered so far, flagged as interrupted.
//!
//! # Example
//!
//! ```ignore
//! use serverbench_core::loadgen::LoadGenerator;
//!
//! let generator = LoadGenerator::new(target, Duration::from_secs(5));
//! generator.warmup(&base_url, provider.warmup(), plan.warmup, &cancel).await?;
//! let measurement = generator
//!     .measure(&base_url, sampler, 16, &plan.measurement.cpu, &cancel)
//!     .await?;
//! ```

mod aggregator;
mod builder;
mod executor;
mod generator;

pub use aggregator::{aggregate_worker_stats, AggregatedStats};
pub use builder::PhaseBuilder;
pub use executor::{Phase, PhaseConfig};
pub use generator::{LoadGenerator, Measurement};
