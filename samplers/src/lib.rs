//! Route samplers for serverbench workloads
//!
//! This crate provides implementations of the `Sampler` trait for:
//!
//! - Warmup against the server root
//! - CPU_BOUND parameter echo (`/params/search`)
//! - IO_BOUND user lookups (`/db/<backend>/users/<id>`)
//! - MIXED, alternating the two
//!
//! [`RouteSamplers`] hands the orchestrator a fresh sampler per cell.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod routes;

use std::sync::Arc;

use serverbench_core::config::BenchmarkSettings;
use serverbench_core::{ResourceClass, Sampler, SamplerError, SamplerProvider, SeededUsers};

pub use routes::{MixedSampler, ParamSearchSampler, RootSampler, UserLookupSampler};

/// Sampler provider for the built-in routes
#[derive(Debug, Clone, Copy)]
pub struct RouteSamplers {
    seed: u64,
}

impl RouteSamplers {
    /// Provider with an RNG seed
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Provider configured from the benchmark settings
    pub fn from_settings(settings: &BenchmarkSettings) -> Self {
        Self::new(settings.seed)
    }
}

impl SamplerProvider for RouteSamplers {
    fn warmup(&self) -> Arc<dyn Sampler> {
        Arc::new(RootSampler)
    }

    fn measurement(
        &self,
        class: ResourceClass,
        backends: &[String],
        seeded: &SeededUsers,
    ) -> Result<Arc<dyn Sampler>, SamplerError> {
        let sampler: Arc<dyn Sampler> = match class {
            ResourceClass::Cpu => Arc::new(ParamSearchSampler::new(self.seed)),
            ResourceClass::Io => Arc::new(UserLookupSampler::new(backends, seeded, self.seed)?),
            ResourceClass::Mixed => {
                let io = UserLookupSampler::new(backends, seeded, self.seed)
                    .map_err(|e| match e {
                        SamplerError::NoBackends(_) => SamplerError::NoBackends(class),
                        other => other,
                    })?;
                Arc::new(MixedSampler::new(ParamSearchSampler::new(self.seed), io))
            }
        };
        tracing::debug!(class = %class, sampler = sampler.name(), "Built measurement sampler");
        Ok(sampler)
    }
}
