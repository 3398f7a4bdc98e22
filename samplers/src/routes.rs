//! Route samplers for each resource class

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serverbench_core::{ResourceClass, RouteRequest, Sampler, SamplerError, SeededUsers};

/// Query terms for the parameter echo route
const SEARCH_TERMS: &[&str] = &[
    "alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel", "india", "juliet",
    "kilo", "lima", "mike", "november", "oscar", "papa", "quebec", "romeo", "sierra", "tango",
];

/// Largest `limit` requested from the search route
const MAX_LIMIT: u32 = 50;

/// Always `GET /`
#[derive(Debug, Default)]
pub struct RootSampler;

impl Sampler for RootSampler {
    fn name(&self) -> &str {
        "root"
    }

    fn sample(&self) -> Result<RouteRequest, SamplerError> {
        Ok(RouteRequest::get("/"))
    }
}

/// CPU_BOUND: `GET /params/search?q=<term>&limit=<n>`
#[derive(Debug)]
pub struct ParamSearchSampler {
    rng: Mutex<StdRng>,
}

impl ParamSearchSampler {
    /// Sampler with a reproducible term and limit sequence
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn next_path(&self) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let term = SEARCH_TERMS.choose(&mut *rng).copied().unwrap_or("alpha");
        let limit = rng.gen_range(1..=MAX_LIMIT);
        format!("/params/search?q={}&limit={}", term, limit)
    }
}

impl Sampler for ParamSearchSampler {
    fn name(&self) -> &str {
        "param-search"
    }

    fn sample(&self) -> Result<RouteRequest, SamplerError> {
        Ok(RouteRequest::get(self.next_path()))
    }
}

/// IO_BOUND: `GET /db/<backend>/users/<id>`
///
/// Backends are visited round-robin; ids are drawn from the users seeded on
/// that backend.
#[derive(Debug)]
pub struct UserLookupSampler {
    backends: Vec<(String, Vec<String>)>,
    next: AtomicUsize,
    rng: Mutex<StdRng>,
}

impl UserLookupSampler {
    /// Build over the given backends
    ///
    /// # Errors
    ///
    /// Fails when `backends` is empty or a backend has no seeded users.
    pub fn new(backends: &[String], seeded: &SeededUsers, seed: u64) -> Result<Self, SamplerError> {
        if backends.is_empty() {
            return Err(SamplerError::NoBackends(ResourceClass::Io));
        }
        let backends = backends
            .iter()
            .map(|b| match seeded.ids_for(b) {
                Some(ids) => Ok((b.clone(), ids.to_vec())),
                None => Err(SamplerError::Invalid(format!("no users seeded on {}", b))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            backends,
            next: AtomicUsize::new(0),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    fn next_path(&self) -> String {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.backends.len();
        let (backend, ids) = &self.backends[index];
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        // ids is never empty, see `new`
        let id = ids.choose(&mut *rng).map_or("", String::as_str);
        format!("/db/{}/users/{}", backend, id)
    }
}

impl Sampler for UserLookupSampler {
    fn name(&self) -> &str {
        "user-lookup"
    }

    fn sample(&self) -> Result<RouteRequest, SamplerError> {
        Ok(RouteRequest::get(self.next_path()))
    }
}

/// MIXED: alternates search and user lookups, starting with search
#[derive(Debug)]
pub struct MixedSampler {
    cpu: ParamSearchSampler,
    io: UserLookupSampler,
    turn: AtomicUsize,
}

impl MixedSampler {
    /// Combine the two route samplers
    pub fn new(cpu: ParamSearchSampler, io: UserLookupSampler) -> Self {
        Self {
            cpu,
            io,
            turn: AtomicUsize::new(0),
        }
    }
}

impl Sampler for MixedSampler {
    fn name(&self) -> &str {
        "mixed"
    }

    fn sample(&self) -> Result<RouteRequest, SamplerError> {
        if self.turn.fetch_add(1, Ordering::Relaxed) % 2 == 0 {
            self.cpu.sample()
        } else {
            self.io.sample()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backends() -> Vec<String> {
        vec!["postgres".to_string(), "redis".to_string()]
    }

    fn seeded() -> SeededUsers {
        let mut seeded = SeededUsers::new();
        seeded.push("postgres", "0190c3d2-7a1b-7c3e-9f00-1234567890ab");
        seeded.push("postgres", "0190c3d2-7a1b-7c3e-9f00-1234567890ac");
        seeded.push("redis", "0190c3d2-8000-7000-8000-00000000000a");
        seeded
    }

    #[test]
    fn test_root_sampler() {
        let req = RootSampler.sample().unwrap();
        assert_eq!(req.path, "/");
    }

    #[test]
    fn test_search_paths_are_well_formed() {
        let sampler = ParamSearchSampler::new(42);
        for _ in 0..100 {
            let path = sampler.sample().unwrap().path;
            let query = path.strip_prefix("/params/search?q=").unwrap();
            let (term, limit) = query.split_once("&limit=").unwrap();
            assert!(SEARCH_TERMS.contains(&term));
            let limit: u32 = limit.parse().unwrap();
            assert!((1..=MAX_LIMIT).contains(&limit));
        }
    }

    #[test]
    fn test_search_is_reproducible_for_a_seed() {
        let a = ParamSearchSampler::new(7);
        let b = ParamSearchSampler::new(7);
        for _ in 0..20 {
            assert_eq!(a.sample().unwrap(), b.sample().unwrap());
        }
    }

    #[test]
    fn test_user_lookup_round_robins_backends() {
        let sampler = UserLookupSampler::new(&backends(), &seeded(), 1).unwrap();
        let paths: Vec<String> = (0..4).map(|_| sampler.sample().unwrap().path).collect();
        assert!(paths[0].starts_with("/db/postgres/users/0190c3d2-7a1b-"));
        assert_eq!(paths[1], "/db/redis/users/0190c3d2-8000-7000-8000-00000000000a");
        assert!(paths[2].starts_with("/db/postgres/users/0190c3d2-7a1b-"));
        assert_eq!(paths[3], paths[1]);
    }

    #[test]
    fn test_user_lookup_draws_only_seeded_ids() {
        let seeded = seeded();
        let ids = seeded.ids_for("postgres").unwrap();
        let sampler = UserLookupSampler::new(&["postgres".to_string()], &seeded, 1).unwrap();
        for _ in 0..20 {
            let path = sampler.sample().unwrap().path;
            let id = path.strip_prefix("/db/postgres/users/").unwrap();
            assert!(ids.iter().any(|seeded| seeded == id));
        }
    }

    #[test]
    fn test_user_lookup_requires_seeded_users() {
        let err = UserLookupSampler::new(&backends(), &SeededUsers::new(), 1).unwrap_err();
        assert!(matches!(err, SamplerError::Invalid(ref m) if m.contains("postgres")));
    }

    #[test]
    fn test_user_lookup_requires_backends() {
        let err = UserLookupSampler::new(&[], &SeededUsers::new(), 1).unwrap_err();
        assert!(matches!(err, SamplerError::NoBackends(ResourceClass::Io)));
    }

    #[test]
    fn test_mixed_alternates() {
        let io = UserLookupSampler::new(&backends(), &seeded(), 1).unwrap();
        let sampler = MixedSampler::new(ParamSearchSampler::new(1), io);
        let paths: Vec<String> = (0..6).map(|_| sampler.sample().unwrap().path).collect();
        for (i, path) in paths.iter().enumerate() {
            if i % 2 == 0 {
                assert!(path.starts_with("/params/search"));
            } else {
                assert!(path.starts_with("/db/"));
            }
        }
    }
}
