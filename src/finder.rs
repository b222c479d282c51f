//! Request orchestration: validate, resolve, consult the cache, run, record.

use crate::cache::{ResultCache, StoreOutcome};
use crate::concurrent::ConcurrentSieve;
use crate::config::{FinderConfig, MAX_BOUND};
use crate::memory::{MemoryProbe, ProcMemoryProbe};
use crate::pool::WorkerPool;
use crate::primes::{self, DENSE_BOUND_LIMIT};
use crate::segment::SegmentPlanner;
use crate::select::{Algorithm, CACHE_HIT, Strategy};
use crate::timing::measure;
use crate::{Error, Result};
use chrono::{DateTime, Local};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindPrimesRequest {
    pub bound: u64,
    pub algorithm: Algorithm,
    /// Answer from the cache when it covers the bound.
    pub use_cache: bool,
    /// Offer freshly computed primes to the cache.
    pub build_cache: bool,
    /// Include the primes themselves; `count` is always filled in.
    pub with_result: bool,
}

impl FindPrimesRequest {
    /// Auto algorithm, no cache, primes included.
    pub fn new(bound: u64) -> Self {
        Self {
            bound,
            algorithm: Algorithm::Auto,
            use_cache: false,
            build_cache: false,
            with_result: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionMetrics {
    pub duration_ms: u64,
    pub duration_ns: u64,
    /// The resolved strategy name, or `CACHE_HIT`.
    pub algorithm_name: &'static str,
    pub cache_hit: bool,
    pub timestamp: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindPrimesResponse {
    /// Empty when the request asked for no result.
    pub primes: Vec<u64>,
    pub count: u64,
    pub metrics: ExecutionMetrics,
    /// What happened when the fresh result was offered to the cache. `None`
    /// for cache hits and for requests without `build_cache`.
    pub cache_status: Option<StoreOutcome>,
}

/// Owns the worker pool and shares the cache; one per process.
pub struct PrimeFinder {
    config: FinderConfig,
    cache: Arc<ResultCache>,
    concurrent: ConcurrentSieve,
}

impl PrimeFinder {
    /// Finder with an in-memory cache and `/proc/meminfo` readings.
    pub fn new(config: FinderConfig) -> Result<Self> {
        let probe: Arc<dyn MemoryProbe> = Arc::new(ProcMemoryProbe::default());
        let cache = Arc::new(ResultCache::new(config.cache, Arc::clone(&probe)));
        Self::with_parts(config, cache, probe)
    }

    pub fn with_parts(
        config: FinderConfig,
        cache: Arc<ResultCache>,
        probe: Arc<dyn MemoryProbe>,
    ) -> Result<Self> {
        let pool = WorkerPool::new(config.workers)?;
        let planner = SegmentPlanner::new(config.concurrent_segments, probe);
        Ok(Self {
            config,
            cache,
            concurrent: ConcurrentSieve::new(pool, planner),
        })
    }

    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// `use_cache` both reads and builds the cache.
    pub fn compute(
        &self,
        bound: u64,
        algorithm: Algorithm,
        use_cache: bool,
        with_result: bool,
    ) -> Result<FindPrimesResponse> {
        self.compute_request(FindPrimesRequest {
            bound,
            algorithm,
            use_cache,
            build_cache: use_cache,
            with_result,
        })
    }

    pub fn compute_request(&self, request: FindPrimesRequest) -> Result<FindPrimesResponse> {
        let bound = request.bound;
        let strategy = request.algorithm.resolve(bound, self.config.auto_threshold);
        validate(bound, strategy)?;

        if request.use_cache {
            let timed = measure(|| self.cache.lookup(bound));
            let cached = timed.value.unwrap_or_else(|e| {
                tracing::warn!(bound, "Cache lookup failed, computing instead: {e}");
                None
            });
            if let Some(primes) = cached {
                tracing::info!(bound, duration_ns = timed.duration_ns, "Served from cache");
                return Ok(respond(
                    primes,
                    request.with_result,
                    CACHE_HIT,
                    true,
                    timed.duration_ms,
                    timed.duration_ns,
                    None,
                ));
            }
        }

        let timed = measure(|| self.run(bound, strategy));
        let primes = timed.value?;
        tracing::info!(
            bound,
            algorithm = strategy.name(),
            count = primes.len(),
            "Execution time for {}: {} ns",
            strategy,
            timed.duration_ns
        );

        let cache_status = if request.build_cache {
            let outcome = self.cache.try_store(bound, &primes);
            if !outcome.is_stored() {
                tracing::info!(bound, "Result {outcome}");
            }
            Some(outcome)
        } else {
            None
        };

        Ok(respond(
            primes,
            request.with_result,
            strategy.name(),
            false,
            timed.duration_ms,
            timed.duration_ns,
            cache_status,
        ))
    }

    fn run(&self, bound: u64, strategy: Strategy) -> Result<Vec<u64>> {
        let segment_size = SegmentPlanner::static_size(bound);
        match strategy {
            Strategy::TrialDivision => primes::trial_division(bound),
            Strategy::Sieve => primes::sieve(bound),
            Strategy::SieveBitset => primes::sieve_bitset(bound),
            Strategy::SegmentedSieve => primes::segmented_sieve(bound, segment_size),
            Strategy::SegmentedSieveBitset => {
                primes::segmented_sieve_bitset(bound, segment_size)
            }
            Strategy::SegmentedSieveConcurrent => self.concurrent.find_primes(bound),
        }
    }
}

/// Reject bounds the resolved strategy cannot serve.
pub fn validate(bound: u64, strategy: Strategy) -> Result<()> {
    if bound < 2 {
        return Err(Error::invalid_bound(
            bound,
            "limit must be greater than or equal to 2",
        ));
    }
    if bound > MAX_BOUND {
        return Err(Error::invalid_bound(
            bound,
            format!("limit must be less than or equal to {MAX_BOUND}"),
        ));
    }
    if !strategy.is_segmented() && bound > DENSE_BOUND_LIMIT {
        return Err(Error::invalid_bound(
            bound,
            format!(
                "{strategy} supports limits up to {DENSE_BOUND_LIMIT}, use a segmented algorithm"
            ),
        ));
    }
    Ok(())
}

fn respond(
    primes: Vec<u64>,
    with_result: bool,
    algorithm_name: &'static str,
    cache_hit: bool,
    duration_ms: u64,
    duration_ns: u64,
    cache_status: Option<StoreOutcome>,
) -> FindPrimesResponse {
    let count = primes.len() as u64;
    FindPrimesResponse {
        primes: if with_result { primes } else { Vec::new() },
        count,
        metrics: ExecutionMetrics {
            duration_ms,
            duration_ns,
            algorithm_name,
            cache_hit,
            timestamp: Local::now(),
        },
        cache_status,
    }
}
