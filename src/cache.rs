//! High-water-mark cache of computed primes.
//!
//! The cache remembers one prime sequence and the bound it was computed for.
//! A request at or below that bound is answered by slicing the sequence; a
//! larger accepted result replaces it outright (ranges are never merged) and
//! the covered bound only ever grows.
//!
//! The sequence itself lives in a [`PrimeStore`], the narrow contract an
//! in-process array or an external key/value backend has to satisfy.

use crate::Result;
use crate::memory::MemoryProbe;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Fraction of total memory a cached prime set may occupy.
pub const DEFAULT_MAX_MEMORY_FRACTION: f64 = 0.2;

/// Largest bound whose result is eligible for caching.
pub const DEFAULT_MAX_CACHED_BOUND: u64 = 100_000_000;

/// Assumed total memory when the probe cannot tell us.
pub const FALLBACK_TOTAL_MEMORY: u64 = 1 << 30;

/// Bytes per cached prime.
const PRIME_BYTES: u64 = size_of::<u64>() as u64;

/// Storage for one ascending prime sequence.
///
/// Both operations must be idempotent and must work on a store that has never
/// been written: `range_up_to` then returns an empty vector.
pub trait PrimeStore: Send + Sync {
    /// Replace the stored sequence with `primes`.
    fn put(&mut self, primes: &[u64]) -> Result<()>;

    /// Every stored prime `<= limit`, ascending.
    fn range_up_to(&self, limit: u64) -> Result<Vec<u64>>;
}

/// In-process array backend.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    primes: Vec<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PrimeStore for MemoryStore {
    fn put(&mut self, primes: &[u64]) -> Result<()> {
        self.primes.clear();
        self.primes.extend_from_slice(primes);
        Ok(())
    }

    fn range_up_to(&self, limit: u64) -> Result<Vec<u64>> {
        let end = self.primes.partition_point(|&p| p <= limit);
        Ok(self.primes[..end].to_vec())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheConfig {
    /// Share of total memory the cached set may use.
    pub max_memory_fraction: f64,
    /// Explicit byte budget; overrides the fraction when set.
    pub max_bytes: Option<u64>,
    /// Bounds above this are never stored. `None` removes the cap.
    pub max_cached_bound: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_memory_fraction: DEFAULT_MAX_MEMORY_FRACTION,
            max_bytes: None,
            max_cached_bound: Some(DEFAULT_MAX_CACHED_BOUND),
        }
    }
}

/// Result of [`ResultCache::try_store`]. None of these fail the request that
/// produced the primes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The set replaced the previous one; the cache now covers `bound`.
    Stored { bound: u64 },
    /// The cache already covers this bound; nothing changed.
    AlreadyCovered { covered: u64 },
    /// The set needs more than the budget allows.
    TooLarge { footprint: u64, budget: u64 },
    /// The bound is above the configured cache-eligibility cap.
    AboveCap { bound: u64, cap: u64 },
    /// The backing store could not be written; the previous contents and
    /// covered bound are kept.
    BackendFailed { reason: String },
}

impl StoreOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, StoreOutcome::Stored { .. })
    }
}

impl fmt::Display for StoreOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreOutcome::Stored { bound } => write!(f, "cached up to {bound}"),
            StoreOutcome::AlreadyCovered { covered } => write!(f, "already cached up to {covered}"),
            StoreOutcome::TooLarge { footprint, budget } => write!(
                f,
                "not cached, {} MB exceeds the {} MB cache budget",
                footprint / (1024 * 1024),
                budget / (1024 * 1024)
            ),
            StoreOutcome::AboveCap { bound, cap } => {
                write!(f, "not cached, bound {bound} is above the cache cap {cap}")
            }
            StoreOutcome::BackendFailed { reason } => {
                write!(f, "not cached, store failed: {reason}")
            }
        }
    }
}

struct CacheState {
    covered_up_to: u64,
    store: Box<dyn PrimeStore>,
}

pub struct ResultCache {
    state: RwLock<CacheState>,
    config: CacheConfig,
    probe: Arc<dyn MemoryProbe>,
}

impl ResultCache {
    pub fn new(config: CacheConfig, probe: Arc<dyn MemoryProbe>) -> Self {
        Self::with_store(Box::new(MemoryStore::new()), config, probe)
    }

    pub fn with_store(
        store: Box<dyn PrimeStore>,
        config: CacheConfig,
        probe: Arc<dyn MemoryProbe>,
    ) -> Self {
        Self {
            state: RwLock::new(CacheState {
                covered_up_to: 0,
                store,
            }),
            config,
            probe,
        }
    }

    /// Highest bound answered from cache, 0 when empty.
    pub fn covered_up_to(&self) -> u64 {
        self.state.read().covered_up_to
    }

    pub fn is_covered(&self, limit: u64) -> bool {
        let covered = self.state.read().covered_up_to;
        covered > 0 && limit <= covered
    }

    /// Cached primes `<= limit`. Empty unless [`is_covered`](Self::is_covered).
    pub fn slice_up_to(&self, limit: u64) -> Result<Vec<u64>> {
        Ok(self.lookup(limit)?.unwrap_or_default())
    }

    /// Covered check and slice under one read lock, so a concurrent store
    /// cannot slip in between them.
    pub fn lookup(&self, limit: u64) -> Result<Option<Vec<u64>>> {
        let state = self.state.read();
        if state.covered_up_to == 0 || limit > state.covered_up_to {
            return Ok(None);
        }
        state.store.range_up_to(limit).map(Some)
    }

    /// Byte budget for one cached set, re-read from the probe on every call.
    pub fn budget_bytes(&self) -> u64 {
        if let Some(bytes) = self.config.max_bytes {
            return bytes;
        }
        let total = self.probe.total_bytes().unwrap_or(FALLBACK_TOTAL_MEMORY);
        (total as f64 * self.config.max_memory_fraction) as u64
    }

    /// Offer the primes computed for `bound`.
    ///
    /// On acceptance the set replaces whatever was cached and the covered bound
    /// rises to `bound`. Every rejection leaves the cache untouched.
    pub fn try_store(&self, bound: u64, primes: &[u64]) -> StoreOutcome {
        if let Some(cap) = self.config.max_cached_bound {
            if bound > cap {
                return StoreOutcome::AboveCap { bound, cap };
            }
        }

        let footprint = (primes.len() as u64).saturating_mul(PRIME_BYTES);
        let budget = self.budget_bytes();
        if footprint > budget {
            tracing::warn!(
                footprint_mb = footprint / (1024 * 1024),
                budget_mb = budget / (1024 * 1024),
                "Prime set too large to cache"
            );
            return StoreOutcome::TooLarge { footprint, budget };
        }

        let mut state = self.state.write();
        if bound <= state.covered_up_to {
            return StoreOutcome::AlreadyCovered {
                covered: state.covered_up_to,
            };
        }

        if let Err(e) = state.store.put(primes) {
            tracing::warn!(bound, "Cache store failed: {e}");
            return StoreOutcome::BackendFailed {
                reason: e.to_string(),
            };
        }
        state.covered_up_to = bound;
        tracing::info!(bound, primes = primes.len(), "Cache extended");
        StoreOutcome::Stored { bound }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::FixedMemoryProbe;
    use crate::primes::sieve;
    use std::thread;

    fn cache(config: CacheConfig) -> ResultCache {
        ResultCache::new(config, Arc::new(FixedMemoryProbe::new(1 << 30, 1 << 30)))
    }

    #[test]
    fn test_empty_cache_covers_nothing() {
        let cache = cache(CacheConfig::default());
        assert_eq!(cache.covered_up_to(), 0);
        assert!(!cache.is_covered(2));
        assert!(!cache.is_covered(0));
        assert!(cache.slice_up_to(100).unwrap().is_empty());
        assert_eq!(cache.lookup(100).unwrap(), None);
    }

    #[test]
    fn test_store_then_slice() {
        let cache = cache(CacheConfig::default());
        let primes = sieve(1_000).unwrap();

        assert_eq!(
            cache.try_store(1_000, &primes),
            StoreOutcome::Stored { bound: 1_000 }
        );
        assert!(cache.is_covered(1_000));
        assert!(cache.is_covered(100));
        assert!(!cache.is_covered(1_001));

        assert_eq!(cache.slice_up_to(100).unwrap(), sieve(100).unwrap());
        assert_eq!(cache.slice_up_to(1_000).unwrap(), primes);
        assert!(cache.slice_up_to(1_001).unwrap().is_empty());
    }

    #[test]
    fn test_covered_bound_only_grows() {
        let cache = cache(CacheConfig::default());
        cache.try_store(10_000, &sieve(10_000).unwrap());
        cache.try_store(50_000, &sieve(50_000).unwrap());

        assert!(cache.is_covered(10_000));
        assert!(cache.is_covered(50_000));

        let outcome = cache.try_store(20_000, &sieve(20_000).unwrap());
        assert_eq!(outcome, StoreOutcome::AlreadyCovered { covered: 50_000 });
        assert_eq!(cache.covered_up_to(), 50_000);
        assert_eq!(cache.slice_up_to(50_000).unwrap().len(), 5_133);
    }

    #[test]
    fn test_oversized_store_is_rejected() {
        let cache = cache(CacheConfig {
            max_bytes: Some(1_000 * 8),
            ..CacheConfig::default()
        });
        cache.try_store(100, &sieve(100).unwrap());

        let primes = sieve(100_000).unwrap();
        let outcome = cache.try_store(100_000, &primes);
        assert_eq!(
            outcome,
            StoreOutcome::TooLarge {
                footprint: primes.len() as u64 * 8,
                budget: 8_000
            }
        );
        assert_eq!(cache.covered_up_to(), 100);
        assert_eq!(cache.slice_up_to(100).unwrap().len(), 25);
    }

    #[test]
    fn test_budget_from_probe_fraction() {
        let probe = Arc::new(FixedMemoryProbe::new(0, 1_000_000));
        let cache = ResultCache::new(CacheConfig::default(), probe);
        assert_eq!(cache.budget_bytes(), 200_000);

        let probe = Arc::new(FixedMemoryProbe::unavailable());
        let cache = ResultCache::new(CacheConfig::default(), probe);
        assert_eq!(cache.budget_bytes(), (FALLBACK_TOTAL_MEMORY as f64 * 0.2) as u64);
    }

    #[test]
    fn test_bound_above_cap_is_not_stored() {
        let cache = cache(CacheConfig {
            max_cached_bound: Some(1_000),
            ..CacheConfig::default()
        });
        let outcome = cache.try_store(1_001, &sieve(1_001).unwrap());
        assert_eq!(outcome, StoreOutcome::AboveCap { bound: 1_001, cap: 1_000 });
        assert!(!cache.is_covered(2));
    }

    struct BrokenStore;

    impl PrimeStore for BrokenStore {
        fn put(&mut self, _primes: &[u64]) -> Result<()> {
            Err(std::io::Error::other("disk full").into())
        }

        fn range_up_to(&self, _limit: u64) -> Result<Vec<u64>> {
            Err(std::io::Error::other("unreadable").into())
        }
    }

    #[test]
    fn test_failed_store_keeps_cache_untouched() {
        let probe = Arc::new(FixedMemoryProbe::new(1 << 30, 1 << 30));
        let cache = ResultCache::with_store(Box::new(BrokenStore), CacheConfig::default(), probe);

        match cache.try_store(100, &sieve(100).unwrap()) {
            StoreOutcome::BackendFailed { reason } => {
                assert!(reason.contains("disk full"), "{}", reason)
            }
            other => panic!("expected BackendFailed, got {:?}", other),
        }
        assert_eq!(cache.covered_up_to(), 0);
        assert_eq!(cache.lookup(100).unwrap(), None);
    }

    #[test]
    fn test_memory_store_contract() {
        let mut store = MemoryStore::new();
        assert!(store.range_up_to(100).unwrap().is_empty());

        store.put(&[2, 3, 5, 7]).unwrap();
        store.put(&[2, 3, 5, 7]).unwrap();
        assert_eq!(store.range_up_to(5).unwrap(), vec![2, 3, 5]);
        assert_eq!(store.range_up_to(1).unwrap(), Vec::<u64>::new());
        assert_eq!(store.range_up_to(u64::MAX).unwrap(), vec![2, 3, 5, 7]);

        store.put(&[]).unwrap();
        assert!(store.range_up_to(100).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_readers_see_consistent_snapshots() {
        let cache = Arc::new(cache(CacheConfig::default()));
        let bounds = [1_000_u64, 5_000, 20_000, 80_000];

        thread::scope(|scope| {
            let writer = Arc::clone(&cache);
            scope.spawn(move || {
                for bound in bounds {
                    writer.try_store(bound, &sieve(bound).unwrap());
                }
            });

            for _ in 0..4 {
                let reader = Arc::clone(&cache);
                scope.spawn(move || {
                    for _ in 0..200 {
                        if let Some(primes) = reader.lookup(1_000).unwrap() {
                            assert_eq!(primes.len(), 168);
                        }
                    }
                });
            }
        });

        assert_eq!(cache.covered_up_to(), 80_000);
    }
}
