use crate::cache::CacheConfig;
use crate::pool::available_workers;
use crate::segment::SegmentSizing;
use crate::select::AUTO_CONCURRENT_THRESHOLD;

/// Largest bound any strategy accepts (`i64::MAX`).
pub const MAX_BOUND: u64 = i64::MAX as u64;

/// Settings for a [`PrimeFinder`](crate::PrimeFinder).
#[derive(Debug, Clone, PartialEq)]
pub struct FinderConfig {
    /// Worker threads for the concurrent sieve.
    pub workers: usize,
    /// Bound at which `Auto` switches to the concurrent sieve.
    pub auto_threshold: u64,
    /// Segment sizing used by the concurrent sieve. The sequential segmented
    /// strategies always use the static size.
    pub concurrent_segments: SegmentSizing,
    pub cache: CacheConfig,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            workers: available_workers(),
            auto_threshold: AUTO_CONCURRENT_THRESHOLD,
            concurrent_segments: SegmentSizing::Dynamic,
            cache: CacheConfig::default(),
        }
    }
}
