//! Segment sizing and the tiling of [2, bound] into sieve windows.

use std::sync::Arc;

use crate::memory::MemoryProbe;

/// Smallest segment the dynamic heuristic will hand out (unless √bound is
/// smaller still).
pub const MIN_DYNAMIC_SEGMENT: u64 = 1024;

/// ⌈√n⌉
pub fn ceil_sqrt(n: u64) -> u64 {
    let root = n.isqrt();
    if root * root == n { root } else { root + 1 }
}

/// One window [low, high] of the search space (both ends inclusive).
///
/// `small_primes` holds every prime up to ⌈√bound⌉ + 1 and is shared by all
/// segments of the same plan.
#[derive(Debug, Clone)]
pub struct SegmentDescriptor {
    pub index: usize,
    pub low: u64,
    pub high: u64,
    pub small_primes: Arc<[u64]>,
}

impl SegmentDescriptor {
    /// Number of candidates in the window.
    pub fn span(&self) -> u64 {
        self.high - self.low + 1
    }
}

/// Tiling of [2, bound] into contiguous windows of `segment_size` numbers.
/// The last window is truncated at `bound`.
#[derive(Debug, Clone)]
pub struct SegmentPlan {
    bound: u64,
    segment_size: u64,
    small_primes: Arc<[u64]>,
}

impl SegmentPlan {
    pub fn new(bound: u64, segment_size: u64, small_primes: Arc<[u64]>) -> Self {
        Self {
            bound,
            segment_size: segment_size.max(1),
            small_primes,
        }
    }

    pub fn segment_size(&self) -> u64 {
        self.segment_size
    }

    pub fn segment_count(&self) -> usize {
        if self.bound < 2 {
            return 0;
        }
        let span = self.bound - 1;
        span.div_ceil(self.segment_size) as usize
    }

    pub fn segments(&self) -> impl Iterator<Item = SegmentDescriptor> + '_ {
        (0..self.segment_count()).map(move |index| {
            let low = 2 + index as u64 * self.segment_size;
            let high = low.saturating_add(self.segment_size - 1).min(self.bound);
            SegmentDescriptor {
                index,
                low,
                high,
                small_primes: Arc::clone(&self.small_primes),
            }
        })
    }
}

/// How the planner picks a segment size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SegmentSizing {
    /// ⌈√bound⌉ + 1
    #[default]
    Static,
    /// Bounded by available memory per worker, see [`SegmentPlanner::dynamic_size`].
    Dynamic,
}

pub struct SegmentPlanner {
    sizing: SegmentSizing,
    probe: Arc<dyn MemoryProbe>,
}

impl SegmentPlanner {
    pub fn new(sizing: SegmentSizing, probe: Arc<dyn MemoryProbe>) -> Self {
        Self { sizing, probe }
    }

    pub fn segment_size(&self, bound: u64, workers: usize) -> u64 {
        match self.sizing {
            SegmentSizing::Static => Self::static_size(bound),
            SegmentSizing::Dynamic => self.dynamic_size(bound, workers),
        }
    }

    pub fn static_size(bound: u64) -> u64 {
        ceil_sqrt(bound) + 1
    }

    /// min(⌈√bound⌉, available ÷ workers ÷ scaling), floored at
    /// [`MIN_DYNAMIC_SEGMENT`]. Falls back to the static size without a
    /// memory reading.
    pub fn dynamic_size(&self, bound: u64, workers: usize) -> u64 {
        let root = ceil_sqrt(bound);

        let Some(available) = self.probe.available_bytes() else {
            tracing::debug!("No memory reading, using static segment size");
            return Self::static_size(bound);
        };

        let scaling = Self::scaling_factor(bound);
        let per_worker = available / workers.max(1) as u64 / scaling;
        let size = per_worker.min(root).max(MIN_DYNAMIC_SEGMENT.min(root)).max(1);

        tracing::debug!(
            bound,
            workers,
            scaling,
            available,
            segment_size = size,
            "Dynamic segment size"
        );
        size
    }

    /// 1 up to 10^8, 2 up to 10^10, 4 beyond.
    pub fn scaling_factor(bound: u64) -> u64 {
        match bound.checked_ilog10().unwrap_or(0) {
            0..=7 => 1,
            8 | 9 => 2,
            _ => 4,
        }
    }
}
