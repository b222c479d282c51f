//! Concurrent segmented sieve over a shared [`WorkerPool`].

use crate::pool::{TaskGroup, WorkerPool};
use crate::primes::{self, sieve_segment_bitset};
use crate::segment::{SegmentDescriptor, SegmentPlan, SegmentPlanner};
use crate::{Result, estimate};
use std::sync::Arc;

/// Runs `SegmentedSieveConcurrent`: one task per segment, each with its own
/// bitset, merged back in segment order.
pub struct ConcurrentSieve {
    pool: WorkerPool,
    planner: SegmentPlanner,
}

impl ConcurrentSieve {
    pub fn new(pool: WorkerPool, planner: SegmentPlanner) -> Self {
        Self { pool, planner }
    }

    pub fn workers(&self) -> usize {
        self.pool.size()
    }

    /// Sieve [2, bound]. Blocks until every segment task has reported; any
    /// failed segment fails the whole call.
    pub fn find_primes(&self, bound: u64) -> Result<Vec<u64>> {
        let small: Arc<[u64]> = Arc::from(primes::small_primes(bound)?);
        let plan = SegmentPlan::new(bound, self.planner.segment_size(bound, self.workers()), small);

        tracing::debug!(
            bound,
            segment_size = plan.segment_size(),
            segments = plan.segment_count(),
            workers = self.workers(),
            "Concurrent sieve plan"
        );

        let parts = self.sieve_segments(&plan, sieve_segment_bitset)?;

        let mut primes = estimate::prime_buffer(bound)?;
        for part in parts {
            primes.extend(part);
        }
        debug_assert!(primes.windows(2).all(|w| w[0] < w[1]));
        Ok(primes)
    }

    /// One task per segment of `plan`; outputs in segment order.
    fn sieve_segments(
        &self,
        plan: &SegmentPlan,
        sieve_one: fn(&SegmentDescriptor) -> Result<Vec<u64>>,
    ) -> Result<Vec<Vec<u64>>> {
        let mut group = TaskGroup::new(&self.pool);
        for segment in plan.segments() {
            if let Err(e) = group.spawn(move || sieve_one(&segment)) {
                group.cancel();
                // Wait for already queued tasks so nothing outlives the request
                let _ = group.join();
                return Err(e);
            }
        }
        group.join()
    }
}
