/// Multiplier applied to the n / ln n estimate so it overshoots the true count.
const SAFETY_FACTOR: f64 = 1.2;

/// Below this bound n / ln n undershoots too much for the factor alone.
const SMALL_BOUND: u64 = 10_000;
const SMALL_BOUND_PADDING: usize = 2_000;

/// Estimate how many primes lie in [2, limit] using the Prime Number Theorem.
///
/// Only used to pre-size result buffers, so it errs high: results are scaled by
/// 1.2 and small bounds get a fixed extra 2000 slots.
pub fn estimate_prime_count(limit: u64) -> usize {
    if limit < 2 {
        return 0;
    }

    let n = limit as f64;
    let estimate = (n / n.ln()).floor() * SAFETY_FACTOR;
    // `as` saturates, so a huge bound clamps to usize::MAX instead of wrapping
    let estimate = estimate as usize;

    if limit < SMALL_BOUND {
        estimate.saturating_add(SMALL_BOUND_PADDING)
    } else {
        estimate
    }
}

/// Allocate an empty prime buffer sized from [`estimate_prime_count`].
///
/// The reservation is fallible; a failed reservation is reported as
/// [`Error::ResourceExhaustion`](crate::Error::ResourceExhaustion).
pub fn prime_buffer(limit: u64) -> crate::Result<Vec<u64>> {
    let capacity = estimate_prime_count(limit);
    let mut primes = Vec::new();
    primes
        .try_reserve_exact(capacity)
        .map_err(|_| crate::Error::ResourceExhaustion {
            bytes: (capacity as u64).saturating_mul(8),
        })?;
    Ok(primes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_below_two_is_zero() {
        assert_eq!(estimate_prime_count(0), 0);
        assert_eq!(estimate_prime_count(1), 0);
    }

    #[test]
    fn test_estimate_small_bounds_get_padding() {
        // 100 / ln(100) = 21.7 -> 21 * 1.2 = 25.2 -> 25, plus padding
        assert_eq!(estimate_prime_count(100), 25 + 2_000);
    }

    #[test]
    fn test_estimate_never_undershoots_known_counts() {
        // (limit, pi(limit))
        let known = [
            (2_u64, 1_usize),
            (10, 4),
            (100, 25),
            (1_000, 168),
            (10_000, 1_229),
            (100_000, 9_592),
            (1_000_000, 78_498),
            (10_000_000, 664_579),
            (1_000_000_000, 50_847_534),
        ];

        for (limit, count) in known {
            let estimate = estimate_prime_count(limit);
            assert!(
                estimate >= count,
                "estimate {} below pi({}) = {}",
                estimate,
                limit,
                count
            );
        }
    }

    #[test]
    fn test_prime_buffer_is_empty_with_capacity() {
        let buffer = prime_buffer(1_000_000).unwrap();
        assert!(buffer.is_empty());
        assert!(buffer.capacity() >= 78_498);
    }
}
