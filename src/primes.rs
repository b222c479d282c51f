//! The sieve algorithm family.
//!
//! Every function here returns an ascending, duplicate-free `Vec<u64>` holding
//! exactly the primes in [2, bound]. None of them validate business rules
//! beyond what they need to index memory; see `finder` for request checks.

use crate::estimate::prime_buffer;
use crate::segment::{SegmentDescriptor, SegmentPlan, ceil_sqrt};
use crate::{Error, Result};
use std::sync::Arc;

/// Largest bound the non-segmented strategies accept. Above it the flag array
/// would need more than 4 Gi entries.
pub const DENSE_BOUND_LIMIT: u64 = if (usize::MAX as u64) < u32::MAX as u64 {
    usize::MAX as u64 - 1
} else {
    u32::MAX as u64
};

#[inline]
fn get_bit(bits: &[u64], idx: usize) -> bool {
    let word_idx = idx / 64;
    let bit_idx = idx % 64;
    (bits[word_idx] & (1_u64 << bit_idx)) != 0
}

#[inline]
fn clear_bit(bits: &mut [u64], idx: usize) {
    let word_idx = idx / 64;
    let bit_idx = idx % 64;
    bits[word_idx] &= !(1_u64 << bit_idx);
}

/// Array length for a dense sieve over [0, bound].
fn dense_len(bound: u64) -> Result<usize> {
    if bound > DENSE_BOUND_LIMIT {
        return Err(Error::invalid_bound(
            bound,
            format!(
                "dense sieves support bounds up to {DENSE_BOUND_LIMIT}, use a segmented algorithm"
            ),
        ));
    }
    Ok(bound as usize + 1)
}

/// Reset `buf` to `len` copies of `value`, reserving fallibly.
fn refill<T: Copy>(buf: &mut Vec<T>, len: usize, value: T) -> Result<()> {
    buf.clear();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::ResourceExhaustion {
            bytes: (len as u64).saturating_mul(size_of::<T>() as u64),
        })?;
    buf.resize(len, value);
    Ok(())
}

/// Push every set bit of `words` as `base + idx`, ignoring bits at or past `len`.
fn collect_set_bits(words: &[u64], len: usize, base: u64, primes: &mut Vec<u64>) {
    for (word_idx, &word) in words.iter().enumerate() {
        let mut word = word;

        while word != 0 {
            let bit_idx = word.trailing_zeros() as usize;
            let idx = word_idx * 64 + bit_idx;

            if idx >= len {
                break;
            }

            primes.push(base + idx as u64);
            word &= word - 1; // clear lowest set bit
        }
    }
}

/// Trial division against every i with i * i <= n.
///
/// O(n√n); a baseline for small bounds and for checking the sieves.
pub fn trial_division(bound: u64) -> Result<Vec<u64>> {
    dense_len(bound)?;
    let mut primes = prime_buffer(bound)?;

    for n in 2..=bound {
        if is_prime_by_trial_division(n) {
            primes.push(n);
        }
    }

    Ok(primes)
}

fn is_prime_by_trial_division(n: u64) -> bool {
    let mut i = 2_u64;
    while i * i <= n {
        if n % i == 0 {
            return false;
        }
        i += 1;
    }
    true
}

/// Sieve of Eratosthenes over one `bool` per number.
pub fn sieve(bound: u64) -> Result<Vec<u64>> {
    let len = dense_len(bound)?;
    let mut is_prime = Vec::new();
    refill(&mut is_prime, len, true)?;
    is_prime[0] = false;
    if len > 1 {
        is_prime[1] = false;
    }

    let mut i = 2_usize;
    while (i as u64) * (i as u64) <= bound {
        if is_prime[i] {
            let mut j = i * i;
            while j < len {
                is_prime[j] = false;
                j += i;
            }
        }
        i += 1;
    }

    let mut primes = prime_buffer(bound)?;
    primes.extend(
        is_prime
            .iter()
            .enumerate()
            .filter(|&(_, &prime)| prime)
            .map(|(num, _)| num as u64),
    );
    Ok(primes)
}

/// Sieve of Eratosthenes over one bit per number (8x less memory than
/// [`sieve`]).
pub fn sieve_bitset(bound: u64) -> Result<Vec<u64>> {
    let len = dense_len(bound)?;
    let mut is_prime = Vec::new();
    refill(&mut is_prime, len.div_ceil(64), !0_u64)?;

    // 0 and 1 are not prime
    clear_bit(&mut is_prime, 0);
    if len > 1 {
        clear_bit(&mut is_prime, 1);
    }

    let mut i = 2_usize;
    while (i as u64) * (i as u64) <= bound {
        if get_bit(&is_prime, i) {
            let mut j = i * i;
            while j < len {
                clear_bit(&mut is_prime, j);
                j += i;
            }
        }
        i += 1;
    }

    let mut primes = prime_buffer(bound)?;
    collect_set_bits(&is_prime, len, 0, &mut primes);
    Ok(primes)
}

/// Primes up to ⌈√bound⌉ + 1, enough to sieve any segment of [2, bound].
pub fn small_primes(bound: u64) -> Result<Vec<u64>> {
    sieve_bitset(ceil_sqrt(bound) + 1)
}

/// First multiple of `p` worth clearing in a window starting at `low`.
#[inline]
fn first_multiple(p: u64, low: u64) -> u64 {
    (p * p).max(low.div_ceil(p) * p)
}

/// Sieve one window with a `bool` per number, appending its primes.
///
/// `mark` is scratch space and may be reused across calls.
pub fn sieve_segment_into(
    segment: &SegmentDescriptor,
    mark: &mut Vec<bool>,
    primes: &mut Vec<u64>,
) -> Result<()> {
    let (low, high) = (segment.low, segment.high);
    refill(mark, segment.span() as usize, true)?;

    for &p in segment.small_primes.iter() {
        if p * p > high {
            break;
        }
        let mut j = first_multiple(p, low);
        while j <= high {
            mark[(j - low) as usize] = false;
            j += p;
        }
    }

    // Segments start at 2, but guard against windows built by hand
    for n in low..=high.min(1) {
        mark[(n - low) as usize] = false;
    }

    primes.extend(
        mark.iter()
            .enumerate()
            .filter(|&(_, &prime)| prime)
            .map(|(i, _)| low + i as u64),
    );
    Ok(())
}

/// Bitset counterpart of [`sieve_segment_into`].
pub fn sieve_segment_bitset_into(
    segment: &SegmentDescriptor,
    words: &mut Vec<u64>,
    primes: &mut Vec<u64>,
) -> Result<()> {
    let (low, high) = (segment.low, segment.high);
    let len = segment.span() as usize;
    refill(words, len.div_ceil(64), !0_u64)?;

    for &p in segment.small_primes.iter() {
        if p * p > high {
            break;
        }
        let mut j = first_multiple(p, low);
        while j <= high {
            clear_bit(words, (j - low) as usize);
            j += p;
        }
    }

    // Segments start at 2, but guard against windows built by hand
    for n in low..=high.min(1) {
        clear_bit(words, (n - low) as usize);
    }

    collect_set_bits(words, len, low, primes);
    Ok(())
}

/// Sieve one window into a fresh buffer. Used by concurrent segment tasks,
/// which must not share scratch space.
pub fn sieve_segment_bitset(segment: &SegmentDescriptor) -> Result<Vec<u64>> {
    let mut words = Vec::new();
    let mut primes = Vec::new();
    sieve_segment_bitset_into(segment, &mut words, &mut primes)?;
    Ok(primes)
}

fn plan_for(bound: u64, segment_size: u64) -> Result<SegmentPlan> {
    let small = small_primes(bound)?;
    Ok(SegmentPlan::new(bound, segment_size, Arc::from(small)))
}

/// Segmented sieve with a `bool` per number in each window.
///
/// Peak memory is the small primes plus one window of `segment_size` flags.
pub fn segmented_sieve(bound: u64, segment_size: u64) -> Result<Vec<u64>> {
    let plan = plan_for(bound, segment_size)?;
    let mut primes = prime_buffer(bound)?;
    let mut mark = Vec::new();

    for segment in plan.segments() {
        sieve_segment_into(&segment, &mut mark, &mut primes)?;
    }

    Ok(primes)
}

/// Segmented sieve with one bit per number in each window.
pub fn segmented_sieve_bitset(bound: u64, segment_size: u64) -> Result<Vec<u64>> {
    let plan = plan_for(bound, segment_size)?;
    let mut primes = prime_buffer(bound)?;
    let mut words = Vec::new();

    for segment in plan.segments() {
        sieve_segment_bitset_into(&segment, &mut words, &mut primes)?;
    }

    Ok(primes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegmentPlanner;
    use rug::Integer;
    use rug::integer::IsPrime;

    const PRIMES_TO_100: [u64; 25] = [
        2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83,
        89, 97,
    ];

    fn all_strategies(bound: u64) -> Vec<(&'static str, Vec<u64>)> {
        let size = SegmentPlanner::static_size(bound);
        vec![
            ("trial_division", trial_division(bound).unwrap()),
            ("sieve", sieve(bound).unwrap()),
            ("sieve_bitset", sieve_bitset(bound).unwrap()),
            ("segmented_sieve", segmented_sieve(bound, size).unwrap()),
            ("segmented_sieve_bitset", segmented_sieve_bitset(bound, size).unwrap()),
        ]
    }

    #[test]
    fn test_all_strategies_to_100() {
        for (name, primes) in all_strategies(100) {
            assert_eq!(primes, PRIMES_TO_100, "{} returned wrong primes", name);
        }
    }

    #[test]
    fn test_bound_two_and_three() {
        for (name, primes) in all_strategies(2) {
            assert_eq!(primes, vec![2], "{}", name);
        }
        for (name, primes) in all_strategies(3) {
            assert_eq!(primes, vec![2, 3], "{}", name);
        }
    }

    #[test]
    fn test_never_reports_zero_or_one() {
        for bound in 2..40 {
            for (name, primes) in all_strategies(bound) {
                assert!(primes.first() == Some(&2), "{} at bound {}", name, bound);
            }
        }
    }

    #[test]
    fn test_sieves_count_to_one_million() {
        let size = SegmentPlanner::static_size(1_000_000);
        assert_eq!(sieve(1_000_000).unwrap().len(), 78_498);
        assert_eq!(sieve_bitset(1_000_000).unwrap().len(), 78_498);
        assert_eq!(segmented_sieve(1_000_000, size).unwrap().len(), 78_498);
        assert_eq!(segmented_sieve_bitset(1_000_000, size).unwrap().len(), 78_498);
    }

    #[test]
    fn test_trial_division_count_to_one_million() {
        assert_eq!(trial_division(1_000_000).unwrap().len(), 78_498);
    }

    #[test]
    fn test_segmented_matches_dense_for_many_bounds() {
        for bound in (2..500).chain([65_535, 65_536, 65_537, 99_991, 100_000]) {
            let dense = sieve(bound).unwrap();
            for size in [1, 2, 3, 64, 65, SegmentPlanner::static_size(bound), 1_000_000] {
                assert_eq!(
                    segmented_sieve(bound, size).unwrap(),
                    dense,
                    "bound {} size {}",
                    bound,
                    size
                );
                assert_eq!(
                    segmented_sieve_bitset(bound, size).unwrap(),
                    dense,
                    "bitset bound {} size {}",
                    bound,
                    size
                );
            }
        }
    }

    #[test]
    fn test_results_agree_with_miller_rabin() {
        let bound = 20_000;
        let primes = sieve_bitset(bound).unwrap();
        let expected: Vec<u64> = (2..=bound)
            .filter(|&n| Integer::from(n).is_probably_prime(30) != IsPrime::No)
            .collect();
        assert_eq!(primes, expected);
    }

    #[test]
    fn test_strictly_increasing() {
        for (name, primes) in all_strategies(50_000) {
            assert!(primes.windows(2).all(|w| w[0] < w[1]), "{} not ascending", name);
        }
    }

    #[test]
    fn test_small_primes_cover_sqrt() {
        let small = small_primes(1_000_000).unwrap();
        assert_eq!(small.last(), Some(&997));
        assert!(small.iter().all(|&p| p <= 1_002));
    }

    #[test]
    fn test_dense_bound_limit_rejected() {
        let bound = DENSE_BOUND_LIMIT + 1;
        assert!(matches!(sieve(bound), Err(Error::InvalidBound { .. })));
        assert!(matches!(sieve_bitset(bound), Err(Error::InvalidBound { .. })));
        assert!(matches!(trial_division(bound), Err(Error::InvalidBound { .. })));
    }

    #[test]
    fn test_segment_beyond_dense_limit() {
        // A single window far above the dense limit, checked against rug
        let bound = DENSE_BOUND_LIMIT * 4;
        let small: Arc<[u64]> = Arc::from(small_primes(bound).unwrap());
        let plan = SegmentPlan::new(bound, 10_000, small);
        let segment = plan.segments().last().unwrap();

        let primes = sieve_segment_bitset(&segment).unwrap();
        let expected: Vec<u64> = (segment.low..=segment.high)
            .filter(|&n| Integer::from(n).is_probably_prime(30) != IsPrime::No)
            .collect();
        assert!(!expected.is_empty());
        assert_eq!(primes, expected);
    }

    #[test]
    fn test_segment_containing_zero_and_one() {
        let small: Arc<[u64]> = Arc::from(small_primes(30).unwrap());
        let segment = SegmentDescriptor {
            index: 0,
            low: 0,
            high: 30,
            small_primes: small,
        };
        let mut mark = Vec::new();
        let mut flags_out = Vec::new();
        sieve_segment_into(&segment, &mut mark, &mut flags_out).unwrap();

        assert_eq!(flags_out, vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
        assert_eq!(sieve_segment_bitset(&segment).unwrap(), flags_out);
    }

    #[test]
    fn test_segment_buffer_reuse() {
        let bound = 10_000;
        let small: Arc<[u64]> = Arc::from(small_primes(bound).unwrap());
        let plan = SegmentPlan::new(bound, 333, small);
        let mut mark = Vec::new();
        let mut words = Vec::new();
        let mut flags_out = Vec::new();
        let mut bits_out = Vec::new();

        for segment in plan.segments() {
            sieve_segment_into(&segment, &mut mark, &mut flags_out).unwrap();
            sieve_segment_bitset_into(&segment, &mut words, &mut bits_out).unwrap();
        }

        assert_eq!(flags_out, sieve(bound).unwrap());
        assert_eq!(bits_out, flags_out);
    }
}
