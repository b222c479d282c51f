//! Symbolic algorithm requests and their resolution to concrete strategies.

use std::fmt;
use std::str::FromStr;

/// Below this bound `Auto` picks the dense sieve; at or above it the
/// concurrent segmented sieve.
pub const AUTO_CONCURRENT_THRESHOLD: u64 = 5_000_000;

/// Algorithm name reported for results served from the cache.
pub const CACHE_HIT: &str = "CACHE_HIT";

/// What a caller asks for. `Auto` must be resolved with [`Algorithm::resolve`]
/// before anything runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, clap::ValueEnum)]
pub enum Algorithm {
    TrialDivision,
    Sieve,
    SieveBitset,
    SegmentedSieve,
    SegmentedSieveBitset,
    SegmentedSieveConcurrent,
    #[default]
    Auto,
}

/// A concrete algorithm. There is no `Auto` here, so an unresolved request
/// cannot reach the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    TrialDivision,
    Sieve,
    SieveBitset,
    SegmentedSieve,
    SegmentedSieveBitset,
    SegmentedSieveConcurrent,
}

impl Algorithm {
    pub const ALL: [Algorithm; 7] = [
        Algorithm::TrialDivision,
        Algorithm::Sieve,
        Algorithm::SieveBitset,
        Algorithm::SegmentedSieve,
        Algorithm::SegmentedSieveBitset,
        Algorithm::SegmentedSieveConcurrent,
        Algorithm::Auto,
    ];

    /// Resolve to a concrete strategy for `bound`, using `threshold` as the
    /// `Auto` switch-over point.
    pub fn resolve(self, bound: u64, threshold: u64) -> Strategy {
        match self {
            Algorithm::TrialDivision => Strategy::TrialDivision,
            Algorithm::Sieve => Strategy::Sieve,
            Algorithm::SieveBitset => Strategy::SieveBitset,
            Algorithm::SegmentedSieve => Strategy::SegmentedSieve,
            Algorithm::SegmentedSieveBitset => Strategy::SegmentedSieveBitset,
            Algorithm::SegmentedSieveConcurrent => Strategy::SegmentedSieveConcurrent,
            Algorithm::Auto if bound < threshold => Strategy::Sieve,
            Algorithm::Auto => Strategy::SegmentedSieveConcurrent,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Auto => "AUTO",
            other => other.resolve(0, 0).name(),
        }
    }
}

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Strategy::TrialDivision => "TRIAL_DIVISION",
            Strategy::Sieve => "SIEVE",
            Strategy::SieveBitset => "SIEVE_BITSET",
            Strategy::SegmentedSieve => "SEGMENTED_SIEVE",
            Strategy::SegmentedSieveBitset => "SEGMENTED_SIEVE_BITSET",
            Strategy::SegmentedSieveConcurrent => "SEGMENTED_SIEVE_CONCURRENT",
        }
    }

    /// Segmented strategies never allocate an array sized by the bound.
    pub fn is_segmented(self) -> bool {
        match self {
            Strategy::TrialDivision | Strategy::Sieve | Strategy::SieveBitset => false,
            Strategy::SegmentedSieve
            | Strategy::SegmentedSieveBitset
            | Strategy::SegmentedSieveConcurrent => true,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown algorithm '{0}'")]
pub struct UnknownAlgorithm(String);

impl FromStr for Algorithm {
    type Err = UnknownAlgorithm;

    /// Accepts the upper-snake-case names, case-insensitively, with `-` or `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Algorithm::ALL
            .into_iter()
            .find(|algorithm| algorithm.name() == normalized)
            .ok_or_else(|| UnknownAlgorithm(s.to_string()))
    }
}
