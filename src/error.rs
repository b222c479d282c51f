//! Error types for prime computation.
//!
//! ## Error Cases
//! - `InvalidBound`: the requested bound cannot be served by the chosen
//!   strategy. Raised before any computation or timing starts.
//! - `ConcurrentExecution`: one or more segment tasks failed; no partial
//!   result is ever returned alongside it.
//! - `ResourceExhaustion`: a dense array or result buffer could not be
//!   allocated. Callers should suggest a smaller bound or a segmented strategy.
//! - `Storage`: the data directory or a file-backed prime store failed.
//!
//! A result that cannot be cached (too large, above the cap, or a failing
//! backing store) is not an error; see
//! [`StoreOutcome`](crate::cache::StoreOutcome). A failing cache read falls back
//! to computing.

pub type Result<T> = core::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The bound is below 2, above the supported range, or too large for a
    /// non-segmented strategy.
    #[error("Invalid bound {bound}: {reason}")]
    InvalidBound { bound: u64, reason: String },

    /// At least one segment of a concurrent sieve failed.
    #[error("Concurrent sieve failed in {failed} of {total} segments: {reason}")]
    ConcurrentExecution {
        failed: usize,
        total: usize,
        reason: String,
    },

    /// Allocating a sieve array or result buffer failed.
    #[error("Out of memory allocating {bytes} bytes, try a smaller bound or a segmented algorithm")]
    ResourceExhaustion { bytes: u64 },

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid_bound(bound: u64, reason: impl Into<String>) -> Self {
        Self::InvalidBound {
            bound,
            reason: reason.into(),
        }
    }
}
