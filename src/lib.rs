//! Prime enumeration up to a bound with dense, segmented and concurrent
//! sieves, auto-selection, and a shared result cache.

pub mod cache;
pub mod concurrent;
pub mod config;
pub mod error;
pub mod estimate;
pub mod finder;
pub mod memory;
pub mod pool;
pub mod primes;
pub mod segment;
pub mod select;
pub mod storage;
pub mod telemetry;
pub mod timing;

pub use cache::{CacheConfig, ResultCache, StoreOutcome};
pub use config::{FinderConfig, MAX_BOUND};
pub use error::{Error, Result};
pub use finder::{ExecutionMetrics, FindPrimesRequest, FindPrimesResponse, PrimeFinder};
pub use segment::SegmentSizing;
pub use select::{Algorithm, Strategy};
