use std::time::Instant;

/// A value together with how long it took to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timed<T> {
    pub value: T,
    pub duration_ms: u64,
    pub duration_ns: u64,
}

/// Run `f` and record its wall-clock duration.
pub fn measure<T>(f: impl FnOnce() -> T) -> Timed<T> {
    let start = Instant::now();
    let value = f();
    let elapsed = start.elapsed();

    Timed {
        value,
        duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        duration_ns: u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX),
    }
}
