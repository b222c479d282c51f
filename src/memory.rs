//! Point-in-time memory readings used by segment planning and the cache budget.
//!
//! Readings are advisory. Code that consumes them must tolerate `None` and must
//! re-read on every request rather than caching a value.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

/// Source of memory statistics, injectable so tests can pin the numbers.
pub trait MemoryProbe: Send + Sync {
    /// Bytes currently available for new allocations.
    fn available_bytes(&self) -> Option<u64>;

    /// Total bytes of memory the process may use.
    fn total_bytes(&self) -> Option<u64>;
}

/// Reads `MemAvailable` and `MemTotal` from `/proc/meminfo`.
///
/// Returns `None` on platforms without procfs.
#[derive(Debug, Clone)]
pub struct ProcMemoryProbe {
    path: PathBuf,
}

impl Default for ProcMemoryProbe {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/proc/meminfo"),
        }
    }
}

impl ProcMemoryProbe {
    #[cfg(test)]
    fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Format: "MemAvailable:   12345 kB"
    fn read_field_kb(&self, field: &str) -> Option<u64> {
        let file = File::open(&self.path).ok()?;
        let reader = BufReader::new(file);

        for line in reader.lines().map_while(|line| line.ok()) {
            if let Some(rest) = line.strip_prefix(field) {
                let rest = rest.strip_prefix(':')?;
                return rest.split_whitespace().next()?.parse::<u64>().ok();
            }
        }

        None
    }
}

impl MemoryProbe for ProcMemoryProbe {
    fn available_bytes(&self) -> Option<u64> {
        self.read_field_kb("MemAvailable")
            .or_else(|| self.read_field_kb("MemFree"))
            .map(|kb| kb.saturating_mul(1024))
    }

    fn total_bytes(&self) -> Option<u64> {
        self.read_field_kb("MemTotal").map(|kb| kb.saturating_mul(1024))
    }
}

/// Fixed readings for reproducible planning decisions.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedMemoryProbe {
    pub available: Option<u64>,
    pub total: Option<u64>,
}

impl FixedMemoryProbe {
    pub const fn new(available: u64, total: u64) -> Self {
        Self {
            available: Some(available),
            total: Some(total),
        }
    }

    /// A probe that never produces a reading.
    pub const fn unavailable() -> Self {
        Self {
            available: None,
            total: None,
        }
    }
}

impl MemoryProbe for FixedMemoryProbe {
    fn available_bytes(&self) -> Option<u64> {
        self.available
    }

    fn total_bytes(&self) -> Option<u64> {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_meminfo(name: &str, content: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("primefinder-meminfo-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_proc_probe_parses_fields() {
        let path = write_meminfo(
            "full",
            "MemTotal:       16384 kB\nMemFree:         1024 kB\nMemAvailable:    8192 kB\n",
        );
        let probe = ProcMemoryProbe::with_path(&path);

        assert_eq!(probe.total_bytes(), Some(16384 * 1024));
        assert_eq!(probe.available_bytes(), Some(8192 * 1024));
    }

    #[test]
    fn test_proc_probe_falls_back_to_mem_free() {
        let path = write_meminfo("old_kernel", "MemTotal:  2048 kB\nMemFree:  512 kB\n");
        let probe = ProcMemoryProbe::with_path(&path);

        assert_eq!(probe.available_bytes(), Some(512 * 1024));
    }

    #[test]
    fn test_proc_probe_missing_file() {
        let probe = ProcMemoryProbe::with_path("/nonexistent/primefinder/meminfo");
        assert_eq!(probe.available_bytes(), None);
        assert_eq!(probe.total_bytes(), None);
    }

    #[test]
    fn test_fixed_probe() {
        let probe = FixedMemoryProbe::new(10, 20);
        assert_eq!(probe.available_bytes(), Some(10));
        assert_eq!(probe.total_bytes(), Some(20));

        let probe = FixedMemoryProbe::unavailable();
        assert_eq!(probe.available_bytes(), None);
    }
}
