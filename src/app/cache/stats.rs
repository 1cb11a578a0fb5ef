//! Cache statistics
//!
//! Counters are updated lock-free from every read, write and fetch path
//! and can be snapshotted at any time for logging or display.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time snapshot of cache activity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from an entry inside the freshness window
    pub fresh_hits: u64,
    /// Reads served from a valid entry past the freshness window
    pub stale_hits: u64,
    /// Reads that found no entry
    pub misses: u64,
    /// Reads that found and evicted an expired entry
    pub expirations: u64,
    /// Reads that found and evicted an entry produced by another transform
    pub transform_mismatches: u64,
    /// Entries written
    pub writes: u64,
    /// Entries removed through explicit eviction
    pub evictions: u64,
    /// Network requests actually issued
    pub network_fetches: u64,
    /// Requests satisfied by joining an in-flight fetch
    pub deduplicated: u64,
    /// Entries currently held
    pub entries: usize,
    /// Fetches currently in flight
    pub pending: usize,
}

impl CacheStats {
    /// Total reads that returned an entry
    pub fn hits(&self) -> u64 {
        self.fresh_hits + self.stale_hits
    }

    /// Hit ratio over all reads, 0.0 when nothing has been read
    pub fn hit_ratio(&self) -> f64 {
        let reads =
            self.hits() + self.misses + self.expirations + self.transform_mismatches;
        if reads == 0 {
            return 0.0;
        }
        self.hits() as f64 / reads as f64
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entries={} pending={} hits={} (fresh={}, stale={}) misses={} expired={} \
             transform_mismatches={} network={} dedup={} hit_ratio={:.1}%",
            self.entries,
            self.pending,
            self.hits(),
            self.fresh_hits,
            self.stale_hits,
            self.misses,
            self.expirations,
            self.transform_mismatches,
            self.network_fetches,
            self.deduplicated,
            self.hit_ratio() * 100.0
        )
    }
}

/// Live counters shared by the cache store and the orchestrator
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub fresh_hits: AtomicU64,
    pub stale_hits: AtomicU64,
    pub misses: AtomicU64,
    pub expirations: AtomicU64,
    pub transform_mismatches: AtomicU64,
    pub writes: AtomicU64,
    pub evictions: AtomicU64,
    pub network_fetches: AtomicU64,
    pub deduplicated: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self, entries: usize, pending: usize) -> CacheStats {
        CacheStats {
            fresh_hits: self.fresh_hits.load(Ordering::Relaxed),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            transform_mismatches: self.transform_mismatches.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            network_fetches: self.network_fetches.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            entries,
            pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio() {
        let stats = CacheStats {
            fresh_hits: 2,
            stale_hits: 1,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.hits(), 3);
        assert!((stats.hit_ratio() - 0.75).abs() < f64::EPSILON);
        assert_eq!(CacheStats::default().hit_ratio(), 0.0);
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = StatsCounters::default();
        StatsCounters::bump(&counters.misses);
        StatsCounters::add(&counters.writes, 3);

        let stats = counters.snapshot(2, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.writes, 3);
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.pending, 1);
        assert!(stats.to_string().contains("entries=2"));
    }
}
