//! In-memory cache store
//!
//! Maps resource identifiers to timestamped entries and owns the
//! freshness/validity policy. All operations are synchronous map mutations;
//! readers always observe a consistent snapshot of a single entry.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, trace};

use crate::app::transform::TransformTag;

use super::config::CacheConfig;
use super::entry::{CacheEntry, Freshness};
use super::stats::StatsCounters;

/// Which entries an eviction removes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eviction<'a> {
    /// A single identifier
    One(&'a str),
    /// Every entry
    All,
}

impl<'a> From<Option<&'a str>> for Eviction<'a> {
    fn from(identifier: Option<&'a str>) -> Self {
        match identifier {
            Some(id) => Eviction::One(id),
            None => Eviction::All,
        }
    }
}

/// Process-wide response cache
///
/// Cloning is cheap and yields a handle to the same underlying map.
#[derive(Debug, Clone)]
pub struct CacheStore {
    config: CacheConfig,
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    stats: Arc<StatsCounters>,
}

impl CacheStore {
    /// Create an empty store with the given policy
    pub fn new(config: CacheConfig) -> Self {
        Self::with_counters(config, Arc::new(StatsCounters::default()))
    }

    pub(crate) fn with_counters(config: CacheConfig, stats: Arc<StatsCounters>) -> Self {
        Self {
            config,
            entries: Arc::new(RwLock::new(HashMap::new())),
            stats,
        }
    }

    /// Get the cache configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read a usable entry
    ///
    /// Returns `None` if there is no entry, the entry has expired, or it was
    /// produced by a different transform. Expired and mismatched entries are
    /// removed as a side effect.
    pub fn read(&self, identifier: &str, transform: Option<&TransformTag>) -> Option<CacheEntry> {
        let (freshness, matches) = {
            let entries = self.read_guard();
            match entries.get(identifier) {
                Some(entry) => (
                    entry.freshness(self.config.freshness_window, self.config.validity_window),
                    entry.matches_transform(transform),
                ),
                None => {
                    StatsCounters::bump(&self.stats.misses);
                    trace!("Cache miss for {}", identifier);
                    return None;
                }
            }
        };

        if freshness == Freshness::Expired {
            self.write_guard().remove(identifier);
            StatsCounters::bump(&self.stats.expirations);
            debug!("Evicted expired cache entry for {}", identifier);
            return None;
        }

        if !matches {
            self.write_guard().remove(identifier);
            StatsCounters::bump(&self.stats.transform_mismatches);
            debug!(
                "Evicted cache entry for {} produced by a different transform",
                identifier
            );
            return None;
        }

        let entry = self.read_guard().get(identifier).cloned();
        match (&entry, freshness) {
            (Some(_), Freshness::Fresh) => StatsCounters::bump(&self.stats.fresh_hits),
            (Some(_), _) => StatsCounters::bump(&self.stats.stale_hits),
            (None, _) => StatsCounters::bump(&self.stats.misses),
        }
        entry
    }

    /// Store a value, unconditionally replacing any previous entry
    pub fn write(
        &self,
        identifier: &str,
        value: Arc<Value>,
        transform: Option<TransformTag>,
    ) -> CacheEntry {
        let entry = CacheEntry::new(value, transform);
        self.write_guard()
            .insert(identifier.to_string(), entry.clone());
        StatsCounters::bump(&self.stats.writes);
        debug!("Cached response for {}", identifier);
        entry
    }

    /// Remove one or all entries, returning how many were removed
    pub fn evict<'a>(&self, target: impl Into<Eviction<'a>>) -> usize {
        let mut entries = self.write_guard();
        let removed = match target.into() {
            Eviction::One(identifier) => usize::from(entries.remove(identifier).is_some()),
            Eviction::All => {
                let count = entries.len();
                entries.clear();
                count
            }
        };
        StatsCounters::add(&self.stats.evictions, removed as u64);
        if removed > 0 {
            debug!("Evicted {} cache entries", removed);
        }
        removed
    }

    /// Whether an entry should trigger a background refresh
    pub fn is_fresh(&self, entry: &CacheEntry) -> bool {
        entry.is_fresh(self.config.freshness_window)
    }

    /// Entry held for an identifier, regardless of validity
    ///
    /// Unlike [`read`](Self::read) this neither counts towards the
    /// statistics nor evicts anything.
    pub fn peek(&self, identifier: &str) -> Option<CacheEntry> {
        self.read_guard().get(identifier).cloned()
    }

    /// Age of the entry held for an identifier, regardless of validity
    pub fn entry_age(&self, identifier: &str) -> Option<Duration> {
        self.read_guard().get(identifier).map(CacheEntry::age)
    }

    /// Number of entries held, including not-yet-evicted expired ones
    pub fn len(&self) -> usize {
        self.read_guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
