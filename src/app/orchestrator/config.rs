//! Configuration structures for the fetch cache service

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::cache::CacheConfig;
use crate::app::scheduler::SchedulerKind;
use crate::constants::debounce;

/// Configuration for a [`FetchCache`](super::FetchCache)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchCacheConfig {
    /// Freshness and validity policy
    pub cache: CacheConfig,
    /// Quiet period an invalidation burst must observe before refreshing
    pub quiet_window: Duration,
    /// Upper bound on how long the idle scheduler defers a refresh
    pub idle_timeout: Duration,
    /// Strategy running debounced refreshes
    pub scheduler: SchedulerKind,
}

impl Default for FetchCacheConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            quiet_window: debounce::QUIET_WINDOW,
            idle_timeout: debounce::IDLE_TIMEOUT,
            scheduler: SchedulerKind::default(),
        }
    }
}

impl FetchCacheConfig {
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Set the debounce quiet window
    pub fn with_quiet_window(mut self, window: Duration) -> Self {
        self.quiet_window = window;
        self
    }

    /// Set the scheduler strategy
    pub fn with_scheduler(mut self, scheduler: SchedulerKind) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        self.cache.validate()?;

        if self.quiet_window.is_zero() {
            return Err("Debounce quiet window cannot be zero".to_string());
        }

        if self.idle_timeout.is_zero() {
            return Err("Idle timeout cannot be zero".to_string());
        }

        Ok(())
    }
}
