//! Cache configuration types and defaults
//!
//! This module contains the freshness/validity policy for the cache store,
//! including default values and validation logic.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::cache;

/// Configuration for the cache store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entries younger than this are served without a background refresh
    pub freshness_window: Duration,
    /// Entries this old or older are discarded on read
    pub validity_window: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_window: cache::FRESHNESS_WINDOW,
            validity_window: cache::VALIDITY_WINDOW,
        }
    }
}

impl CacheConfig {
    /// Set the freshness window
    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    /// Set the validity window
    pub fn with_validity_window(mut self, window: Duration) -> Self {
        self.validity_window = window;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.freshness_window.is_zero() {
            return Err("Freshness window cannot be zero".to_string());
        }

        if self.validity_window.is_zero() {
            return Err("Validity window cannot be zero".to_string());
        }

        if self.freshness_window >= self.validity_window {
            return Err(format!(
                "Freshness window ({:?}) must be shorter than validity window ({:?})",
                self.freshness_window, self.validity_window
            ));
        }

        Ok(())
    }
}
