//! Cached endpoint responses
//!
//! An entry is replaced wholesale on every successful fetch and never
//! mutated in place, so values are shared behind an `Arc`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::time::Instant;

use crate::app::transform::TransformTag;

/// Age classification of a cached entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Younger than the freshness window; served with no refresh
    Fresh,
    /// Past the freshness window but still valid; served and revalidated
    Stale,
    /// At or past the validity window; discarded
    Expired,
}

/// A timestamped response held by the cache store
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The (possibly transformed) payload
    pub value: Arc<Value>,
    /// Monotonic capture time used for all age checks
    pub captured_at: Instant,
    /// Wall-clock capture time for display
    pub captured_wall: DateTime<Utc>,
    /// Tag of the transform that produced `value`, `None` for raw payloads
    pub transform: Option<TransformTag>,
}

impl CacheEntry {
    /// Create an entry stamped with the current time
    pub fn new(value: Arc<Value>, transform: Option<TransformTag>) -> Self {
        Self {
            value,
            captured_at: Instant::now(),
            captured_wall: Utc::now(),
            transform,
        }
    }

    /// Time elapsed since capture
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.captured_at)
    }

    /// Check if this entry may still be served
    pub fn is_valid(&self, validity: Duration) -> bool {
        self.age() < validity
    }

    /// Check if this entry is young enough to skip revalidation
    pub fn is_fresh(&self, freshness: Duration) -> bool {
        self.age() < freshness
    }

    /// Classify the entry against both windows
    pub fn freshness(&self, freshness: Duration, validity: Duration) -> Freshness {
        let age = self.age();
        if age >= validity {
            Freshness::Expired
        } else if age >= freshness {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }

    /// Check whether the entry was produced by the requested transform
    pub fn matches_transform(&self, transform: Option<&TransformTag>) -> bool {
        self.transform.as_ref() == transform
    }
}
