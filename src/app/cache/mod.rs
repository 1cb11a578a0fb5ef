//! In-memory response cache with freshness and validity windows
//!
//! This module provides the process-wide store of endpoint responses used by
//! the fetch orchestrator. Entries are keyed by resource identifier and
//! tagged with the transform that produced them.
//!
//! # Key Features
//!
//! - **Validity window**: entries older than the window are evicted lazily on read
//! - **Freshness window**: decides whether a served entry is also revalidated
//! - **Transform-aware reads**: an entry produced by another transform is a miss
//! - **Statistics**: lock-free hit/miss/eviction counters
//!
//! # Module Organization
//!
//! - [`config`] - Freshness/validity policy
//! - [`entry`] - Timestamped entries and age classification
//! - [`store`] - The keyed store itself
//! - [`stats`] - Activity counters and snapshots
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use fetch_cache::app::cache::{CacheConfig, CacheStore};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache = CacheStore::new(CacheConfig::default());
//! cache.write("/api/engineers", Arc::new(json!([{"name": "ada"}])), None);
//!
//! let entry = cache.read("/api/engineers", None).expect("entry is fresh");
//! assert!(cache.is_fresh(&entry));
//! # }
//! ```

pub mod config;
pub mod entry;
pub mod stats;
pub mod store;

// Re-export main public API
pub use config::CacheConfig;
pub use entry::{CacheEntry, Freshness};
pub use stats::CacheStats;
pub(crate) use stats::StatsCounters;
pub use store::{CacheStore, Eviction};
