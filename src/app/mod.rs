//! Core application logic for the fetch cache
//!
//! This module contains the engine: the response cache, the in-flight
//! request registry, the transport, cancellation scopes, invalidation
//! signals with their debouncer and scheduling strategies, and the
//! orchestrator that ties them together per consumer session.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fetch_cache::app::{
//!     ClientConfig, FetchCache, FetchCacheConfig, HttpTransport, SessionOptions, Transform,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(HttpTransport::new(&ClientConfig::default())?);
//! let service = FetchCache::new(FetchCacheConfig::default(), "https://example.com/api", transport);
//!
//! // Refresh the list whenever someone emits "engineers-changed"
//! let session = service.attach(
//!     "/engineers",
//!     SessionOptions::default()
//!         .with_transform(Transform::pointer("/items"))
//!         .with_invalidation_signal("engineers-changed"),
//! );
//!
//! let mut states = session.subscribe();
//! while states.changed().await.is_ok() {
//!     let state = states.borrow().clone();
//!     println!("{}: {:?}", state.status, state.data);
//!     service.emit("engineers-changed");
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cancellation;
pub mod client;
pub mod debounce;
pub mod orchestrator;
pub mod pending;
pub mod scheduler;
pub mod signals;
pub mod transform;

// Re-export main public API
pub use cache::{CacheConfig, CacheEntry, CacheStats, CacheStore, Eviction, Freshness};
pub use cancellation::{CancellationScope, TaskHandle};
pub use client::{compose_url, fetch_json, ClientConfig, HttpTransport, Transport, TransportResponse};
pub use debounce::{EventDebouncer, RefreshFn};
pub use orchestrator::{FetchCache, FetchCacheConfig, FetchSession, FetchState, FetchStatus, SessionOptions};
pub use pending::{FetchOutcome, FetchedPayload, PendingFetch, PendingRegistry};
pub use scheduler::{
    IdleScheduler, ImmediateScheduler, PriorityScheduler, Scheduler, SchedulerKind, TaskPriority,
};
pub use signals::{InvalidationBus, InvalidationChannel, Subscription};
pub use transform::{Transform, TransformTag};
