//! Fetch orchestration over the shared cache and pending registry
//!
//! [`FetchCache`] is the process-wide service: it owns the [`CacheStore`],
//! the [`PendingRegistry`], the transport and the scheduling strategy, and
//! hands out [`FetchSession`]s. Each session runs the per-consumer state
//! machine that decides between serving cached data, serving it while
//! revalidating in the background, and blocking on a network fetch.
//!
//! # Architecture
//!
//! - [`config`] - Service configuration and validation
//! - [`session`] - Per-consumer session and request flow
//! - [`state`] - Observable `{data, loading, error}` snapshots
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fetch_cache::app::{ClientConfig, FetchCache, FetchCacheConfig, HttpTransport, SessionOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(HttpTransport::new(&ClientConfig::default())?);
//! let service = FetchCache::new(FetchCacheConfig::default(), "https://example.com/api", transport);
//!
//! let session = service.attach("/engineers", SessionOptions::default().without_auto_fetch());
//! let engineers = session.request(false).await?;
//! println!("{}", engineers);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod session;
pub mod state;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info};

use crate::app::cache::{CacheStats, CacheStore, Eviction, StatsCounters};
use crate::app::client::{compose_url, fetch_json, Transport};
use crate::app::pending::{FetchOutcome, FetchedPayload, PendingFetch, PendingRegistry};
use crate::app::scheduler::Scheduler;
use crate::app::signals::{InvalidationBus, InvalidationChannel};
use crate::app::transform::Transform;
use crate::errors::FetchError;

pub use config::FetchCacheConfig;
pub use session::{FetchSession, SessionOptions};
pub use state::{FetchState, FetchStatus};

/// Shared cache service injected into every session
///
/// Construct it once per process (or once per test) and attach sessions
/// to it. Every session attached to the same service shares its cache and
/// its in-flight requests.
pub struct FetchCache {
    config: FetchCacheConfig,
    base_url: String,
    store: CacheStore,
    pending: PendingRegistry,
    stats: Arc<StatsCounters>,
    transport: Arc<dyn Transport>,
    scheduler: Arc<dyn Scheduler>,
    channel: Arc<dyn InvalidationChannel>,
}

impl FetchCache {
    /// Create a service with an in-process invalidation bus
    ///
    /// The scheduler is built from `config.scheduler`.
    pub fn new(
        config: FetchCacheConfig,
        base_url: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        let scheduler = config.scheduler.build(config.idle_timeout);
        Self::with_parts(
            config,
            base_url,
            transport,
            scheduler,
            Arc::new(InvalidationBus::new()),
        )
    }

    /// Create a service with an explicit scheduler and invalidation channel
    pub fn with_parts(
        config: FetchCacheConfig,
        base_url: impl Into<String>,
        transport: Arc<dyn Transport>,
        scheduler: Arc<dyn Scheduler>,
        channel: Arc<dyn InvalidationChannel>,
    ) -> Arc<Self> {
        let stats = Arc::new(StatsCounters::default());
        let base_url = base_url.into();
        info!(
            "Fetch cache ready (base URL '{}', scheduler {})",
            base_url,
            scheduler.kind()
        );

        Arc::new(Self {
            store: CacheStore::with_counters(config.cache, Arc::clone(&stats)),
            pending: PendingRegistry::new(),
            config,
            base_url,
            stats,
            transport,
            scheduler,
            channel,
        })
    }

    /// Attach a consumer session to an identifier
    ///
    /// Runs the initial fetch in the background when `auto_fetch` is set
    /// and subscribes to the invalidation signal, if any.
    pub fn attach(self: &Arc<Self>, identifier: impl Into<String>, options: SessionOptions) -> FetchSession {
        FetchSession::attach(Arc::clone(self), identifier.into(), options)
    }

    pub fn config(&self) -> &FetchCacheConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Direct access to the cache store
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Direct access to the pending registry
    pub fn pending(&self) -> &PendingRegistry {
        &self.pending
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    pub fn channel(&self) -> &Arc<dyn InvalidationChannel> {
        &self.channel
    }

    /// Emit an invalidation signal, returning how many sessions listen to it
    pub fn emit(&self, signal: &str) -> usize {
        self.channel.emit(signal)
    }

    /// Drop one or all cached entries
    pub fn evict_cache(&self, identifier: Option<&str>) -> usize {
        self.store.evict(Eviction::from(identifier))
    }

    /// Forget one or all in-flight fetches
    ///
    /// The fetches keep running and still populate the cache; only new
    /// requests stop joining them.
    pub fn evict_pending(&self, identifier: Option<&str>) -> usize {
        let removed = self.pending.evict(identifier);
        if removed > 0 {
            debug!("Forgot {} pending fetches", removed);
        }
        removed
    }

    /// Number of identifiers with a fetch in flight
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Snapshot of the cache counters
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.store.len(), self.pending.len())
    }

    pub(crate) fn record_dedup(&self) {
        StatsCounters::bump(&self.stats.deduplicated);
    }

    /// Issue a network fetch for an identifier and register it
    ///
    /// Replaces whatever is in flight for the identifier. The fetch runs in
    /// its own task: it writes the cache on success no matter what happens
    /// to the sessions waiting on it.
    pub(crate) fn start_fetch(self: &Arc<Self>, identifier: &str, transform: Option<Transform>) -> PendingFetch {
        self.pending
            .register(identifier, self.fetch_task(identifier, transform))
    }

    /// Join the fetch in flight for an identifier, starting one if there is none
    ///
    /// Returns `true` alongside the handle when an existing fetch was joined.
    pub(crate) fn join_or_start_fetch(
        self: &Arc<Self>,
        identifier: &str,
        transform: Option<Transform>,
    ) -> (PendingFetch, bool) {
        let (pending, joined) = self
            .pending
            .join_or_register(identifier, || self.fetch_task(identifier, transform));
        if joined {
            self.record_dedup();
        }
        (pending, joined)
    }

    fn fetch_task(
        self: &Arc<Self>,
        identifier: &str,
        transform: Option<Transform>,
    ) -> impl Future<Output = FetchOutcome> + Send + 'static {
        let service = Arc::clone(self);
        let owned_identifier = identifier.to_string();

        async move {
            let url = compose_url(&service.base_url, &owned_identifier);
            StatsCounters::bump(&service.stats.network_fetches);

            let raw = Arc::new(fetch_json(service.transport.as_ref(), &url).await?);
            let shaped = match &transform {
                Some(t) => t.apply((*raw).clone()).map(Arc::new),
                None => Ok(Arc::clone(&raw)),
            };
            let tag = transform.as_ref().map(|t| t.tag().clone());

            match &shaped {
                Ok(value) => {
                    service
                        .store
                        .write(&owned_identifier, Arc::clone(value), tag.clone());
                }
                Err(e) => debug!("Not caching {}: {}", owned_identifier, e),
            }

            Ok::<_, FetchError>(FetchedPayload {
                raw,
                shaped,
                transform: tag,
            })
        }
    }
}

impl fmt::Debug for FetchCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchCache")
            .field("base_url", &self.base_url)
            .field("entries", &self.store.len())
            .field("pending", &self.pending.len())
            .field("scheduler", &self.scheduler.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::client::TransportResponse;
    use crate::errors::FetchResult;
    use futures::future::{BoxFuture, FutureExt};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingTransport {
        urls: Mutex<Vec<String>>,
    }

    impl Transport for RecordingTransport {
        fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, FetchResult<TransportResponse>> {
            self.urls.lock().unwrap().push(url.to_string());
            async { Ok(TransportResponse::new(200, r#"{"items":[1,2,3]}"#)) }.boxed()
        }
    }

    #[tokio::test]
    async fn test_start_fetch_composes_url_and_writes_cache() {
        let transport = Arc::new(RecordingTransport::default());
        let service = FetchCache::new(FetchCacheConfig::default(), "https://example.com/api", transport.clone());

        let fetched = service.start_fetch("/engineers", None).wait().await.unwrap();
        assert_eq!(*fetched.value_for(None).unwrap(), json!({"items": [1, 2, 3]}));
        assert_eq!(
            *transport.urls.lock().unwrap(),
            vec!["https://example.com/api/engineers".to_string()]
        );

        let entry = service.store().read("/engineers", None).unwrap();
        assert_eq!(*entry.value, json!({"items": [1, 2, 3]}));
        assert_eq!(service.pending_count(), 0);
        assert_eq!(service.stats().network_fetches, 1);
    }

    #[tokio::test]
    async fn test_start_fetch_caches_transformed_value() {
        let transport = Arc::new(RecordingTransport::default());
        let service = FetchCache::new(FetchCacheConfig::default(), "/api", transport.clone());
        let items = Transform::pointer("/items");

        let fetched = service
            .start_fetch("https://other.example.com/list", Some(items.clone()))
            .wait()
            .await
            .unwrap();
        assert_eq!(*fetched.value_for(Some(&items)).unwrap(), json!([1, 2, 3]));
        assert_eq!(*fetched.raw, json!({"items": [1, 2, 3]}));
        assert_eq!(
            transport.urls.lock().unwrap()[0],
            "https://other.example.com/list"
        );

        assert!(service
            .store()
            .read("https://other.example.com/list", Some(items.tag()))
            .is_some());
    }

    #[tokio::test]
    async fn test_rejected_transform_is_not_cached_or_shared() {
        let transport = Arc::new(RecordingTransport::default());
        let service = FetchCache::new(FetchCacheConfig::default(), "/api", transport);
        let missing = Transform::pointer("/missing");

        let (pending, joined) = service.join_or_start_fetch("https://example.com/x", Some(missing.clone()));
        assert!(!joined);
        let (shared, joined) = service.join_or_start_fetch("https://example.com/x", None);
        assert!(joined);

        let fetched = shared.wait().await.unwrap();
        assert!(fetched.value_for(Some(&missing)).is_err());
        assert_eq!(*fetched.value_for(None).unwrap(), json!({"items": [1, 2, 3]}));
        assert!(pending.wait().await.is_ok());

        assert!(service.store().is_empty());
        assert_eq!(service.stats().deduplicated, 1);
        assert_eq!(service.stats().network_fetches, 1);
    }

    #[tokio::test]
    async fn test_admin_operations() {
        let service = FetchCache::new(
            FetchCacheConfig::default(),
            "/api",
            Arc::new(RecordingTransport::default()),
        );
        service.store().write("/a", Arc::new(json!(1)), None);
        service.store().write("/b", Arc::new(json!(2)), None);

        assert_eq!(service.evict_cache(Some("/a")), 1);
        assert_eq!(service.evict_cache(None), 1);
        assert_eq!(service.evict_pending(None), 0);
        assert_eq!(service.pending_count(), 0);
        assert_eq!(service.stats().evictions, 2);
    }
}
