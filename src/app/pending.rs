//! In-flight request registry
//!
//! Collapses concurrent requests for the same identifier into one network
//! operation. Each registered fetch runs in its own task and is exposed to
//! callers as a shared future, so it settles (and updates the cache) even
//! if every caller stops waiting.
//!
//! Entries carry a generation number. A fetch removes its own mapping when
//! it settles, but only while it is still the registered generation for
//! its identifier; a forced refresh that replaced it keeps its slot.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::app::transform::{Transform, TransformTag};
use crate::errors::{FetchError, FetchResult};

/// Result of one network attempt, as seen by every caller that shared it
#[derive(Debug, Clone)]
pub struct FetchedPayload {
    /// Decoded response body before any transform
    pub raw: Arc<Value>,
    /// Payload after the initiating caller's transform
    ///
    /// A rejection here belongs to the initiator only; joiners with another
    /// transform still shape `raw` themselves.
    pub shaped: FetchResult<Arc<Value>>,
    /// Tag of the initiating caller's transform
    pub transform: Option<TransformTag>,
}

impl FetchedPayload {
    /// Payload shaped for a given caller's transform
    ///
    /// Reuses the initiator's result when the tags agree, otherwise applies
    /// the caller's transform to the raw body.
    pub fn value_for(&self, transform: Option<&Transform>) -> FetchResult<Arc<Value>> {
        if transform.map(Transform::tag) == self.transform.as_ref() {
            return self.shaped.clone();
        }
        match transform {
            Some(t) => t.apply((*self.raw).clone()).map(Arc::new),
            None => Ok(Arc::clone(&self.raw)),
        }
    }
}

/// Outcome shared between all joiners of a fetch
pub type FetchOutcome = FetchResult<FetchedPayload>;

type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// Handle to an in-flight fetch
#[derive(Clone)]
pub struct PendingFetch {
    generation: u64,
    future: SharedFetch,
}

impl PendingFetch {
    /// Generation number assigned at registration
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the fetch to settle
    pub async fn wait(&self) -> FetchOutcome {
        self.future.clone().await
    }
}

impl fmt::Debug for PendingFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingFetch")
            .field("generation", &self.generation)
            .field("settled", &self.future.peek().is_some())
            .finish()
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_generation: u64,
    entries: HashMap<String, PendingFetch>,
}

/// Process-wide map from identifier to in-flight fetch
///
/// Cloning is cheap and yields a handle to the same registry.
#[derive(Debug, Clone, Default)]
pub struct PendingRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up the fetch currently registered for an identifier
    pub fn join(&self, identifier: &str) -> Option<PendingFetch> {
        self.lock().entries.get(identifier).cloned()
    }

    /// Whether a fetch is registered for an identifier
    pub fn contains(&self, identifier: &str) -> bool {
        self.lock().entries.contains_key(identifier)
    }

    /// Start a fetch and install it for an identifier
    ///
    /// Overwrites any mapping already present (last writer wins). The
    /// future is spawned immediately and releases its own mapping once it
    /// settles, success or failure.
    pub fn register<F>(&self, identifier: &str, fetch: F) -> PendingFetch
    where
        F: Future<Output = FetchOutcome> + Send + 'static,
    {
        let mut inner = self.lock();
        self.install(&mut inner, identifier, fetch)
    }

    /// Join the fetch in flight for an identifier, or start one
    ///
    /// Lookup and insertion happen under one lock, so concurrent callers
    /// on any number of threads end up sharing a single fetch. `make_fetch`
    /// only runs when nothing was in flight. The flag is `true` when an
    /// existing fetch was joined.
    pub fn join_or_register<F, M>(&self, identifier: &str, make_fetch: M) -> (PendingFetch, bool)
    where
        F: Future<Output = FetchOutcome> + Send + 'static,
        M: FnOnce() -> F,
    {
        let mut inner = self.lock();
        if let Some(existing) = inner.entries.get(identifier) {
            return (existing.clone(), true);
        }
        (self.install(&mut inner, identifier, make_fetch()), false)
    }

    fn install<F>(&self, inner: &mut RegistryInner, identifier: &str, fetch: F) -> PendingFetch
    where
        F: Future<Output = FetchOutcome> + Send + 'static,
    {
        inner.next_generation += 1;
        let generation = inner.next_generation;

        let registry = self.clone();
        let owned_identifier = identifier.to_string();
        let task = tokio::spawn(async move {
            let outcome = fetch.await;
            registry.release_generation(&owned_identifier, generation);
            outcome
        });

        let future = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Pending fetch task failed to complete: {}", e);
                    Err(FetchError::Cancelled)
                }
            }
        }
        .boxed()
        .shared();

        let pending = PendingFetch { generation, future };
        if let Some(previous) = inner
            .entries
            .insert(identifier.to_string(), pending.clone())
        {
            debug!(
                "Fetch generation {} for {} supersedes generation {}",
                generation, identifier, previous.generation
            );
        } else {
            trace!("Registered fetch generation {} for {}", generation, identifier);
        }
        pending
    }

    /// Remove the mapping only if it still refers to this fetch
    pub fn release(&self, identifier: &str, fetch: &PendingFetch) -> bool {
        self.release_generation(identifier, fetch.generation)
    }

    fn release_generation(&self, identifier: &str, generation: u64) -> bool {
        let mut inner = self.lock();
        match inner.entries.get(identifier) {
            Some(current) if current.generation == generation => {
                inner.entries.remove(identifier);
                trace!("Released fetch generation {} for {}", generation, identifier);
                true
            }
            Some(current) => {
                trace!(
                    "Fetch generation {} for {} settled after being superseded by {}",
                    generation,
                    identifier,
                    current.generation
                );
                false
            }
            None => false,
        }
    }

    /// Forget one or all in-flight mappings
    ///
    /// The fetches themselves keep running and still update the cache.
    pub fn evict(&self, identifier: Option<&str>) -> usize {
        let mut inner = self.lock();
        match identifier {
            Some(id) => usize::from(inner.entries.remove(id).is_some()),
            None => {
                let count = inner.entries.len();
                inner.entries.clear();
                count
            }
        }
    }

    /// Number of identifiers with a fetch in flight
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::oneshot;

    fn payload(v: Value) -> FetchedPayload {
        let value = Arc::new(v);
        FetchedPayload {
            raw: Arc::clone(&value),
            shaped: Ok(value),
            transform: None,
        }
    }

    #[tokio::test]
    async fn test_register_join_and_release() {
        let registry = PendingRegistry::new();
        let (tx, rx) = oneshot::channel::<FetchOutcome>();

        let pending = registry.register("/x", async move { rx.await.unwrap() });
        assert_eq!(registry.len(), 1);

        let joined = registry.join("/x").unwrap();
        assert_eq!(joined.generation(), pending.generation());

        tx.send(Ok(payload(json!({"a": 1})))).unwrap();
        let outcome = joined.wait().await.unwrap();
        assert_eq!(*outcome.value_for(None).unwrap(), json!({"a": 1}));
        assert!(registry.is_empty());
        assert!(registry.join("/x").is_none());
    }

    #[tokio::test]
    async fn test_failure_also_releases() {
        let registry = PendingRegistry::new();
        let pending = registry.register("/x", async { Err(FetchError::http_status(500)) });

        assert_eq!(pending.wait().await.unwrap_err().status(), Some(500));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_superseded_fetch_does_not_release_newer() {
        let registry = PendingRegistry::new();
        let (old_tx, old_rx) = oneshot::channel::<FetchOutcome>();
        let (new_tx, new_rx) = oneshot::channel::<FetchOutcome>();

        let old = registry.register("/x", async move { old_rx.await.unwrap() });
        let new = registry.register("/x", async move { new_rx.await.unwrap() });
        assert_eq!(registry.len(), 1);
        assert!(!registry.release("/x", &old));

        old_tx.send(Ok(payload(json!("old")))).unwrap();
        assert_eq!(*old.wait().await.unwrap().raw, json!("old"));
        assert_eq!(
            registry.join("/x").map(|p| p.generation()),
            Some(new.generation())
        );

        new_tx.send(Ok(payload(json!("new")))).unwrap();
        new.wait().await.unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_evict_keeps_fetch_running() {
        let registry = PendingRegistry::new();
        let (tx, rx) = oneshot::channel::<FetchOutcome>();
        let pending = registry.register("/x", async move { rx.await.unwrap() });
        registry.register("/y", futures::future::pending());

        assert_eq!(registry.evict(Some("/x")), 1);
        assert_eq!(registry.len(), 1);

        tx.send(Ok(payload(json!(1)))).unwrap();
        assert!(pending.wait().await.is_ok());

        assert_eq!(registry.evict(None), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_value_for_reuses_matching_transform() {
        let double = Transform::new("double", |v| json!(v.as_i64().unwrap_or(0) * 2));
        let fetched = FetchedPayload {
            raw: Arc::new(json!(2)),
            shaped: Ok(Arc::new(json!(4))),
            transform: Some(double.tag().clone()),
        };

        assert_eq!(*fetched.value_for(Some(&double)).unwrap(), json!(4));
        assert_eq!(*fetched.value_for(None).unwrap(), json!(2));

        let negate = Transform::new("negate", |v| json!(-v.as_i64().unwrap_or(0)));
        assert_eq!(*fetched.value_for(Some(&negate)).unwrap(), json!(-2));
    }

    #[test]
    fn test_initiator_rejection_does_not_reach_other_transforms() {
        let strict = Transform::pointer("/missing");
        let fetched = FetchedPayload {
            raw: Arc::new(json!({"items": [1, 2]})),
            shaped: strict.apply(json!({"items": [1, 2]})).map(Arc::new),
            transform: Some(strict.tag().clone()),
        };

        assert!(fetched.value_for(Some(&strict)).is_err());
        assert_eq!(*fetched.value_for(None).unwrap(), json!({"items": [1, 2]}));
        let items = Transform::pointer("/items");
        assert_eq!(*fetched.value_for(Some(&items)).unwrap(), json!([1, 2]));
    }

    #[tokio::test]
    async fn test_join_or_register_installs_once() {
        let registry = PendingRegistry::new();
        let (tx, rx) = oneshot::channel::<FetchOutcome>();

        let (first, joined) = registry.join_or_register("/x", || async move { rx.await.unwrap() });
        assert!(!joined);

        let (second, joined) = registry.join_or_register(
            "/x",
            || -> futures::future::Pending<FetchOutcome> { panic!("a second fetch must not be created") },
        );
        assert!(joined);
        assert_eq!(first.generation(), second.generation());
        assert_eq!(registry.len(), 1);

        tx.send(Ok(payload(json!(1)))).unwrap();
        assert_eq!(*second.wait().await.unwrap().raw, json!(1));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_join_or_register_is_atomic_across_threads() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(8)
            .enable_all()
            .build()
            .unwrap();
        let registry = PendingRegistry::new();
        let created = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        runtime.block_on(async {
            let barrier = Arc::new(tokio::sync::Barrier::new(16));
            let tasks: Vec<_> = (0..16)
                .map(|_| {
                    let registry = registry.clone();
                    let created = Arc::clone(&created);
                    let barrier = Arc::clone(&barrier);
                    tokio::spawn(async move {
                        barrier.wait().await;
                        let (pending, _) = registry.join_or_register("/x", || {
                            created.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                            async {
                                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                                Ok(payload(json!(1)))
                            }
                        });
                        pending.wait().await.unwrap().raw
                    })
                })
                .collect();
            for task in tasks {
                assert_eq!(*task.await.unwrap(), json!(1));
            }
        });

        assert_eq!(created.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
