//! Per-consumer fetch sessions
//!
//! A session binds one consumer to one identifier. Every request walks the
//! same decision ladder:
//!
//! 1. join a fetch already in flight for the identifier (no network call),
//! 2. serve a usable cache entry, revalidating in the background once it
//!    is no longer fresh,
//! 3. otherwise publish `loading` and block on a new network fetch.
//!
//! Forced requests skip the first two steps. All continuations check the
//! session's [`CancellationScope`] before publishing, so results arriving
//! after a detach or a rebind are dropped.

use std::sync::{Arc, PoisonError, RwLock, Weak};

use futures::future::FutureExt;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::app::cancellation::CancellationScope;
use crate::app::debounce::{EventDebouncer, RefreshFn};
use crate::app::pending::PendingFetch;
use crate::app::transform::Transform;
use crate::errors::FetchResult;

use super::state::{FetchState, FetchStatus};
use super::FetchCache;

/// Options a consumer attaches with
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Applied to every payload before it is cached and published
    pub transform: Option<Transform>,
    /// Fetch as soon as the session is bound
    pub auto_fetch: bool,
    /// Signal that triggers a debounced forced refresh
    pub invalidation_signal: Option<String>,
    /// Consult the cache before fetching
    pub cache_enabled: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            transform: None,
            auto_fetch: true,
            invalidation_signal: None,
            cache_enabled: true,
        }
    }
}

impl SessionOptions {
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_invalidation_signal(mut self, signal: impl Into<String>) -> Self {
        self.invalidation_signal = Some(signal.into());
        self
    }

    pub fn without_auto_fetch(mut self) -> Self {
        self.auto_fetch = false;
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Whether switching to `other` requires a new cancellation scope
    fn requires_rebind(&self, other: &SessionOptions) -> bool {
        self.invalidation_signal != other.invalidation_signal
            || self.cache_enabled != other.cache_enabled
    }
}

/// How a request reports failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestMode {
    /// Errors are published to the session
    Foreground,
    /// Errors are logged and the previous state is kept
    Silent,
}

#[derive(Debug)]
struct Binding {
    identifier: String,
    options: SessionOptions,
    scope: CancellationScope,
}

struct SessionInner {
    service: Arc<FetchCache>,
    binding: RwLock<Binding>,
    state: watch::Sender<FetchState>,
}

/// A consumer's view of one identifier
///
/// Dropping the session (or calling [`detach`](Self::detach)) fires its
/// cancellation scope. Fetches already on the wire still complete and
/// populate the shared cache.
pub struct FetchSession {
    inner: Arc<SessionInner>,
}

impl FetchSession {
    pub(crate) fn attach(service: Arc<FetchCache>, identifier: String, options: SessionOptions) -> Self {
        let (state, _) = watch::channel(FetchState::default());
        let scope = CancellationScope::new(identifier.clone());
        debug!("Attaching session to {}", identifier);

        let inner = Arc::new(SessionInner {
            service,
            binding: RwLock::new(Binding {
                identifier,
                options,
                scope,
            }),
            state,
        });
        inner.activate();
        Self { inner }
    }

    /// Identifier the session is currently bound to
    pub fn identifier(&self) -> String {
        self.inner.read_binding(|b| b.identifier.clone())
    }

    pub fn options(&self) -> SessionOptions {
        self.inner.read_binding(|b| b.options.clone())
    }

    /// Current state snapshot
    pub fn state(&self) -> FetchState {
        self.inner.state.borrow().clone()
    }

    /// Receive every state the session publishes
    pub fn subscribe(&self) -> watch::Receiver<FetchState> {
        self.inner.state.subscribe()
    }

    /// Run the request flow for the bound identifier
    ///
    /// Returns the payload the session published, or the error of a failed
    /// foreground fetch.
    pub async fn request(&self, force: bool) -> FetchResult<Arc<Value>> {
        self.inner.request(force, RequestMode::Foreground).await
    }

    /// Always go to the network
    pub async fn refetch(&self) -> FetchResult<Arc<Value>> {
        self.request(true).await
    }

    /// Change what the session is bound to
    ///
    /// Changing the identifier, the invalidation signal or the cache
    /// setting fires the current scope and binds a fresh one, re-running
    /// the auto-fetch. A transform-only change applies from the next
    /// request.
    pub fn reconfigure(&self, identifier: impl Into<String>, options: SessionOptions) {
        self.inner.reconfigure(identifier.into(), options);
    }

    /// Tear the session down
    pub fn detach(self) {
        // Drop fires the scope.
    }
}

impl Drop for FetchSession {
    fn drop(&mut self) {
        let scope = self.inner.read_binding(|b| b.scope.clone());
        trace!("Detaching session from {}", scope.identifier());
        scope.cancel();
    }
}

impl std::fmt::Debug for FetchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("FetchSession")
            .field("identifier", &self.identifier())
            .field("status", &state.status)
            .field("loading", &state.loading)
            .finish()
    }
}

impl SessionInner {
    fn read_binding<T>(&self, f: impl FnOnce(&Binding) -> T) -> T {
        f(&self.binding.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn snapshot(&self) -> (String, SessionOptions, CancellationScope) {
        self.read_binding(|b| (b.identifier.clone(), b.options.clone(), b.scope.clone()))
    }

    /// Publish a state change unless the scope has fired
    fn publish(&self, scope: &CancellationScope, update: impl FnOnce(&mut FetchState)) -> bool {
        if scope.is_cancelled() {
            trace!("Dropping stale update for {}", scope.identifier());
            return false;
        }
        self.state.send_modify(update);
        true
    }

    /// Start the scope-owned tasks for the current binding
    fn activate(self: &Arc<Self>) {
        let (identifier, options, scope) = self.snapshot();

        if let Some(signal) = &options.invalidation_signal {
            let config = self.service.config();
            let debouncer = EventDebouncer::new(config.quiet_window, Arc::clone(self.service.scheduler()));
            let subscription = self.service.channel().subscribe(signal);
            debug!("Session for {} listens to '{}'", identifier, signal);
            debouncer.spawn(subscription, &scope, self.refresh_fn());
        }

        if options.auto_fetch {
            let weak = Arc::downgrade(self);
            scope.spawn(async move {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if let Err(e) = inner.request(false, RequestMode::Foreground).await {
                    debug!("Initial fetch for {} failed: {}", identifier, e);
                }
            });
        }
    }

    fn refresh_fn(self: &Arc<Self>) -> RefreshFn {
        let weak: Weak<SessionInner> = Arc::downgrade(self);
        Arc::new(move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    let _ = inner.request(true, RequestMode::Silent).await;
                }
            }
            .boxed()
        })
    }

    fn reconfigure(self: &Arc<Self>, identifier: String, options: SessionOptions) {
        let previous = {
            let mut binding = self.binding.write().unwrap_or_else(PoisonError::into_inner);
            let rebind = binding.identifier != identifier || binding.options.requires_rebind(&options);
            if !rebind {
                binding.options = options;
                return;
            }

            let fresh = CancellationScope::new(identifier.clone());
            binding.identifier = identifier;
            binding.options = options;
            std::mem::replace(&mut binding.scope, fresh)
        };

        debug!(
            "Rebinding session from {} to {}",
            previous.identifier(),
            self.read_binding(|b| b.identifier.clone())
        );
        previous.cancel();
        self.activate();
    }

    async fn request(self: &Arc<Self>, force: bool, mode: RequestMode) -> FetchResult<Arc<Value>> {
        let (identifier, options, scope) = self.snapshot();
        let service = &self.service;
        let transform = options.transform.as_ref();

        if !force {
            if let Some(pending) = service.pending().join(&identifier) {
                service.record_dedup();
                debug!("Joining in-flight fetch for {}", identifier);
                let outcome = pending
                    .wait()
                    .await
                    .and_then(|fetched| fetched.value_for(transform));
                return self.settle(&scope, &identifier, &options, outcome, mode, None);
            }

            if options.cache_enabled {
                if let Some(entry) = service.store().read(&identifier, transform.map(Transform::tag)) {
                    let value = Arc::clone(&entry.value);
                    self.publish(&scope, |s| s.serve_cached(Arc::clone(&value)));

                    if !service.store().is_fresh(&entry) {
                        self.revalidate(&scope, &identifier, options.transform.clone());
                    }
                    return Ok(value);
                }
            }
        }

        let previous_status = self.state.borrow().status;
        let (pending, joined) = if force {
            (service.start_fetch(&identifier, options.transform.clone()), false)
        } else {
            service.join_or_start_fetch(&identifier, options.transform.clone())
        };
        if joined {
            debug!("Joining fetch for {} started concurrently", identifier);
        } else {
            self.publish(&scope, |s| s.begin_loading(mode == RequestMode::Foreground));
        }

        let outcome = pending
            .wait()
            .await
            .and_then(|fetched| fetched.value_for(transform));
        self.settle(&scope, &identifier, &options, outcome, mode, Some(previous_status))
    }

    /// Publish the outcome of a fetch this session waited on
    fn settle(
        &self,
        scope: &CancellationScope,
        identifier: &str,
        options: &SessionOptions,
        outcome: FetchResult<Arc<Value>>,
        mode: RequestMode,
        previous_status: Option<FetchStatus>,
    ) -> FetchResult<Arc<Value>> {
        match outcome {
            Ok(value) => {
                self.publish(scope, |s| s.succeed(Arc::clone(&value)));
                Ok(value)
            }
            Err(error) if mode == RequestMode::Silent => {
                debug!("Debounced refresh for {} failed: {}", identifier, error);
                let status = previous_status.unwrap_or_default();
                self.publish(scope, |s| s.restore(status));
                Err(error)
            }
            Err(error) => {
                warn!("Fetch for {} failed: {}", identifier, error);
                let fallback = self
                    .service
                    .store()
                    .read(identifier, options.transform.as_ref().map(Transform::tag))
                    .map(|entry| entry.value);
                let message = error.to_string();
                self.publish(scope, |s| s.fail(message, fallback));
                Err(error)
            }
        }
    }

    /// Refresh a stale entry without touching `loading` or `error`
    ///
    /// Does nothing when a fetch for the identifier is already in flight.
    fn revalidate(self: &Arc<Self>, scope: &CancellationScope, identifier: &str, transform: Option<Transform>) {
        let (pending, joined) = self.service.join_or_start_fetch(identifier, transform.clone());
        if joined {
            trace!("Revalidation for {} already in flight", identifier);
            return;
        }
        debug!("Serving stale {} while revalidating", identifier);

        let weak = Arc::downgrade(self);
        let task_scope = scope.clone();
        let identifier = identifier.to_string();

        scope.spawn(async move {
            let Some(outcome) = task_scope.run_until_cancelled(pending.wait()).await else {
                return;
            };
            let outcome = outcome.and_then(|fetched| fetched.value_for(transform.as_ref()));
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match outcome {
                Ok(value) => {
                    if inner.publish(&task_scope, |s| s.succeed(value)) {
                        trace!("Background refresh for {} published", identifier);
                    }
                }
                Err(e) => debug!("Background refresh for {} failed: {}", identifier, e),
            }
        });
    }
}
