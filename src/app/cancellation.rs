//! Cooperative cancellation bound to a session
//!
//! A scope is created whenever a session attaches or changes its
//! identifier, invalidation signal or cache setting. Firing it aborts the
//! timers and callbacks the scope tracks and voids any continuation that
//! checks it afterwards. It never aborts a network request already running
//! inside the pending registry.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;
use tokio::task::AbortHandle;
use tracing::trace;

/// Cancellation handle for a spawned task or a queued callback
///
/// Queued callbacks that have not started yet check the flag before
/// running; spawned tasks are additionally aborted.
#[derive(Debug, Clone, Default)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    abort: Option<AbortHandle>,
}

impl TaskHandle {
    /// Handle for a callback that has not been spawned yet
    pub fn deferred() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Record that a deferred callback has run
    pub fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
            || self.abort.as_ref().is_some_and(AbortHandle::is_finished)
    }
}

impl From<AbortHandle> for TaskHandle {
    fn from(abort: AbortHandle) -> Self {
        Self {
            abort: Some(abort),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct ScopeInner {
    identifier: String,
    cancelled: AtomicBool,
    notify: Notify,
    tracked: Mutex<Vec<TaskHandle>>,
}

/// Lifetime token for one session binding
#[derive(Debug, Clone)]
pub struct CancellationScope {
    inner: Arc<ScopeInner>,
}

impl CancellationScope {
    /// Create a live scope for an identifier
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                identifier: identifier.into(),
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
                tracked: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Identifier this scope was created for
    pub fn identifier(&self) -> &str {
        &self.inner.identifier
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Fire the scope
    ///
    /// Idempotent. Aborts every tracked task that has not finished.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }

        let tracked = std::mem::take(
            &mut *self
                .inner
                .tracked
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for handle in &tracked {
            handle.cancel();
        }
        self.inner.notify.notify_waiters();
        trace!(
            "Cancelled scope for {} ({} tracked tasks)",
            self.inner.identifier,
            tracked.len()
        );
    }

    /// Tie a spawned task or queued callback to this scope
    ///
    /// A task tracked after the scope fired is cancelled immediately.
    pub fn track(&self, handle: impl Into<TaskHandle>) {
        let handle = handle.into();
        if self.is_cancelled() {
            handle.cancel();
            return;
        }

        let mut tracked = self
            .inner
            .tracked
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tracked.retain(|h| !h.is_finished());
        tracked.push(handle);
    }

    /// Spawn a task owned by this scope
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.track(handle.abort_handle());
    }

    /// Resolve once the scope has fired
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Run a future unless the scope fires first
    pub async fn run_until_cancelled<F: Future>(&self, future: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            output = future => Some(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let scope = CancellationScope::new("/x");
        assert_eq!(scope.identifier(), "/x");
        assert!(!scope.is_cancelled());

        scope.cancel();
        scope.cancel();
        assert!(scope.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_tracked_tasks() {
        let scope = CancellationScope::new("/x");
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<()>();

        scope.spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let _ = tx.send(());
        });
        scope.cancel();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_deferred_handle_is_flagged() {
        let scope = CancellationScope::new("/x");
        let handle = TaskHandle::deferred();
        scope.track(handle.clone());
        assert!(!handle.is_cancelled());

        scope.cancel();
        assert!(handle.is_cancelled());
        assert!(!handle.is_finished());

        handle.mark_finished();
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_track_after_cancel_aborts_immediately() {
        let scope = CancellationScope::new("/x");
        scope.cancel();

        let handle = tokio::spawn(futures::future::pending::<()>());
        scope.track(handle.abort_handle());
        assert!(handle.await.unwrap_err().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_cancelled() {
        let scope = CancellationScope::new("/x");
        assert_eq!(scope.run_until_cancelled(async { 7 }).await, Some(7));

        let waiter = scope.clone();
        let pending = tokio::spawn(async move {
            waiter
                .run_until_cancelled(tokio::time::sleep(Duration::from_secs(60)))
                .await
        });
        tokio::task::yield_now().await;
        scope.cancel();
        assert_eq!(pending.await.unwrap(), None);
    }
}
