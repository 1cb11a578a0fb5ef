//! Debouncing of invalidation signals
//!
//! Bursts of invalidation signals collapse into a single forced refresh.
//! Each signal re-arms a quiet-window timer; when the window elapses with no
//! further signal the refresh is handed to the configured scheduler, unless
//! a debounced refresh for the same session is still running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

use crate::app::cancellation::CancellationScope;
use crate::app::scheduler::{Scheduler, TaskPriority};
use crate::app::signals::Subscription;

/// Refresh invoked when a burst of signals has quieted down
pub type RefreshFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Coalesces invalidation signals for one session binding
#[derive(Clone)]
pub struct EventDebouncer {
    quiet_window: Duration,
    scheduler: Arc<dyn Scheduler>,
    in_flight: Arc<AtomicBool>,
}

impl EventDebouncer {
    pub fn new(quiet_window: Duration, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            quiet_window,
            scheduler,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a debounced refresh is currently running
    pub fn is_pending(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Listen to a subscription for the lifetime of a scope
    pub fn spawn(self, subscription: Subscription, scope: &CancellationScope, refresh: RefreshFn) {
        let owner = scope.clone();
        scope.spawn(self.run(subscription, owner, refresh));
    }

    async fn run(self, mut subscription: Subscription, scope: CancellationScope, refresh: RefreshFn) {
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                signal = subscription.recv() => match signal {
                    Some(()) => {
                        // Re-arming replaces any trigger that has not fired yet.
                        deadline = Some(Instant::now() + self.quiet_window);
                        trace!("Signal '{}' re-armed debounce for {}", subscription.signal(), scope.identifier());
                    }
                    None => {
                        debug!("Signal '{}' closed", subscription.signal());
                        break;
                    }
                },
                _ = scope.cancelled() => {
                    trace!("Debouncer for {} stopped", scope.identifier());
                    break;
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    self.trigger(&scope, &refresh);
                }
            }
        }
    }

    fn trigger(&self, scope: &CancellationScope, refresh: &RefreshFn) {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!(
                "Debounced refresh for {} dropped, previous one still running",
                scope.identifier()
            );
            return;
        }

        let latch = Arc::clone(&self.in_flight);
        let refresh = Arc::clone(refresh);
        let owner = scope.clone();
        let handle = self.scheduler.schedule(
            TaskPriority::Background,
            Box::new(move || {
                let task_scope = owner.clone();
                owner.spawn(async move {
                    trace!("Running debounced refresh for {}", task_scope.identifier());
                    refresh().await;
                    latch.store(false, Ordering::Release);
                });
            }),
        );
        scope.track(handle);
    }
}

impl std::fmt::Debug for EventDebouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDebouncer")
            .field("quiet_window", &self.quiet_window)
            .field("scheduler", &self.scheduler.kind())
            .field("in_flight", &self.is_pending())
            .finish()
    }
}
