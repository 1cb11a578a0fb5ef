//! Task scheduling strategies for deferred refreshes
//!
//! Debounced refreshes are handed to a [`Scheduler`] rather than run inline.
//! The strategy is chosen once when the fetch cache is built:
//!
//! - [`PriorityScheduler`] - a single worker draining a priority queue
//! - [`IdleScheduler`] - waits for the runtime to go quiet, bounded by a timeout
//! - [`ImmediateScheduler`] - spawns the callback right away
//!
//! Every strategy returns a [`TaskHandle`] so a cancellation scope can drop
//! callbacks that have not run yet.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::app::cancellation::TaskHandle;
use crate::constants::debounce;

/// A deferred callback
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Relative urgency of a scheduled callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskPriority {
    Background,
    UserVisible,
    UserBlocking,
}

/// Strategy used to run deferred callbacks
pub trait Scheduler: Send + Sync + fmt::Debug {
    /// Queue a callback; it runs at most once and never after cancellation
    fn schedule(&self, priority: TaskPriority, job: Job) -> TaskHandle;

    /// Which strategy this is
    fn kind(&self) -> SchedulerKind;
}

/// Scheduler strategies selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    #[default]
    Priority,
    Idle,
    Immediate,
}

impl SchedulerKind {
    /// Build the scheduler for this strategy
    pub fn build(self, idle_timeout: Duration) -> Arc<dyn Scheduler> {
        match self {
            SchedulerKind::Priority => Arc::new(PriorityScheduler::new()),
            SchedulerKind::Idle => Arc::new(IdleScheduler::new(idle_timeout)),
            SchedulerKind::Immediate => Arc::new(ImmediateScheduler),
        }
    }
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulerKind::Priority => "priority",
            SchedulerKind::Idle => "idle",
            SchedulerKind::Immediate => "immediate",
        };
        f.write_str(name)
    }
}

impl FromStr for SchedulerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "priority" => Ok(SchedulerKind::Priority),
            "idle" => Ok(SchedulerKind::Idle),
            "immediate" => Ok(SchedulerKind::Immediate),
            other => Err(format!(
                "Unknown scheduler '{}'. Expected priority, idle or immediate",
                other
            )),
        }
    }
}

/// Spawns every callback as its own task
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn schedule(&self, _priority: TaskPriority, job: Job) -> TaskHandle {
        tokio::spawn(async move { job() }).abort_handle().into()
    }

    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Immediate
    }
}

/// Runs callbacks once the runtime has had a chance to drain other work
///
/// Idleness is approximated by yielding to the runtime a fixed number of
/// rounds; the timeout bounds how long a busy runtime can defer the
/// callback.
#[derive(Debug, Clone, Copy)]
pub struct IdleScheduler {
    timeout: Duration,
}

impl IdleScheduler {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for IdleScheduler {
    fn default() -> Self {
        Self::new(debounce::IDLE_TIMEOUT)
    }
}

async fn idle_window() {
    for _ in 0..debounce::IDLE_YIELD_ROUNDS {
        tokio::task::yield_now().await;
    }
}

impl Scheduler for IdleScheduler {
    fn schedule(&self, _priority: TaskPriority, job: Job) -> TaskHandle {
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = idle_window() => trace!("Idle callback running"),
                _ = tokio::time::sleep(timeout) => debug!("Idle callback forced after {:?}", timeout),
            }
            job();
        })
        .abort_handle()
        .into()
    }

    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Idle
    }
}

struct QueuedJob {
    priority: TaskPriority,
    sequence: u64,
    handle: TaskHandle,
    job: Job,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    // Highest priority first, then FIFO within a priority.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Priority-aware task queue served by a single worker task
///
/// The worker is started lazily on the first scheduled callback, so the
/// scheduler can be built outside a runtime.
#[derive(Default)]
pub struct PriorityScheduler {
    sender: OnceLock<mpsc::UnboundedSender<QueuedJob>>,
    sequence: std::sync::atomic::AtomicU64,
}

impl PriorityScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self) -> &mpsc::UnboundedSender<QueuedJob> {
        self.sender.get_or_init(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(run_priority_queue(rx));
            debug!("Started priority scheduler worker");
            tx
        })
    }
}

impl fmt::Debug for PriorityScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityScheduler")
            .field("started", &self.sender.get().is_some())
            .finish()
    }
}

async fn run_priority_queue(mut rx: mpsc::UnboundedReceiver<QueuedJob>) {
    let mut queue = BinaryHeap::new();

    loop {
        if queue.is_empty() {
            match rx.recv().await {
                Some(job) => queue.push(job),
                None => break,
            }
        }

        // Let callers that scheduled in the same tick land before picking.
        tokio::task::yield_now().await;
        while let Ok(job) = rx.try_recv() {
            queue.push(job);
        }

        if let Some(queued) = queue.pop() {
            if queued.handle.is_cancelled() {
                trace!("Dropping cancelled {:?} callback", queued.priority);
                continue;
            }
            (queued.job)();
            queued.handle.mark_finished();
        }
    }

    debug!("Priority scheduler worker stopped");
}

impl Scheduler for PriorityScheduler {
    fn schedule(&self, priority: TaskPriority, job: Job) -> TaskHandle {
        let handle = TaskHandle::deferred();
        let sequence = self
            .sequence
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let queued = QueuedJob {
            priority,
            sequence,
            handle: handle.clone(),
            job,
        };
        if self.sender().send(queued).is_err() {
            debug!("Priority scheduler worker is gone, dropping callback");
            handle.cancel();
        }
        handle
    }

    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    fn recording_job(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Job {
        let log = Arc::clone(log);
        Box::new(move || log.lock().unwrap().push(name))
    }

    #[tokio::test]
    async fn test_immediate_runs_job() {
        let (tx, rx) = oneshot::channel();
        ImmediateScheduler.schedule(
            TaskPriority::Background,
            Box::new(move || {
                let _ = tx.send(42);
            }),
        );
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_runs_job() {
        let (tx, rx) = oneshot::channel();
        let scheduler = IdleScheduler::new(Duration::from_millis(50));
        scheduler.schedule(
            TaskPriority::Background,
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        assert!(rx.await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_idle_job_never_runs() {
        let (tx, rx) = oneshot::channel::<()>();
        let scheduler = IdleScheduler::new(Duration::from_secs(1));
        let handle = scheduler.schedule(
            TaskPriority::Background,
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        handle.cancel();
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_priority_queue_orders_jobs() {
        let scheduler = PriorityScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = oneshot::channel();

        scheduler.schedule(TaskPriority::Background, recording_job(&log, "background"));
        scheduler.schedule(TaskPriority::UserBlocking, recording_job(&log, "blocking"));
        scheduler.schedule(TaskPriority::UserVisible, recording_job(&log, "visible"));
        scheduler.schedule(
            TaskPriority::Background,
            Box::new(move || {
                let _ = tx.send(());
            }),
        );

        rx.await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["blocking", "visible", "background"]
        );
    }

    #[tokio::test]
    async fn test_priority_queue_skips_cancelled() {
        let scheduler = PriorityScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = oneshot::channel();

        let skipped = scheduler.schedule(TaskPriority::UserBlocking, recording_job(&log, "skipped"));
        skipped.cancel();
        let ran = scheduler.schedule(TaskPriority::Background, recording_job(&log, "ran"));
        scheduler.schedule(
            TaskPriority::Background,
            Box::new(move || {
                let _ = tx.send(());
            }),
        );

        rx.await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["ran"]);
        assert!(ran.is_finished());
    }

    #[test]
    fn test_scheduler_kind_parsing() {
        assert_eq!("Idle".parse::<SchedulerKind>().unwrap(), SchedulerKind::Idle);
        assert_eq!(SchedulerKind::default(), SchedulerKind::Priority);
        assert!("fastest".parse::<SchedulerKind>().is_err());
        assert_eq!(SchedulerKind::Immediate.to_string(), "immediate");
    }
}
