//! Bounded worker pool for fire-and-forget side effects.
//!
//! Cache writes and usage-log appends must not delay the response, and must
//! survive the caller's cancellation. They are queued here and executed by a
//! fixed set of workers that belong to the pool, not to any request.
//!
//! ## Semantics
//!
//! - **At most once.** Each task runs at most one time; failures are counted
//!   and logged at `debug`, never retried or escalated.
//! - **Bounded.** The queue holds at most `capacity` tasks. On overflow the
//!   [`OverflowPolicy`] decides which task is discarded.
//! - **Independent lifetime.** Dropping the future that submitted a task has no
//!   effect on it. Only [`DetachedWorkPool::shutdown`] stops the workers, after
//!   draining what is queued for at most the grace period.

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::GatewayMetrics;

/// Boxed error returned by detached tasks.
pub type BoxError = Box<dyn StdError + Send + Sync>;

type TaskFuture = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send>>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Which task to discard when the queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the oldest queued task to make room for the new one.
    #[default]
    DropOldest,
    /// Reject the incoming task and keep the queue as it is.
    DropNewest,
}

/// Sizing of a [`DetachedWorkPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetachedPoolConfig {
    /// Number of worker tasks. Clamped to at least 1.
    pub workers: usize,
    /// Maximum queued (not yet running) tasks. Clamped to at least 1.
    pub capacity: usize,
    /// What to do when the queue is full.
    pub overflow: OverflowPolicy,
}

impl Default for DetachedPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            capacity: 1024,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// What a detached task does; selects the failure counter it reports to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Writes a response into the cache.
    CacheWrite,
    /// Appends a usage-log record.
    UsageLog,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::CacheWrite => f.write_str("cache_write"),
            TaskKind::UsageLog => f.write_str("usage_log"),
        }
    }
}

/// A unit of detached work.
pub struct DetachedTask {
    kind: TaskKind,
    future: TaskFuture,
}

impl DetachedTask {
    /// Wraps `future` as a task of the given kind.
    pub fn new<F>(kind: TaskKind, future: F) -> Self
    where
        F: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            kind,
            future: Box::pin(future),
        }
    }

    /// The task's kind.
    pub fn kind(&self) -> TaskKind {
        self.kind
    }
}

impl std::fmt::Debug for DetachedTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetachedTask").field("kind", &self.kind).finish()
    }
}

/// Result of [`DetachedWorkPool::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The task was queued.
    Queued,
    /// The task was queued after evicting the oldest queued task.
    QueuedEvictingOldest,
    /// The queue was full and the task was discarded.
    Rejected,
    /// The pool is shut down; the task was discarded.
    Closed,
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

// `closed` lives under the same lock as the tasks: a submit either lands
// before the close and is drained, or observes the close and is dropped.
#[derive(Default)]
struct Queue {
    tasks: VecDeque<DetachedTask>,
    closed: bool,
}

enum Next {
    Run(DetachedTask),
    Wait,
    Stop,
}

struct Shared {
    queue: Mutex<Queue>,
    work_ready: Notify,
    idle: Notify,
    // Queued plus running tasks.
    pending: AtomicUsize,
    capacity: usize,
    overflow: OverflowPolicy,
    metrics: Arc<GatewayMetrics>,
}

impl Shared {
    fn lock_queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next(&self) -> Next {
        let mut queue = self.lock_queue();
        match queue.tasks.pop_front() {
            Some(task) => Next::Run(task),
            None if queue.closed => Next::Stop,
            None => Next::Wait,
        }
    }

    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    async fn run(&self, task: DetachedTask) {
        let kind = task.kind;
        // Spawned so that a panicking task cannot take the worker down with it.
        match tokio::spawn(task.future).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                debug!(%kind, %error, "detached task failed");
                self.record_failure(kind);
            }
            Err(error) => {
                warn!(%kind, %error, "detached task aborted");
                self.record_failure(kind);
            }
        }
        self.metrics.record_detached_completed();
        self.finish_one();
    }

    fn record_failure(&self, kind: TaskKind) {
        match kind {
            TaskKind::CacheWrite => self.metrics.record_cache_write_failure(),
            TaskKind::UsageLog => self.metrics.record_usage_log_failure(),
        }
    }
}

/// Fixed-size pool of workers draining a bounded queue of [`DetachedTask`]s.
pub struct DetachedWorkPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DetachedWorkPool {
    /// Spawns the workers. Must be called from within a Tokio runtime.
    pub fn start(config: DetachedPoolConfig, metrics: Arc<GatewayMetrics>) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue::default()),
            work_ready: Notify::new(),
            idle: Notify::new(),
            pending: AtomicUsize::new(0),
            capacity: config.capacity.max(1),
            overflow: config.overflow,
            metrics,
        });

        let workers = (0..config.workers.max(1))
            .map(|_| tokio::spawn(run_worker(Arc::clone(&shared))))
            .collect();

        Self {
            shared,
            workers: Mutex::new(workers),
        }
    }

    /// Counters this pool reports to.
    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.shared.metrics
    }

    /// Number of tasks queued or running.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Queues `task` without waiting for it.
    pub fn submit(&self, task: DetachedTask) -> SubmitOutcome {
        let shared = &self.shared;
        let kind = task.kind;
        let outcome = {
            let mut queue = shared.lock_queue();
            let queue = &mut *queue;
            if queue.closed {
                SubmitOutcome::Closed
            } else if queue.tasks.len() >= shared.capacity {
                match shared.overflow {
                    OverflowPolicy::DropOldest => {
                        // One out, one in: `pending` is unchanged.
                        if let Some(evicted) = queue.tasks.pop_front() {
                            warn!(kind = %evicted.kind, "detached queue full, evicting oldest task");
                        }
                        queue.tasks.push_back(task);
                        SubmitOutcome::QueuedEvictingOldest
                    }
                    OverflowPolicy::DropNewest => {
                        warn!(%kind, "detached queue full, rejecting task");
                        SubmitOutcome::Rejected
                    }
                }
            } else {
                shared.pending.fetch_add(1, Ordering::AcqRel);
                queue.tasks.push_back(task);
                SubmitOutcome::Queued
            }
        };

        match outcome {
            SubmitOutcome::Queued => shared.work_ready.notify_one(),
            SubmitOutcome::QueuedEvictingOldest => {
                shared.metrics.record_detached_dropped();
                shared.work_ready.notify_one();
            }
            SubmitOutcome::Rejected | SubmitOutcome::Closed => {
                shared.metrics.record_detached_dropped();
            }
        }
        outcome
    }

    /// Resolves once no task is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.shared.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if self.shared.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Stops accepting work, drains the queue and stops the workers.
    ///
    /// Returns `true` if everything drained within `grace`. Workers still
    /// running after `grace` are aborted and their queued tasks are lost.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.shared.lock_queue().closed = true;
        self.shared.work_ready.notify_waiters();

        let mut workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        let drained = tokio::time::timeout(grace, async {
            for worker in workers.iter_mut() {
                let _ = worker.await;
            }
        })
        .await
        .is_ok();

        if !drained {
            warn!(
                pending = self.pending(),
                "detached pool did not drain before the grace period elapsed"
            );
            for worker in &workers {
                worker.abort();
            }
        }
        drained
    }
}

impl std::fmt::Debug for DetachedWorkPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetachedWorkPool")
            .field("capacity", &self.shared.capacity)
            .field("overflow", &self.shared.overflow)
            .field("pending", &self.pending())
            .finish()
    }
}

async fn run_worker(shared: Arc<Shared>) {
    loop {
        // Registered before the queue is inspected so a wake-up between the
        // check and the await is not lost.
        let ready = shared.work_ready.notified();
        tokio::pin!(ready);
        ready.as_mut().enable();

        match shared.next() {
            Next::Run(task) => shared.run(task).await,
            Next::Stop => break,
            Next::Wait => ready.await,
        }
    }
}
