//! Bounded asynchronous worker with explicit lifecycle and admission control.
//!
//! `BoundedWorker` owns a fixed-size [`ThreadPool`] for the span between
//! `start()` and `stop()`. Submissions are admitted or rejected synchronously;
//! admitted items run a [`RemoteTransform`] on a pool thread and resolve their
//! [`Completion`] exactly once.
//!
//! State machine: Initial -> Operational -> Stopped (terminal).

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::{ArcSwap, ArcSwapOption};
use convoy_core::{Converted, RemoteTransform, WorkItem};
use parking_lot::Mutex;
use tracing::{debug, error, field, info, info_span, trace, warn};

use crate::completion::{self, Completion, Resolver};
use crate::config::WorkerConfig;
use crate::error::{LifecycleError, ShutdownIncomplete, SubmitError, WorkError};
use crate::pool::{Job, Rejection, ThreadPool};
use crate::state::WorkerState;

// ---------------------------------------------------------------------------
// Worker trait
// ---------------------------------------------------------------------------

/// Lifecycle-managed, submit-and-get-a-handle worker.
pub trait Worker: Send + Sync {
    /// Allocates the pool and makes the worker operational.
    ///
    /// # Errors
    ///
    /// Returns a [`LifecycleError`] if the worker is already running, has
    /// been stopped, or the pool cannot be created.
    fn start(&self) -> Result<(), LifecycleError>;

    /// Stops admission, drains or cancels outstanding work, and moves the
    /// worker to `Stopped`. Never fails; see [`StopReport`].
    fn stop(&self) -> StopReport;

    /// Admits `item` for execution and returns its completion handle.
    ///
    /// # Errors
    ///
    /// Returns a [`SubmitError`] if the worker is not operational or its
    /// queue is full. No task is scheduled in that case.
    fn submit(&self, item: WorkItem) -> Result<Completion, SubmitError>;

    /// Current lifecycle state.
    fn state(&self) -> WorkerState;
}

// ---------------------------------------------------------------------------
// Reports and statistics
// ---------------------------------------------------------------------------

/// How a call to `stop()` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The worker was never started; there was nothing to drain.
    NeverStarted,
    /// The worker was already stopped.
    AlreadyStopped,
    /// All queued and running work finished within the drain grace period.
    Drained,
    /// Queued work was cancelled and running work finished within the
    /// cancellation grace period.
    DrainedAfterCancel,
    /// Work was still running after both grace periods.
    Incomplete { still_running: usize },
}

/// Summary returned by `stop()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopReport {
    pub outcome: ShutdownOutcome,
    /// Queued items resolved with [`WorkError::Cancelled`].
    pub cancelled: usize,
    pub elapsed: Duration,
}

impl StopReport {
    /// `true` unless work was still running when `stop()` gave up.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !matches!(self.outcome, ShutdownOutcome::Incomplete { .. })
    }

    /// Converts an incomplete shutdown into an error value.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownIncomplete`] if work was still running.
    pub fn into_result(self) -> Result<Self, ShutdownIncomplete> {
        match self.outcome {
            ShutdownOutcome::Incomplete { still_running } => {
                Err(ShutdownIncomplete { still_running })
            }
            _ => Ok(self),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

/// Point-in-time view of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub state: WorkerState,
    /// Items waiting for a thread.
    pub queued: usize,
    /// Items currently running.
    pub active: usize,
    /// Accepted submissions.
    pub submitted: u64,
    /// Submissions refused by admission control.
    pub rejected: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

// ---------------------------------------------------------------------------
// BoundedWorker
// ---------------------------------------------------------------------------

/// Fixed-size thread pool behind a capacity-limited FIFO queue.
///
/// All methods take `&self`; share the worker across threads with `Arc`.
pub struct BoundedWorker<T: RemoteTransform> {
    config: WorkerConfig,
    transform: Arc<T>,
    state: ArcSwap<WorkerState>,
    pool: ArcSwapOption<ThreadPool>,
    /// Serializes `start()` and `stop()`.
    lifecycle: Mutex<()>,
    counters: Arc<Counters>,
}

impl<T: RemoteTransform> BoundedWorker<T> {
    /// Creates a worker in the `Initial` state. No threads are spawned until
    /// [`start`](Self::start).
    #[must_use]
    pub fn new(config: WorkerConfig, transform: T) -> Self {
        Self::with_shared(config, Arc::new(transform))
    }

    /// Like [`new`](Self::new) but reuses a transform shared with other owners.
    #[must_use]
    pub fn with_shared(config: WorkerConfig, transform: Arc<T>) -> Self {
        Self {
            config,
            transform,
            state: ArcSwap::from_pointee(WorkerState::Initial),
            pool: ArcSwapOption::empty(),
            lifecycle: Mutex::new(()),
            counters: Arc::new(Counters::default()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        **self.state.load()
    }

    /// Allocates the pool and transitions `Initial -> Operational`.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::AlreadyStarted`] if already operational; no second
    ///   pool is allocated.
    /// - [`LifecycleError::Terminated`] if the worker has been stopped.
    /// - [`LifecycleError::InvalidConfig`] or [`LifecycleError::ThreadSpawn`]
    ///   if the pool cannot be created; the worker stays `Initial`.
    pub fn start(&self) -> Result<(), LifecycleError> {
        let _lifecycle = self.lifecycle.lock();
        match self.state() {
            WorkerState::Initial => {}
            WorkerState::Operational => return Err(LifecycleError::AlreadyStarted),
            WorkerState::Stopped => return Err(LifecycleError::Terminated),
        }

        self.config.validate()?;
        let pool = ThreadPool::spawn(self.config.pool_size, &self.config.thread_name_prefix)?;
        let threads = pool.size();
        self.pool.store(Some(Arc::new(pool)));
        self.state.store(Arc::new(WorkerState::Operational));

        info!(
            max_queue_size = self.config.max_queue_size,
            "Worker started and is operational with {threads} threads ready"
        );
        Ok(())
    }

    /// Shuts the worker down and transitions to `Stopped`.
    ///
    /// 1. Marks the worker `Stopped` and closes the pool to new work
    /// 2. Waits up to `drain_timeout` for queued and running items
    /// 3. On timeout, cancels queued items and waits up to `cancel_timeout`
    /// 4. If items are still running, logs and reports an incomplete shutdown
    ///
    /// Blocks the calling thread for at most the sum of both grace periods.
    pub fn stop(&self) -> StopReport {
        let _lifecycle = self.lifecycle.lock();
        let started = Instant::now();
        let previous = self.state();
        self.state.store(Arc::new(WorkerState::Stopped));

        let Some(pool) = self.pool.load_full() else {
            let outcome = if previous == WorkerState::Stopped {
                ShutdownOutcome::AlreadyStopped
            } else {
                ShutdownOutcome::NeverStarted
            };
            debug!(?outcome, "stop() with no pool");
            return StopReport {
                outcome,
                cancelled: 0,
                elapsed: started.elapsed(),
            };
        };

        pool.shutdown();
        info!(
            queued = pool.queued(),
            active = pool.active(),
            "Worker stopping, draining outstanding work"
        );

        let mut cancelled = 0;
        let outcome = if pool.await_termination(self.config.drain_timeout) {
            ShutdownOutcome::Drained
        } else {
            warn!(
                timeout_ms = duration_ms(self.config.drain_timeout),
                queued = pool.queued(),
                active = pool.active(),
                "Drain grace period expired, cancelling queued work"
            );
            cancelled = pool.cancel_queued();
            if pool.await_termination(self.config.cancel_timeout) {
                ShutdownOutcome::DrainedAfterCancel
            } else {
                let still_running = pool.active();
                error!(
                    still_running,
                    live_threads = pool.live(),
                    timeout_ms = duration_ms(self.config.cancel_timeout),
                    "Pool did not terminate"
                );
                ShutdownOutcome::Incomplete { still_running }
            }
        };
        self.pool.store(None);

        let report = StopReport {
            outcome,
            cancelled,
            elapsed: started.elapsed(),
        };
        if report.is_clean() {
            info!(cancelled, elapsed_ms = duration_ms(report.elapsed), "Worker stopped successfully");
        }
        report
    }

    /// Admits `item` or rejects it synchronously.
    ///
    /// Checks, in order: the worker is `Operational` and its pool is not
    /// shutting down, then fewer than `max_queue_size` items are waiting.
    /// Items already running do not count against the queue bound.
    ///
    /// # Errors
    ///
    /// - [`SubmitError::NotOperational`] before `start()`, during or after
    ///   `stop()`.
    /// - [`SubmitError::QueueFull`] when the waiting queue is saturated.
    pub fn submit(&self, item: WorkItem) -> Result<Completion, SubmitError> {
        let state = self.state();
        if !state.accepts_work() {
            return Err(self.reject(SubmitError::NotOperational { state }));
        }
        let Some(pool) = self.pool.load_full() else {
            return Err(self.reject(SubmitError::NotOperational {
                state: self.state(),
            }));
        };

        let (resolver, completion) = completion::pair();
        let task = ConversionTask {
            item,
            resolver,
            transform: Arc::clone(&self.transform),
            counters: Arc::clone(&self.counters),
        };

        // Counted before the task is visible to pool threads.
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        let admitted = pool.try_execute(Box::new(task), self.config.max_queue_size);
        if admitted.is_err() {
            self.counters.submitted.fetch_sub(1, Ordering::Relaxed);
        }

        match admitted {
            Ok(()) => {
                trace!(kind = %item.kind(), value = item.value, "work accepted");
                Ok(completion)
            }
            // stop() publishes `Stopped` before closing the pool.
            Err(Rejection::ShuttingDown) => Err(self.reject(SubmitError::NotOperational {
                state: self.state(),
            })),
            Err(Rejection::Full { capacity }) => {
                Err(self.reject(SubmitError::QueueFull { capacity }))
            }
        }
    }

    /// Returns a snapshot of the worker's counters and queue occupancy.
    #[must_use]
    pub fn stats(&self) -> WorkerStats {
        let (queued, active) = self
            .pool
            .load_full()
            .map_or((0, 0), |pool| (pool.queued(), pool.active()));
        // Terminal counts first: any item they include was already counted
        // as submitted.
        let completed = self.counters.completed.load(Ordering::Acquire);
        let failed = self.counters.failed.load(Ordering::Acquire);
        let cancelled = self.counters.cancelled.load(Ordering::Acquire);
        WorkerStats {
            state: self.state(),
            queued,
            active,
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            completed,
            failed,
            cancelled,
        }
    }

    fn reject(&self, err: SubmitError) -> SubmitError {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        debug!(error = %err, "work rejected");
        err
    }
}

impl<T: RemoteTransform> Worker for BoundedWorker<T> {
    fn start(&self) -> Result<(), LifecycleError> {
        Self::start(self)
    }

    fn stop(&self) -> StopReport {
        Self::stop(self)
    }

    fn submit(&self, item: WorkItem) -> Result<Completion, SubmitError> {
        Self::submit(self, item)
    }

    fn state(&self) -> WorkerState {
        Self::state(self)
    }
}

impl<T: RemoteTransform> Drop for BoundedWorker<T> {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.load_full() {
            if !pool.is_shutdown() {
                warn!("Worker dropped while operational; closing pool without waiting");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ConversionTask
// ---------------------------------------------------------------------------

struct ConversionTask<T> {
    item: WorkItem,
    resolver: Resolver,
    transform: Arc<T>,
    counters: Arc<Counters>,
}

impl<T: RemoteTransform> Job for ConversionTask<T> {
    fn run(self: Box<Self>) {
        let Self {
            item,
            resolver,
            transform,
            counters,
        } = *self;

        let span = info_span!(
            "convert",
            kind = %item.kind(),
            value = item.value,
            duration_ms = field::Empty,
            outcome = field::Empty,
        );
        let _entered = span.enter();
        let start = Instant::now();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            transform.transform(item.kind(), item.value)
        }));
        let outcome = match result {
            Ok(Ok(output)) => Ok(Converted::new(item, output)),
            Ok(Err(e)) => Err(WorkError::Transform(e)),
            Err(payload) => Err(WorkError::Panicked {
                message: panic_message(&*payload),
            }),
        };

        span.record("duration_ms", duration_ms(start.elapsed()));
        match &outcome {
            Ok(converted) => {
                span.record("outcome", "ok");
                counters.completed.fetch_add(1, Ordering::Release);
                debug!(output = converted.output, "conversion completed");
            }
            Err(e) => {
                span.record("outcome", "error");
                counters.failed.fetch_add(1, Ordering::Release);
                warn!(error = %e, "conversion failed");
            }
        }

        resolver.resolve(outcome);
    }

    fn cancel(self: Box<Self>) {
        let Self {
            item,
            resolver,
            counters,
            ..
        } = *self;
        counters.cancelled.fetch_add(1, Ordering::Release);
        debug!(kind = %item.kind(), value = item.value, "queued conversion cancelled");
        resolver.resolve(Err(WorkError::Cancelled));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn duration_ms(d: Duration) -> u64 {
    d.as_millis() as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
