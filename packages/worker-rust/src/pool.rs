//! Fixed-size thread pool draining a single bounded FIFO queue.
//!
//! The queue, the shutdown flag and the thread accounting live behind one
//! mutex, so admission (`try_execute`) and shutdown are linearizable: a job
//! is either enqueued before the shutdown flag is raised, and then runs or is
//! cancelled, or it is rejected. Nothing accepted is dropped silently.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::error::LifecycleError;

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A unit of work executed on a pool thread.
pub(crate) trait Job: Send + 'static {
    /// Runs the job to completion on the current pool thread.
    fn run(self: Box<Self>);

    /// Called instead of `run` when the job is removed from the queue by
    /// shutdown before any thread picked it up.
    fn cancel(self: Box<Self>);
}

/// Why [`ThreadPool::try_execute`] refused a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejection {
    ShuttingDown,
    Full { capacity: usize },
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct QueueState {
    jobs: VecDeque<Box<dyn Job>>,
    shutdown: bool,
    /// Threads currently executing a job.
    active: usize,
    /// Threads that have not yet exited their loop.
    live: usize,
}

impl QueueState {
    /// Threads that will claim the next queued job: spawned threads not yet
    /// looping, threads blocked in `next_job`, and threads between jobs.
    fn idle(&self) -> usize {
        self.live.saturating_sub(self.active)
    }

    /// Jobs no idle thread is going to claim.
    fn waiting(&self) -> usize {
        self.jobs.len().saturating_sub(self.idle())
    }
}

struct Shared {
    state: Mutex<QueueState>,
    /// Signalled when a job is queued or shutdown is requested.
    work_available: Condvar,
    /// Signalled when the last live thread exits.
    terminated: Condvar,
}

#[derive(Clone, Copy)]
enum Counter {
    Active,
    Live,
}

/// Decrements a thread counter when dropped, including during unwinding.
struct CountGuard<'a> {
    shared: &'a Shared,
    counter: Counter,
}

impl Drop for CountGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        match self.counter {
            Counter::Active => state.active -= 1,
            Counter::Live => state.live -= 1,
        }
        if state.live == 0 {
            self.shared.terminated.notify_all();
        }
    }
}

// ---------------------------------------------------------------------------
// ThreadPool
// ---------------------------------------------------------------------------

/// A fixed set of OS threads pulling jobs from one FIFO queue.
pub(crate) struct ThreadPool {
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl ThreadPool {
    /// Spawns `size` threads named `{name_prefix}-{index}`.
    ///
    /// If a thread fails to spawn, the threads already running are told to
    /// exit and the error is returned.
    pub(crate) fn spawn(size: usize, name_prefix: &str) -> Result<Self, LifecycleError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                shutdown: false,
                active: 0,
                live: 0,
            }),
            work_available: Condvar::new(),
            terminated: Condvar::new(),
        });
        let pool = Self {
            shared,
            handles: Mutex::new(Vec::with_capacity(size)),
            size,
        };

        for index in 0..size {
            let shared = Arc::clone(&pool.shared);
            pool.shared.state.lock().live += 1;
            let spawned = thread::Builder::new()
                .name(format!("{name_prefix}-{index}"))
                .spawn(move || worker_loop(index, &shared));
            match spawned {
                Ok(handle) => pool.handles.lock().push(handle),
                Err(e) => {
                    pool.shared.state.lock().live -= 1;
                    pool.shutdown();
                    return Err(LifecycleError::ThreadSpawn(e));
                }
            }
        }

        Ok(pool)
    }

    /// Number of threads the pool was created with.
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Enqueues `job` unless the pool is shutting down or `capacity` jobs are
    /// already waiting. Running jobs, and queued jobs an idle thread is about
    /// to claim, do not count against `capacity`.
    pub(crate) fn try_execute(&self, job: Box<dyn Job>, capacity: usize) -> Result<(), Rejection> {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(Rejection::ShuttingDown);
        }
        if state.jobs.len() >= capacity.saturating_add(state.idle()) {
            return Err(Rejection::Full { capacity });
        }
        state.jobs.push_back(job);
        drop(state);
        self.shared.work_available.notify_one();
        Ok(())
    }

    /// Stops admission. Queued jobs still run; threads exit once the queue is
    /// empty.
    pub(crate) fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        if !state.shutdown {
            state.shutdown = true;
            debug!(queued = state.jobs.len(), "pool shutdown requested");
        }
        drop(state);
        self.shared.work_available.notify_all();
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    /// Removes every queued job and cancels it. Returns how many were
    /// cancelled. Running jobs are not interrupted.
    pub(crate) fn cancel_queued(&self) -> usize {
        let drained: Vec<Box<dyn Job>> = self.shared.state.lock().jobs.drain(..).collect();
        let count = drained.len();
        for job in drained {
            job.cancel();
        }
        count
    }

    /// Waits up to `timeout` for every thread to exit. Returns `true` if the
    /// pool terminated, in which case the threads are joined.
    pub(crate) fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while state.live > 0 {
            if self
                .shared
                .terminated
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                break;
            }
        }
        let terminated = state.live == 0;
        drop(state);

        if terminated {
            for handle in self.handles.lock().drain(..) {
                if handle.join().is_err() {
                    warn!("pool thread exited by panic");
                }
            }
        }
        terminated
    }

    /// Number of jobs waiting for a thread.
    pub(crate) fn queued(&self) -> usize {
        self.shared.state.lock().waiting()
    }

    /// Number of threads currently running a job.
    pub(crate) fn active(&self) -> usize {
        self.shared.state.lock().active
    }

    /// Number of threads still running their loop.
    pub(crate) fn live(&self) -> usize {
        self.shared.state.lock().live
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(index: usize, shared: &Shared) {
    trace!("pool thread {index} started");
    let _live = CountGuard {
        shared,
        counter: Counter::Live,
    };

    while let Some(job) = next_job(shared) {
        let _active = CountGuard {
            shared,
            counter: Counter::Active,
        };
        job.run();
    }

    trace!("pool thread {index} exiting");
}

/// Blocks until a job is available, or returns `None` once the pool is shut
/// down and the queue is empty. Marks the thread active before returning a
/// job, under the same lock that removed it from the queue.
fn next_job(shared: &Shared) -> Option<Box<dyn Job>> {
    let mut state = shared.state.lock();
    loop {
        if let Some(job) = state.jobs.pop_front() {
            state.active += 1;
            return Some(job);
        }
        if state.shutdown {
            return None;
        }
        shared.work_available.wait(&mut state);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    use super::*;

    struct Counting {
        ran: Arc<AtomicUsize>,
        cancelled: Arc<AtomicUsize>,
    }

    impl Job for Counting {
        fn run(self: Box<Self>) {
            self.ran.fetch_add(1, Ordering::SeqCst);
        }

        fn cancel(self: Box<Self>) {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Runs until the paired sender is dropped or sends.
    struct Blocking {
        release: mpsc::Receiver<()>,
        started: mpsc::Sender<()>,
    }

    impl Job for Blocking {
        fn run(self: Box<Self>) {
            let _ = self.started.send(());
            let _ = self.release.recv();
        }

        fn cancel(self: Box<Self>) {}
    }

    fn counting(ran: &Arc<AtomicUsize>, cancelled: &Arc<AtomicUsize>) -> Box<dyn Job> {
        Box::new(Counting {
            ran: Arc::clone(ran),
            cancelled: Arc::clone(cancelled),
        })
    }

    #[test]
    fn runs_jobs_and_terminates_after_shutdown() {
        let pool = ThreadPool::spawn(2, "test-pool").unwrap();
        assert_eq!(pool.size(), 2);

        let ran = Arc::new(AtomicUsize::new(0));
        let cancelled = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            pool.try_execute(counting(&ran, &cancelled), 16).unwrap();
        }

        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));
        assert_eq!(ran.load(Ordering::SeqCst), 5);
        assert_eq!(cancelled.load(Ordering::SeqCst), 0);
        assert_eq!(pool.live(), 0);
    }

    #[test]
    fn rejects_after_shutdown() {
        let pool = ThreadPool::spawn(1, "test-pool").unwrap();
        pool.shutdown();
        assert!(pool.is_shutdown());

        let ran = Arc::new(AtomicUsize::new(0));
        let cancelled = Arc::new(AtomicUsize::new(0));
        assert_eq!(
            pool.try_execute(counting(&ran, &cancelled), 16),
            Err(Rejection::ShuttingDown)
        );
        assert!(pool.await_termination(Duration::from_secs(5)));
    }

    #[test]
    fn capacity_counts_waiting_jobs_only() {
        let pool = ThreadPool::spawn(1, "test-pool").unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();

        pool.try_execute(
            Box::new(Blocking {
                release: release_rx,
                started: started_tx,
            }),
            1,
        )
        .unwrap();
        started_rx.recv().unwrap();
        assert_eq!(pool.active(), 1);
        assert_eq!(pool.queued(), 0);

        let ran = Arc::new(AtomicUsize::new(0));
        let cancelled = Arc::new(AtomicUsize::new(0));
        pool.try_execute(counting(&ran, &cancelled), 1).unwrap();
        assert_eq!(pool.queued(), 1);
        assert_eq!(
            pool.try_execute(counting(&ran, &cancelled), 1),
            Err(Rejection::Full { capacity: 1 })
        );

        release_tx.send(()).unwrap();
        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn idle_threads_do_not_count_against_capacity() {
        let pool = ThreadPool::spawn(3, "test-pool").unwrap();
        let mut releases = Vec::new();
        let (started_tx, started_rx) = mpsc::channel();

        // Submitted before any thread has had a chance to look at the queue.
        for _ in 0..5 {
            let (release_tx, release_rx) = mpsc::channel();
            releases.push(release_tx);
            pool.try_execute(
                Box::new(Blocking {
                    release: release_rx,
                    started: started_tx.clone(),
                }),
                2,
            )
            .unwrap();
        }

        let ran = Arc::new(AtomicUsize::new(0));
        let cancelled = Arc::new(AtomicUsize::new(0));
        assert_eq!(
            pool.try_execute(counting(&ran, &cancelled), 2),
            Err(Rejection::Full { capacity: 2 })
        );

        for _ in 0..3 {
            started_rx.recv().unwrap();
        }
        assert_eq!(pool.active(), 3);
        assert_eq!(pool.queued(), 2);

        drop(releases);
        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn zero_capacity_admits_one_job_per_idle_thread() {
        let pool = ThreadPool::spawn(2, "test-pool").unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_a, rx_a) = mpsc::channel();
        let (release_b, rx_b) = mpsc::channel();

        for release in [rx_a, rx_b] {
            pool.try_execute(
                Box::new(Blocking {
                    release,
                    started: started_tx.clone(),
                }),
                0,
            )
            .unwrap();
        }

        let ran = Arc::new(AtomicUsize::new(0));
        let cancelled = Arc::new(AtomicUsize::new(0));
        assert_eq!(
            pool.try_execute(counting(&ran, &cancelled), 0),
            Err(Rejection::Full { capacity: 0 })
        );

        started_rx.recv().unwrap();
        started_rx.recv().unwrap();
        release_a.send(()).unwrap();
        release_b.send(()).unwrap();
        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));
    }

    #[test]
    fn cancel_queued_skips_waiting_jobs() {
        let pool = ThreadPool::spawn(1, "test-pool").unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();

        pool.try_execute(
            Box::new(Blocking {
                release: release_rx,
                started: started_tx,
            }),
            8,
        )
        .unwrap();
        started_rx.recv().unwrap();

        let ran = Arc::new(AtomicUsize::new(0));
        let cancelled = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            pool.try_execute(counting(&ran, &cancelled), 8).unwrap();
        }

        pool.shutdown();
        assert!(!pool.await_termination(Duration::from_millis(20)));
        assert_eq!(pool.cancel_queued(), 3);

        release_tx.send(()).unwrap();
        assert!(pool.await_termination(Duration::from_secs(5)));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(cancelled.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn panicking_job_does_not_leak_thread_accounting() {
        struct Panics;
        impl Job for Panics {
            fn run(self: Box<Self>) {
                panic!("boom");
            }
            fn cancel(self: Box<Self>) {}
        }

        let pool = ThreadPool::spawn(1, "test-pool").unwrap();
        pool.try_execute(Box::new(Panics), 1).unwrap();
        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));
        assert_eq!(pool.active(), 0);
        assert_eq!(pool.live(), 0);
    }
}
