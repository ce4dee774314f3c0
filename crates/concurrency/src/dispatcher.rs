//! Fire-and-forget commit dispatcher
//!
//! A fixed pool of worker threads executing detached commits in FIFO order.
//! Callers submit and return immediately; a job's outcome is never reported
//! back to its submitter.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::error;

/// Error returned when the dispatch queue is full or shut down.
#[derive(Debug)]
pub struct BackpressureError;

impl std::fmt::Display for BackpressureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "commit dispatcher queue is full")
    }
}

impl std::error::Error for BackpressureError {}

/// Dispatcher metrics snapshot.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherStats {
    /// Jobs waiting in the queue.
    pub queue_depth: usize,
    /// Jobs currently executing.
    pub active_jobs: usize,
    /// Jobs finished since creation.
    pub jobs_completed: u64,
    /// Number of worker threads.
    pub worker_count: usize,
}

type Job = Box<dyn FnOnce() + Send>;

struct DispatcherInner {
    queue: Mutex<VecDeque<Job>>,
    work_ready: Condvar,
    drain_cond: Condvar,
    shutdown: AtomicBool,
    queue_depth: AtomicUsize,
    active_jobs: AtomicUsize,
    max_queue_depth: usize,
    jobs_completed: AtomicU64,
}

/// Worker pool for detached commits.
pub struct CommitDispatcher {
    inner: Arc<DispatcherInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    num_threads: usize,
}

impl CommitDispatcher {
    /// Create a dispatcher with `num_threads` workers (at least one).
    ///
    /// Workers are named `arbor-commit-0`, `arbor-commit-1`, etc.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if a worker thread cannot be spawned.
    pub fn new(num_threads: usize, max_queue_depth: usize) -> arbor_core::Result<Self> {
        let num_threads = num_threads.max(1);
        let inner = Arc::new(DispatcherInner {
            queue: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            drain_cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            queue_depth: AtomicUsize::new(0),
            active_jobs: AtomicUsize::new(0),
            max_queue_depth,
            jobs_completed: AtomicU64::new(0),
        });

        let dispatcher = Self {
            inner,
            workers: Mutex::new(Vec::with_capacity(num_threads)),
            num_threads,
        };
        for i in 0..num_threads {
            let inner = Arc::clone(&dispatcher.inner);
            let handle = std::thread::Builder::new()
                .name(format!("arbor-commit-{}", i))
                .spawn(move || worker_loop(&inner))?;
            dispatcher.workers.lock().push(handle);
        }
        Ok(dispatcher)
    }

    /// Queue a job.
    ///
    /// Returns `Err(BackpressureError)` if the queue is at capacity or the
    /// dispatcher has been shut down.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> Result<(), BackpressureError> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(BackpressureError);
        }
        if self.inner.queue_depth.load(Ordering::Acquire) >= self.inner.max_queue_depth {
            return Err(BackpressureError);
        }

        {
            let mut queue = self.inner.queue.lock();
            queue.push_back(Box::new(job));
            self.inner.queue_depth.fetch_add(1, Ordering::Release);
        }

        self.inner.work_ready.notify_one();
        Ok(())
    }

    /// Block until all queued and in-flight jobs have completed.
    ///
    /// Workers keep running afterwards.
    pub fn drain(&self) {
        let mut queue = self.inner.queue.lock();
        while self.inner.queue_depth.load(Ordering::Acquire) > 0
            || self.inner.active_jobs.load(Ordering::Acquire) > 0
        {
            self.inner.drain_cond.wait(&mut queue);
        }
    }

    /// Signal workers to exit and join them. Queued jobs still run first.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);

        // Notify under the queue lock so a worker between its shutdown check
        // and its wait cannot miss the wakeup.
        {
            let _queue = self.inner.queue.lock();
            self.inner.work_ready.notify_all();
        }

        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }

    /// Return a snapshot of dispatcher metrics.
    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            queue_depth: self.inner.queue_depth.load(Ordering::Relaxed),
            active_jobs: self.inner.active_jobs.load(Ordering::Relaxed),
            jobs_completed: self.inner.jobs_completed.load(Ordering::Relaxed),
            worker_count: self.num_threads,
        }
    }
}

impl Drop for CommitDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Decrements `active_jobs` and wakes drain waiters, even if the job panics.
struct ActiveJobGuard<'a> {
    inner: &'a DispatcherInner,
}

impl<'a> Drop for ActiveJobGuard<'a> {
    fn drop(&mut self) {
        let prev_active = self.inner.active_jobs.fetch_sub(1, Ordering::Release);
        self.inner.jobs_completed.fetch_add(1, Ordering::Relaxed);

        if prev_active == 1 && self.inner.queue_depth.load(Ordering::Acquire) == 0 {
            let _queue = self.inner.queue.lock();
            self.inner.drain_cond.notify_all();
        }
    }
}

fn worker_loop(inner: &DispatcherInner) {
    loop {
        let job = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(job) = queue.pop_front() {
                    inner.queue_depth.fetch_sub(1, Ordering::Release);
                    inner.active_jobs.fetch_add(1, Ordering::Release);
                    break job;
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        let _guard = ActiveJobGuard { inner };

        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)) {
            error!(
                target: "arbor::dispatcher",
                "detached commit panicked: {:?}",
                e.downcast_ref::<&str>().copied().unwrap_or("(non-string panic)")
            );
        }
    }
}
