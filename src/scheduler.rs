//! Bounded work scheduler.
//!
//! Generic FIFO task runner that caps concurrent in-flight work units. It
//! knows nothing about entries or uploads: a work unit is a boxed factory
//! producing a future, and completion is signalled exactly once when that
//! future resolves. Producers may enqueue both before and after `run`,
//! including from inside a running unit, which is how the session engine
//! discovers directory children.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, trace};

/// A queued unit of asynchronous work.
pub type WorkUnit = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send + 'static>;

/// FIFO scheduler with a fixed concurrency cap.
#[derive(Clone)]
pub struct WorkScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    max_workers: usize,
    queue: Mutex<VecDeque<WorkUnit>>,
    running: Mutex<usize>,
    active: AtomicBool,
    settled: Notify,
}

impl WorkScheduler {
    /// Create a scheduler running at most `max_workers` units concurrently.
    pub fn new(max_workers: usize) -> Self {
        assert!(max_workers > 0, "scheduler requires at least one worker");
        Self {
            inner: Arc::new(SchedulerInner {
                max_workers,
                queue: Mutex::new(VecDeque::new()),
                running: Mutex::new(0),
                active: AtomicBool::new(false),
                settled: Notify::new(),
            }),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.inner.max_workers
    }

    /// Append a work unit to the pending queue. Units start in FIFO order
    /// relative to enqueue time; completion order is unconstrained.
    pub fn enqueue(&self, unit: WorkUnit) {
        let mut queue = self.inner.queue.lock();
        queue.push_back(unit);
        trace!(pending = queue.len(), "enqueued work unit");
    }

    /// Begin (or resume) draining the queue. Safe to call repeatedly; each
    /// call tops the running set back up to the cap.
    pub fn run(&self) {
        self.inner.active.store(true, Ordering::SeqCst);
        self.inner.fill();
    }

    /// Drop all pending units and stop starting new work. Units already
    /// started are not torn down; cancellation is their own, cooperative
    /// responsibility. Their completions are still accounted for.
    pub fn stop(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
        let dropped = {
            let mut queue = self.inner.queue.lock();
            let n = queue.len();
            queue.clear();
            n
        };
        if dropped > 0 {
            debug!(dropped, "scheduler stopped with pending work units");
        }
        // A stop with nothing running settles the scheduler immediately.
        if self.inner.is_settled() {
            self.inner.settled.notify_waiters();
        }
    }

    /// True when nothing is running and nothing is pending.
    pub fn is_settled(&self) -> bool {
        self.inner.is_settled()
    }

    pub fn pending(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn running(&self) -> usize {
        *self.inner.running.lock()
    }

    /// Resolve once no units are running and the queue is empty.
    pub async fn wait_settled(&self) {
        loop {
            let mut notified = pin!(self.inner.settled.notified());
            notified.as_mut().enable();
            if self.inner.is_settled() {
                return;
            }
            notified.await;
        }
    }
}

impl SchedulerInner {
    fn is_settled(&self) -> bool {
        *self.running.lock() == 0 && self.queue.lock().is_empty()
    }

    fn fill(self: &Arc<Self>) {
        loop {
            if !self.active.load(Ordering::SeqCst) {
                return;
            }
            let unit = {
                let mut running = self.running.lock();
                if *running >= self.max_workers {
                    return;
                }
                let Some(unit) = self.queue.lock().pop_front() else {
                    return;
                };
                *running += 1;
                unit
            };

            let inner = Arc::clone(self);
            tokio::spawn(async move {
                unit().await;
                inner.unit_complete();
            });
        }
    }

    fn unit_complete(self: &Arc<Self>) {
        {
            let mut running = self.running.lock();
            // A zero count here means completion was signalled more times
            // than units were started: a double-callback defect.
            if *running == 0 {
                panic!("work scheduler completion signalled with no running units");
            }
            *running -= 1;
        }

        if self.active.load(Ordering::SeqCst) {
            self.fill();
        }

        if self.is_settled() {
            self.active.store(false, Ordering::SeqCst);
            self.settled.notify_waiters();
        }
    }
}
