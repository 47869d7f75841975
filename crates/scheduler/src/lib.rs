//! Bounded-parallelism scheduling: a single shared priority queue feeding a
//! pool of worker threads (§4.7, §5).
//!
//! There is no affinity between workers and paths. Jobs for the same path
//! are not guaranteed to process in enqueue order if they land at different
//! priorities — callers must tolerate eventual consistency per path, which
//! the keyword index's upsert-by-path and the vector index's delete-then-add
//! sequence both make safe (§5).

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use core_types::{Job, Operation, Priority};
use parking_lot::{Condvar, Mutex};
use tracing::debug;

/// Default queue capacity per §6/§7 ("Capacity is fixed (default 10 000)").
pub const DEFAULT_CAPACITY: usize = 10_000;

struct Inner {
    heap: BinaryHeap<Job>,
    sequence: u64,
}

/// A bounded, priority-ordered job queue. Multiple producers (watcher,
/// bulk scanner) may push concurrently; the manager is the single consumer.
pub struct PriorityQueue {
    inner: Mutex<Inner>,
    not_empty: Condvar,
    capacity: usize,
    dropped: AtomicU64,
}

impl PriorityQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                sequence: 0,
            }),
            not_empty: Condvar::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Non-blocking enqueue. Returns `false` (and increments the drop
    /// counter) if the queue is at capacity — this is the watcher's only
    /// backpressure action (§4.6, §7).
    pub fn try_enqueue(&self, path: impl Into<std::path::PathBuf>, operation: Operation, priority: Priority) -> bool {
        let mut inner = self.inner.lock();
        if inner.heap.len() >= self.capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let sequence = inner.sequence;
        inner.sequence += 1;
        inner.heap.push(Job::new(path, operation, priority, sequence));
        drop(inner);
        self.not_empty.notify_one();
        true
    }

    /// Blocking enqueue used by the bulk scanner, which has nowhere else to
    /// put a `low`-priority job and is willing to wait for room rather than
    /// drop initial-scan work.
    pub fn enqueue_blocking(&self, path: impl Into<std::path::PathBuf>, operation: Operation, priority: Priority) {
        let path = path.into();
        loop {
            let mut inner = self.inner.lock();
            if inner.heap.len() < self.capacity {
                let sequence = inner.sequence;
                inner.sequence += 1;
                inner.heap.push(Job::new(path, operation, priority, sequence));
                drop(inner);
                self.not_empty.notify_one();
                return;
            }
            // Queue is full; release the lock briefly and retry. There is no
            // "not_full" condvar because this path is only exercised by the
            // single-threaded bulk scanner, not a hot producer loop.
            drop(inner);
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Pop the highest-priority, earliest-enqueued job, waiting up to
    /// `timeout` for one to appear. Used by workers and by the manager's
    /// drain-detection loop (§5: "bounded wait of 1 s, then re-check running
    /// flag").
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Job> {
        let mut inner = self.inner.lock();
        if inner.heap.is_empty() {
            let result = self.not_empty.wait_for(&mut inner, timeout);
            if result.timed_out() && inner.heap.is_empty() {
                return None;
            }
        }
        inner.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count of watcher events dropped because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// A bounded pool of worker threads pulling from one [`PriorityQueue`].
///
/// The manager is single-threaded with respect to queue *consumption*
/// (there is exactly one logical dispatch loop); parallelism exists
/// strictly in the workers' execution of `handler` (§5).
pub struct WorkerPool {
    handles: Vec<std::thread::JoinHandle<()>>,
    running: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Spawn `num_workers` threads, each looping: pop a job (1 s bounded
    /// wait), run `handler`, repeat until `running` is cleared.
    pub fn spawn<F>(queue: Arc<PriorityQueue>, num_workers: usize, handler: F) -> Self
    where
        F: Fn(Job) + Send + Sync + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(handler);

        let handles = (0..num_workers.max(1))
            .map(|worker_id| {
                let queue = Arc::clone(&queue);
                let running = Arc::clone(&running);
                let in_flight = Arc::clone(&in_flight);
                let handler = Arc::clone(&handler);
                std::thread::Builder::new()
                    .name(format!("indexer-worker-{worker_id}"))
                    .spawn(move || {
                        while running.load(Ordering::Acquire) {
                            match queue.pop_timeout(Duration::from_secs(1)) {
                                Some(job) => {
                                    in_flight.fetch_add(1, Ordering::AcqRel);
                                    handler(job);
                                    in_flight.fetch_sub(1, Ordering::AcqRel);
                                }
                                None => continue,
                            }
                        }
                        debug!(worker_id, "worker thread exiting");
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self {
            handles,
            running,
            in_flight,
        }
    }

    /// Number of jobs currently being processed (not counting queued jobs).
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Clear the running flag and join every worker thread. In-flight jobs
    /// finish their current step; none are forcibly aborted mid-write (§5).
    pub fn shutdown(self) {
        self.running.store(false, Ordering::Release);
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}
