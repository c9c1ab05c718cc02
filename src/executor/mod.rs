//! Execution backend: the worker pool and its shared FIFO job queue.
//!
//! This is where schedule generation is decoupled from bounded-concurrency
//! execution. Open-loop generators enqueue closures as fast as their pacing
//! distribution yields timestamps; N persistent worker threads dequeue and run
//! them. The queue is unbounded and unthrottled on purpose — sustained
//! overload shows up as growing queue depth and delayed execution, never as
//! rejection.
//!
//! # Shutdown
//!
//! The default shutdown is a graceful drain: one poison-pill sentinel per
//! worker travels through the same queue as real work, so it is FIFO-ordered
//! behind any backlog and teardown blocks until that backlog finishes. For
//! callers that need to abandon a backlog instead, [`WorkerPool::shutdown_now`]
//! closes the queue and discards whatever has not started yet.
//!
//! # Failure
//!
//! A panicking job is not intercepted. It kills its worker thread and the pool
//! runs at reduced capacity for the rest of the run; there is no centralized
//! failure aggregation and no run-wide abort.

pub mod distribution;
pub mod phase;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::error::{Error, Result};

/// A zero-argument unit of work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Job(Job),
    /// Poison pill: the receiving worker exits.
    Shutdown,
}

/// Fixed-size pool of persistent worker threads consuming from one shared
/// FIFO queue. Submission order is FIFO; completion order under contention is
/// not deterministic.
pub struct WorkerPool {
    tx: Sender<Message>,
    workers: Vec<JoinHandle<()>>,
    pending: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Start `size` worker threads, all blocking on an empty queue.
    pub fn spawn(size: usize) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        let pending = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicBool::new(false));
        let workers = (0..size)
            .map(|i| {
                let rx = rx.clone();
                let pending = Arc::clone(&pending);
                let closed = Arc::clone(&closed);
                std::thread::Builder::new()
                    .name(format!("parabench-worker-{i}"))
                    .spawn(move || worker_loop(rx, pending, closed))
                    .expect("failed to spawn worker thread")
            })
            .collect();
        tracing::debug!(workers = size, "worker pool started");
        Self {
            tx,
            workers,
            pending,
            closed,
        }
    }

    /// Enqueue a job. Never blocks, never rejects.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.tx
            .send(Message::Job(Box::new(job)))
            .expect("job queue closed");
    }

    /// Jobs submitted but not yet finished (queued or executing).
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Number of workers the pool was started with.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Graceful drain: one sentinel per worker, FIFO behind the backlog, then
    /// join every worker and verify the queue is empty. Blocks for as long as
    /// the pending backlog takes to finish.
    ///
    /// Returns the number of worker threads joined, which is always the
    /// number the pool was spawned with — a worker killed by a panicking job
    /// still gets joined here.
    pub fn shutdown(mut self) -> Result<usize> {
        tracing::info!(pending = self.pending(), "draining worker pool");
        for _ in 0..self.workers.len() {
            self.tx
                .send(Message::Shutdown)
                .expect("job queue closed before shutdown");
        }
        let mut joined = 0;
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                // The worker died earlier from a panicking job; its sentinel
                // stays in the queue, harmlessly.
                tracing::warn!("worker thread had panicked before shutdown");
            }
            joined += 1;
        }
        let outstanding = self.pending.load(Ordering::SeqCst);
        if outstanding != 0 {
            return Err(Error::UndrainedQueue { outstanding });
        }
        Ok(joined)
    }

    /// Fast, non-draining shutdown: queued jobs that have not started are
    /// discarded. The job currently executing on each worker still finishes.
    pub fn shutdown_now(mut self) {
        tracing::info!(pending = self.pending(), "closing worker pool, abandoning backlog");
        self.closed.store(true, Ordering::SeqCst);
        for _ in 0..self.workers.len() {
            let _ = self.tx.send(Message::Shutdown);
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Decrements the outstanding-job count when dropped, so the count stays
/// accurate even when a job panics and unwinds through the worker.
struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn worker_loop(rx: Receiver<Message>, pending: Arc<AtomicUsize>, closed: Arc<AtomicBool>) {
    while let Ok(message) = rx.recv() {
        match message {
            Message::Job(job) => {
                let _guard = PendingGuard(Arc::clone(&pending));
                if !closed.load(Ordering::SeqCst) {
                    // A panic here unwinds through the worker and kills it.
                    job();
                }
            }
            Message::Shutdown => break,
        }
    }
}
