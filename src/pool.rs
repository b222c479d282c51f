//! Fixed-size thread pool and the task group used to fan out segment work.
//!
//! [`WorkerPool`] owns a set of OS threads that pull boxed jobs from one shared
//! channel. It is created once and reused across requests; dropping it closes
//! the channel and joins every worker.
//!
//! [`TaskGroup`] is the structured layer on top: tasks are spawned into a group
//! and [`TaskGroup::join`] is the only way to get their results back. A failing
//! (or panicking) task cancels the group, tasks that have not started yet skip
//! their work, and `join` reports a single aggregate failure with no partial
//! output.

use crate::{Error, Result};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` worker threads (at least one).
    pub fn new(size: usize) -> Result<Self> {
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(size);
        for worker_id in 0..size {
            let receiver = Arc::clone(&receiver);
            let handle = thread::Builder::new()
                .name(format!("sieve-worker-{worker_id}"))
                .spawn(move || worker_loop(worker_id, receiver))
                .map_err(|e| Error::ConcurrentExecution {
                    failed: 0,
                    total: size,
                    reason: format!("failed to spawn worker {worker_id}: {e}"),
                })?;
            workers.push(handle);
        }

        tracing::debug!(workers = size, "Worker pool started");
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// One worker per available processing unit.
    pub fn with_available_parallelism() -> Result<Self> {
        Self::new(available_workers())
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job for the next free worker.
    pub fn execute<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or_else(pool_closed)?;
        sender.send(Box::new(job)).map_err(|_| pool_closed())
    }

    /// Stop accepting work, let queued jobs finish and join every worker.
    pub fn shutdown(&mut self) {
        // Closing the channel ends each worker's recv loop once the queue drains
        if self.sender.take().is_none() {
            return;
        }

        for (worker_id, handle) in self.workers.drain(..).enumerate() {
            if handle.join().is_err() {
                tracing::error!("Worker {worker_id} panicked during shutdown");
            }
        }

        tracing::debug!("Worker pool shut down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// `std::thread::available_parallelism`, or 4 when it cannot be determined.
pub fn available_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn pool_closed() -> Error {
    Error::ConcurrentExecution {
        failed: 0,
        total: 0,
        reason: "worker pool is shut down".to_string(),
    }
}

fn worker_loop(worker_id: usize, receiver: Arc<Mutex<Receiver<Job>>>) {
    tracing::trace!("Worker {worker_id} started");

    loop {
        // The guard is a temporary, so the lock is released before the job runs
        let job = receiver.lock().recv();
        match job {
            Ok(job) => job(),
            Err(_) => break,
        }
    }

    tracing::trace!("Worker {worker_id} stopped");
}

/// How one task ended, as reported back to [`TaskGroup::join`].
enum Report {
    Done,
    Skipped,
    Failed(String),
}

struct Shared<T> {
    cancelled: AtomicBool,
    results: Mutex<Vec<(usize, T)>>,
}

/// A batch of tasks on a [`WorkerPool`] that succeed or fail together.
pub struct TaskGroup<'pool, T> {
    pool: &'pool WorkerPool,
    shared: Arc<Shared<T>>,
    report_tx: Sender<Report>,
    report_rx: Receiver<Report>,
    spawned: usize,
}

impl<'pool, T: Send + 'static> TaskGroup<'pool, T> {
    pub fn new(pool: &'pool WorkerPool) -> Self {
        let (report_tx, report_rx) = mpsc::channel();
        Self {
            pool,
            shared: Arc::new(Shared {
                cancelled: AtomicBool::new(false),
                results: Mutex::new(Vec::new()),
            }),
            report_tx,
            report_rx,
            spawned: 0,
        }
    }

    /// Queue `task` on the pool. Its output is tagged with the spawn order so
    /// [`join`](Self::join) can return results in that order.
    pub fn spawn<F>(&mut self, task: F) -> Result<()>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let index = self.spawned;
        let shared = Arc::clone(&self.shared);
        let report_tx = self.report_tx.clone();

        let job = move || {
            if shared.cancelled.load(Ordering::Acquire) {
                let _ = report_tx.send(Report::Skipped);
                return;
            }

            let report = match panic::catch_unwind(AssertUnwindSafe(task)) {
                Ok(Ok(value)) => {
                    shared.results.lock().push((index, value));
                    Report::Done
                }
                Ok(Err(e)) => {
                    shared.cancelled.store(true, Ordering::Release);
                    Report::Failed(e.to_string())
                }
                Err(payload) => {
                    shared.cancelled.store(true, Ordering::Release);
                    Report::Failed(panic_message(payload.as_ref()))
                }
            };
            let _ = report_tx.send(report);
        };

        if let Err(e) = self.pool.execute(job) {
            self.shared.cancelled.store(true, Ordering::Release);
            return Err(e);
        }
        self.spawned += 1;
        Ok(())
    }

    /// Mark the group as cancelled; tasks that have not started will skip.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::Release);
    }

    /// Wait for every spawned task. Returns all outputs in spawn order, or one
    /// [`Error::ConcurrentExecution`] if any task failed.
    pub fn join(self) -> Result<Vec<T>> {
        let Self {
            shared,
            report_tx,
            report_rx,
            spawned,
            ..
        } = self;
        // Only task clones of the sender remain, so the loop ends once every
        // queued task has reported or been dropped
        drop(report_tx);

        let mut received = 0;
        let mut failed = 0;
        let mut first_reason = None;
        for report in report_rx.iter() {
            received += 1;
            match report {
                Report::Done | Report::Skipped => {}
                Report::Failed(reason) => {
                    tracing::error!("Segment task failed: {reason}");
                    failed += 1;
                    first_reason.get_or_insert(reason);
                }
            }
        }

        let lost = spawned - received.min(spawned);
        let skipped = shared.cancelled.load(Ordering::Acquire);
        if failed > 0 || lost > 0 || skipped {
            return Err(Error::ConcurrentExecution {
                failed: failed + lost,
                total: spawned,
                reason: first_reason
                    .unwrap_or_else(|| "tasks were cancelled before completing".to_string()),
            });
        }

        let mut results = std::mem::take(&mut *shared.results.lock());
        results.sort_unstable_by_key(|(index, _)| *index);
        Ok(results.into_iter().map(|(_, value)| value).collect())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("task panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("task panicked: {s}")
    } else {
        "task panicked".to_string()
    }
}
