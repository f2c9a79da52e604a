//! Bounded worker pool for outbound delivery
//!
//! Producers never wait: a job either lands in its worker's queue or is refused
//! with [`PoolError::Saturated`]. Jobs are routed by key, so jobs sharing a key
//! run on the same worker in submission order.

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Worker pool errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("worker pool saturated")]
    Saturated,

    #[error("worker pool shut down")]
    Closed,
}

/// Pool counters
#[derive(Debug, Default)]
struct PoolCounters {
    completed: AtomicU64,
    rejected: AtomicU64,
    panicked: AtomicU64,
}

/// Snapshot of pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    pub workers: usize,
    pub completed: u64,
    pub rejected: u64,
    pub panicked: u64,
}

/// Fixed-size pool of worker tasks with bounded per-worker queues
pub struct WorkerPool {
    senders: Vec<mpsc::Sender<Job>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<PoolCounters>,
}

impl WorkerPool {
    /// Spawn `workers` workers sharing `capacity` queue slots
    ///
    /// Must be called within a tokio runtime.
    pub fn new(workers: usize, capacity: usize) -> Self {
        let workers = workers.max(1);
        let per_worker = (capacity / workers).max(1);
        let counters = Arc::new(PoolCounters::default());

        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for index in 0..workers {
            let (tx, rx) = mpsc::channel(per_worker);
            senders.push(tx);
            handles.push(tokio::spawn(run_worker(index, rx, Arc::clone(&counters))));
        }

        tracing::debug!(workers, per_worker, "Worker pool started");

        Self {
            senders,
            handles: Mutex::new(handles),
            counters,
        }
    }

    /// Number of workers
    pub fn workers(&self) -> usize {
        self.senders.len()
    }

    /// Submit a job without waiting
    ///
    /// Jobs with the same `key` run in submission order.
    pub fn try_submit<F>(&self, key: usize, job: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = &self.senders[key % self.senders.len()];
        match sender.try_send(Box::new(job)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(PoolError::Saturated)
            }
            Err(TrySendError::Closed(_)) => Err(PoolError::Closed),
        }
    }

    /// Current counters
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.senders.len(),
            completed: self.counters.completed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
        }
    }

    /// Stop all workers, discarding queued jobs
    pub fn shutdown(&self) {
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("stats", &self.stats())
            .finish()
    }
}

async fn run_worker(index: usize, mut rx: mpsc::Receiver<Job>, counters: Arc<PoolCounters>) {
    while let Some(job) = rx.recv().await {
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            counters.panicked.fetch_add(1, Ordering::Relaxed);
            tracing::error!(worker = index, "Worker job panicked");
        } else {
            counters.completed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::{mpsc::unbounded_channel, oneshot};

    #[tokio::test]
    async fn test_runs_jobs() {
        let pool = WorkerPool::new(4, 64);
        let (tx, rx) = oneshot::channel();

        pool.try_submit(1, move || {
            let _ = tx.send(42);
        })
        .unwrap();

        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_same_key_preserves_order() {
        let pool = WorkerPool::new(4, 400);
        let (tx, mut rx) = unbounded_channel();

        for i in 0..50 {
            let tx = tx.clone();
            pool.try_submit(7, move || {
                let _ = tx.send(i);
            })
            .unwrap();
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(i) = rx.recv().await {
            seen.push(i);
        }
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_saturation_is_reported_not_awaited() {
        let pool = WorkerPool::new(1, 2);
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let (started_tx, started_rx) = oneshot::channel();

        // Block the only worker so its queue fills up.
        pool.try_submit(0, move || {
            let _ = started_tx.send(());
            let _ = release_rx.recv_timeout(Duration::from_secs(5));
        })
        .unwrap();
        started_rx.await.unwrap();

        pool.try_submit(0, || {}).unwrap();
        pool.try_submit(0, || {}).unwrap();
        assert_eq!(pool.try_submit(0, || {}), Err(PoolError::Saturated));
        assert_eq!(pool.stats().rejected, 1);

        release_tx.send(()).unwrap();
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::new(1, 8);
        let (tx, rx) = oneshot::channel();

        pool.try_submit(0, || panic!("boom")).unwrap();
        pool.try_submit(0, move || {
            let _ = tx.send(());
        })
        .unwrap();

        rx.await.unwrap();
        assert_eq!(pool.stats().panicked, 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_queues() {
        let pool = WorkerPool::new(2, 8);
        pool.shutdown();
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(pool.try_submit(0, || {}), Err(PoolError::Closed));
    }
}
