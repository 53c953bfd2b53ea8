use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("worker pool is closed")]
    Closed,
    #[error("worker pool queue is full")]
    Full,
}

/// Fixed-size pool of `N` workers draining a bounded job queue of
/// capacity `Q` (§4.6). A worker that panics or whose job errors does
/// not take the pool down with it — jobs are plain `Future<Output =
/// ()>`, so failures are the job's own concern to report, not the
/// pool's.
pub struct WorkerPool {
    tx: mpsc::Sender<Job>,
    closed: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(nthreads: usize, queue_size: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Job>(queue_size.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let closed = Arc::new(AtomicBool::new(false));

        let workers = (0..nthreads.max(1))
            .map(|id| {
                let rx = rx.clone();
                tokio::spawn(async move {
                    loop {
                        let job = rx.lock().await.recv().await;
                        match job {
                            Some(job) => job.await,
                            None => {
                                debug!(worker = id, "worker pool channel closed, exiting");
                                break;
                            }
                        }
                    }
                })
            })
            .collect();

        Self { tx, closed, workers }
    }

    /// Non-blocking submission: rejected with [`PoolError::Full`] if
    /// the queue has no space, or [`PoolError::Closed`] once `close`
    /// has been called. The caller (the Dispatcher's send phase) is
    /// expected to re-queue the job itself on `Full`.
    pub fn add_job(&self, job: Job) -> Result<(), PoolError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PoolError::Closed);
        }
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PoolError::Full,
            mpsc::error::TrySendError::Closed(_) => PoolError::Closed,
        })
    }

    /// Stops accepting new jobs and waits for every worker to drain
    /// the queue and exit. Dropping the sender is what wakes workers
    /// blocked on `recv`, standing in for the `2*N` `EXIT` sentinels a
    /// non-async thread pool would need.
    pub async fn close(self) {
        self.closed.store(true, Ordering::SeqCst);
        drop(self.tx);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[tokio::test]
    async fn jobs_run_and_pool_drains_on_close() {
        let pool = WorkerPool::new(2, 8);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let counter = counter.clone();
            pool.add_job(Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }

        pool.close().await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn full_queue_is_reported_not_blocked() {
        let pool = WorkerPool::new(0, 1);
        // No workers draining, so the one slot fills immediately.
        pool.add_job(Box::pin(async {})).unwrap();
        assert!(matches!(pool.add_job(Box::pin(async {})), Err(PoolError::Full)));
        pool.close().await;
    }
}
