use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Bounded-concurrency job pool. Submission never blocks: jobs queue on the
/// semaphore and at most `size` run at once, so a burst of inbound blocks
/// cannot fan out into an unbounded number of in-flight RPC calls.
///
/// Each subsystem (listener, syncer, retry, intra-block transaction fetch)
/// owns its own pool.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size.max(1))),
        }
    }

    /// Submits a job. The job starts once a permit frees up; queued jobs are
    /// not cancellable.
    pub fn spawn<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            job.await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn runs_at_most_size_jobs_concurrently() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (done_tx, mut done_rx) = mpsc::channel(8);

        for _ in 0..8 {
            let running = running.clone();
            let peak = peak.clone();
            let done = done_tx.clone();
            pool.spawn(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                let _ = done.send(()).await;
            });
        }

        for _ in 0..8 {
            done_rx.recv().await.expect("job should complete");
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
