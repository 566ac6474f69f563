//! FIFO queue of asynchronous jobs.
//!
//! Jobs are enqueued synchronously, so their order is the order of the
//! `run` calls, and a single worker task awaits them one at a time.

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

type Job = BoxFuture<'static, ()>;

#[derive(Debug)]
pub struct AsyncQueue {
    name: &'static str,
    tx: mpsc::UnboundedSender<Job>,
    pending: Arc<AtomicUsize>,
    worker: JoinHandle<()>,
}

impl AsyncQueue {
    /// Spawns the worker; must be called inside a Tokio runtime.
    pub fn new(name: &'static str) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_pending = pending.clone();

        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
                worker_pending.fetch_sub(1, Ordering::AcqRel);
            }
            trace!(queue = name, "Queue worker stopped");
        });

        Self {
            name,
            tx,
            pending,
            worker,
        }
    }

    /// Appends `job`; it starts after every previously queued job finished.
    pub fn run<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(Box::pin(job)).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            trace!(queue = self.name, "Queue closed, job dropped");
        }
    }

    /// Jobs queued or running.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

impl Drop for AsyncQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test(start_paused = true)]
    async fn test_jobs_run_in_order_without_overlap() {
        let queue = AsyncQueue::new("test");
        let log = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = oneshot::channel();

        for (i, delay) in [(0, 30), (1, 10), (2, 0)] {
            let log = log.clone();
            queue.run(async move {
                log.lock().push(format!("start {i}"));
                tokio::time::sleep(Duration::from_millis(delay)).await;
                log.lock().push(format!("end {i}"));
            });
        }
        queue.run(async move {
            let _ = done_tx.send(());
        });

        done_rx.await.unwrap();
        assert_eq!(
            *log.lock(),
            vec!["start 0", "end 0", "start 1", "end 1", "start 2", "end 2"]
        );
    }
}
