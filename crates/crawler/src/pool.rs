use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use bluesnake_core::CrawlError;

pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Bounded pool of fetch workers over a shared queue. `submit` awaits when
/// the queue is full; that backpressure is what keeps the Processor from
/// outrunning the fetch capacity.
pub struct WorkerPool {
    tx: Mutex<Option<mpsc::Sender<Task>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(parallelism: usize, queue_size: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Task>(queue_size.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let mut handles = Vec::with_capacity(parallelism.max(1));
        for worker_id in 0..parallelism.max(1) {
            let rx = Arc::clone(&rx);
            handles.push(tokio::spawn(async move {
                debug!(worker_id, "worker started");
                loop {
                    // Take the lock only to receive; the task itself runs
                    // with the queue free for the other workers.
                    let task = { rx.lock().await.recv().await };
                    match task {
                        Some(task) => task.await,
                        None => break,
                    }
                }
                debug!(worker_id, "worker exiting");
            }));
        }
        Self {
            tx: Mutex::new(Some(tx)),
            handles: Mutex::new(handles),
        }
    }

    /// Enqueue a task, awaiting while the queue is full. Fails with
    /// `QueueClosed` once the pool is closed; the rejected task is dropped
    /// here, which runs its cleanup guards.
    pub async fn submit(&self, task: Task) -> Result<(), CrawlError> {
        let tx = match self.tx.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        let tx = tx.ok_or(CrawlError::QueueClosed)?;
        tx.send(task).await.map_err(|_| CrawlError::QueueClosed)
    }

    /// Close the queue and wait for the workers to drain and exit.
    /// Idempotent.
    pub async fn close(&self) {
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
        let handles: Vec<JoinHandle<()>> = match self.handles.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn submitted_tasks_all_run() {
        let pool = WorkerPool::new(4, 16);
        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let ran = Arc::clone(&ran);
            pool.submit(Box::pin(async move {
                ran.fetch_add(1, Ordering::SeqCst);
            }))
            .await
            .unwrap();
        }
        pool.close().await;
        assert_eq!(ran.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_parallelism() {
        let pool = WorkerPool::new(3, 32);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..12 {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            pool.submit(Box::pin(async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }))
            .await
            .unwrap();
        }
        pool.close().await;
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn submit_after_close_fails_and_drops_the_task() {
        let pool = WorkerPool::new(1, 1);
        pool.close().await;
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = Arc::clone(&ran);
        let err = pool
            .submit(Box::pin(async move {
                ran2.fetch_add(1, Ordering::SeqCst);
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::QueueClosed));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let pool = WorkerPool::new(2, 4);
        pool.close().await;
        pool.close().await;
    }
}
