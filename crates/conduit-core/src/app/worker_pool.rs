//! WorkerPool - 有界 worker pool
//!
//! - `core_workers` 個の常駐 task が有界キューを消化する
//! - キューが満杯なら最大 `max_workers - core_workers` 個の burst worker を起動。
//!   自分の task を実行したあとキューが空になるまで手伝って終了する
//! - どちらも埋まっていれば submit は即座に拒否

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{Mutex as AsyncMutex, Semaphore, mpsc};
use tokio::task::JoinHandle;

use crate::config::PoolSettings;

pub type PoolTask = Pin<Box<dyn Future<Output = ()> + Send>>;

type SharedReceiver = Arc<AsyncMutex<mpsc::Receiver<PoolTask>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("worker queue is full")]
    Full,

    #[error("worker pool is shut down")]
    Closed,
}

/// Where an accepted task went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Queued,
    Burst,
}

pub struct WorkerPool {
    tx: Mutex<Option<mpsc::Sender<PoolTask>>>,
    rx: SharedReceiver,
    burst: Arc<Semaphore>,
    burst_capacity: u32,
    joins: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn the core workers. Must be called inside a tokio runtime.
    pub fn start(settings: &PoolSettings) -> Self {
        let core = settings.core_workers.max(1);
        let burst_capacity = u32::try_from(settings.max_workers.saturating_sub(core)).unwrap_or(u32::MAX);
        let (tx, rx) = mpsc::channel::<PoolTask>(settings.queue_capacity.max(1));
        let rx: SharedReceiver = Arc::new(AsyncMutex::new(rx));

        let joins = (0..core)
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                tokio::spawn(async move { core_worker(worker_id, rx).await })
            })
            .collect();

        tracing::debug!(core, burst_capacity, queue_capacity = settings.queue_capacity, "worker pool started");

        Self {
            tx: Mutex::new(Some(tx)),
            rx,
            burst: Arc::new(Semaphore::new(burst_capacity as usize)),
            burst_capacity,
            joins: Mutex::new(joins),
        }
    }

    /// A pool with no workers that refuses every task. For apps that only
    /// read or sweep jobs.
    pub fn closed() -> Self {
        let (_, rx) = mpsc::channel::<PoolTask>(1);
        Self {
            tx: Mutex::new(None),
            rx: Arc::new(AsyncMutex::new(rx)),
            burst: Arc::new(Semaphore::new(0)),
            burst_capacity: 0,
            joins: Mutex::new(Vec::new()),
        }
    }

    /// Hand a task to the pool without waiting.
    pub fn try_submit(&self, task: PoolTask) -> Result<Dispatch, PoolError> {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return Err(PoolError::Closed);
        };

        match tx.try_send(task) {
            Ok(()) => Ok(Dispatch::Queued),
            Err(TrySendError::Closed(_)) => Err(PoolError::Closed),
            Err(TrySendError::Full(task)) => {
                let permit = Arc::clone(&self.burst)
                    .try_acquire_owned()
                    .map_err(|_| PoolError::Full)?;
                let rx = Arc::clone(&self.rx);
                tokio::spawn(async move {
                    run_task("burst", task).await;
                    drain_queue(rx).await;
                    drop(permit);
                });
                Ok(Dispatch::Burst)
            }
        }
    }

    /// Tasks waiting in the queue.
    pub fn queued(&self) -> usize {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .unwrap_or(0)
    }

    /// Burst workers currently alive.
    pub fn active_burst(&self) -> usize {
        (self.burst_capacity as usize).saturating_sub(self.burst.available_permits())
    }

    /// Stop accepting tasks. Queued tasks still run.
    pub fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Close, let the queue drain, and wait for every worker to finish.
    pub async fn shutdown_and_join(&self) {
        self.close();
        let joins = std::mem::take(&mut *self.joins.lock().unwrap_or_else(PoisonError::into_inner));
        for join in joins {
            let _ = join.await;
        }
        // Burst workers hold a permit until they exit.
        if let Ok(permits) = self.burst.acquire_many(self.burst_capacity).await {
            permits.forget();
            self.burst.add_permits(self.burst_capacity as usize);
        }
        tracing::debug!("worker pool stopped");
    }
}

async fn core_worker(worker_id: usize, rx: SharedReceiver) {
    loop {
        // The lock is held only while waiting for the next task.
        let task = rx.lock().await.recv().await;
        let Some(task) = task else {
            break;
        };
        run_task(&format!("core-{worker_id}"), task).await;
    }
}

async fn drain_queue(rx: SharedReceiver) {
    loop {
        // A held lock means another worker is already parked on the queue.
        let next = match rx.try_lock() {
            Ok(mut guard) => guard.try_recv(),
            Err(_) => break,
        };
        match next {
            Ok(task) => run_task("burst", task).await,
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
        }
    }
}

/// Run on its own task so a panic stays contained to that job.
async fn run_task(worker: &str, task: PoolTask) {
    if let Err(err) = tokio::spawn(task).await {
        tracing::error!(worker, error = %err, "pool task crashed");
    }
}
