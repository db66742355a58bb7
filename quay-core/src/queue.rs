use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::StorageOptions;
use crate::error::StorageError;
use crate::lock::DistributedLock;
use crate::ops;
use crate::store::DocumentStore;

/// All dequeuers serialize their claim attempts under this lock, so the
/// per-queue scan never races against itself across processes.
const DEQUEUE_LOCK: &str = "locks:job:dequeue";

/// The fetch side of the queue: blocks until an entry is available on one of
/// the watched queues and hands it out wrapped in a [`FetchedJob`].
pub struct JobQueue {
    store: Arc<dyn DocumentStore>,
    options: Arc<StorageOptions>,
}

impl JobQueue {
    pub(crate) fn new(store: Arc<dyn DocumentStore>, options: Arc<StorageOptions>) -> Self {
        Self { store, options }
    }

    /// Add a job reference to `queue`. Duplicate enqueues are legal and
    /// create independent entries.
    pub async fn enqueue(&self, queue: &str, job_id: &str) -> Result<(), StorageError> {
        ops::queue::enqueue(self.store.as_ref(), queue, job_id).await
    }

    /// Round-robin over `queues` until an entry is claimed. Blocks, sleeping
    /// `queue_poll_interval` after each full empty pass; returns
    /// [`StorageError::Cancelled`] when `token` fires.
    pub async fn dequeue(
        &self,
        queues: &[String],
        token: &CancellationToken,
    ) -> Result<FetchedJob, StorageError> {
        if queues.is_empty() {
            return Err(StorageError::NoQueues);
        }

        let mut index = 0;
        loop {
            if token.is_cancelled() {
                return Err(StorageError::Cancelled);
            }

            let queue = &queues[index];
            if let Some(entry) = self.try_claim(queue, token).await? {
                return Ok(entry);
            }

            index = (index + 1) % queues.len();
            if index == 0 {
                // a full pass found nothing; back off before the next one
                tokio::select! {
                    _ = token.cancelled() => return Err(StorageError::Cancelled),
                    _ = tokio::time::sleep(self.options.queue_poll_interval) => {}
                }
            }
        }
    }

    async fn try_claim(
        &self,
        queue: &str,
        token: &CancellationToken,
    ) -> Result<Option<FetchedJob>, StorageError> {
        let mut lock = tokio::select! {
            _ = token.cancelled() => return Err(StorageError::Cancelled),
            lock = DistributedLock::acquire(
                self.store.clone(),
                DEQUEUE_LOCK,
                self.options.dequeue_lock_timeout,
                self.options.lock_retry_interval,
            ) => match lock {
                Ok(lock) => lock,
                // Someone else is scanning; treat the queue as empty for now.
                Err(StorageError::LockTimeout { .. }) => return Ok(None),
                Err(err) => return Err(err),
            },
        };

        let claimed =
            ops::queue::claim_next(self.store.as_ref(), queue, self.options.invisibility_timeout)
                .await;

        if let Err(err) = lock.release().await {
            warn!("failed to release dequeue lock: {}", err);
        }

        match claimed? {
            Some(entry) => {
                debug!("fetched job {} from queue '{}'", entry.job_id, queue);
                Ok(Some(FetchedJob::start(
                    self.store.clone(),
                    self.options.clone(),
                    entry.id,
                    entry.job_id,
                    queue.to_string(),
                )))
            }
            None => Ok(None),
        }
    }
}

struct FetchedInner {
    store: Arc<dyn DocumentStore>,
    entry_id: String,
    job_id: String,
    queue: String,
    /// Set once the entry has been removed or requeued; every later
    /// operation (including the keep-alive and Drop) becomes a no-op.
    settled: AtomicBool,
    /// Serializes settle operations against keep-alive refreshes.
    op_lock: tokio::sync::Mutex<()>,
}

/// A claimed queue entry. While alive, a background task refreshes the claim
/// so the entry stays invisible past the invisibility timeout. Exactly one
/// outcome applies: [`remove_from_queue`](FetchedJob::remove_from_queue) on
/// success, [`requeue`](FetchedJob::requeue) on failure, or an implicit
/// requeue when the handle is dropped unsettled.
pub struct FetchedJob {
    inner: Arc<FetchedInner>,
    keep_alive: JoinHandle<()>,
}

impl FetchedJob {
    fn start(
        store: Arc<dyn DocumentStore>,
        options: Arc<StorageOptions>,
        entry_id: String,
        job_id: String,
        queue: String,
    ) -> Self {
        let inner = Arc::new(FetchedInner {
            store,
            entry_id,
            job_id,
            queue,
            settled: AtomicBool::new(false),
            op_lock: tokio::sync::Mutex::new(()),
        });
        let keep_alive = tokio::spawn(keep_alive_loop(
            inner.clone(),
            options.keep_alive_interval,
        ));
        Self { inner, keep_alive }
    }

    pub fn job_id(&self) -> &str {
        &self.inner.job_id
    }

    pub fn queue(&self) -> &str {
        &self.inner.queue
    }

    /// Processing succeeded: delete the queue entry for good.
    pub async fn remove_from_queue(&self) -> Result<(), StorageError> {
        let _guard = self.inner.op_lock.lock().await;
        if self.inner.settled.load(Ordering::SeqCst) {
            return Ok(());
        }
        ops::queue::release(self.inner.store.as_ref(), &self.inner.entry_id).await?;
        self.inner.settled.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Processing failed: hand the entry back so another worker can claim it.
    pub async fn requeue(&self) -> Result<(), StorageError> {
        let _guard = self.inner.op_lock.lock().await;
        if self.inner.settled.load(Ordering::SeqCst) {
            return Ok(());
        }
        ops::queue::requeue(self.inner.store.as_ref(), &self.inner.entry_id).await?;
        self.inner.settled.store(true, Ordering::SeqCst);
        Ok(())
    }
}

async fn keep_alive_loop(inner: Arc<FetchedInner>, interval: std::time::Duration) {
    loop {
        tokio::time::sleep(interval).await;

        let _guard = inner.op_lock.lock().await;
        if inner.settled.load(Ordering::SeqCst) {
            break;
        }
        match ops::queue::extend_claim(inner.store.as_ref(), &inner.entry_id).await {
            Ok(true) => debug!("kept queue entry for job {} alive", inner.job_id),
            Ok(false) => {
                warn!(
                    "queue entry for job {} vanished; stopping keep-alive",
                    inner.job_id
                );
                break;
            }
            Err(err) => warn!(
                "failed to keep queue entry for job {} alive: {}",
                inner.job_id, err
            ),
        }
    }
}

impl Drop for FetchedJob {
    fn drop(&mut self) {
        self.keep_alive.abort();
        if self.inner.settled.load(Ordering::SeqCst) {
            return;
        }
        // Dropped without an explicit outcome: treat it as abandoned and
        // requeue. If no runtime is available the invisibility timeout
        // eventually reclaims the entry anyway.
        if let Ok(handle) = Handle::try_current() {
            let inner = self.inner.clone();
            handle.spawn(async move {
                let _guard = inner.op_lock.lock().await;
                if inner.settled.swap(true, Ordering::SeqCst) {
                    return;
                }
                if let Err(err) =
                    ops::queue::requeue(inner.store.as_ref(), &inner.entry_id).await
                {
                    warn!("failed to requeue job {} on drop: {}", inner.job_id, err);
                }
            });
        }
    }
}
