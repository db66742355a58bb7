use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::StorageOptions;
use crate::error::StorageError;
use crate::lock::DistributedLock;
use crate::ops;
use crate::ops::janitor::EXPIRABLE_KINDS;
use crate::store::DocumentStore;
use crate::types::epoch_now;

const EXPIRATION_LOCK: &str = "locks:expirationmanager";
const EXPIRATION_LOCK_TIMEOUT: Duration = Duration::from_secs(300);

/// Background deleter of documents whose `expire_on` has passed.
///
/// Each sweep visits the expirable kinds one at a time, taking the sweep
/// lock per kind so concurrent sweepers on other nodes interleave instead of
/// duplicating work. Raw counters are never swept; the aggregator owns their
/// lifetime.
pub struct ExpirationSweeper {
    store: Arc<dyn DocumentStore>,
    options: Arc<StorageOptions>,
}

impl ExpirationSweeper {
    pub(crate) fn new(store: Arc<dyn DocumentStore>, options: Arc<StorageOptions>) -> Self {
        Self { store, options }
    }

    /// One full sweep across all expirable kinds. A failure on one kind is
    /// logged and the sweep moves on; only cancellation aborts the pass.
    /// Returns the number of documents deleted.
    pub async fn run_once(&self, token: &CancellationToken) -> Result<u64, StorageError> {
        let mut swept = 0;
        for kind in EXPIRABLE_KINDS {
            if token.is_cancelled() {
                return Err(StorageError::Cancelled);
            }

            let mut lock = tokio::select! {
                _ = token.cancelled() => return Err(StorageError::Cancelled),
                lock = DistributedLock::acquire(
                    self.store.clone(),
                    EXPIRATION_LOCK,
                    EXPIRATION_LOCK_TIMEOUT,
                    self.options.lock_retry_interval,
                ) => match lock {
                    Ok(lock) => lock,
                    Err(err) => {
                        warn!("skipping expired {} documents: {}", kind, err);
                        continue;
                    }
                },
            };

            let result =
                ops::janitor::sweep_expired(self.store.as_ref(), kind, epoch_now()).await;
            if let Err(err) = lock.release().await {
                warn!("failed to release expiration lock: {}", err);
            }

            match result {
                Ok(count) => {
                    if count > 0 {
                        info!("removed {} outdated {} documents", count, kind);
                    }
                    swept += count;
                }
                Err(err) => warn!("failed to sweep expired {} documents: {}", kind, err),
            }
        }
        Ok(swept)
    }

    /// Sweep forever on `expiration_check_interval`, until `token` fires.
    pub async fn run(&self, token: CancellationToken) {
        loop {
            match self.run_once(&token).await {
                Ok(_) => {}
                Err(StorageError::Cancelled) => break,
                Err(err) => error!("expiration sweep failed: {}", err),
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.options.expiration_check_interval) => {}
            }
        }
        info!("expiration sweeper stopping");
    }
}
