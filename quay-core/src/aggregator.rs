use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::StorageOptions;
use crate::error::StorageError;
use crate::lock::DistributedLock;
use crate::ops;
use crate::store::DocumentStore;

const AGGREGATION_LOCK: &str = "locks:countersaggregator";
const AGGREGATION_LOCK_BASE_TIMEOUT: Duration = Duration::from_secs(30);

/// Background compactor for counters: folds the append-only raw delta
/// documents into one aggregate per key, keeping storage growth bounded.
pub struct CounterAggregator {
    store: Arc<dyn DocumentStore>,
    options: Arc<StorageOptions>,
}

impl CounterAggregator {
    pub(crate) fn new(store: Arc<dyn DocumentStore>, options: Arc<StorageOptions>) -> Self {
        Self { store, options }
    }

    /// One aggregation pass under the aggregation lock. Returns the number
    /// of raw documents folded in and deleted.
    pub async fn run_once(&self, token: &CancellationToken) -> Result<u64, StorageError> {
        // The budget stretches with the poll interval so a slow pass on
        // another node is waited out rather than abandoned immediately.
        let lock_timeout = AGGREGATION_LOCK_BASE_TIMEOUT + self.options.queue_poll_interval;

        let mut lock = tokio::select! {
            _ = token.cancelled() => return Err(StorageError::Cancelled),
            lock = DistributedLock::acquire(
                self.store.clone(),
                AGGREGATION_LOCK,
                lock_timeout,
                self.options.lock_retry_interval,
            ) => lock?,
        };

        let result = ops::janitor::aggregate_counters(self.store.as_ref()).await;
        if let Err(err) = lock.release().await {
            warn!("failed to release aggregation lock: {}", err);
        }

        let consumed = result?;
        if consumed > 0 {
            info!("aggregated {} raw counter documents", consumed);
        }
        Ok(consumed)
    }

    /// Aggregate forever on `counters_aggregate_interval`, until `token`
    /// fires.
    pub async fn run(&self, token: CancellationToken) {
        loop {
            match self.run_once(&token).await {
                Ok(_) => {}
                Err(StorageError::Cancelled) => break,
                Err(err) => error!("counter aggregation failed: {}", err),
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.options.counters_aggregate_interval) => {}
            }
        }
        info!("counter aggregator stopping");
    }
}
