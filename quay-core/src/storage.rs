use std::sync::Arc;
use std::time::Duration;

use crate::aggregator::CounterAggregator;
use crate::config::StorageOptions;
use crate::connection::StorageConnection;
use crate::error::{StorageError, StoreError};
use crate::monitor::MonitoringApi;
use crate::queue::JobQueue;
use crate::store::DocumentStore;
use crate::sweeper::ExpirationSweeper;

const STATISTICS_CACHE_TTL: Duration = Duration::from_secs(1);

/// The storage root: owns the store handle and options, verifies the bucket
/// is queryable at startup, and hands out the engine's components.
pub struct Storage {
    store: Arc<dyn DocumentStore>,
    options: Arc<StorageOptions>,
}

impl Storage {
    /// Verify (or create, per `options.create_indexes`) the secondary
    /// indexes and return the root. A missing index is fatal here rather
    /// than a latent failure on the first query.
    pub async fn new(
        store: Arc<dyn DocumentStore>,
        options: StorageOptions,
    ) -> Result<Self, StorageError> {
        let create = options.create_indexes;
        match store.ensure_indexes(create).await {
            Ok(()) => {}
            Err(StoreError::MissingIndexes(detail)) => {
                return Err(StorageError::MissingIndexes(detail));
            }
            Err(err) => return Err(err.into()),
        }
        Ok(Self {
            store,
            options: Arc::new(options),
        })
    }

    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    pub fn connection(&self) -> StorageConnection {
        StorageConnection::new(self.store.clone(), self.options.clone())
    }

    pub fn queue(&self) -> JobQueue {
        JobQueue::new(self.store.clone(), self.options.clone())
    }

    pub fn expiration_sweeper(&self) -> ExpirationSweeper {
        ExpirationSweeper::new(self.store.clone(), self.options.clone())
    }

    pub fn counter_aggregator(&self) -> CounterAggregator {
        CounterAggregator::new(self.store.clone(), self.options.clone())
    }

    pub fn monitoring(&self) -> MonitoringApi {
        MonitoringApi::new(self.store.clone(), STATISTICS_CACHE_TTL)
    }
}
