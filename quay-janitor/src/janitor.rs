use std::sync::Arc;

use quay_core::{DocumentStore, Storage, StorageError, StorageOptions};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::JanitorSettings;
use crate::metrics_constants::*;

// The janitor reports its own metrics; this is mostly for testing purposes
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CleanupResult {
    pub expired: u64,
    pub aggregated: u64,
    pub reaped_servers: u64,
}

/// Runs the engine's maintenance passes on a timer: expiration sweep,
/// counter aggregation, and dead-server reaping.
pub struct Janitor {
    pub storage: Storage,
    pub settings: JanitorSettings,
}

impl Janitor {
    pub async fn new(
        store: Arc<dyn DocumentStore>,
        options: StorageOptions,
        settings: JanitorSettings,
    ) -> Result<Self, StorageError> {
        let storage = Storage::new(store, options).await?;
        Ok(Self { storage, settings })
    }

    pub async fn run_once(&self, token: &CancellationToken) -> Result<CleanupResult, StorageError> {
        info!("Running janitor loop");
        metrics::counter!(RUN_STARTS, "janitor_id" => self.settings.id.clone()).increment(1);

        let expired = self.storage.expiration_sweeper().run_once(token).await?;
        metrics::counter!(EXPIRED_COUNT, "janitor_id" => self.settings.id.clone())
            .increment(expired);

        let aggregated = self.storage.counter_aggregator().run_once(token).await?;
        metrics::counter!(AGGREGATED_COUNT, "janitor_id" => self.settings.id.clone())
            .increment(aggregated);

        let reaped_servers = self
            .storage
            .connection()
            .remove_timed_out_servers(self.settings.server_timeout)
            .await?;
        metrics::counter!(REAPED_SERVERS_COUNT, "janitor_id" => self.settings.id.clone())
            .increment(reaped_servers);

        let summaries = self.storage.monitoring().queues().await?;
        let (enqueued, fetched) = summaries
            .iter()
            .fold((0, 0), |(e, f), q| (e + q.enqueued, f + q.fetched));
        metrics::gauge!(ENQUEUED_DEPTH, "janitor_id" => self.settings.id.clone())
            .set(enqueued as f64);
        metrics::gauge!(FETCHED_DEPTH, "janitor_id" => self.settings.id.clone())
            .set(fetched as f64);

        metrics::counter!(RUN_ENDS, "janitor_id" => self.settings.id.clone()).increment(1);
        info!("Janitor loop complete");
        Ok(CleanupResult {
            expired,
            aggregated,
            reaped_servers,
        })
    }
}
