use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::StorageOptions;
use crate::error::StorageError;
use crate::lock::DistributedLock;
use crate::ops;
use crate::queue::{FetchedJob, JobQueue};
use crate::store::DocumentStore;
use crate::transaction::WriteTransaction;
use crate::types::{epoch_now, DocumentKind, Epoch, JobData, JobInit, StateData};

fn ttl_from(expire_on: Option<Epoch>) -> Option<Duration> {
    expire_on.map(|deadline| {
        let remaining = deadline - epoch_now();
        Duration::from_secs(remaining.max(0) as u64)
    })
}

/// The per-client surface of the storage engine: job CRUD, locks, write
/// batches, dequeueing, server registration, and the keyed-collection
/// getters the dashboard and job filters read from.
///
/// Connections are cheap to create and hold no bucket state of their own.
pub struct StorageConnection {
    store: Arc<dyn DocumentStore>,
    options: Arc<StorageOptions>,
}

impl StorageConnection {
    pub(crate) fn new(store: Arc<dyn DocumentStore>, options: Arc<StorageOptions>) -> Self {
        Self { store, options }
    }

    // Jobs -------------------------------------------------------------

    /// Persist a new job and return its id. The job is not yet on any
    /// queue; a follow-up transaction enqueues it.
    pub async fn create_job(&self, init: JobInit) -> Result<String, StorageError> {
        ops::job::create_job(self.store.as_ref(), init).await
    }

    pub async fn get_job_data(&self, job_id: &str) -> Result<Option<JobData>, StorageError> {
        ops::job::get_job_data(self.store.as_ref(), job_id).await
    }

    pub async fn get_state_data(&self, job_id: &str) -> Result<Option<StateData>, StorageError> {
        ops::job::get_state_data(self.store.as_ref(), job_id).await
    }

    pub async fn get_job_parameter(
        &self,
        job_id: &str,
        name: &str,
    ) -> Result<Option<String>, StorageError> {
        ops::job::get_job_parameter(self.store.as_ref(), job_id, name).await
    }

    /// Fails with [`StorageError::UnknownJob`] if the job does not exist.
    pub async fn set_job_parameter(
        &self,
        job_id: &str,
        name: &str,
        value: &str,
    ) -> Result<(), StorageError> {
        ops::job::set_job_parameter(self.store.as_ref(), job_id, name, value).await
    }

    // Locks and batches ------------------------------------------------

    pub async fn acquire_lock(
        &self,
        resource: &str,
        timeout: Duration,
    ) -> Result<DistributedLock, StorageError> {
        DistributedLock::acquire(
            self.store.clone(),
            resource,
            timeout,
            self.options.lock_retry_interval,
        )
        .await
    }

    pub fn write_transaction(&self) -> WriteTransaction {
        WriteTransaction::new(self.store.clone())
    }

    /// Block until a job is available on one of `queues`, or `token` fires.
    pub async fn fetch_next_job(
        &self,
        queues: &[String],
        token: &CancellationToken,
    ) -> Result<FetchedJob, StorageError> {
        JobQueue::new(self.store.clone(), self.options.clone())
            .dequeue(queues, token)
            .await
    }

    // Servers ----------------------------------------------------------

    pub async fn announce_server(
        &self,
        server_id: &str,
        worker_count: u32,
        queues: Vec<String>,
    ) -> Result<(), StorageError> {
        ops::server::announce(self.store.as_ref(), server_id, worker_count, queues).await
    }

    pub async fn heartbeat(&self, server_id: &str) -> Result<(), StorageError> {
        ops::server::heartbeat(self.store.as_ref(), server_id).await
    }

    pub async fn remove_server(&self, server_id: &str) -> Result<(), StorageError> {
        ops::server::remove(self.store.as_ref(), server_id).await
    }

    pub async fn remove_timed_out_servers(
        &self,
        timeout: Duration,
    ) -> Result<u64, StorageError> {
        ops::server::reap_servers(self.store.as_ref(), timeout).await
    }

    // Counters ---------------------------------------------------------

    pub async fn get_counter(&self, key: &str) -> Result<i64, StorageError> {
        ops::kv::counter_sum(self.store.as_ref(), key).await
    }

    // Sets -------------------------------------------------------------

    pub async fn get_all_items_from_set(
        &self,
        key: &str,
    ) -> Result<Vec<String>, StorageError> {
        ops::kv::set_members(self.store.as_ref(), key).await
    }

    pub async fn get_range_from_set(
        &self,
        key: &str,
        start: usize,
        end: usize,
    ) -> Result<Vec<String>, StorageError> {
        ops::kv::set_range(self.store.as_ref(), key, start, end).await
    }

    pub async fn get_set_count(&self, key: &str) -> Result<u64, StorageError> {
        ops::kv::set_count(self.store.as_ref(), key).await
    }

    /// Lowest-scored member of `key` within `[from, to]`.
    pub async fn get_first_by_lowest_score_from_set(
        &self,
        key: &str,
        from: f64,
        to: f64,
    ) -> Result<Option<String>, StorageError> {
        ops::kv::first_by_lowest_score(self.store.as_ref(), key, from, to).await
    }

    pub async fn get_set_ttl(&self, key: &str) -> Result<Option<Duration>, StorageError> {
        let expiry = ops::kv::key_ttl(self.store.as_ref(), DocumentKind::Set, key).await?;
        Ok(ttl_from(expiry))
    }

    // Hashes -----------------------------------------------------------

    pub async fn get_all_entries_from_hash(
        &self,
        key: &str,
    ) -> Result<Vec<(String, String)>, StorageError> {
        ops::kv::hash_entries(self.store.as_ref(), key).await
    }

    /// Upsert a batch of fields, preserving (key, field) uniqueness.
    pub async fn set_range_in_hash(
        &self,
        key: &str,
        fields: Vec<(String, String)>,
    ) -> Result<(), StorageError> {
        ops::kv::set_hash_fields(self.store.as_ref(), key, fields).await
    }

    pub async fn get_value_from_hash(
        &self,
        key: &str,
        field: &str,
    ) -> Result<Option<String>, StorageError> {
        ops::kv::hash_value(self.store.as_ref(), key, field).await
    }

    pub async fn get_hash_count(&self, key: &str) -> Result<u64, StorageError> {
        ops::kv::hash_count(self.store.as_ref(), key).await
    }

    pub async fn get_hash_ttl(&self, key: &str) -> Result<Option<Duration>, StorageError> {
        let expiry = ops::kv::key_ttl(self.store.as_ref(), DocumentKind::Hash, key).await?;
        Ok(ttl_from(expiry))
    }

    // Lists ------------------------------------------------------------

    /// Full list contents, newest first.
    pub async fn get_all_items_from_list(
        &self,
        key: &str,
    ) -> Result<Vec<String>, StorageError> {
        ops::kv::list_items(self.store.as_ref(), key).await
    }

    pub async fn get_range_from_list(
        &self,
        key: &str,
        start: usize,
        end: usize,
    ) -> Result<Vec<String>, StorageError> {
        ops::kv::list_range(self.store.as_ref(), key, start, end).await
    }

    pub async fn get_list_count(&self, key: &str) -> Result<u64, StorageError> {
        ops::kv::list_count(self.store.as_ref(), key).await
    }

    pub async fn get_list_ttl(&self, key: &str) -> Result<Option<Duration>, StorageError> {
        let expiry = ops::kv::key_ttl(self.store.as_ref(), DocumentKind::List, key).await?;
        Ok(ttl_from(expiry))
    }
}
