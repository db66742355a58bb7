use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::StorageError;
use crate::ops;
use crate::store::{DocumentQuery, DocumentStore, QueryOrder};
use crate::types::{Document, DocumentKind};

/// Name and depth of one queue, split by visibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSummary {
    pub name: String,
    pub enqueued: u64,
    pub fetched: u64,
}

/// The headline numbers a dashboard renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statistics {
    pub servers: u64,
    pub queues: u64,
    pub enqueued: u64,
    pub fetched: u64,
    pub succeeded: i64,
    pub deleted: i64,
}

/// Read-only projections over the engine's documents.
///
/// `statistics()` runs several queries, so results are cached for `cache_ttl`
/// with a single-writer refresh under the cache lock; everything else reads
/// the index directly.
pub struct MonitoringApi {
    store: Arc<dyn DocumentStore>,
    cache_ttl: Duration,
    statistics_cache: tokio::sync::Mutex<Option<(Statistics, Instant)>>,
}

impl MonitoringApi {
    pub(crate) fn new(store: Arc<dyn DocumentStore>, cache_ttl: Duration) -> Self {
        Self {
            store,
            cache_ttl,
            statistics_cache: tokio::sync::Mutex::new(None),
        }
    }

    /// All queue names with outstanding entries, with their depths.
    pub async fn queues(&self) -> Result<Vec<QueueSummary>, StorageError> {
        let entries = self
            .store
            .query(&DocumentQuery::kind(DocumentKind::Queue))
            .await?;

        let mut depths: std::collections::BTreeMap<String, (u64, u64)> =
            std::collections::BTreeMap::new();
        for document in entries {
            let Document::Queue(entry) = document else {
                continue;
            };
            let (enqueued, fetched) = depths.entry(entry.name).or_insert((0, 0));
            if entry.fetched_at.is_some() {
                *fetched += 1;
            } else {
                *enqueued += 1;
            }
        }
        Ok(depths
            .into_iter()
            .map(|(name, (enqueued, fetched))| QueueSummary {
                name,
                enqueued,
                fetched,
            })
            .collect())
    }

    pub async fn enqueued_count(&self, queue: &str) -> Result<u64, StorageError> {
        self.count_entries(queue, false).await
    }

    pub async fn fetched_count(&self, queue: &str) -> Result<u64, StorageError> {
        self.count_entries(queue, true).await
    }

    /// Job ids currently visible on `queue`, oldest first.
    pub async fn enqueued_job_ids(
        &self,
        queue: &str,
        skip: usize,
        take: usize,
    ) -> Result<Vec<String>, StorageError> {
        let entries = self
            .store
            .query(
                &DocumentQuery::kind(DocumentKind::Queue)
                    .name(queue)
                    .order(QueryOrder::CreatedAsc),
            )
            .await?;
        Ok(entries
            .into_iter()
            .filter_map(|document| match document {
                Document::Queue(entry) if entry.fetched_at.is_none() => Some(entry.job_id),
                _ => None,
            })
            .skip(skip)
            .take(take)
            .collect())
    }

    /// Registered server ids.
    pub async fn servers(&self) -> Result<Vec<String>, StorageError> {
        let servers = self
            .store
            .query(&DocumentQuery::kind(DocumentKind::Server))
            .await?;
        let mut ids: Vec<String> = servers
            .into_iter()
            .filter_map(|document| match document {
                Document::Server(server) => Some(server.server_id),
                _ => None,
            })
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub async fn statistics(&self) -> Result<Statistics, StorageError> {
        let mut cache = self.statistics_cache.lock().await;
        if let Some((cached, refreshed_at)) = cache.as_ref() {
            if refreshed_at.elapsed() < self.cache_ttl {
                return Ok(cached.clone());
            }
        }

        let fresh = self.compute_statistics().await?;
        *cache = Some((fresh.clone(), Instant::now()));
        Ok(fresh)
    }

    async fn compute_statistics(&self) -> Result<Statistics, StorageError> {
        let servers = self
            .store
            .query(&DocumentQuery::kind(DocumentKind::Server))
            .await?
            .len() as u64;

        let queues = self.queues().await?;
        let (enqueued, fetched) = queues
            .iter()
            .fold((0, 0), |(e, f), q| (e + q.enqueued, f + q.fetched));

        let succeeded = ops::kv::counter_sum(self.store.as_ref(), "stats:succeeded").await?;
        let deleted = ops::kv::counter_sum(self.store.as_ref(), "stats:deleted").await?;

        Ok(Statistics {
            servers,
            queues: queues.len() as u64,
            enqueued,
            fetched,
            succeeded,
            deleted,
        })
    }

    async fn count_entries(&self, queue: &str, fetched: bool) -> Result<u64, StorageError> {
        let entries = self
            .store
            .query(&DocumentQuery::kind(DocumentKind::Queue).name(queue))
            .await?;
        Ok(entries
            .iter()
            .filter(|document| match document {
                Document::Queue(entry) => entry.fetched_at.is_some() == fetched,
                _ => false,
            })
            .count() as u64)
    }
}
