use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{CounterKind, Document, DocumentKind, Epoch};

mod memory;
pub use memory::MemoryBucket;

/// A document plus the version token it was read at, for conditional writes.
#[derive(Debug, Clone)]
pub struct VersionedDocument {
    pub cas: u64,
    pub document: Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOrder {
    CreatedAsc,
    CreatedDesc,
    ScoreAsc,
}

/// An equality/range filter over the bucket's secondary index.
///
/// Query results may lag recent writes by the store's indexing delay, so any
/// read-then-write decision based on them has to be re-validated with a point
/// `get` plus a conditional write.
#[derive(Debug, Clone, Default)]
pub struct DocumentQuery {
    pub kind: Option<DocumentKind>,
    pub key: Option<String>,
    pub field: Option<String>,
    pub name: Option<String>,
    pub value: Option<String>,
    pub job_id: Option<String>,
    pub counter_kind: Option<CounterKind>,
    pub score_range: Option<(f64, f64)>,
    pub expires_before: Option<Epoch>,
    pub heartbeat_before: Option<Epoch>,
    pub order: Option<QueryOrder>,
    pub skip: Option<usize>,
    pub take: Option<usize>,
}

impl DocumentQuery {
    pub fn kind(kind: DocumentKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn key(mut self, key: &str) -> Self {
        self.key = Some(key.to_string());
        self
    }

    pub fn field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn job_id(mut self, job_id: &str) -> Self {
        self.job_id = Some(job_id.to_string());
        self
    }

    pub fn counter_kind(mut self, counter_kind: CounterKind) -> Self {
        self.counter_kind = Some(counter_kind);
        self
    }

    pub fn score_between(mut self, from: f64, to: f64) -> Self {
        self.score_range = Some((from, to));
        self
    }

    pub fn expires_before(mut self, cutoff: Epoch) -> Self {
        self.expires_before = Some(cutoff);
        self
    }

    pub fn heartbeat_before(mut self, cutoff: Epoch) -> Self {
        self.heartbeat_before = Some(cutoff);
        self
    }

    pub fn order(mut self, order: QueryOrder) -> Self {
        self.order = Some(order);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn take(mut self, take: usize) -> Self {
        self.take = Some(take);
        self
    }
}

/// The boundary to the backing document database: a key-value bucket with
/// strongly consistent point operations and an eventually consistent
/// secondary-index query path.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Strongly consistent point read.
    async fn get(&self, id: &str) -> Result<Option<VersionedDocument>, StoreError>;

    /// Fails with [`StoreError::KeyExists`] if the key is already present.
    async fn insert(&self, document: Document) -> Result<(), StoreError>;

    /// Create-or-replace.
    async fn upsert(&self, document: Document) -> Result<(), StoreError>;

    /// Compare-and-swap on the version token returned by [`get`](Self::get).
    /// Returns `false` when the token no longer matches or the key is gone.
    async fn replace(&self, document: Document, cas: u64) -> Result<bool, StoreError>;

    /// Idempotent delete; `false` when the key was already absent.
    async fn remove(&self, id: &str) -> Result<bool, StoreError>;

    /// Secondary-index query. Eventually consistent.
    async fn query(&self, query: &DocumentQuery) -> Result<Vec<Document>, StoreError>;

    /// Verify (and optionally create) the secondary indexes the query path
    /// needs. Called once at startup; a missing index is fatal there.
    async fn ensure_indexes(&self, create_if_missing: bool) -> Result<(), StoreError>;
}
