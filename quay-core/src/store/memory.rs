use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::store::{DocumentQuery, DocumentStore, QueryOrder, VersionedDocument};
use crate::types::Document;

/// In-memory bucket, used by the test suites and for local development.
///
/// Point operations and queries are all immediately consistent here, which is
/// stricter than a real backend guarantees - the engine must not depend on
/// that, so correctness-critical paths still re-validate with `get` + CAS.
#[derive(Default)]
pub struct MemoryBucket {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    documents: HashMap<String, (u64, Document)>,
    next_cas: u64,
}

impl MemoryBucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently stored, across all kinds.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn created_on(document: &Document) -> Option<DateTime<Utc>> {
    match document {
        Document::Job(d) => Some(d.created_on),
        Document::State(d) => Some(d.created_on),
        Document::Queue(d) => Some(d.created_on),
        Document::Set(d) => Some(d.created_on),
        Document::List(d) => Some(d.created_on),
        Document::Server(d) => Some(d.created_on),
        Document::Counter(_) | Document::Hash(_) | Document::Lock(_) => None,
    }
}

fn matches(document: &Document, query: &DocumentQuery) -> bool {
    if let Some(kind) = query.kind {
        if document.kind() != kind {
            return false;
        }
    }
    if let Some(key) = &query.key {
        let doc_key = match document {
            Document::Counter(d) => Some(&d.key),
            Document::Set(d) => Some(&d.key),
            Document::Hash(d) => Some(&d.key),
            Document::List(d) => Some(&d.key),
            _ => None,
        };
        if doc_key != Some(key) {
            return false;
        }
    }
    if let Some(field) = &query.field {
        match document {
            Document::Hash(d) if &d.field == field => {}
            _ => return false,
        }
    }
    if let Some(name) = &query.name {
        let doc_name = match document {
            Document::Queue(d) => Some(&d.name),
            Document::Lock(d) => Some(&d.name),
            Document::State(d) => Some(&d.name),
            _ => None,
        };
        if doc_name != Some(name) {
            return false;
        }
    }
    if let Some(value) = &query.value {
        let doc_value = match document {
            Document::Set(d) => Some(&d.value),
            Document::Hash(d) => Some(&d.value),
            Document::List(d) => Some(&d.value),
            _ => None,
        };
        if doc_value != Some(value) {
            return false;
        }
    }
    if let Some(job_id) = &query.job_id {
        let doc_job_id = match document {
            Document::Queue(d) => Some(&d.job_id),
            Document::State(d) => Some(&d.job_id),
            _ => None,
        };
        if doc_job_id != Some(job_id) {
            return false;
        }
    }
    if let Some(counter_kind) = query.counter_kind {
        match document {
            Document::Counter(d) if d.counter_kind == counter_kind => {}
            _ => return false,
        }
    }
    if let Some((from, to)) = query.score_range {
        match document {
            Document::Set(d) if d.score >= from && d.score <= to => {}
            _ => return false,
        }
    }
    if let Some(cutoff) = query.expires_before {
        if !document.expire_on().is_some_and(|e| e < cutoff) {
            return false;
        }
    }
    if let Some(cutoff) = query.heartbeat_before {
        match document {
            Document::Server(d) if d.last_heartbeat < cutoff => {}
            _ => return false,
        }
    }
    true
}

#[async_trait]
impl DocumentStore for MemoryBucket {
    async fn get(&self, id: &str) -> Result<Option<VersionedDocument>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.documents.get(id).map(|(cas, document)| VersionedDocument {
            cas: *cas,
            document: document.clone(),
        }))
    }

    async fn insert(&self, document: Document) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let id = document.id().to_string();
        if inner.documents.contains_key(&id) {
            return Err(StoreError::KeyExists(id));
        }
        inner.next_cas += 1;
        let cas = inner.next_cas;
        inner.documents.insert(id, (cas, document));
        Ok(())
    }

    async fn upsert(&self, document: Document) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_cas += 1;
        let cas = inner.next_cas;
        inner.documents.insert(document.id().to_string(), (cas, document));
        Ok(())
    }

    async fn replace(&self, document: Document, cas: u64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let id = document.id().to_string();
        match inner.documents.get(&id) {
            Some((current, _)) if *current == cas => {}
            _ => return Ok(false),
        }
        inner.next_cas += 1;
        let next = inner.next_cas;
        inner.documents.insert(id, (next, document));
        Ok(true)
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.documents.remove(id).is_some())
    }

    async fn query(&self, query: &DocumentQuery) -> Result<Vec<Document>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut results: Vec<Document> = inner
            .documents
            .values()
            .map(|(_, document)| document)
            .filter(|document| matches(document, query))
            .cloned()
            .collect();
        drop(inner);

        match query.order {
            Some(QueryOrder::CreatedAsc) => results.sort_by_key(created_on),
            Some(QueryOrder::CreatedDesc) => {
                results.sort_by_key(created_on);
                results.reverse();
            }
            Some(QueryOrder::ScoreAsc) => results.sort_by(|a, b| {
                let score = |d: &Document| match d {
                    Document::Set(s) => s.score,
                    _ => 0.0,
                };
                score(a).total_cmp(&score(b))
            }),
            None => {}
        }

        let skip = query.skip.unwrap_or(0);
        let take = query.take.unwrap_or(usize::MAX);
        Ok(results.into_iter().skip(skip).take(take).collect())
    }

    async fn ensure_indexes(&self, _create_if_missing: bool) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{epoch_now, CounterDocument, CounterKind, DocumentKind, SetDocument};
    use crate::DocumentQuery;

    #[tokio::test]
    async fn insert_rejects_duplicate_keys() {
        let bucket = MemoryBucket::new();
        let doc = Document::Set(SetDocument::new("k", "v", 0.0));
        bucket.insert(doc.clone()).await.unwrap();
        assert!(matches!(
            bucket.insert(doc).await,
            Err(StoreError::KeyExists(_))
        ));
    }

    #[tokio::test]
    async fn replace_requires_matching_cas() {
        let bucket = MemoryBucket::new();
        bucket
            .insert(Document::Set(SetDocument::new("k", "v", 0.0)))
            .await
            .unwrap();
        let versioned = bucket
            .query(&DocumentQuery::kind(DocumentKind::Set))
            .await
            .unwrap()
            .pop()
            .map(|d| d.id().to_string())
            .unwrap();
        let versioned = bucket.get(&versioned).await.unwrap().unwrap();

        let mut updated = versioned.document.clone();
        updated.set_expire_on(Some(epoch_now()));
        assert!(bucket.replace(updated.clone(), versioned.cas).await.unwrap());
        // second write with the stale token loses
        assert!(!bucket.replace(updated, versioned.cas).await.unwrap());
    }

    #[tokio::test]
    async fn query_filters_by_counter_kind() {
        let bucket = MemoryBucket::new();
        bucket
            .insert(Document::Counter(CounterDocument::raw("k", 1, None)))
            .await
            .unwrap();
        bucket
            .insert(Document::Counter(CounterDocument::aggregate("k", 5, None)))
            .await
            .unwrap();

        let raw = bucket
            .query(&DocumentQuery::kind(DocumentKind::Counter).counter_kind(CounterKind::Raw))
            .await
            .unwrap();
        assert_eq!(raw.len(), 1);
    }
}
