use std::cmp;
use std::collections::HashMap;

use tracing::warn;

use crate::error::{StorageError, StoreError};
use crate::ops::meta::update_with_cas;
use crate::store::{DocumentQuery, DocumentStore};
use crate::types::{
    epoch_now, CounterDocument, CounterKind, Document, DocumentKind, Epoch,
};

/// The kinds the sweeper visits, in order. Raw counters are excluded: only
/// the aggregator may delete those, after folding them in.
pub(crate) const EXPIRABLE_KINDS: [DocumentKind; 6] = [
    DocumentKind::Lock,
    DocumentKind::Job,
    DocumentKind::List,
    DocumentKind::Set,
    DocumentKind::Hash,
    DocumentKind::Counter,
];

/// Delete every document of `kind` whose expiry has passed. For counters
/// the filter narrows to aggregates; raw rows always survive the sweep.
pub(crate) async fn sweep_expired(
    store: &dyn DocumentStore,
    kind: DocumentKind,
    now: Epoch,
) -> Result<u64, StorageError> {
    let mut query = DocumentQuery::kind(kind).expires_before(now);
    if kind == DocumentKind::Counter {
        query = query.counter_kind(CounterKind::Aggregate);
    }
    let expired = store.query(&query).await?;

    let removals = expired
        .iter()
        .map(|document| store.remove(document.id()));
    let mut swept = 0;
    for result in futures::future::join_all(removals).await {
        match result {
            Ok(true) => swept += 1,
            Ok(false) => {}
            Err(err) => warn!("failed to remove expired {} document: {}", kind, err),
        }
    }
    Ok(swept)
}

struct PendingAggregate {
    sum: i64,
    expire_on: Option<Epoch>,
    raw_ids: Vec<String>,
}

/// Fold raw counter deltas into their per-key aggregate documents. Raw rows
/// are only deleted after their sum has durably landed in the aggregate, so
/// a crash mid-pass can double-visit but never lose a delta... as long as
/// the pass runs under the aggregation lock, which the caller holds.
pub(crate) async fn aggregate_counters(
    store: &dyn DocumentStore,
) -> Result<u64, StorageError> {
    let raws = store
        .query(&DocumentQuery::kind(DocumentKind::Counter).counter_kind(CounterKind::Raw))
        .await?;

    let mut pending: HashMap<String, PendingAggregate> = HashMap::new();
    for document in raws {
        let Document::Counter(counter) = document else {
            continue;
        };
        let entry = pending
            .entry(counter.key.clone())
            .or_insert_with(|| PendingAggregate {
                sum: 0,
                expire_on: None,
                raw_ids: Vec::new(),
            });
        entry.sum += counter.value;
        // None orders below Some, so an unexpiring row never shortens the
        // aggregate's lifetime and the latest deadline wins.
        entry.expire_on = cmp::max(entry.expire_on, counter.expire_on);
        entry.raw_ids.push(counter.id);
    }

    let mut consumed = 0;
    for (key, group) in pending {
        if !merge_aggregate(store, &key, group.sum, group.expire_on).await? {
            continue;
        }
        for raw_id in &group.raw_ids {
            store.remove(raw_id).await?;
        }
        consumed += group.raw_ids.len() as u64;
    }
    Ok(consumed)
}

/// Add `delta` into the aggregate document for `key`, creating it if absent.
/// Contended inserts and CAS losses retry until the write lands.
async fn merge_aggregate(
    store: &dyn DocumentStore,
    key: &str,
    delta: i64,
    expire_on: Option<Epoch>,
) -> Result<bool, StorageError> {
    loop {
        let updated = update_with_cas(store, &CounterDocument::aggregate_id(key), |document| {
            if let Document::Counter(aggregate) = document {
                aggregate.value += delta;
                aggregate.expire_on = cmp::max(aggregate.expire_on, expire_on);
            }
        })
        .await?;
        if updated {
            return Ok(true);
        }

        match store
            .insert(Document::Counter(CounterDocument::aggregate(
                key, delta, expire_on,
            )))
            .await
        {
            Ok(()) => return Ok(true),
            Err(StoreError::KeyExists(_)) => continue, // lost the create race
            Err(err) => return Err(err.into()),
        }
    }
}
