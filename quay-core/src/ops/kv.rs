use crate::error::StorageError;
use crate::ops::meta::update_with_cas;
use crate::store::{DocumentQuery, DocumentStore, QueryOrder};
use crate::types::{
    Document, DocumentKind, Epoch, HashDocument, ListDocument, SetDocument,
};

// Counters ------------------------------------------------------------------

/// Record a raw counter delta. Raw documents pile up until the aggregator
/// folds them into the per-key aggregate.
pub(crate) async fn append_counter(
    store: &dyn DocumentStore,
    key: &str,
    value: i64,
    expire_on: Option<Epoch>,
) -> Result<(), StorageError> {
    store
        .insert(Document::Counter(crate::types::CounterDocument::raw(
            key, value, expire_on,
        )))
        .await?;
    Ok(())
}

/// Current value of a counter: the aggregate (if any) plus all raw deltas
/// that have not been folded in yet.
pub(crate) async fn counter_sum(
    store: &dyn DocumentStore,
    key: &str,
) -> Result<i64, StorageError> {
    let documents = store
        .query(&DocumentQuery::kind(DocumentKind::Counter).key(key))
        .await?;
    let mut sum = 0;
    for document in documents {
        if let Document::Counter(counter) = document {
            sum += counter.value;
        }
    }
    Ok(sum)
}

// Sets ----------------------------------------------------------------------

/// Insert `value` into the set at `key`, or update its score if it is already
/// a member. Uniqueness is per (key, value).
pub(crate) async fn add_to_set(
    store: &dyn DocumentStore,
    key: &str,
    value: &str,
    score: f64,
) -> Result<(), StorageError> {
    let existing = store
        .query(&DocumentQuery::kind(DocumentKind::Set).key(key).value(value))
        .await?;

    match existing.into_iter().next() {
        Some(Document::Set(mut member)) => {
            member.score = score;
            store.upsert(Document::Set(member)).await?;
        }
        _ => {
            store
                .upsert(Document::Set(SetDocument::new(key, value, score)))
                .await?;
        }
    }
    Ok(())
}

pub(crate) async fn remove_from_set(
    store: &dyn DocumentStore,
    key: &str,
    value: &str,
) -> Result<(), StorageError> {
    let existing = store
        .query(&DocumentQuery::kind(DocumentKind::Set).key(key).value(value))
        .await?;
    for document in existing {
        store.remove(document.id()).await?;
    }
    Ok(())
}

pub(crate) async fn set_members(
    store: &dyn DocumentStore,
    key: &str,
) -> Result<Vec<String>, StorageError> {
    let documents = store
        .query(
            &DocumentQuery::kind(DocumentKind::Set)
                .key(key)
                .order(QueryOrder::CreatedAsc),
        )
        .await?;
    Ok(documents
        .into_iter()
        .filter_map(|document| match document {
            Document::Set(member) => Some(member.value),
            _ => None,
        })
        .collect())
}

pub(crate) async fn set_range(
    store: &dyn DocumentStore,
    key: &str,
    start: usize,
    end: usize,
) -> Result<Vec<String>, StorageError> {
    if end < start {
        return Ok(Vec::new());
    }
    let documents = store
        .query(
            &DocumentQuery::kind(DocumentKind::Set)
                .key(key)
                .order(QueryOrder::CreatedAsc)
                .skip(start)
                .take(end - start + 1),
        )
        .await?;
    Ok(documents
        .into_iter()
        .filter_map(|document| match document {
            Document::Set(member) => Some(member.value),
            _ => None,
        })
        .collect())
}

pub(crate) async fn set_count(
    store: &dyn DocumentStore,
    key: &str,
) -> Result<u64, StorageError> {
    let documents = store
        .query(&DocumentQuery::kind(DocumentKind::Set).key(key))
        .await?;
    Ok(documents.len() as u64)
}

/// Lowest-scored member of `key` whose score falls in `[from, to]`. This is
/// what the recurring-job scheduler polls for.
pub(crate) async fn first_by_lowest_score(
    store: &dyn DocumentStore,
    key: &str,
    from: f64,
    to: f64,
) -> Result<Option<String>, StorageError> {
    let documents = store
        .query(
            &DocumentQuery::kind(DocumentKind::Set)
                .key(key)
                .score_between(from, to)
                .order(QueryOrder::ScoreAsc)
                .take(1),
        )
        .await?;
    Ok(documents.into_iter().next().and_then(|document| match document {
        Document::Set(member) => Some(member.value),
        _ => None,
    }))
}

// Hashes --------------------------------------------------------------------

/// Upsert a batch of hash fields for `key`. Fields are unique per
/// (key, field); existing documents are updated in place.
pub(crate) async fn set_hash_fields(
    store: &dyn DocumentStore,
    key: &str,
    fields: Vec<(String, String)>,
) -> Result<(), StorageError> {
    let existing = store
        .query(&DocumentQuery::kind(DocumentKind::Hash).key(key))
        .await?;
    let mut by_field: std::collections::HashMap<String, HashDocument> = existing
        .into_iter()
        .filter_map(|document| match document {
            Document::Hash(entry) => Some((entry.field.clone(), entry)),
            _ => None,
        })
        .collect();

    for (field, value) in fields {
        let document = match by_field.remove(&field) {
            Some(mut entry) => {
                entry.value = value;
                entry
            }
            None => HashDocument::new(key, &field, &value),
        };
        store.upsert(Document::Hash(document)).await?;
    }
    Ok(())
}

pub(crate) async fn hash_entries(
    store: &dyn DocumentStore,
    key: &str,
) -> Result<Vec<(String, String)>, StorageError> {
    let documents = store
        .query(&DocumentQuery::kind(DocumentKind::Hash).key(key))
        .await?;
    Ok(documents
        .into_iter()
        .filter_map(|document| match document {
            Document::Hash(entry) => Some((entry.field, entry.value)),
            _ => None,
        })
        .collect())
}

pub(crate) async fn hash_value(
    store: &dyn DocumentStore,
    key: &str,
    field: &str,
) -> Result<Option<String>, StorageError> {
    let documents = store
        .query(&DocumentQuery::kind(DocumentKind::Hash).key(key).field(field))
        .await?;
    Ok(documents.into_iter().next().and_then(|document| match document {
        Document::Hash(entry) => Some(entry.value),
        _ => None,
    }))
}

pub(crate) async fn hash_count(
    store: &dyn DocumentStore,
    key: &str,
) -> Result<u64, StorageError> {
    let documents = store
        .query(&DocumentQuery::kind(DocumentKind::Hash).key(key))
        .await?;
    Ok(documents.len() as u64)
}

pub(crate) async fn remove_hash(
    store: &dyn DocumentStore,
    key: &str,
) -> Result<(), StorageError> {
    let documents = store
        .query(&DocumentQuery::kind(DocumentKind::Hash).key(key))
        .await?;
    for document in documents {
        store.remove(document.id()).await?;
    }
    Ok(())
}

// Lists ---------------------------------------------------------------------

pub(crate) async fn insert_to_list(
    store: &dyn DocumentStore,
    key: &str,
    value: &str,
) -> Result<(), StorageError> {
    store
        .insert(Document::List(ListDocument::new(key, value)))
        .await?;
    Ok(())
}

/// Remove one occurrence of `value` from the list; duplicates keep their
/// remaining entries.
pub(crate) async fn remove_from_list(
    store: &dyn DocumentStore,
    key: &str,
    value: &str,
) -> Result<(), StorageError> {
    let documents = store
        .query(
            &DocumentQuery::kind(DocumentKind::List)
                .key(key)
                .value(value)
                .order(QueryOrder::CreatedAsc)
                .take(1),
        )
        .await?;
    if let Some(document) = documents.into_iter().next() {
        store.remove(document.id()).await?;
    }
    Ok(())
}

/// Keep only the entries whose newest-first index falls in
/// `[keep_start, keep_end]`; everything else is deleted.
pub(crate) async fn trim_list(
    store: &dyn DocumentStore,
    key: &str,
    keep_start: usize,
    keep_end: usize,
) -> Result<(), StorageError> {
    let documents = store
        .query(
            &DocumentQuery::kind(DocumentKind::List)
                .key(key)
                .order(QueryOrder::CreatedDesc),
        )
        .await?;
    for (index, document) in documents.into_iter().enumerate() {
        if index < keep_start || index > keep_end {
            store.remove(document.id()).await?;
        }
    }
    Ok(())
}

/// Full list contents, newest first.
pub(crate) async fn list_items(
    store: &dyn DocumentStore,
    key: &str,
) -> Result<Vec<String>, StorageError> {
    let documents = store
        .query(
            &DocumentQuery::kind(DocumentKind::List)
                .key(key)
                .order(QueryOrder::CreatedDesc),
        )
        .await?;
    Ok(documents
        .into_iter()
        .filter_map(|document| match document {
            Document::List(entry) => Some(entry.value),
            _ => None,
        })
        .collect())
}

pub(crate) async fn list_range(
    store: &dyn DocumentStore,
    key: &str,
    start: usize,
    end: usize,
) -> Result<Vec<String>, StorageError> {
    if end < start {
        return Ok(Vec::new());
    }
    let documents = store
        .query(
            &DocumentQuery::kind(DocumentKind::List)
                .key(key)
                .order(QueryOrder::CreatedDesc)
                .skip(start)
                .take(end - start + 1),
        )
        .await?;
    Ok(documents
        .into_iter()
        .filter_map(|document| match document {
            Document::List(entry) => Some(entry.value),
            _ => None,
        })
        .collect())
}

pub(crate) async fn list_count(
    store: &dyn DocumentStore,
    key: &str,
) -> Result<u64, StorageError> {
    let documents = store
        .query(&DocumentQuery::kind(DocumentKind::List).key(key))
        .await?;
    Ok(documents.len() as u64)
}

// Expiry --------------------------------------------------------------------

/// Smallest `expire_on` across the rows of a keyed collection, i.e. when the
/// first piece of it goes away.
pub(crate) async fn key_ttl(
    store: &dyn DocumentStore,
    kind: DocumentKind,
    key: &str,
) -> Result<Option<Epoch>, StorageError> {
    let documents = store
        .query(&DocumentQuery::kind(kind).key(key))
        .await?;
    Ok(documents
        .into_iter()
        .filter_map(|document| document.expire_on())
        .min())
}

/// Stamp (or clear, with `None`) the expiry on every row of a keyed
/// collection. Each row goes through its own CAS loop so a concurrent writer
/// never has its update clobbered.
pub(crate) async fn stamp_expiry(
    store: &dyn DocumentStore,
    kind: DocumentKind,
    key: &str,
    expire_on: Option<Epoch>,
) -> Result<(), StorageError> {
    let documents = store
        .query(&DocumentQuery::kind(kind).key(key))
        .await?;
    for document in documents {
        update_with_cas(store, document.id(), |doc| {
            doc.set_expire_on(expire_on);
        })
        .await?;
    }
    Ok(())
}
