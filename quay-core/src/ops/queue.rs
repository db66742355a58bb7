use std::time::Duration;

use crate::error::StorageError;
use crate::ops::meta::update_with_cas;
use crate::store::{DocumentQuery, DocumentStore, QueryOrder};
use crate::types::{epoch_now, Document, DocumentKind, QueueDocument};

pub(crate) async fn enqueue(
    store: &dyn DocumentStore,
    queue: &str,
    job_id: &str,
) -> Result<(), StorageError> {
    // Duplicate enqueues are legal and just create independent entries.
    store
        .insert(Document::Queue(QueueDocument::new(queue, job_id)))
        .await?;
    Ok(())
}

/// Claim the oldest visible entry on `queue`, if any.
///
/// Entries are visible when they have never been fetched, or when their
/// `fetched_at` has aged past the invisibility timeout (the worker that
/// claimed them died without releasing or renewing). The candidate list comes
/// from the index and may be stale, so each candidate is re-validated against
/// a point read and stamped with a CAS write; losing that race moves on to
/// the next candidate.
pub(crate) async fn claim_next(
    store: &dyn DocumentStore,
    queue: &str,
    invisibility_timeout: Duration,
) -> Result<Option<QueueDocument>, StorageError> {
    let now = epoch_now();
    let cutoff = now - invisibility_timeout.as_secs() as i64;

    let candidates = store
        .query(
            &DocumentQuery::kind(DocumentKind::Queue)
                .name(queue)
                .order(QueryOrder::CreatedAsc),
        )
        .await?;

    for candidate in candidates {
        let Document::Queue(entry) = &candidate else {
            continue;
        };
        if entry.fetched_at.is_some_and(|fetched| fetched >= cutoff) {
            continue;
        }

        let Some(versioned) = store.get(candidate.id()).await? else {
            continue; // deleted since the index saw it
        };
        let Document::Queue(mut entry) = versioned.document else {
            continue;
        };
        if entry.fetched_at.is_some_and(|fetched| fetched >= cutoff) {
            continue; // someone claimed it between the query and the read
        }

        entry.fetched_at = Some(now);
        if store
            .replace(Document::Queue(entry.clone()), versioned.cas)
            .await?
        {
            return Ok(Some(entry));
        }
    }

    Ok(None)
}

/// Retire a claimed entry for good: processing finished.
pub(crate) async fn release(
    store: &dyn DocumentStore,
    entry_id: &str,
) -> Result<(), StorageError> {
    store.remove(entry_id).await?;
    Ok(())
}

/// Clear `fetched_at` so the entry becomes claimable again.
pub(crate) async fn requeue(
    store: &dyn DocumentStore,
    entry_id: &str,
) -> Result<(), StorageError> {
    update_with_cas(store, entry_id, |document| {
        if let Document::Queue(entry) = document {
            entry.fetched_at = None;
        }
    })
    .await?;
    Ok(())
}

/// Refresh a claim's `fetched_at` to now, keeping the entry invisible while
/// a long-running job is still being processed. Returns `false` if the entry
/// no longer exists.
pub(crate) async fn extend_claim(
    store: &dyn DocumentStore,
    entry_id: &str,
) -> Result<bool, StorageError> {
    let now = epoch_now();
    update_with_cas(store, entry_id, move |document| {
        if let Document::Queue(entry) = document {
            entry.fetched_at = Some(now);
        }
    })
    .await
}
