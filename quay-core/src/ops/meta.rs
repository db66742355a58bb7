use crate::error::StorageError;
use crate::store::DocumentStore;
use crate::types::Document;

/// Read-mutate-replace under the store's version token, retrying until the
/// write lands or the document disappears. Returns `false` if the document
/// was not found.
///
/// This is the engine's answer to the eventually-consistent index: decisions
/// made from a query are re-applied against a strongly-consistent point read,
/// and a lost race just means re-reading and trying again.
pub(crate) async fn update_with_cas<F>(
    store: &dyn DocumentStore,
    id: &str,
    mut mutate: F,
) -> Result<bool, StorageError>
where
    F: FnMut(&mut Document) + Send,
{
    loop {
        let Some(versioned) = store.get(id).await? else {
            return Ok(false);
        };
        let mut document = versioned.document;
        mutate(&mut document);
        if store.replace(document, versioned.cas).await? {
            return Ok(true);
        }
    }
}
