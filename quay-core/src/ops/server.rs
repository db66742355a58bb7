use std::time::Duration;

use tracing::info;

use crate::error::StorageError;
use crate::ops::meta::update_with_cas;
use crate::store::{DocumentQuery, DocumentStore};
use crate::types::{epoch_now, Document, DocumentKind, ServerDocument};

/// Register (or re-register) a processing server. Re-announcing replaces the
/// previous registration and refreshes the heartbeat.
pub(crate) async fn announce(
    store: &dyn DocumentStore,
    server_id: &str,
    worker_count: u32,
    queues: Vec<String>,
) -> Result<(), StorageError> {
    store
        .upsert(Document::Server(ServerDocument::new(
            server_id,
            worker_count,
            queues,
        )))
        .await?;
    Ok(())
}

pub(crate) async fn heartbeat(
    store: &dyn DocumentStore,
    server_id: &str,
) -> Result<(), StorageError> {
    let now = epoch_now();
    update_with_cas(store, &ServerDocument::id_for(server_id), move |document| {
        if let Document::Server(server) = document {
            server.last_heartbeat = now;
        }
    })
    .await?;
    Ok(())
}

pub(crate) async fn remove(
    store: &dyn DocumentStore,
    server_id: &str,
) -> Result<(), StorageError> {
    store.remove(&ServerDocument::id_for(server_id)).await?;
    Ok(())
}

/// Delete registrations whose heartbeat is older than `timeout`. Returns the
/// number of servers reaped.
pub(crate) async fn reap_servers(
    store: &dyn DocumentStore,
    timeout: Duration,
) -> Result<u64, StorageError> {
    let cutoff = epoch_now() - timeout.as_secs() as i64;
    let stale = store
        .query(&DocumentQuery::kind(DocumentKind::Server).heartbeat_before(cutoff))
        .await?;

    let mut reaped = 0;
    for document in stale {
        if store.remove(document.id()).await? {
            if let Document::Server(server) = &document {
                info!("removed timed-out server {}", server.server_id);
            }
            reaped += 1;
        }
    }
    Ok(reaped)
}
