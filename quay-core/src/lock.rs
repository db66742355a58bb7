use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::{StorageError, StoreError};
use crate::store::DocumentStore;
use crate::types::{epoch_now, Document, LockDocument};

/// A mutex held as a document in the bucket.
///
/// Acquisition races on an insert of a deterministically-addressed lock
/// document; a lock whose expiry has passed is stolen with a conditional
/// write on the holder's version token, so two stealers can never both win.
/// The expiry doubles as a liveness bound: a crashed holder's lock becomes
/// stealable after `timeout` even if the document is never cleaned up.
pub struct DistributedLock {
    store: Arc<dyn DocumentStore>,
    resource: String,
    id: String,
    held: bool,
}

impl DistributedLock {
    /// Block until the lock on `resource` is ours, polling every
    /// `retry_interval`. Gives up with [`StorageError::LockTimeout`] once
    /// `timeout` has elapsed without winning.
    pub async fn acquire(
        store: Arc<dyn DocumentStore>,
        resource: &str,
        timeout: Duration,
        retry_interval: Duration,
    ) -> Result<Self, StorageError> {
        let id = LockDocument::id_for(resource);
        let deadline = Instant::now() + timeout;

        loop {
            if try_acquire(store.as_ref(), resource, &id, timeout).await? {
                debug!("acquired lock on resource '{}'", resource);
                return Ok(Self {
                    store,
                    resource: resource.to_string(),
                    id,
                    held: true,
                });
            }

            if Instant::now() >= deadline {
                return Err(StorageError::LockTimeout {
                    resource: resource.to_string(),
                });
            }
            tokio::time::sleep(retry_interval).await;
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Delete the lock document. Safe to call more than once.
    pub async fn release(&mut self) -> Result<(), StorageError> {
        if !self.held {
            return Ok(());
        }
        self.store.remove(&self.id).await?;
        self.held = false;
        Ok(())
    }
}

async fn try_acquire(
    store: &dyn DocumentStore,
    resource: &str,
    id: &str,
    timeout: Duration,
) -> Result<bool, StorageError> {
    let now = epoch_now();
    let expire_on = now + timeout.as_secs() as i64;

    let Some(current) = store.get(id).await? else {
        // Free. Race the insert; losing just means contention.
        return match store
            .insert(Document::Lock(LockDocument::new(resource, expire_on)))
            .await
        {
            Ok(()) => Ok(true),
            Err(StoreError::KeyExists(_)) => Ok(false),
            Err(err) => Err(err.into()),
        };
    };

    // Held but expired: the holder died. Steal under the version token so
    // only one contender succeeds.
    if current.document.expire_on().is_some_and(|e| e < now) {
        let stolen = store
            .replace(
                Document::Lock(LockDocument::new(resource, expire_on)),
                current.cas,
            )
            .await?;
        return Ok(stolen);
    }

    Ok(false)
}

impl Drop for DistributedLock {
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        // Best effort; an unreleased lock still frees itself via its expiry.
        match Handle::try_current() {
            Ok(handle) => {
                let store = self.store.clone();
                let id = self.id.clone();
                handle.spawn(async move {
                    if let Err(err) = store.remove(&id).await {
                        warn!("failed to remove lock document {}: {}", id, err);
                    }
                });
            }
            Err(_) => warn!(
                "lock on '{}' dropped outside a runtime; it will expire on its own",
                self.resource
            ),
        }
    }
}
