use thiserror::Error;

/// Errors surfaced by a concrete document-store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("document {0} already exists")]
    KeyExists(String),
    #[error("required secondary indexes are missing: {0}")]
    MissingIndexes(String),
    #[error("{op} failed: {message}")]
    Operation { op: &'static str, message: String },
    #[error("could not serialize document: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors about the storage engine itself - lock timeouts, cancelled waits,
/// missing jobs, and wrapped backend failures.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("could not place a lock on resource '{resource}': lock timeout")]
    LockTimeout { resource: String },
    #[error("required secondary indexes are missing: {0}")]
    MissingIndexes(String),
    #[error("the operation was cancelled")]
    Cancelled,
    #[error("no queues were provided to dequeue from")]
    NoQueues,
    #[error("unknown job id: {0}")]
    UnknownJob(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}
