mod ops;

// We do this pattern (privately use a module, then re-export parts of it) so
// we can refactor the internals without breaking the public API

// Types
mod types;
pub use types::CounterDocument;
pub use types::CounterKind;
pub use types::Document;
pub use types::DocumentKind;
pub use types::HashDocument;
pub use types::JobDocument;
pub use types::ListDocument;
pub use types::LockDocument;
pub use types::QueueDocument;
pub use types::ServerDocument;
pub use types::SetDocument;
pub use types::StateDocument;
pub use types::Epoch;
pub use types::Invocation;
pub use types::JobData;
pub use types::JobInit;
pub use types::StateData;
pub use types::StateInit;
pub use types::epoch_now;

// Errors
mod error;
// Errors surfaced by a concrete document-store backend
pub use error::StoreError;
// Errors about the storage engine - lock timeouts, cancellation, unknown jobs
pub use error::StorageError;

// Store boundary
mod store;
pub use store::DocumentQuery;
pub use store::DocumentStore;
pub use store::MemoryBucket;
pub use store::QueryOrder;
pub use store::VersionedDocument;

// Lock
mod lock;
pub use lock::DistributedLock;

// Queue
mod queue;
// A claimed queue entry; requeues itself when dropped without an outcome
pub use queue::FetchedJob;
pub use queue::JobQueue;

// Write batches
mod transaction;
pub use transaction::WriteTransaction;

// Background maintenance
mod aggregator;
mod sweeper;
pub use aggregator::CounterAggregator;
pub use sweeper::ExpirationSweeper;

// Connection facade and monitoring
mod connection;
mod monitor;
pub use connection::StorageConnection;
pub use monitor::MonitoringApi;
pub use monitor::QueueSummary;
pub use monitor::Statistics;

// Config and root
mod config;
mod storage;
pub use config::StorageOptions;
pub use storage::Storage;
