use std::sync::Arc;
use std::time::Duration;

use crate::error::StorageError;
use crate::ops;
use crate::ops::meta::update_with_cas;
use crate::store::DocumentStore;
use crate::types::{epoch_now, Document, DocumentKind, StateDocument, StateInit};

/// A single queued mutation. Commands are applied strictly in the order they
/// were recorded.
enum Command {
    AddToQueue {
        queue: String,
        job_id: String,
    },
    CounterDelta {
        key: String,
        value: i64,
        expire_in: Option<Duration>,
    },
    ExpireJob {
        job_id: String,
        expire_in: Duration,
    },
    PersistJob {
        job_id: String,
    },
    SetJobState {
        job_id: String,
        state: StateInit,
    },
    AddJobState {
        job_id: String,
        state: StateInit,
    },
    AddToSet {
        key: String,
        value: String,
        score: f64,
    },
    RemoveFromSet {
        key: String,
        value: String,
    },
    SetHash {
        key: String,
        fields: Vec<(String, String)>,
    },
    RemoveHash {
        key: String,
    },
    InsertToList {
        key: String,
        value: String,
    },
    RemoveFromList {
        key: String,
        value: String,
    },
    TrimList {
        key: String,
        keep_start: usize,
        keep_end: usize,
    },
    ExpireKey {
        kind: DocumentKind,
        key: String,
        expire_in: Duration,
    },
    PersistKey {
        kind: DocumentKind,
        key: String,
    },
}

/// A write batch. Mutations are recorded locally and only touch the bucket
/// on [`commit`](WriteTransaction::commit), in recorded order. There is no
/// cross-document atomicity: a failure mid-commit leaves earlier commands
/// applied and propagates the error.
pub struct WriteTransaction {
    store: Arc<dyn DocumentStore>,
    commands: Vec<Command>,
}

impl WriteTransaction {
    pub(crate) fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            commands: Vec::new(),
        }
    }

    pub fn add_to_queue(&mut self, queue: &str, job_id: &str) {
        self.commands.push(Command::AddToQueue {
            queue: queue.to_string(),
            job_id: job_id.to_string(),
        });
    }

    pub fn increment_counter(&mut self, key: &str, expire_in: Option<Duration>) {
        self.commands.push(Command::CounterDelta {
            key: key.to_string(),
            value: 1,
            expire_in,
        });
    }

    pub fn decrement_counter(&mut self, key: &str, expire_in: Option<Duration>) {
        self.commands.push(Command::CounterDelta {
            key: key.to_string(),
            value: -1,
            expire_in,
        });
    }

    pub fn expire_job(&mut self, job_id: &str, expire_in: Duration) {
        self.commands.push(Command::ExpireJob {
            job_id: job_id.to_string(),
            expire_in,
        });
    }

    pub fn persist_job(&mut self, job_id: &str) {
        self.commands.push(Command::PersistJob {
            job_id: job_id.to_string(),
        });
    }

    /// Record a state transition: the state document is written to the
    /// history and the job's current-state pointer moves to it.
    pub fn set_job_state(&mut self, job_id: &str, state: StateInit) {
        self.commands.push(Command::SetJobState {
            job_id: job_id.to_string(),
            state,
        });
    }

    /// Append to the state history without moving the current-state pointer.
    pub fn add_job_state(&mut self, job_id: &str, state: StateInit) {
        self.commands.push(Command::AddJobState {
            job_id: job_id.to_string(),
            state,
        });
    }

    pub fn add_to_set(&mut self, key: &str, value: &str, score: f64) {
        self.commands.push(Command::AddToSet {
            key: key.to_string(),
            value: value.to_string(),
            score,
        });
    }

    pub fn remove_from_set(&mut self, key: &str, value: &str) {
        self.commands.push(Command::RemoveFromSet {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    pub fn set_range_in_hash(&mut self, key: &str, fields: Vec<(String, String)>) {
        self.commands.push(Command::SetHash {
            key: key.to_string(),
            fields,
        });
    }

    pub fn remove_hash(&mut self, key: &str) {
        self.commands.push(Command::RemoveHash {
            key: key.to_string(),
        });
    }

    pub fn insert_to_list(&mut self, key: &str, value: &str) {
        self.commands.push(Command::InsertToList {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    pub fn remove_from_list(&mut self, key: &str, value: &str) {
        self.commands.push(Command::RemoveFromList {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    pub fn trim_list(&mut self, key: &str, keep_start: usize, keep_end: usize) {
        self.commands.push(Command::TrimList {
            key: key.to_string(),
            keep_start,
            keep_end,
        });
    }

    pub fn expire_set(&mut self, key: &str, expire_in: Duration) {
        self.expire_key(DocumentKind::Set, key, expire_in);
    }

    pub fn expire_hash(&mut self, key: &str, expire_in: Duration) {
        self.expire_key(DocumentKind::Hash, key, expire_in);
    }

    pub fn expire_list(&mut self, key: &str, expire_in: Duration) {
        self.expire_key(DocumentKind::List, key, expire_in);
    }

    pub fn persist_set(&mut self, key: &str) {
        self.persist_key(DocumentKind::Set, key);
    }

    pub fn persist_hash(&mut self, key: &str) {
        self.persist_key(DocumentKind::Hash, key);
    }

    pub fn persist_list(&mut self, key: &str) {
        self.persist_key(DocumentKind::List, key);
    }

    fn expire_key(&mut self, kind: DocumentKind, key: &str, expire_in: Duration) {
        self.commands.push(Command::ExpireKey {
            kind,
            key: key.to_string(),
            expire_in,
        });
    }

    fn persist_key(&mut self, kind: DocumentKind, key: &str) {
        self.commands.push(Command::PersistKey {
            kind,
            key: key.to_string(),
        });
    }

    /// Apply every recorded command, in order. The first failure stops the
    /// batch and is returned; already-applied commands stay applied.
    pub async fn commit(self) -> Result<(), StorageError> {
        for command in self.commands {
            apply(self.store.as_ref(), command).await?;
        }
        Ok(())
    }
}

fn expiry_from_now(expire_in: Duration) -> i64 {
    epoch_now() + expire_in.as_secs() as i64
}

async fn apply(store: &dyn DocumentStore, command: Command) -> Result<(), StorageError> {
    match command {
        Command::AddToQueue { queue, job_id } => {
            ops::queue::enqueue(store, &queue, &job_id).await
        }
        Command::CounterDelta {
            key,
            value,
            expire_in,
        } => {
            let expire_on = expire_in.map(expiry_from_now);
            ops::kv::append_counter(store, &key, value, expire_on).await
        }
        Command::ExpireJob { job_id, expire_in } => {
            let expire_on = Some(expiry_from_now(expire_in));
            update_with_cas(store, &job_id, |document| {
                document.set_expire_on(expire_on);
            })
            .await?;
            Ok(())
        }
        Command::PersistJob { job_id } => {
            update_with_cas(store, &job_id, |document| {
                document.set_expire_on(None);
            })
            .await?;
            Ok(())
        }
        Command::SetJobState { job_id, state } => {
            let state_doc = StateDocument::new(&job_id, state);
            let state_id = state_doc.id.clone();
            let state_name = state_doc.name.clone();
            // The history record must be durable before the pointer moves;
            // if the insert fails the job keeps pointing at its old state.
            store.insert(Document::State(state_doc)).await?;
            update_with_cas(store, &job_id, |document| {
                if let Document::Job(job) = document {
                    job.state_id = Some(state_id.clone());
                    job.state_name = Some(state_name.clone());
                }
            })
            .await?;
            Ok(())
        }
        Command::AddJobState { job_id, state } => {
            store
                .insert(Document::State(StateDocument::new(&job_id, state)))
                .await?;
            Ok(())
        }
        Command::AddToSet { key, value, score } => {
            ops::kv::add_to_set(store, &key, &value, score).await
        }
        Command::RemoveFromSet { key, value } => {
            ops::kv::remove_from_set(store, &key, &value).await
        }
        Command::SetHash { key, fields } => ops::kv::set_hash_fields(store, &key, fields).await,
        Command::RemoveHash { key } => ops::kv::remove_hash(store, &key).await,
        Command::InsertToList { key, value } => {
            ops::kv::insert_to_list(store, &key, &value).await
        }
        Command::RemoveFromList { key, value } => {
            ops::kv::remove_from_list(store, &key, &value).await
        }
        Command::TrimList {
            key,
            keep_start,
            keep_end,
        } => ops::kv::trim_list(store, &key, keep_start, keep_end).await,
        Command::ExpireKey {
            kind,
            key,
            expire_in,
        } => {
            let expire_on = Some(expiry_from_now(expire_in));
            ops::kv::stamp_expiry(store, kind, &key, expire_on).await
        }
        Command::PersistKey { kind, key } => {
            ops::kv::stamp_expiry(store, kind, &key, None).await
        }
    }
}
