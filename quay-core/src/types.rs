use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Absolute deadlines are persisted as epoch seconds, matching the wire
/// format other clients of the bucket expect.
pub type Epoch = i64;

pub fn epoch_now() -> Epoch {
    Utc::now().timestamp()
}

fn generated_id(prefix: &str) -> String {
    format!("{}::{}", prefix, Uuid::now_v7())
}

// Deterministic ids let us do strongly-consistent point reads for documents
// that are addressed by name (locks, servers, aggregated counters) instead of
// going through the eventually-consistent index.
fn hashed_id(prefix: &str, name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    format!("{}::{}", prefix, hex::encode(&digest[..8]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Server,
    Job,
    Queue,
    Counter,
    List,
    Hash,
    Set,
    State,
    Lock,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Server => "server",
            DocumentKind::Job => "job",
            DocumentKind::Queue => "queue",
            DocumentKind::Counter => "counter",
            DocumentKind::List => "list",
            DocumentKind::Hash => "hash",
            DocumentKind::Set => "set",
            DocumentKind::State => "state",
            DocumentKind::Lock => "lock",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterKind {
    Raw,
    Aggregate,
}

/// Every persisted entity, discriminated by a `type` tag so all kinds can
/// share one bucket namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Document {
    Job(JobDocument),
    State(StateDocument),
    Queue(QueueDocument),
    Counter(CounterDocument),
    Set(SetDocument),
    Hash(HashDocument),
    List(ListDocument),
    Server(ServerDocument),
    Lock(LockDocument),
}

impl Document {
    pub fn id(&self) -> &str {
        match self {
            Document::Job(d) => &d.id,
            Document::State(d) => &d.id,
            Document::Queue(d) => &d.id,
            Document::Counter(d) => &d.id,
            Document::Set(d) => &d.id,
            Document::Hash(d) => &d.id,
            Document::List(d) => &d.id,
            Document::Server(d) => &d.id,
            Document::Lock(d) => &d.id,
        }
    }

    pub fn kind(&self) -> DocumentKind {
        match self {
            Document::Job(_) => DocumentKind::Job,
            Document::State(_) => DocumentKind::State,
            Document::Queue(_) => DocumentKind::Queue,
            Document::Counter(_) => DocumentKind::Counter,
            Document::Set(_) => DocumentKind::Set,
            Document::Hash(_) => DocumentKind::Hash,
            Document::List(_) => DocumentKind::List,
            Document::Server(_) => DocumentKind::Server,
            Document::Lock(_) => DocumentKind::Lock,
        }
    }

    pub fn expire_on(&self) -> Option<Epoch> {
        match self {
            Document::Job(d) => d.expire_on,
            Document::State(d) => d.expire_on,
            Document::Queue(d) => d.expire_on,
            Document::Counter(d) => d.expire_on,
            Document::Set(d) => d.expire_on,
            Document::Hash(d) => d.expire_on,
            Document::List(d) => d.expire_on,
            Document::Server(d) => d.expire_on,
            Document::Lock(d) => d.expire_on,
        }
    }

    pub fn set_expire_on(&mut self, expire_on: Option<Epoch>) {
        match self {
            Document::Job(d) => d.expire_on = expire_on,
            Document::State(d) => d.expire_on = expire_on,
            Document::Queue(d) => d.expire_on = expire_on,
            Document::Counter(d) => d.expire_on = expire_on,
            Document::Set(d) => d.expire_on = expire_on,
            Document::Hash(d) => d.expire_on = expire_on,
            Document::List(d) => d.expire_on = expire_on,
            Document::Server(d) => d.expire_on = expire_on,
            Document::Lock(d) => d.expire_on = expire_on,
        }
    }
}

/// The chunk of data needed to create a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInit {
    /// Serialized invocation descriptor, kept opaque at this layer. Payloads
    /// that fail to parse back are surfaced through [`JobData::load_error`],
    /// never as a storage error.
    pub invocation: serde_json::Value,
    pub arguments: String,
    pub parameters: HashMap<String, String>,
    pub created_on: DateTime<Utc>,
    /// Jobs are created already carrying their expiry; a later state
    /// transition persists them once they are picked up.
    pub expire_in: std::time::Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDocument {
    pub id: String,
    pub expire_on: Option<Epoch>,
    pub invocation: serde_json::Value,
    pub arguments: String,
    pub state_id: Option<String>,
    pub state_name: Option<String>,
    pub parameters: HashMap<String, String>,
    pub created_on: DateTime<Utc>,
}

impl JobDocument {
    pub fn new(init: JobInit) -> Self {
        let expire_on = init.created_on.timestamp() + init.expire_in.as_secs() as Epoch;
        Self {
            id: generated_id("job"),
            expire_on: Some(expire_on),
            invocation: init.invocation,
            arguments: init.arguments,
            state_id: None,
            state_name: None,
            parameters: init.parameters,
            created_on: init.created_on,
        }
    }
}

/// Immutable state-history record. Many states exist per job; the job's
/// `state_id` always points at the most recently applied one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    pub id: String,
    pub expire_on: Option<Epoch>,
    pub job_id: String,
    pub name: String,
    pub reason: Option<String>,
    pub created_on: DateTime<Utc>,
    pub data: HashMap<String, String>,
}

impl StateDocument {
    pub fn new(job_id: &str, init: StateInit) -> Self {
        Self {
            id: generated_id("state"),
            expire_on: None,
            job_id: job_id.to_string(),
            name: init.name,
            reason: init.reason,
            created_on: Utc::now(),
            data: init.data,
        }
    }
}

/// The pieces of a state transition a caller provides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateInit {
    pub name: String,
    pub reason: Option<String>,
    pub data: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueDocument {
    pub id: String,
    pub expire_on: Option<Epoch>,
    pub name: String,
    pub job_id: String,
    pub created_on: DateTime<Utc>,
    /// Present while a worker holds the entry; it is invisible to other
    /// dequeuers until this is cleared or ages past the invisibility timeout.
    pub fetched_at: Option<Epoch>,
}

impl QueueDocument {
    pub fn new(queue: &str, job_id: &str) -> Self {
        Self {
            id: generated_id("queue"),
            expire_on: None,
            name: queue.to_string(),
            job_id: job_id.to_string(),
            created_on: Utc::now(),
            fetched_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterDocument {
    pub id: String,
    pub expire_on: Option<Epoch>,
    pub key: String,
    pub value: i64,
    pub counter_kind: CounterKind,
}

impl CounterDocument {
    pub fn raw(key: &str, value: i64, expire_on: Option<Epoch>) -> Self {
        Self {
            id: generated_id("counter"),
            expire_on,
            key: key.to_string(),
            value,
            counter_kind: CounterKind::Raw,
        }
    }

    pub fn aggregate(key: &str, value: i64, expire_on: Option<Epoch>) -> Self {
        Self {
            id: Self::aggregate_id(key),
            expire_on,
            key: key.to_string(),
            value,
            counter_kind: CounterKind::Aggregate,
        }
    }

    /// One aggregate document per key, addressed deterministically so the
    /// aggregator can read it back with a point get.
    pub fn aggregate_id(key: &str) -> String {
        hashed_id("counter", &format!("{key}::aggregate"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetDocument {
    pub id: String,
    pub expire_on: Option<Epoch>,
    pub key: String,
    pub value: String,
    pub score: f64,
    pub created_on: DateTime<Utc>,
}

impl SetDocument {
    pub fn new(key: &str, value: &str, score: f64) -> Self {
        Self {
            id: generated_id("set"),
            expire_on: None,
            key: key.to_string(),
            value: value.to_string(),
            score,
            created_on: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashDocument {
    pub id: String,
    pub expire_on: Option<Epoch>,
    pub key: String,
    pub field: String,
    pub value: String,
}

impl HashDocument {
    pub fn new(key: &str, field: &str, value: &str) -> Self {
        Self {
            id: generated_id("hash"),
            expire_on: None,
            key: key.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListDocument {
    pub id: String,
    pub expire_on: Option<Epoch>,
    pub key: String,
    pub value: String,
    pub created_on: DateTime<Utc>,
}

impl ListDocument {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            id: generated_id("list"),
            expire_on: None,
            key: key.to_string(),
            value: value.to_string(),
            created_on: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDocument {
    pub id: String,
    pub expire_on: Option<Epoch>,
    pub server_id: String,
    pub worker_count: u32,
    pub queues: Vec<String>,
    pub created_on: DateTime<Utc>,
    pub last_heartbeat: Epoch,
}

impl ServerDocument {
    pub fn new(server_id: &str, worker_count: u32, queues: Vec<String>) -> Self {
        Self {
            id: Self::id_for(server_id),
            expire_on: None,
            server_id: server_id.to_string(),
            worker_count,
            queues,
            created_on: Utc::now(),
            last_heartbeat: epoch_now(),
        }
    }

    pub fn id_for(server_id: &str) -> String {
        hashed_id("server", server_id)
    }
}

/// Existence + non-expired means the lock is held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockDocument {
    pub id: String,
    pub expire_on: Option<Epoch>,
    pub name: String,
}

impl LockDocument {
    pub fn new(resource: &str, expire_on: Epoch) -> Self {
        Self {
            id: Self::id_for(resource),
            expire_on: Some(expire_on),
            name: resource.to_string(),
        }
    }

    pub fn id_for(resource: &str) -> String {
        hashed_id("lock", resource)
    }
}

/// The parsed form of a job's invocation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    #[serde(rename = "type")]
    pub type_name: String,
    pub method: String,
    pub parameter_types: String,
    pub arguments: String,
}

/// What a dashboard or the job engine gets back when it asks for a job.
/// A payload that no longer deserializes still yields the job's metadata,
/// with the parse failure captured in `load_error`.
#[derive(Debug, Clone, PartialEq)]
pub struct JobData {
    pub invocation: Option<Invocation>,
    pub load_error: Option<String>,
    pub state: Option<String>,
    pub created_on: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateData {
    pub name: String,
    pub reason: Option<String>,
    pub data: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_round_trips_through_type_tag() {
        let doc = Document::Queue(QueueDocument::new("default", "job::1"));
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["type"], "queue");
        let back: Document = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn deterministic_ids_are_stable() {
        assert_eq!(LockDocument::id_for("res"), LockDocument::id_for("res"));
        assert_ne!(LockDocument::id_for("res"), LockDocument::id_for("other"));
        assert_eq!(
            CounterDocument::aggregate_id("stats"),
            CounterDocument::aggregate_id("stats")
        );
    }
}
