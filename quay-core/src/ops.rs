pub(crate) mod janitor;
pub(crate) mod job;
pub(crate) mod kv;
pub(crate) mod meta;
pub(crate) mod queue;
pub(crate) mod server;
