use std::time::Duration;

use envconfig::Envconfig;
use quay_core::StorageOptions;
use uuid::Uuid;

#[derive(Envconfig)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "::")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3313")]
    pub port: u16,

    #[envconfig(default = "30")]
    pub cleanup_interval_secs: u64,

    /// Servers whose heartbeat is older than this are reaped.
    #[envconfig(default = "300")]
    pub server_timeout_secs: u64,

    #[envconfig(default = "2")]
    pub lock_retry_interval_secs: u64,

    #[envconfig(default = "15")]
    pub queue_poll_interval_secs: u64,

    #[envconfig(default = "true")]
    pub create_indexes: bool,

    // Only one janitor should be doing cleanup per bucket; the id mostly
    // exists to tell their metrics apart
    pub janitor_id: Option<String>,
}

impl Config {
    pub fn janitor_settings(&self) -> JanitorSettings {
        JanitorSettings {
            id: self
                .janitor_id
                .clone()
                .unwrap_or_else(|| Uuid::now_v7().to_string()),
            server_timeout: Duration::from_secs(self.server_timeout_secs),
        }
    }

    pub fn storage_options(&self) -> StorageOptions {
        StorageOptions {
            lock_retry_interval: Duration::from_secs(self.lock_retry_interval_secs),
            queue_poll_interval: Duration::from_secs(self.queue_poll_interval_secs),
            create_indexes: self.create_indexes,
            ..StorageOptions::default()
        }
    }
}

pub struct JanitorSettings {
    pub id: String,
    pub server_timeout: Duration,
}
