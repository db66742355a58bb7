use std::time::Duration;

/// Tuning knobs for the storage engine. The defaults suit a production
/// deployment; tests shrink the intervals to keep runs fast.
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Per-request budget a backend should apply to its point operations.
    pub request_timeout: Duration,
    /// Cadence of the expiration sweeper.
    pub expiration_check_interval: Duration,
    /// Cadence of the counter aggregator.
    pub counters_aggregate_interval: Duration,
    /// How long a dequeuer sleeps after finding all its queues empty.
    pub queue_poll_interval: Duration,
    /// How long a claimed queue entry stays hidden before it is considered
    /// abandoned and becomes claimable again.
    pub invisibility_timeout: Duration,
    /// Budget for the shared dequeue lock.
    pub dequeue_lock_timeout: Duration,
    /// Poll interval while waiting on a contended lock.
    pub lock_retry_interval: Duration,
    /// How often a held queue entry has its claim stamp refreshed.
    pub keep_alive_interval: Duration,
    /// Create missing secondary indexes at startup instead of failing.
    pub create_indexes: bool,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            expiration_check_interval: Duration::from_secs(120),
            counters_aggregate_interval: Duration::from_secs(120),
            queue_poll_interval: Duration::from_secs(15),
            invisibility_timeout: Duration::from_secs(30 * 60),
            dequeue_lock_timeout: Duration::from_secs(15),
            lock_retry_interval: Duration::from_secs(2),
            keep_alive_interval: Duration::from_secs(5 * 60),
            create_indexes: true,
        }
    }
}
