pub const RUN_STARTS: &str = "quay_janitor_run_starts";
pub const RUN_ENDS: &str = "quay_janitor_run_ends";

pub const EXPIRED_COUNT: &str = "quay_janitor_expired_documents";
pub const AGGREGATED_COUNT: &str = "quay_janitor_aggregated_counters";
pub const REAPED_SERVERS_COUNT: &str = "quay_janitor_reaped_servers";

// Basic bucket-level gauges the janitor reports on each pass
pub const ENQUEUED_DEPTH: &str = "quay_enqueued_jobs";
pub const FETCHED_DEPTH: &str = "quay_fetched_jobs";
