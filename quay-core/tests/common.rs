use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use quay_core::{JobInit, MemoryBucket, Storage, StorageOptions};

/// Options shrunk so polling loops settle in milliseconds rather than the
/// production-scale minutes.
#[allow(dead_code)]
pub fn test_options() -> StorageOptions {
    StorageOptions {
        request_timeout: Duration::from_millis(200),
        expiration_check_interval: Duration::from_millis(50),
        counters_aggregate_interval: Duration::from_millis(50),
        queue_poll_interval: Duration::from_millis(20),
        invisibility_timeout: Duration::from_secs(30 * 60),
        dequeue_lock_timeout: Duration::from_millis(200),
        lock_retry_interval: Duration::from_millis(10),
        keep_alive_interval: Duration::from_millis(50),
        create_indexes: true,
    }
}

#[allow(dead_code)]
pub async fn test_storage() -> (Arc<MemoryBucket>, Storage) {
    test_storage_with(test_options()).await
}

#[allow(dead_code)]
pub async fn test_storage_with(options: StorageOptions) -> (Arc<MemoryBucket>, Storage) {
    let bucket = Arc::new(MemoryBucket::new());
    let storage = Storage::new(bucket.clone(), options)
        .await
        .expect("failed to initialize storage");
    (bucket, storage)
}

#[allow(dead_code)]
pub fn sample_job() -> JobInit {
    JobInit {
        invocation: serde_json::json!({
            "type": "Worker.EmailSender",
            "method": "Send",
            "parameter_types": "[\"System.String\"]",
            "arguments": "[\"hello\"]",
        }),
        arguments: "[\"hello\"]".to_string(),
        parameters: HashMap::new(),
        created_on: Utc::now(),
        expire_in: Duration::from_secs(24 * 60 * 60),
    }
}
