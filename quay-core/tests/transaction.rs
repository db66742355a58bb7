use std::collections::HashMap;
use std::time::Duration;

use quay_core::{CounterKind, Document, DocumentKind, DocumentQuery, DocumentStore, StateInit};

mod common;
use common::{sample_job, test_storage};

fn state(name: &str) -> StateInit {
    StateInit {
        name: name.to_string(),
        reason: None,
        data: HashMap::new(),
    }
}

#[tokio::test]
async fn counter_deltas_accumulate() {
    let (_bucket, storage) = test_storage().await;
    let connection = storage.connection();

    let mut txn = connection.write_transaction();
    txn.increment_counter("stats:succeeded", None);
    txn.increment_counter("stats:succeeded", None);
    txn.increment_counter("stats:succeeded", None);
    txn.decrement_counter("stats:succeeded", None);
    txn.commit().await.expect("failed to commit");

    assert_eq!(connection.get_counter("stats:succeeded").await.unwrap(), 2);
    // untouched counters read as zero
    assert_eq!(connection.get_counter("stats:deleted").await.unwrap(), 0);
}

#[tokio::test]
async fn set_job_state_moves_the_pointer_and_keeps_history() {
    let (bucket, storage) = test_storage().await;
    let connection = storage.connection();

    let job_id = connection
        .create_job(sample_job())
        .await
        .expect("failed to create job");

    let mut txn = connection.write_transaction();
    txn.set_job_state(&job_id, state("Enqueued"));
    txn.commit().await.expect("failed to commit");

    let mut txn = connection.write_transaction();
    txn.set_job_state(&job_id, state("Processing"));
    txn.commit().await.expect("failed to commit");

    let data = connection
        .get_job_data(&job_id)
        .await
        .expect("failed to read job")
        .expect("job should exist");
    assert_eq!(data.state.as_deref(), Some("Processing"));

    let current = connection
        .get_state_data(&job_id)
        .await
        .expect("failed to read state")
        .expect("state should exist");
    assert_eq!(current.name, "Processing");

    // both transitions remain in the history
    let history = bucket
        .query(&DocumentQuery::kind(DocumentKind::State).job_id(&job_id))
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn add_job_state_leaves_the_pointer_alone() {
    let (_bucket, storage) = test_storage().await;
    let connection = storage.connection();

    let job_id = connection.create_job(sample_job()).await.unwrap();

    let mut txn = connection.write_transaction();
    txn.set_job_state(&job_id, state("Enqueued"));
    txn.add_job_state(&job_id, state("Annotation"));
    txn.commit().await.expect("failed to commit");

    let data = connection.get_job_data(&job_id).await.unwrap().unwrap();
    assert_eq!(data.state.as_deref(), Some("Enqueued"));
}

#[tokio::test]
async fn set_membership_is_unique_per_value() {
    let (_bucket, storage) = test_storage().await;
    let connection = storage.connection();

    let mut txn = connection.write_transaction();
    txn.add_to_set("recurring-jobs", "job-1", 1.0);
    txn.add_to_set("recurring-jobs", "job-1", 9.0); // re-add updates the score
    txn.add_to_set("recurring-jobs", "job-2", 5.0);
    txn.commit().await.expect("failed to commit");

    assert_eq!(connection.get_set_count("recurring-jobs").await.unwrap(), 2);
    // job-1's score was overwritten to 9.0, so job-2 is now the lowest
    assert_eq!(
        connection
            .get_first_by_lowest_score_from_set("recurring-jobs", 0.0, 10.0)
            .await
            .unwrap()
            .as_deref(),
        Some("job-2")
    );

    let mut txn = connection.write_transaction();
    txn.remove_from_set("recurring-jobs", "job-1");
    txn.commit().await.expect("failed to commit");
    assert_eq!(
        connection.get_all_items_from_set("recurring-jobs").await.unwrap(),
        vec!["job-2".to_string()]
    );
}

#[tokio::test]
async fn hash_fields_update_in_place() {
    let (_bucket, storage) = test_storage().await;
    let connection = storage.connection();

    let mut txn = connection.write_transaction();
    txn.set_range_in_hash(
        "recurring-job:1",
        vec![
            ("cron".to_string(), "* * * * *".to_string()),
            ("queue".to_string(), "default".to_string()),
        ],
    );
    txn.commit().await.expect("failed to commit");

    // the connection-level writer goes through the same uniqueness check
    connection
        .set_range_in_hash(
            "recurring-job:1",
            vec![("cron".to_string(), "0 * * * *".to_string())],
        )
        .await
        .expect("failed to update hash");

    assert_eq!(connection.get_hash_count("recurring-job:1").await.unwrap(), 2);
    assert_eq!(
        connection
            .get_value_from_hash("recurring-job:1", "cron")
            .await
            .unwrap()
            .as_deref(),
        Some("0 * * * *")
    );

    let mut txn = connection.write_transaction();
    txn.remove_hash("recurring-job:1");
    txn.commit().await.expect("failed to commit");
    assert_eq!(connection.get_hash_count("recurring-job:1").await.unwrap(), 0);
}

#[tokio::test]
async fn list_insert_remove_and_trim() {
    let (_bucket, storage) = test_storage().await;
    let connection = storage.connection();

    for value in ["a", "b", "c", "d"] {
        let mut txn = connection.write_transaction();
        txn.insert_to_list("log", value);
        txn.commit().await.expect("failed to commit");
        // creation-time ordering; keep the timestamps distinct
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // newest first
    assert_eq!(
        connection.get_all_items_from_list("log").await.unwrap(),
        vec!["d", "c", "b", "a"]
    );

    let mut txn = connection.write_transaction();
    txn.remove_from_list("log", "c");
    txn.commit().await.expect("failed to commit");
    assert_eq!(
        connection.get_all_items_from_list("log").await.unwrap(),
        vec!["d", "b", "a"]
    );

    // keep only the two newest
    let mut txn = connection.write_transaction();
    txn.trim_list("log", 0, 1);
    txn.commit().await.expect("failed to commit");
    assert_eq!(
        connection.get_all_items_from_list("log").await.unwrap(),
        vec!["d", "b"]
    );
    assert_eq!(connection.get_list_count("log").await.unwrap(), 2);
}

#[tokio::test]
async fn expire_and_persist_job() {
    let (bucket, storage) = test_storage().await;
    let connection = storage.connection();

    let job_id = connection.create_job(sample_job()).await.unwrap();

    let mut txn = connection.write_transaction();
    txn.expire_job(&job_id, Duration::from_secs(3600));
    txn.commit().await.expect("failed to commit");

    let job = bucket.get(&job_id).await.unwrap().expect("job should exist");
    assert!(job.document.expire_on().is_some());

    let mut txn = connection.write_transaction();
    txn.persist_job(&job_id);
    txn.commit().await.expect("failed to commit");

    let job = bucket.get(&job_id).await.unwrap().expect("job should exist");
    assert_eq!(job.document.expire_on(), None);
}

#[tokio::test]
async fn expire_and_persist_keyed_collections() {
    let (bucket, storage) = test_storage().await;
    let connection = storage.connection();

    let mut txn = connection.write_transaction();
    txn.add_to_set("s", "v1", 0.0);
    txn.add_to_set("s", "v2", 0.0);
    txn.commit().await.expect("failed to commit");

    let mut txn = connection.write_transaction();
    txn.expire_set("s", Duration::from_secs(3600));
    txn.commit().await.expect("failed to commit");

    let ttl = connection.get_set_ttl("s").await.unwrap();
    assert!(ttl.is_some_and(|ttl| ttl <= Duration::from_secs(3600)));

    let members = bucket
        .query(&DocumentQuery::kind(DocumentKind::Set).key("s"))
        .await
        .unwrap();
    assert!(members.iter().all(|doc| doc.expire_on().is_some()));

    let mut txn = connection.write_transaction();
    txn.persist_set("s");
    txn.commit().await.expect("failed to commit");
    assert_eq!(connection.get_set_ttl("s").await.unwrap(), None);
}

#[tokio::test]
async fn counter_expiry_is_stamped_on_the_raw_document() {
    let (bucket, storage) = test_storage().await;
    let connection = storage.connection();

    let mut txn = connection.write_transaction();
    txn.increment_counter("stats:succeeded", Some(Duration::from_secs(3600)));
    txn.commit().await.expect("failed to commit");

    let raws = bucket
        .query(
            &DocumentQuery::kind(DocumentKind::Counter)
                .key("stats:succeeded")
                .counter_kind(CounterKind::Raw),
        )
        .await
        .unwrap();
    assert_eq!(raws.len(), 1);
    assert!(raws[0].expire_on().is_some());
    if let Document::Counter(counter) = &raws[0] {
        assert_eq!(counter.value, 1);
    } else {
        panic!("expected a counter document");
    }
}
