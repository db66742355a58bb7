use std::time::Duration;

use quay_core::{
    epoch_now, CounterDocument, CounterKind, Document, DocumentKind, DocumentQuery,
    DocumentStore, LockDocument, SetDocument,
};
use tokio_util::sync::CancellationToken;

mod common;
use common::{sample_job, test_storage};

#[tokio::test]
async fn sweep_deletes_expired_documents_only() {
    let (bucket, storage) = test_storage().await;
    let now = epoch_now();

    let mut expired_set = SetDocument::new("old", "v", 0.0);
    expired_set.expire_on = Some(now - 60);
    bucket.insert(Document::Set(expired_set)).await.unwrap();

    let mut future_set = SetDocument::new("fresh", "v", 0.0);
    future_set.expire_on = Some(now + 3600);
    bucket.insert(Document::Set(future_set)).await.unwrap();

    // no expiry at all
    bucket
        .insert(Document::Set(SetDocument::new("forever", "v", 0.0)))
        .await
        .unwrap();

    bucket
        .insert(Document::Lock(LockDocument::new("dead", now - 10)))
        .await
        .unwrap();

    let token = CancellationToken::new();
    let swept = storage
        .expiration_sweeper()
        .run_once(&token)
        .await
        .expect("sweep failed");
    assert_eq!(swept, 2);

    let remaining = bucket
        .query(&DocumentQuery::kind(DocumentKind::Set))
        .await
        .unwrap();
    let mut keys: Vec<_> = remaining
        .iter()
        .filter_map(|doc| match doc {
            Document::Set(set) => Some(set.key.clone()),
            _ => None,
        })
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["forever".to_string(), "fresh".to_string()]);

    // survivors keep surviving
    let swept = storage
        .expiration_sweeper()
        .run_once(&token)
        .await
        .expect("sweep failed");
    assert_eq!(swept, 0);
}

#[tokio::test]
async fn sweep_never_touches_raw_counters() {
    let (bucket, storage) = test_storage().await;
    let now = epoch_now();

    // an expired raw delta: the aggregator owns it, not the sweeper
    bucket
        .insert(Document::Counter(CounterDocument::raw(
            "stats",
            1,
            Some(now - 60),
        )))
        .await
        .unwrap();
    // an expired aggregate is fair game
    bucket
        .insert(Document::Counter(CounterDocument::aggregate(
            "done",
            5,
            Some(now - 60),
        )))
        .await
        .unwrap();

    let token = CancellationToken::new();
    let swept = storage
        .expiration_sweeper()
        .run_once(&token)
        .await
        .expect("sweep failed");
    assert_eq!(swept, 1);

    let raws = bucket
        .query(&DocumentQuery::kind(DocumentKind::Counter).counter_kind(CounterKind::Raw))
        .await
        .unwrap();
    assert_eq!(raws.len(), 1, "the raw delta must survive the sweep");
}

#[tokio::test]
async fn sweep_respects_cancellation() {
    let (_bucket, storage) = test_storage().await;
    let token = CancellationToken::new();
    token.cancel();

    let result = storage.expiration_sweeper().run_once(&token).await;
    assert!(matches!(result, Err(quay_core::StorageError::Cancelled)));
}

#[tokio::test]
async fn expired_jobs_are_swept() {
    let (bucket, storage) = test_storage().await;
    let connection = storage.connection();

    let mut init = sample_job();
    init.expire_in = Duration::from_secs(0);
    let job_id = connection.create_job(init).await.unwrap();

    // second-granularity expiry; make sure "now" has moved past it
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let token = CancellationToken::new();
    storage
        .expiration_sweeper()
        .run_once(&token)
        .await
        .expect("sweep failed");

    assert!(bucket.get(&job_id).await.unwrap().is_none());
}

#[tokio::test]
async fn aggregation_folds_raw_deltas_into_one_document() {
    let (bucket, storage) = test_storage().await;
    let connection = storage.connection();

    let mut txn = connection.write_transaction();
    for _ in 0..5 {
        txn.increment_counter("stats:succeeded", None);
    }
    txn.decrement_counter("stats:succeeded", None);
    txn.increment_counter("stats:deleted", None);
    txn.commit().await.expect("failed to commit");

    let token = CancellationToken::new();
    let consumed = storage
        .counter_aggregator()
        .run_once(&token)
        .await
        .expect("aggregation failed");
    assert_eq!(consumed, 7);

    // sums are preserved and no raw rows remain
    assert_eq!(connection.get_counter("stats:succeeded").await.unwrap(), 4);
    assert_eq!(connection.get_counter("stats:deleted").await.unwrap(), 1);
    let raws = bucket
        .query(&DocumentQuery::kind(DocumentKind::Counter).counter_kind(CounterKind::Raw))
        .await
        .unwrap();
    assert!(raws.is_empty());

    // exactly one aggregate per key
    let aggregates = bucket
        .query(
            &DocumentQuery::kind(DocumentKind::Counter)
                .key("stats:succeeded")
                .counter_kind(CounterKind::Aggregate),
        )
        .await
        .unwrap();
    assert_eq!(aggregates.len(), 1);
}

#[tokio::test]
async fn aggregation_merges_into_an_existing_aggregate() {
    let (bucket, storage) = test_storage().await;
    let connection = storage.connection();

    let mut txn = connection.write_transaction();
    txn.increment_counter("stats", None);
    txn.increment_counter("stats", None);
    txn.commit().await.expect("failed to commit");

    let token = CancellationToken::new();
    storage
        .counter_aggregator()
        .run_once(&token)
        .await
        .expect("aggregation failed");

    let mut txn = connection.write_transaction();
    txn.increment_counter("stats", None);
    txn.commit().await.expect("failed to commit");

    storage
        .counter_aggregator()
        .run_once(&token)
        .await
        .expect("aggregation failed");

    assert_eq!(connection.get_counter("stats").await.unwrap(), 3);
    let aggregates = bucket
        .query(
            &DocumentQuery::kind(DocumentKind::Counter)
                .key("stats")
                .counter_kind(CounterKind::Aggregate),
        )
        .await
        .unwrap();
    assert_eq!(aggregates.len(), 1);
}

#[tokio::test]
async fn aggregation_keeps_the_latest_expiry() {
    let (bucket, storage) = test_storage().await;
    let connection = storage.connection();
    let now = epoch_now();

    let mut txn = connection.write_transaction();
    txn.increment_counter("stats", Some(Duration::from_secs(60)));
    txn.increment_counter("stats", Some(Duration::from_secs(3600)));
    txn.commit().await.expect("failed to commit");

    let token = CancellationToken::new();
    storage
        .counter_aggregator()
        .run_once(&token)
        .await
        .expect("aggregation failed");

    let aggregate = bucket
        .get(&CounterDocument::aggregate_id("stats"))
        .await
        .unwrap()
        .expect("aggregate should exist");
    let expire_on = aggregate.document.expire_on().expect("expiry should be set");
    assert!(expire_on >= now + 3600 - 2, "the furthest deadline wins");
}
