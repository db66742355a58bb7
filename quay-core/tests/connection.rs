use std::time::Duration;

use quay_core::StorageError;

mod common;
use common::{sample_job, test_storage};

#[tokio::test]
async fn job_parameters_round_trip() {
    let (_bucket, storage) = test_storage().await;
    let connection = storage.connection();

    let mut init = sample_job();
    init.parameters.insert("a".to_string(), "1".to_string());
    let job_id = connection.create_job(init).await.expect("failed to create job");

    assert_eq!(
        connection.get_job_parameter(&job_id, "a").await.unwrap().as_deref(),
        Some("1")
    );

    connection
        .set_job_parameter(&job_id, "b", "2")
        .await
        .expect("failed to set parameter");

    assert_eq!(
        connection.get_job_parameter(&job_id, "b").await.unwrap().as_deref(),
        Some("2")
    );
    // existing parameters are untouched
    assert_eq!(
        connection.get_job_parameter(&job_id, "a").await.unwrap().as_deref(),
        Some("1")
    );
    assert_eq!(
        connection.get_job_parameter(&job_id, "missing").await.unwrap(),
        None
    );
}

#[tokio::test]
async fn set_parameter_on_missing_job_fails() {
    let (_bucket, storage) = test_storage().await;
    let result = storage
        .connection()
        .set_job_parameter("job::nope", "a", "1")
        .await;
    assert!(matches!(result, Err(StorageError::UnknownJob(_))));
}

#[tokio::test]
async fn job_data_parses_the_invocation() {
    let (_bucket, storage) = test_storage().await;
    let connection = storage.connection();

    let job_id = connection.create_job(sample_job()).await.unwrap();
    let data = connection
        .get_job_data(&job_id)
        .await
        .unwrap()
        .expect("job should exist");

    let invocation = data.invocation.expect("payload should parse");
    assert_eq!(invocation.type_name, "Worker.EmailSender");
    assert_eq!(invocation.method, "Send");
    assert_eq!(data.load_error, None);
    assert_eq!(data.state, None);
}

#[tokio::test]
async fn unparseable_invocation_surfaces_as_load_error() {
    let (_bucket, storage) = test_storage().await;
    let connection = storage.connection();

    let mut init = sample_job();
    init.invocation = serde_json::json!({"not": "an invocation"});
    let job_id = connection.create_job(init).await.unwrap();

    let data = connection
        .get_job_data(&job_id)
        .await
        .unwrap()
        .expect("a broken payload must not hide the job");
    assert_eq!(data.invocation, None);
    assert!(data.load_error.is_some());
}

#[tokio::test]
async fn missing_job_reads_as_none() {
    let (_bucket, storage) = test_storage().await;
    let connection = storage.connection();

    assert!(connection.get_job_data("job::nope").await.unwrap().is_none());
    assert!(connection.get_state_data("job::nope").await.unwrap().is_none());
}

#[tokio::test]
async fn server_announce_heartbeat_and_reap() {
    let (_bucket, storage) = test_storage().await;
    let connection = storage.connection();

    connection
        .announce_server("srv-1", 4, vec!["default".to_string()])
        .await
        .expect("failed to announce");
    connection
        .announce_server("srv-2", 2, vec!["critical".to_string()])
        .await
        .expect("failed to announce");

    let monitoring = storage.monitoring();
    assert_eq!(
        monitoring.servers().await.unwrap(),
        vec!["srv-1".to_string(), "srv-2".to_string()]
    );

    // re-announcing is an upsert, not a duplicate
    connection
        .announce_server("srv-1", 8, vec!["default".to_string()])
        .await
        .expect("failed to re-announce");
    assert_eq!(monitoring.servers().await.unwrap().len(), 2);

    connection.heartbeat("srv-1").await.expect("failed to heartbeat");

    // both heartbeats are fresh; nothing to reap
    let reaped = connection
        .remove_timed_out_servers(Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(reaped, 0);

    // with a zero timeout everything is stale
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let reaped = connection
        .remove_timed_out_servers(Duration::from_secs(0))
        .await
        .unwrap();
    assert_eq!(reaped, 2);
    assert!(monitoring.servers().await.unwrap().is_empty());

    connection
        .remove_server("srv-1")
        .await
        .expect("removing an absent server is fine");
}

#[tokio::test]
async fn acquire_lock_through_the_connection() {
    let (_bucket, storage) = test_storage().await;
    let connection = storage.connection();

    let mut lock = connection
        .acquire_lock("migrations", Duration::from_secs(5))
        .await
        .expect("failed to acquire");
    lock.release().await.expect("failed to release");
}
