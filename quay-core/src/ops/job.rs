use crate::error::StorageError;
use crate::ops::meta::update_with_cas;
use crate::store::DocumentStore;
use crate::types::{Document, Invocation, JobData, JobDocument, JobInit, StateData};

pub(crate) async fn create_job(
    store: &dyn DocumentStore,
    init: JobInit,
) -> Result<String, StorageError> {
    let document = JobDocument::new(init);
    let id = document.id.clone();
    store.insert(Document::Job(document)).await?;
    Ok(id)
}

pub(crate) async fn get_job(
    store: &dyn DocumentStore,
    job_id: &str,
) -> Result<Option<JobDocument>, StorageError> {
    match store.get(job_id).await? {
        Some(versioned) => match versioned.document {
            Document::Job(job) => Ok(Some(job)),
            _ => Ok(None),
        },
        None => Ok(None),
    }
}

pub(crate) async fn get_job_data(
    store: &dyn DocumentStore,
    job_id: &str,
) -> Result<Option<JobData>, StorageError> {
    let Some(job) = get_job(store, job_id).await? else {
        return Ok(None);
    };

    // A payload that fails to parse still yields the job's metadata, so
    // dashboards can render something useful for a broken job.
    let (invocation, load_error) =
        match serde_json::from_value::<Invocation>(job.invocation.clone()) {
            Ok(invocation) => (Some(invocation), None),
            Err(err) => (None, Some(err.to_string())),
        };

    Ok(Some(JobData {
        invocation,
        load_error,
        state: job.state_name,
        created_on: job.created_on,
    }))
}

pub(crate) async fn get_state_data(
    store: &dyn DocumentStore,
    job_id: &str,
) -> Result<Option<StateData>, StorageError> {
    let Some(job) = get_job(store, job_id).await? else {
        return Ok(None);
    };
    let Some(state_id) = job.state_id else {
        return Ok(None);
    };
    match store.get(&state_id).await? {
        Some(versioned) => match versioned.document {
            Document::State(state) => Ok(Some(StateData {
                name: state.name,
                reason: state.reason,
                data: state.data,
            })),
            _ => Ok(None),
        },
        None => Ok(None),
    }
}

pub(crate) async fn get_job_parameter(
    store: &dyn DocumentStore,
    job_id: &str,
    name: &str,
) -> Result<Option<String>, StorageError> {
    let Some(job) = get_job(store, job_id).await? else {
        return Ok(None);
    };
    Ok(job.parameters.get(name).cloned())
}

pub(crate) async fn set_job_parameter(
    store: &dyn DocumentStore,
    job_id: &str,
    name: &str,
    value: &str,
) -> Result<(), StorageError> {
    let updated = update_with_cas(store, job_id, |document| {
        if let Document::Job(job) = document {
            job.parameters.insert(name.to_string(), value.to_string());
        }
    })
    .await?;
    if !updated {
        return Err(StorageError::UnknownJob(job_id.to_string()));
    }
    Ok(())
}
