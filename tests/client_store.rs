// tests/client_store.rs

mod common;
use crate::common::{init_tracing, ConfigBuilder, Harness, HarnessBuilder, TestResult};

use std::time::Duration;

use serde_json::json;

use safeflow::client::WorkflowFilter;
use safeflow::dag::{Job, JobType, Workflow};
use safeflow::errors::FlowError;
use safeflow::store::KeyValueStore;
use safeflow::types::WorkflowStatus;
use safeflow_test_utils::fixtures::{FetchFirstJob, Prepare};

fn sorted_names(flow: &Workflow) -> Vec<String> {
    let mut names: Vec<String> = flow.jobs.iter().map(Job::name).collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_find_missing_workflow() {
    let h = Harness::new();

    match h.client.find_workflow("does-not-exist").await {
        Err(FlowError::WorkflowNotFound(id)) => assert_eq!(id, "does-not-exist"),
        other => panic!("Expected WorkflowNotFound, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_find_workflow_reassembles_jobs() -> TestResult {
    init_tracing();
    let h = Harness::new();
    let flow = Workflow::create(&h.client, "TestWorkflow", vec![json!(42)]).await?;

    let found = h.client.find_workflow(&flow.id).await?;
    assert_eq!(found.klass, "TestWorkflow");
    assert_eq!(found.arguments, vec![json!(42)]);
    assert!(found.persisted);
    assert_eq!(sorted_names(&found), sorted_names(&flow));

    let prepare = found.find_job(Prepare::NAME).ok_or("no Prepare")?;
    assert_eq!(prepare.params, json!({ "some_id": 42 }));
    assert_eq!(prepare.outgoing.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_key_layout() -> TestResult {
    let h = HarnessBuilder::new()
        .config(ConfigBuilder::new().namespace("custom").build())
        .build();
    let flow = Workflow::create(&h.client, "TestWorkflow", vec![]).await?;

    let mut keys = h.store.keys("custom.").await?;
    keys.sort();

    let mut expected = vec![format!("custom.workflows.{}", flow.id)];
    for klass in [
        "FetchFirstJob",
        "FetchSecondJob",
        "NormalizeJob",
        "PersistFirstJob",
        "Prepare",
    ] {
        expected.push(format!("custom.jobs.{}.{}", flow.id, klass));
    }
    expected.sort();

    assert_eq!(keys, expected);
    assert!(h.store.keys("safe.").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_find_job_by_name_and_type() -> TestResult {
    let h = Harness::new();
    let flow = Workflow::create(&h.client, "TestWorkflow", vec![]).await?;
    let expected = flow.find_job(FetchFirstJob::NAME).ok_or("no FetchFirstJob")?;

    let by_name = h.client.find_job(&flow.id, &expected.name()).await?;
    let by_type = h.client.find_job(&flow.id, FetchFirstJob::NAME).await?;
    assert_eq!(&by_name, expected);
    assert_eq!(&by_type, expected);

    match h.client.find_job(&flow.id, "FetchFirstJob|missing").await {
        Err(FlowError::JobNotFound { job, .. }) => assert_eq!(job, "FetchFirstJob|missing"),
        other => panic!("Expected JobNotFound, got: {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_persist_job_overwrites_record() -> TestResult {
    let h = Harness::new();
    let flow = Workflow::create(&h.client, "TestWorkflow", vec![]).await?;

    let mut job = h.client.find_job(&flow.id, Prepare::NAME).await?;
    job.start();
    job.finish();
    job.output(json!({ "rows": 3 }));
    h.client.persist_job(&flow.id, &job).await?;

    let stored = h.client.find_job(&flow.id, &job.name()).await?;
    assert!(stored.is_succeeded());
    assert_eq!(stored.output_payload, Some(json!({ "rows": 3 })));
    Ok(())
}

#[tokio::test]
async fn test_destroy_removes_every_key() -> TestResult {
    let h = Harness::new();
    let keep = Workflow::create(&h.client, "TestWorkflow", vec![]).await?;
    let flow = Workflow::create(&h.client, "TestWorkflow", vec![]).await?;

    h.client.destroy_workflow(&flow).await?;

    let remaining = h.store.keys("safe.").await?;
    assert!(remaining.iter().all(|k| k.contains(&keep.id)));
    assert_eq!(remaining.len(), 6);
    assert!(matches!(
        h.client.find_workflow(&flow.id).await,
        Err(FlowError::WorkflowNotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_expire_applies_ttl_to_every_key() -> TestResult {
    let h = Harness::new();
    let flow = Workflow::create(&h.client, "TestWorkflow", vec![]).await?;

    flow.expire(&h.client, Some(10)).await?;

    let keys = h.store.keys("safe.").await?;
    assert_eq!(keys.len(), 6);
    for key in keys.iter() {
        assert_eq!(h.store.ttl(key).await?, Some(Duration::from_secs(10)), "key {key}");
    }
    Ok(())
}

#[tokio::test]
async fn test_expire_with_default_never_removes_ttl() -> TestResult {
    let h = Harness::new();
    let flow = Workflow::create(&h.client, "TestWorkflow", vec![]).await?;

    flow.expire(&h.client, Some(10)).await?;
    flow.expire(&h.client, None).await?;

    for key in h.store.keys("safe.").await? {
        assert_eq!(h.store.ttl(&key).await?, None, "key {key}");
    }
    Ok(())
}

#[tokio::test]
async fn test_expire_uses_configured_default() -> TestResult {
    let h = HarnessBuilder::new()
        .config(ConfigBuilder::new().ttl(60).build())
        .build();
    let flow = Workflow::create(&h.client, "TestWorkflow", vec![]).await?;

    flow.expire(&h.client, None).await?;

    let key = h.client.keys().workflow(&flow.id);
    assert_eq!(h.store.ttl(&key).await?, Some(Duration::from_secs(60)));
    Ok(())
}

#[tokio::test]
async fn test_start_enqueues_initial_jobs_and_clears_stopped() -> TestResult {
    let h = Harness::new();
    let mut flow = Workflow::create(&h.client, "TestWorkflow", vec![]).await?;
    flow.mark_as_stopped();
    flow.persist(&h.client).await?;

    flow.start(&h.client).await?;

    let deliveries = h.queue.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].workflow_id, flow.id);
    assert_eq!(deliveries[0].job_name, name_of(&flow, Prepare::NAME));
    assert_eq!(deliveries[0].delay, None);

    let stored = h.client.find_workflow(&flow.id).await?;
    assert!(!stored.stopped);
    assert!(stored.find_job(Prepare::NAME).ok_or("no Prepare")?.is_enqueued());
    assert!(!stored.find_job(FetchFirstJob::NAME).ok_or("no FetchFirstJob")?.is_enqueued());
    Ok(())
}

fn name_of(flow: &Workflow, klass: &str) -> String {
    flow.find_job(klass).map(Job::name).unwrap_or_default()
}

#[tokio::test]
async fn test_start_persists_unsaved_workflow() -> TestResult {
    let h = Harness::new();
    let mut flow = Workflow::build(&h.client, "TestWorkflow", vec![]).await?;

    flow.start(&h.client).await?;

    assert!(h.client.workflow_exists(&flow.id).await?);
    assert_eq!(h.monitor.workflow_count(), 1);
    assert_eq!(h.queue.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_client_start_registers_unsaved_workflow() -> TestResult {
    let h = Harness::new();
    let mut flow = Workflow::build(&h.client, "TestWorkflow", vec![]).await?;

    h.client.start_workflow(&mut flow).await?;
    h.client.persist_workflow(&mut flow).await?;

    assert!(flow.persisted);
    assert_eq!(h.monitor.workflow_count(), 1);
    let registration = h.monitor.registration(&flow.id).ok_or("not registered")?;
    assert_eq!(registration.workflow, "TestWorkflow");
    assert_eq!(registration.jobs.len(), 5);
    Ok(())
}

#[tokio::test]
async fn test_job_delay_and_queue_are_passed_along() -> TestResult {
    let h = HarnessBuilder::new()
        .config(ConfigBuilder::new().job_delay(5).build())
        .build();
    let flow = Workflow::create(&h.client, "TestWorkflow", vec![]).await?;

    let mut job = h.client.find_job(&flow.id, Prepare::NAME).await?;
    job.queue = Some("critical".into());
    h.client.enqueue_job(&flow.id, &mut job).await?;

    let deliveries = h.queue.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].delay, Some(Duration::from_secs(5)));
    assert_eq!(deliveries[0].queue.as_deref(), Some("critical"));
    Ok(())
}

#[tokio::test]
async fn test_stop_workflow() -> TestResult {
    let h = Harness::new();
    let flow = Workflow::create(&h.client, "TestWorkflow", vec![]).await?;

    h.client.stop_workflow(&flow.id).await?;

    let stored = h.client.find_workflow(&flow.id).await?;
    assert!(stored.is_stopped());
    assert_eq!(stored.status(), WorkflowStatus::Stopped);
    Ok(())
}

#[tokio::test]
async fn test_record_without_stopped_field_reads_as_running() -> TestResult {
    let h = Harness::new();
    let flow = Workflow::create(&h.client, "TestWorkflow", vec![]).await?;

    let key = h.client.keys().workflow(&flow.id);
    let outdated = json!({
        "name": "TestWorkflow",
        "id": flow.id,
        "klass": "TestWorkflow",
        "arguments": [],
    });
    h.store.set(&key, &outdated.to_string()).await?;

    let stored = h.client.find_workflow(&flow.id).await?;
    assert!(!stored.stopped);
    assert_eq!(stored.jobs.len(), 5);
    Ok(())
}

#[tokio::test]
async fn test_dangling_edge_is_rejected_on_load() -> TestResult {
    let h = Harness::new();
    let flow = Workflow::create(&h.client, "TestWorkflow", vec![]).await?;

    let mut prepare = h.client.find_job(&flow.id, Prepare::NAME).await?;
    prepare.outgoing.push("FetchFirstJob|gone".into());
    h.client.persist_job(&flow.id, &prepare).await?;

    match h.client.find_workflow(&flow.id).await {
        Err(FlowError::DependencyNotFound { dependency, .. }) => {
            assert_eq!(dependency, "FetchFirstJob|gone")
        }
        other => panic!("Expected DependencyNotFound, got: {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_all_workflows() -> TestResult {
    let h = Harness::new();
    let a = Workflow::create(&h.client, "TestWorkflow", vec![]).await?;
    let b = Workflow::create(&h.client, "FanInWorkflow", vec![]).await?;

    let mut ids: Vec<String> = h
        .client
        .all_workflows()
        .await?
        .into_iter()
        .map(|f| f.id)
        .collect();
    ids.sort();
    let mut expected = vec![a.id, b.id];
    expected.sort();

    assert_eq!(ids, expected);
    Ok(())
}

#[tokio::test]
async fn test_find_not_finished_filters_by_type() -> TestResult {
    let h = Harness::new();
    let flow = Workflow::create(&h.client, "FanInWorkflow", vec![]).await?;

    let found = h
        .client
        .find_not_finished_workflow_by(&WorkflowFilter::new("FanInWorkflow"))
        .await?;
    assert_eq!(found.map(|f| f.id), Some(flow.id));

    let other = h
        .client
        .find_not_finished_workflow_by(&WorkflowFilter::new("TestWorkflow"))
        .await?;
    assert!(other.is_none());
    Ok(())
}

#[tokio::test]
async fn test_next_free_ids_are_unique() -> TestResult {
    let h = Harness::new();
    let a = h.client.next_free_workflow_id().await?;
    let b = h.client.next_free_workflow_id().await?;
    assert_ne!(a, b);

    let j1 = h.client.next_free_job_id(&a, Prepare::NAME).await?;
    let j2 = h.client.next_free_job_id(&a, Prepare::NAME).await?;
    assert_ne!(j1, j2);
    Ok(())
}
