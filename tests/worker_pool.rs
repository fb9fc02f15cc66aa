// tests/worker_pool.rs

mod common;
use crate::common::{init_tracing, with_timeout, ConfigBuilder, HarnessBuilder, TestResult};

use std::time::Duration;

use safeflow::dag::{Job, JobType, Workflow};
use safeflow::types::WorkflowStatus;
use safeflow_test_utils::fixtures::{CountingJob, FailingJob};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_runs_workflow_to_completion() -> TestResult {
    init_tracing();
    let (client, _store, monitor, pool) = HarnessBuilder::new()
        .config(ConfigBuilder::new().concurrency(3).build())
        .build_with_pool()
        .into_pool();

    let mut flow = Workflow::create(&client, "TestWorkflow", vec![]).await?;
    flow.start(&client).await?;

    let report = with_timeout(pool.run_until_idle()).await?;

    assert_eq!(report.performed, 5);
    assert!(report.failed.is_empty());
    let stored = client.find_workflow(&flow.id).await?;
    assert_eq!(stored.status(), WorkflowStatus::Finished);
    assert_eq!(monitor.workflow_count(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_runs_several_workflows() -> TestResult {
    let (client, _store, _monitor, pool) = HarnessBuilder::new().build_with_pool().into_pool();

    let mut ids = Vec::new();
    for _ in 0..4 {
        let mut flow = Workflow::create(&client, "FanInWorkflow", vec![]).await?;
        flow.start(&client).await?;
        ids.push(flow.id);
    }

    let report = with_timeout(pool.run_until_idle()).await?;

    assert_eq!(report.performed, 16);
    for id in ids {
        let stored = client.find_workflow(&id).await?;
        assert_eq!(stored.status(), WorkflowStatus::Finished, "workflow {id}");
    }
    Ok(())
}

#[tokio::test]
async fn test_pool_reports_failed_deliveries() -> TestResult {
    let (client, _store, _monitor, pool) = HarnessBuilder::new().build_with_pool().into_pool();

    let mut flow = Workflow::create(&client, "FailingWorkflow", vec![]).await?;
    flow.start(&client).await?;

    let report = with_timeout(pool.run_until_idle()).await?;

    assert_eq!(report.performed, 2);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].0.job_name.starts_with(FailingJob::NAME));
    assert!(report.failed[0].1.contains("Failing job body"));

    let stored = client.find_workflow(&flow.id).await?;
    assert_eq!(stored.status(), WorkflowStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn test_pool_waits_for_delayed_redelivery() -> TestResult {
    let counting = CountingJob::default();
    let (client, _store, _monitor, pool) = HarnessBuilder::new()
        .with_registry(|r| counting.register(r, "Counting"))
        .build_with_pool()
        .into_pool();

    let mut flow = Workflow::new(client.next_free_workflow_id().await?, "FanInWorkflow", vec![]);
    let job = Job::new(flow.id.clone(), "Counting", "only");
    flow.jobs.push(job.clone());
    flow.persist(&client).await?;
    client
        .redeliver(&flow.id, &job, Duration::from_millis(50))
        .await?;

    let report = with_timeout(pool.run_until_idle()).await?;

    assert_eq!(report.performed, 1);
    assert_eq!(counting.runs(), 1);
    Ok(())
}

#[tokio::test]
async fn test_idle_pool_returns_immediately() -> TestResult {
    let (_client, _store, _monitor, pool) = HarnessBuilder::new().build_with_pool().into_pool();

    let report = with_timeout(pool.run_until_idle()).await?;
    assert_eq!(report.performed, 0);
    Ok(())
}
