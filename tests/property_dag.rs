// tests/property_dag.rs

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use proptest::prelude::*;
use serde_json::Value;

use safeflow::dag::{Job, RunOptions, Workflow, WorkflowBuilder, WorkflowDefinition};
use safeflow::errors::Result;
use safeflow::types::WorkflowStatus;
use safeflow_test_utils::builders::HarnessBuilder;
use safeflow_test_utils::fixtures::CountingJob;

/// Task `i` runs after every task listed in `deps[i]`; all indices are < i.
struct GeneratedWorkflow {
    deps: Vec<BTreeSet<usize>>,
}

#[async_trait]
impl WorkflowDefinition for GeneratedWorkflow {
    fn name(&self) -> &str {
        "GeneratedWorkflow"
    }

    async fn configure(&self, flow: &mut WorkflowBuilder<'_>, _args: &[Value]) -> Result<()> {
        for (i, deps) in self.deps.iter().enumerate() {
            let after: Vec<String> = deps.iter().map(|d| format!("Task{d}")).collect();
            flow.run_named(&format!("Task{i}"), RunOptions::new().after_all(after))
                .await?;
        }
        Ok(())
    }
}

// Acyclic by construction: task N may only depend on tasks 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<BTreeSet<usize>>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, potential)| {
                    if i == 0 {
                        BTreeSet::new()
                    } else {
                        potential.into_iter().map(|d| d % i).collect()
                    }
                })
                .collect()
        })
    })
}

fn run_generated(deps: Vec<BTreeSet<usize>>) -> (usize, HashMap<String, usize>, WorkflowStatus, Vec<Job>) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async move {
        let counters: Vec<CountingJob> = (0..deps.len()).map(|_| CountingJob::default()).collect();
        let h = HarnessBuilder::new()
            .with_registry(|r| {
                for (i, counter) in counters.iter().enumerate() {
                    counter.register(r, &format!("Task{i}"));
                }
                r.register_workflow(GeneratedWorkflow { deps: deps.clone() });
            })
            .build();

        let mut flow = Workflow::create(&h.client, "GeneratedWorkflow", vec![])
            .await
            .unwrap();
        flow.start(&h.client).await.unwrap();

        let performed = h.drain().await;
        let mut deliveries: HashMap<String, usize> = HashMap::new();
        for (delivery, outcome) in performed.iter() {
            outcome.as_ref().unwrap();
            *deliveries.entry(delivery.job_name.clone()).or_default() += 1;
        }

        let runs = counters.iter().map(CountingJob::runs).sum();
        let stored = h.client.find_workflow(&flow.id).await.unwrap();
        (runs, deliveries, stored.status(), stored.jobs)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_every_job_runs_exactly_once(deps in dag_strategy(8)) {
        let num_tasks = deps.len();
        let (runs, deliveries, status, jobs) = run_generated(deps);

        prop_assert_eq!(runs, num_tasks);
        prop_assert_eq!(deliveries.len(), num_tasks);
        prop_assert!(deliveries.values().all(|n| *n == 1));
        prop_assert_eq!(status, WorkflowStatus::Finished);
        prop_assert!(jobs.iter().all(Job::is_succeeded));
    }

    #[test]
    fn test_children_finish_after_parents(deps in dag_strategy(8)) {
        let (_runs, _deliveries, _status, jobs) = run_generated(deps);
        let by_name: HashMap<String, &Job> = jobs.iter().map(|j| (j.name(), j)).collect();

        for job in jobs.iter() {
            for parent in job.incoming.iter() {
                let parent = by_name[parent];
                prop_assert!(parent.outgoing.contains(&job.name()));
                prop_assert!(parent.finished_at <= job.started_at);
            }
        }
    }

    #[test]
    fn test_readiness_matches_timestamps(
        enqueued in any::<bool>(),
        started in any::<bool>(),
        finished in any::<bool>(),
        failed in any::<bool>(),
        parents_ok in any::<bool>(),
    ) {
        let mut job = Job::new("wf", "Prepare", "1");
        job.enqueued_at = enqueued.then_some(1);
        job.started_at = started.then_some(2);
        job.finished_at = (finished || failed).then_some(3);
        job.failed_at = failed.then_some(3);

        let untouched = !enqueued && !started && !finished && !failed;
        prop_assert_eq!(job.is_ready_given(parents_ok), untouched && parents_ok);
        prop_assert_eq!(job.is_succeeded(), (finished || failed) && !failed);
    }
}
