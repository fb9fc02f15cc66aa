//! Job types, workflow definitions and record resolvers shared by the tests.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use safeflow::client::LinkedRecords;
use safeflow::dag::{JobContext, JobType, Perform, Registry, RunOptions, WorkflowBuilder, WorkflowDefinition};
use safeflow::errors::Result;
use safeflow::types::RecordRef;

macro_rules! output_job {
    ($ty:ident, $name:literal, $output:expr) => {
        #[derive(Debug, Default)]
        pub struct $ty;

        #[async_trait]
        impl Perform for $ty {
            async fn perform(&self, ctx: &mut JobContext) -> anyhow::Result<()> {
                ctx.output($output);
                Ok(())
            }
        }

        impl JobType for $ty {
            const NAME: &'static str = $name;
        }
    };
}

output_job!(Prepare, "Prepare", json!({ "prepared": true }));
output_job!(FetchFirstJob, "FetchFirstJob", json!({ "fetched": "first" }));
output_job!(FetchSecondJob, "FetchSecondJob", json!({ "fetched": "second" }));

/// Fails unless it received its parent's output.
#[derive(Debug, Default)]
pub struct PersistFirstJob;

#[async_trait]
impl Perform for PersistFirstJob {
    async fn perform(&self, ctx: &mut JobContext) -> anyhow::Result<()> {
        anyhow::ensure!(!ctx.payloads().is_empty(), "no incoming payloads");
        let parents: Vec<Value> = ctx
            .payloads()
            .iter()
            .map(|p| p.output.clone().unwrap_or(Value::Null))
            .collect();
        ctx.output(json!({ "persisted": parents }));
        Ok(())
    }
}

impl JobType for PersistFirstJob {
    const NAME: &'static str = "PersistFirstJob";
}

/// Outputs the types of its parents.
#[derive(Debug, Default)]
pub struct NormalizeJob;

#[async_trait]
impl Perform for NormalizeJob {
    async fn perform(&self, ctx: &mut JobContext) -> anyhow::Result<()> {
        let mut parents: Vec<String> = ctx.payloads().iter().map(|p| p.klass.clone()).collect();
        parents.sort();
        ctx.output(json!(parents));
        Ok(())
    }
}

impl JobType for NormalizeJob {
    const NAME: &'static str = "NormalizeJob";
}

#[derive(Debug, Default)]
pub struct FailingJob;

#[async_trait]
impl Perform for FailingJob {
    async fn perform(&self, _ctx: &mut JobContext) -> anyhow::Result<()> {
        anyhow::bail!("Failing job body")
    }
}

impl JobType for FailingJob {
    const NAME: &'static str = "FailingJob";
}

/// Error that [`TrackingJob`] treats as recoverable.
#[derive(Debug)]
pub struct SkippableRecord(pub i64);

impl fmt::Display for SkippableRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SkippableRecord: record {} could not be processed", self.0)
    }
}

impl std::error::Error for SkippableRecord {}

/// Processes `params.ids` one by one through `JobContext::track`.
///
/// Odd ids fail with [`SkippableRecord`] (recoverable), negative ids fail
/// with a plain error (not recoverable).
#[derive(Debug, Default)]
pub struct TrackingJob;

#[async_trait]
impl Perform for TrackingJob {
    async fn perform(&self, ctx: &mut JobContext) -> anyhow::Result<()> {
        let ids: Vec<i64> = ctx
            .params()
            .get("ids")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_i64).collect())
            .unwrap_or_default();

        for id in ids {
            let record = RecordRef::new("Item", id);
            ctx.track(Some(&record), || async move {
                if id < 0 {
                    anyhow::bail!("record {id} is corrupt");
                }
                if id % 2 != 0 {
                    return Err(SkippableRecord(id).into());
                }
                Ok(())
            })
            .await?;
        }
        Ok(())
    }

    fn is_recoverable(&self, error: &anyhow::Error) -> bool {
        error.downcast_ref::<SkippableRecord>().is_some()
    }

    fn total_steps(&self) -> i64 {
        10
    }
}

impl JobType for TrackingJob {
    const NAME: &'static str = "TrackingJob";
}

/// Counts executions; fails while `failures_left` is positive.
#[derive(Debug, Clone, Default)]
pub struct CountingJob {
    pub runs: Arc<AtomicUsize>,
    pub failures_left: Arc<AtomicUsize>,
}

impl CountingJob {
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Register under `name`, sharing counters with `self`.
    pub fn register(&self, registry: &mut Registry, name: &str) {
        let shared = self.clone();
        registry.register_job_factory(name, move || Arc::new(shared.clone()) as Arc<dyn Perform>);
    }
}

#[async_trait]
impl Perform for CountingJob {
    async fn perform(&self, _ctx: &mut JobContext) -> anyhow::Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            anyhow::bail!("counting job failure, {} left", left - 1);
        }
        Ok(())
    }
}

/// Reads a linked record from the first workflow argument, if it is one.
fn linked_record(args: &[Value]) -> Option<RecordRef> {
    args.first()
        .and_then(|arg| serde_json::from_value::<RecordRef>(arg.clone()).ok())
}

/// ```text
/// Prepare ─┬─> FetchFirstJob ──> PersistFirstJob ─┐
///          └─> FetchSecondJob ────────────────────┴─> NormalizeJob
/// ```
#[derive(Debug, Default)]
pub struct TestWorkflow;

#[async_trait]
impl WorkflowDefinition for TestWorkflow {
    fn name(&self) -> &str {
        "TestWorkflow"
    }

    async fn configure(&self, flow: &mut WorkflowBuilder<'_>, args: &[Value]) -> Result<()> {
        if let Some(record) = linked_record(args) {
            flow.link(record);
        }

        let some_id = args.first().cloned().unwrap_or(Value::Null);
        flow.run::<Prepare>(RunOptions::new().params(json!({ "some_id": some_id })))
            .await?;
        flow.run::<NormalizeJob>(RunOptions::new()).await?;
        flow.run::<FetchFirstJob>(RunOptions::new().after(Prepare::NAME))
            .await?;
        flow.run::<FetchSecondJob>(
            RunOptions::new()
                .after(Prepare::NAME)
                .before(NormalizeJob::NAME),
        )
        .await?;
        flow.run::<PersistFirstJob>(
            RunOptions::new()
                .after(FetchFirstJob::NAME)
                .before(NormalizeJob::NAME),
        )
        .await?;
        Ok(())
    }
}

/// ```text
/// Prepare ─┬─> FetchFirstJob ──┬─> PersistFirstJob
///          └─> FetchSecondJob ─┘
/// ```
#[derive(Debug, Default)]
pub struct FanInWorkflow;

#[async_trait]
impl WorkflowDefinition for FanInWorkflow {
    fn name(&self) -> &str {
        "FanInWorkflow"
    }

    async fn configure(&self, flow: &mut WorkflowBuilder<'_>, _args: &[Value]) -> Result<()> {
        let prepare = flow.run::<Prepare>(RunOptions::new()).await?;
        let first = flow
            .run::<FetchFirstJob>(RunOptions::new().after(prepare.clone()))
            .await?;
        let second = flow
            .run::<FetchSecondJob>(RunOptions::new().after(prepare))
            .await?;
        flow.run::<PersistFirstJob>(RunOptions::new().after_all([first, second]))
            .await?;
        Ok(())
    }
}

/// `Prepare -> FailingJob -> NormalizeJob`
#[derive(Debug, Default)]
pub struct FailingWorkflow;

#[async_trait]
impl WorkflowDefinition for FailingWorkflow {
    fn name(&self) -> &str {
        "FailingWorkflow"
    }

    async fn configure(&self, flow: &mut WorkflowBuilder<'_>, _args: &[Value]) -> Result<()> {
        flow.run::<Prepare>(RunOptions::new()).await?;
        flow.run::<FailingJob>(RunOptions::new().after(Prepare::NAME))
            .await?;
        flow.run::<NormalizeJob>(RunOptions::new().after(FailingJob::NAME))
            .await?;
        Ok(())
    }
}

/// A single `TrackingJob` over `args[0]` (an array of ids).
#[derive(Debug, Default)]
pub struct TrackingWorkflow;

#[async_trait]
impl WorkflowDefinition for TrackingWorkflow {
    fn name(&self) -> &str {
        "TrackingWorkflow"
    }

    async fn configure(&self, flow: &mut WorkflowBuilder<'_>, args: &[Value]) -> Result<()> {
        let ids = args.first().cloned().unwrap_or_else(|| json!([]));
        flow.run::<TrackingJob>(RunOptions::new().params(json!({ "ids": ids })))
            .await?;
        Ok(())
    }
}

/// Every fixture job and workflow type.
pub fn registry() -> Registry {
    Registry::new()
        .with_job::<Prepare>()
        .with_job::<FetchFirstJob>()
        .with_job::<FetchSecondJob>()
        .with_job::<PersistFirstJob>()
        .with_job::<NormalizeJob>()
        .with_job::<FailingJob>()
        .with_job::<TrackingJob>()
        .with_workflow(TestWorkflow)
        .with_workflow(FanInWorkflow)
        .with_workflow(FailingWorkflow)
        .with_workflow(TrackingWorkflow)
}

/// A [`LinkedRecords`] resolver backed by a set the test controls.
#[derive(Debug, Clone, Default)]
pub struct KnownRecords {
    records: Arc<Mutex<HashSet<RecordRef>>>,
}

impl KnownRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: RecordRef) {
        self.records.lock().unwrap().insert(record);
    }

    pub fn remove(&self, record: &RecordRef) {
        self.records.lock().unwrap().remove(record);
    }
}

#[async_trait]
impl LinkedRecords for KnownRecords {
    async fn exists(&self, record: &RecordRef) -> Result<bool> {
        Ok(self.records.lock().unwrap().contains(record))
    }
}
