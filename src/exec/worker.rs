// src/exec/worker.rs

//! One job execution per delivery.
//!
//! A worker keeps no state between invocations: everything is reloaded from
//! the store. Re-delivering a job that already succeeded skips its body and
//! only re-runs the bookkeeping and the hand-off to its children, so
//! duplicate deliveries are harmless.

use tracing::{debug, error, info, warn};

use crate::client::Client;
use crate::dag::{IncomingPayload, Job, JobContext};
use crate::errors::{FlowError, Result};
use crate::store::lock::{LockTimings, StoreLock};

/// Outcome of advancing one outgoing edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeAdvance {
    Enqueued,
    NotReady,
    /// The edge lock stayed held for the whole wait.
    Contended,
}

#[derive(Debug, Clone)]
pub struct Worker {
    client: Client,
}

impl Worker {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Execute `job_name` of `workflow_id` and hand off to its children.
    ///
    /// Returns [`FlowError::JobFailed`] when the body fails, unless
    /// `silent_fail` is configured. A contended edge lock is not an error: the
    /// same delivery is re-enqueued with a delay and `Ok` is returned.
    pub async fn perform(&self, workflow_id: &str, job_name: &str) -> Result<()> {
        if !self.client.workflow_exists(workflow_id).await? {
            return Err(FlowError::WorkflowNotFound(workflow_id.to_string()));
        }
        let job = self.client.find_job(workflow_id, job_name).await?;

        if job.is_succeeded() {
            info!(workflow = %workflow_id, job = %job.name(), "job already succeeded; skipping body");
            self.after_invocation(workflow_id, &job).await?;
            return self.enqueue_outgoing_jobs(workflow_id, &job).await;
        }

        let (job, outcome) = self.execute(workflow_id, job).await?;

        let after = self.after_invocation(workflow_id, &job).await;
        if let Err(err) = outcome {
            if let Err(after_err) = after {
                warn!(workflow = %workflow_id, job = %job.name(), error = %after_err, "post-invocation update failed");
            }
            return Err(err);
        }
        after?;

        if job.is_failed() {
            return Ok(());
        }
        self.enqueue_outgoing_jobs(workflow_id, &job).await
    }

    /// Run the body. The outer `Result` carries store failures; the inner one
    /// the job's own failure after it has been recorded.
    async fn execute(&self, workflow_id: &str, mut job: Job) -> Result<(Job, Result<()>)> {
        let handler = self.client.registry().instantiate(&job.klass)?;
        let payloads = self.incoming_payloads(workflow_id, &job).await?;

        job.start();
        self.client.persist_job(workflow_id, &job).await?;
        debug!(workflow = %workflow_id, job = %job.name(), "job started");

        let mut ctx = JobContext::new(
            job,
            payloads,
            self.client.monitor().clone(),
            handler.clone(),
        );
        let outcome = handler.perform(&mut ctx).await;
        let mut job = ctx.into_job();

        match outcome {
            Ok(()) => {
                job.finish();
                self.client.persist_job(workflow_id, &job).await?;
                info!(workflow = %workflow_id, job = %job.name(), "job succeeded");
                Ok((job, Ok(())))
            }
            Err(err) => {
                job.fail();
                self.client.persist_job(workflow_id, &job).await?;
                error!(workflow = %workflow_id, job = %job.name(), error = %format!("{err:#}"), "job failed");

                if let Some(hook) = self.client.hooks().error_monitor.as_ref() {
                    hook(&err);
                }

                if self.client.config().silent_fail {
                    Ok((job, Ok(())))
                } else {
                    let name = job.name();
                    Ok((job, Err(FlowError::JobFailed { job: name, source: err })))
                }
            }
        }
    }

    async fn incoming_payloads(&self, workflow_id: &str, job: &Job) -> Result<Vec<IncomingPayload>> {
        let mut payloads = Vec::with_capacity(job.incoming.len());
        for name in job.incoming.iter() {
            let parent = self.client.find_job(workflow_id, name).await?;
            payloads.push(IncomingPayload {
                id: parent.name(),
                klass: parent.klass.clone(),
                output: parent.output_payload.clone(),
            });
        }
        Ok(payloads)
    }

    /// Runs whether the body succeeded, failed or was skipped.
    async fn after_invocation(&self, workflow_id: &str, job: &Job) -> Result<()> {
        if let Some(callback) = self.client.hooks().monitor_callback.as_ref() {
            let counters = self.client.load_job_counters(job).await?;
            callback(counters.as_ref());
        }

        // Only the workflow record is written: sibling jobs may have moved on
        // since this worker loaded anything.
        let flow = self.client.find_workflow(workflow_id).await?;
        self.client.persist_workflow_record(&flow).await?;
        if flow.is_finished() {
            info!(workflow = %workflow_id, status = %flow.status(), "workflow finished");
            self.client.expire_workflow(&flow, None).await?;
        }
        Ok(())
    }

    async fn enqueue_outgoing_jobs(&self, workflow_id: &str, job: &Job) -> Result<()> {
        for child in job.outgoing.iter() {
            if self.advance_edge(workflow_id, child).await? == EdgeAdvance::Contended {
                let delay = self.client.config().lock.reschedule_delay();
                self.client.redeliver(workflow_id, job, delay).await?;
                return Ok(());
            }
        }
        Ok(())
    }

    /// Under the edge lock: re-check `child`'s readiness against the store
    /// and enqueue it if ready. At most one worker can enqueue a child no
    /// matter how many parents finish at once.
    pub async fn advance_edge(&self, workflow_id: &str, child: &str) -> Result<EdgeAdvance> {
        let key = self.client.keys().edge_lock(workflow_id, child);
        let timings = LockTimings::from(&self.client.config().lock);

        let Some(lock) = StoreLock::try_acquire(self.client.store(), &key, timings).await? else {
            warn!(workflow = %workflow_id, job = %child, lock = %key, "edge lock contended");
            return Ok(EdgeAdvance::Contended);
        };

        let outcome = self.enqueue_if_ready(workflow_id, child).await;
        let released = lock.release().await;

        let outcome = outcome?;
        if !released? {
            warn!(lock = %key, "edge lock lease expired before release");
        }
        Ok(outcome)
    }

    async fn enqueue_if_ready(&self, workflow_id: &str, child: &str) -> Result<EdgeAdvance> {
        let mut job = self.client.find_job(workflow_id, child).await?;
        if job.is_ready_to_start(&self.client).await? {
            self.client.enqueue_job(workflow_id, &mut job).await?;
            Ok(EdgeAdvance::Enqueued)
        } else {
            debug!(workflow = %workflow_id, job = %child, "child not ready");
            Ok(EdgeAdvance::NotReady)
        }
    }
}
