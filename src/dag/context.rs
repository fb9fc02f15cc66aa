// src/dag/context.rs

//! What a job body sees while it runs.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::dag::job::Job;
use crate::dag::registry::Perform;
use crate::monitor::MonitorStore;
use crate::types::RecordRef;

/// Output of one parent job, handed to its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingPayload {
    /// Parent job name.
    pub id: String,
    pub klass: String,
    pub output: Option<Value>,
}

pub struct JobContext {
    job: Job,
    payloads: Vec<IncomingPayload>,
    monitor: Arc<dyn MonitorStore>,
    handler: Arc<dyn Perform>,
}

impl JobContext {
    pub fn new(
        job: Job,
        payloads: Vec<IncomingPayload>,
        monitor: Arc<dyn MonitorStore>,
        handler: Arc<dyn Perform>,
    ) -> Self {
        Self {
            job,
            payloads,
            monitor,
            handler,
        }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn params(&self) -> &Value {
        &self.job.params
    }

    pub fn payloads(&self) -> &[IncomingPayload] {
        &self.payloads
    }

    /// Set this job's output, visible to its children once it succeeds.
    pub fn output(&mut self, data: Value) {
        self.job.output(data);
    }

    pub fn into_job(self) -> Job {
        self.job
    }

    /// Run one unit of work and record its outcome.
    ///
    /// Success bumps the success counter. A recoverable error bumps the
    /// failure counter, files an error occurrence and is swallowed. In both
    /// cases `record` (if any) becomes the last processed record. Any other
    /// error is returned untouched.
    pub async fn track<F, Fut>(&mut self, record: Option<&RecordRef>, body: F) -> anyhow::Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        match body().await {
            Ok(()) => {
                self.monitor.track_success(&self.job).await?;
            }
            Err(err) if self.handler.is_recoverable(&err) => {
                let message = format!("{err:#}");
                warn!(job = %self.job.name(), error = %message, "recoverable error tracked");
                self.monitor.track_failure(&self.job).await?;
                self.monitor
                    .create_error(record, &message, &self.job.params, &self.job)
                    .await?;
            }
            Err(err) => return Err(err),
        }

        if let Some(record) = record {
            self.monitor.track_record(&self.job, record.id).await?;
        }
        Ok(())
    }

    /// Identity of the last record passed to `track`, for resumption.
    pub async fn last_recorded_id(&self) -> anyhow::Result<Option<i64>> {
        let counters = self.monitor.load_job(&self.job).await?;
        Ok(counters
            .map(|c| c.last_success_id)
            .filter(|id| *id != 0))
    }
}
