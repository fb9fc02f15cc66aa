// src/monitor/mod.rs

//! Monitor Store interface.
//!
//! The Monitor Store is an external system of record for dashboards: one
//! record per workflow, one per job with success/failure counters, and a log
//! of error occurrences. The core only talks to it through [`MonitorStore`];
//! which database sits behind it is the embedding application's business.
//!
//! [`MemoryMonitor`] is a complete in-process implementation used by tests
//! and single-process deployments. [`NoopMonitor`] discards everything.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dag::Job;
use crate::errors::Result;
use crate::types::RecordRef;

pub mod memory;

pub use memory::MemoryMonitor;

/// Per-job counters kept by the Monitor Store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    pub successes: u64,
    pub failures: u64,
    /// Identity of the last record processed by `track`, 0 if none.
    #[serde(default)]
    pub last_success_id: i64,
    /// Declared step count of the job.
    #[serde(default)]
    pub total: i64,
}

impl JobCounters {
    pub fn processed(&self) -> u64 {
        self.successes + self.failures
    }
}

/// Identifies one job's monitor record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobMonitorKey {
    pub job: String,
    pub job_id: String,
}

impl From<&Job> for JobMonitorKey {
    fn from(job: &Job) -> Self {
        Self {
            job: job.klass.clone(),
            job_id: job.id.clone(),
        }
    }
}

/// What gets registered on a workflow's first persist.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowRegistration {
    pub workflow: String,
    pub workflow_id: String,
    pub monitorable: Option<RecordRef>,
    /// Job key and declared total steps, one per job.
    pub jobs: Vec<(JobMonitorKey, i64)>,
}

/// One failure filed by `track`.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorOccurrence {
    pub job: JobMonitorKey,
    pub record: Option<RecordRef>,
    pub message: String,
    pub params: Value,
}

#[async_trait]
pub trait MonitorStore: Send + Sync {
    /// Register a workflow and one sub-record per job. Registering the same
    /// workflow twice must not create duplicates.
    async fn create(&self, registration: &WorkflowRegistration) -> Result<()>;

    async fn load_job(&self, job: &Job) -> Result<Option<JobCounters>>;

    async fn track_success(&self, job: &Job) -> Result<()>;

    async fn track_failure(&self, job: &Job) -> Result<()>;

    async fn track_record(&self, job: &Job, last_id: i64) -> Result<()>;

    async fn create_error(
        &self,
        record: Option<&RecordRef>,
        message: &str,
        params: &Value,
        job: &Job,
    ) -> Result<()>;
}

/// A Monitor Store that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

#[async_trait]
impl MonitorStore for NoopMonitor {
    async fn create(&self, _registration: &WorkflowRegistration) -> Result<()> {
        Ok(())
    }

    async fn load_job(&self, _job: &Job) -> Result<Option<JobCounters>> {
        Ok(None)
    }

    async fn track_success(&self, _job: &Job) -> Result<()> {
        Ok(())
    }

    async fn track_failure(&self, _job: &Job) -> Result<()> {
        Ok(())
    }

    async fn track_record(&self, _job: &Job, _last_id: i64) -> Result<()> {
        Ok(())
    }

    async fn create_error(
        &self,
        _record: Option<&RecordRef>,
        _message: &str,
        _params: &Value,
        _job: &Job,
    ) -> Result<()> {
        Ok(())
    }
}
