// src/monitor/memory.rs

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::dag::Job;
use crate::errors::{FlowError, Result};
use crate::types::RecordRef;

use super::{ErrorOccurrence, JobCounters, JobMonitorKey, MonitorStore, WorkflowRegistration};

#[derive(Debug, Default)]
struct State {
    workflows: Vec<WorkflowRegistration>,
    jobs: BTreeMap<JobMonitorKey, JobCounters>,
    errors: Vec<ErrorOccurrence>,
}

/// In-process [`MonitorStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryMonitor {
    state: Arc<Mutex<State>>,
}

impl MemoryMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| FlowError::Monitor("monitor state poisoned".to_string()))
    }

    pub fn workflow_count(&self) -> usize {
        self.lock().map(|s| s.workflows.len()).unwrap_or(0)
    }

    pub fn job_count(&self) -> usize {
        self.lock().map(|s| s.jobs.len()).unwrap_or(0)
    }

    pub fn registration(&self, workflow_id: &str) -> Option<WorkflowRegistration> {
        self.lock().ok().and_then(|s| {
            s.workflows
                .iter()
                .find(|w| w.workflow_id == workflow_id)
                .cloned()
        })
    }

    pub fn counters(&self, key: &JobMonitorKey) -> Option<JobCounters> {
        self.lock().ok().and_then(|s| s.jobs.get(key).cloned())
    }

    pub fn errors(&self) -> Vec<ErrorOccurrence> {
        self.lock().map(|s| s.errors.clone()).unwrap_or_default()
    }

    fn update(&self, job: &Job, f: impl FnOnce(&mut JobCounters)) -> Result<()> {
        let mut state = self.lock()?;
        let counters = state.jobs.entry(JobMonitorKey::from(job)).or_default();
        f(counters);
        Ok(())
    }
}

#[async_trait]
impl MonitorStore for MemoryMonitor {
    async fn create(&self, registration: &WorkflowRegistration) -> Result<()> {
        let mut state = self.lock()?;

        // first-or-create, keyed on workflow type + id
        let known = state.workflows.iter().any(|w| {
            w.workflow == registration.workflow && w.workflow_id == registration.workflow_id
        });
        if !known {
            state.workflows.push(registration.clone());
        }

        for (key, total) in registration.jobs.iter() {
            state.jobs.entry(key.clone()).or_insert_with(|| JobCounters {
                total: *total,
                ..JobCounters::default()
            });
        }

        Ok(())
    }

    async fn load_job(&self, job: &Job) -> Result<Option<JobCounters>> {
        Ok(self.lock()?.jobs.get(&JobMonitorKey::from(job)).cloned())
    }

    async fn track_success(&self, job: &Job) -> Result<()> {
        self.update(job, |c| c.successes += 1)
    }

    async fn track_failure(&self, job: &Job) -> Result<()> {
        self.update(job, |c| c.failures += 1)
    }

    async fn track_record(&self, job: &Job, last_id: i64) -> Result<()> {
        self.update(job, |c| c.last_success_id = last_id)
    }

    async fn create_error(
        &self,
        record: Option<&RecordRef>,
        message: &str,
        params: &Value,
        job: &Job,
    ) -> Result<()> {
        let mut state = self.lock()?;
        state.errors.push(ErrorOccurrence {
            job: JobMonitorKey::from(job),
            record: record.cloned(),
            message: message.to_string(),
            params: params.clone(),
        });
        Ok(())
    }
}
