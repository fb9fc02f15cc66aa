// src/dag/workflow.rs

//! A named, persisted DAG of jobs.
//!
//! `Workflow` is plain data. Anything that touches the store goes through a
//! [`Client`] passed in by the caller; status is always derived from the jobs
//! and the `stopped` flag, never stored as the source of truth.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::client::{Client, WorkflowFilter};
use crate::dag::builder::{ensure_acyclic, WorkflowBuilder};
use crate::dag::job::Job;
use crate::errors::{FlowError, Result};
use crate::types::{RecordRef, Timestamp, WorkflowStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    pub id: String,
    /// Registered workflow type name.
    pub klass: String,
    pub arguments: Vec<Value>,
    pub jobs: Vec<Job>,
    pub stopped: bool,
    pub persisted: bool,
    pub linked_record: Option<RecordRef>,
}

/// Stored form of a workflow's metadata. Jobs are stored separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    #[serde(default)]
    pub name: String,
    pub id: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub finished: usize,
    pub klass: String,
    #[serde(default = "default_status")]
    pub status: WorkflowStatus,
    #[serde(default)]
    pub stopped: bool,
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    #[serde(default)]
    pub finished_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_id: Option<i64>,
}

fn default_status() -> WorkflowStatus {
    WorkflowStatus::Running
}

impl WorkflowRecord {
    pub fn linked_record(&self) -> Option<RecordRef> {
        match (&self.linked_type, self.linked_id) {
            (Some(record_type), Some(id)) => Some(RecordRef::new(record_type.clone(), id)),
            _ => None,
        }
    }
}

impl Workflow {
    /// An empty, unpersisted workflow. Use [`Workflow::build`] to run the
    /// type's definition.
    pub fn new(id: impl Into<String>, klass: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            id: id.into(),
            klass: klass.into(),
            arguments,
            jobs: Vec::new(),
            stopped: false,
            persisted: false,
            linked_record: None,
        }
    }

    /// Reassemble a workflow from stored records. Every edge must point at a
    /// job that is present.
    pub fn from_record(record: WorkflowRecord, jobs: Vec<Job>) -> Result<Self> {
        let linked_record = record.linked_record();
        let flow = Self {
            id: record.id,
            klass: record.klass,
            arguments: record.arguments,
            jobs,
            stopped: record.stopped,
            persisted: true,
            linked_record,
        };

        for job in flow.jobs.iter() {
            for name in job.incoming.iter().chain(job.outgoing.iter()) {
                if flow.find_job(name).is_none() {
                    return Err(FlowError::DependencyNotFound {
                        job: job.name(),
                        dependency: name.clone(),
                    });
                }
            }
        }

        Ok(flow)
    }

    /// Run the registered definition of `klass` and resolve its edges.
    /// Nothing is written to the store.
    pub async fn build(client: &Client, klass: &str, arguments: Vec<Value>) -> Result<Workflow> {
        let definition = client.registry().workflow(klass)?;
        let mut builder = WorkflowBuilder::new(client, klass, arguments.clone()).await?;
        definition.configure(&mut builder, &arguments).await?;
        builder.finish()
    }

    /// Build and persist.
    pub async fn create(client: &Client, klass: &str, arguments: Vec<Value>) -> Result<Workflow> {
        let mut flow = Self::build(client, klass, arguments).await?;
        flow.persist(client).await?;
        Ok(flow)
    }

    /// Return the existing unfinished workflow of the same type and linked
    /// record, or persist a new one.
    ///
    /// The lookup and the write are not atomic: two concurrent callers can
    /// both end up creating.
    pub async fn create_unique(
        client: &Client,
        klass: &str,
        arguments: Vec<Value>,
    ) -> Result<Workflow> {
        let mut candidate = Self::build(client, klass, arguments).await?;

        let filter = WorkflowFilter::for_workflow(&candidate);
        if let Some(existing) = client.find_not_finished_workflow_by(&filter).await? {
            info!(
                workflow = %existing.id,
                klass = %existing.klass,
                "reusing unfinished workflow"
            );
            return Ok(existing);
        }

        candidate.persist(client).await?;
        Ok(candidate)
    }

    pub async fn find(client: &Client, id: &str) -> Result<Workflow> {
        client.find_workflow(id).await
    }

    /// Write the workflow and all its jobs. The first successful write also
    /// registers the workflow with the Monitor Store.
    pub async fn persist(&mut self, client: &Client) -> Result<()> {
        ensure_acyclic(self)?;
        client.persist_workflow(self).await
    }

    /// Persist if needed, then enqueue every job without parents.
    pub async fn start(&mut self, client: &Client) -> Result<()> {
        if !self.persisted {
            self.persist(client).await?;
        }
        client.start_workflow(self).await
    }

    /// Re-enqueue every failed job.
    pub async fn continue_failed(&mut self, client: &Client) -> Result<()> {
        let id = self.id.clone();
        for job in self.jobs.iter_mut().filter(|j| j.is_failed()) {
            client.enqueue_job(&id, job).await?;
        }
        Ok(())
    }

    /// Apply `ttl_secs` (or the configured default) to every key of this
    /// workflow. A non-positive TTL removes expiry.
    pub async fn expire(&self, client: &Client, ttl_secs: Option<i64>) -> Result<()> {
        client.expire_workflow(self, ttl_secs).await
    }

    /// Replace jobs and flags with the stored state.
    pub async fn reload(&mut self, client: &Client) -> Result<&mut Self> {
        let fresh = client.find_workflow(&self.id).await?;
        self.jobs = fresh.jobs;
        self.stopped = fresh.stopped;
        self.linked_record = fresh.linked_record;
        self.persisted = true;
        Ok(self)
    }

    pub fn mark_as_stopped(&mut self) {
        self.stopped = true;
    }

    pub fn mark_as_started(&mut self) {
        self.stopped = false;
    }

    pub fn mark_as_persisted(&mut self) {
        self.persisted = true;
    }

    /// Find a job by exact name, or by type when `name` has no id part.
    pub fn find_job(&self, name: &str) -> Option<&Job> {
        match Job::split_name(name) {
            Some(_) => self.jobs.iter().find(|j| j.name() == name),
            None => self.jobs.iter().find(|j| j.klass == name),
        }
    }

    pub fn find_job_mut(&mut self, name: &str) -> Option<&mut Job> {
        match Job::split_name(name) {
            Some(_) => self.jobs.iter_mut().find(|j| j.name() == name),
            None => self.jobs.iter_mut().find(|j| j.klass == name),
        }
    }

    pub fn initial_jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter().filter(|j| j.has_no_dependencies())
    }

    pub fn is_finished(&self) -> bool {
        self.jobs.iter().all(Job::is_finished)
    }

    pub fn is_started(&self) -> bool {
        self.started_at().is_some()
    }

    pub fn is_running(&self) -> bool {
        self.is_started() && !self.is_finished()
    }

    pub fn is_failed(&self) -> bool {
        self.jobs.iter().any(Job::is_failed)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Failed beats running beats finished beats stopped.
    pub fn status(&self) -> WorkflowStatus {
        if self.is_failed() {
            WorkflowStatus::Failed
        } else if self.is_running() {
            WorkflowStatus::Running
        } else if self.is_finished() {
            WorkflowStatus::Finished
        } else if self.is_stopped() {
            WorkflowStatus::Stopped
        } else {
            WorkflowStatus::Running
        }
    }

    /// Earliest job start.
    pub fn started_at(&self) -> Option<Timestamp> {
        self.jobs.iter().filter_map(|j| j.started_at).min()
    }

    /// Latest job finish, once every job has finished.
    pub fn finished_at(&self) -> Option<Timestamp> {
        if !self.is_finished() {
            return None;
        }
        self.jobs.iter().filter_map(|j| j.finished_at).max()
    }

    pub fn to_record(&self) -> WorkflowRecord {
        WorkflowRecord {
            name: self.klass.clone(),
            id: self.id.clone(),
            arguments: self.arguments.clone(),
            total: self.jobs.len(),
            finished: self.jobs.iter().filter(|j| j.is_finished()).count(),
            klass: self.klass.clone(),
            status: self.status(),
            stopped: self.stopped,
            started_at: self.started_at(),
            finished_at: self.finished_at(),
            linked_type: self.linked_record.as_ref().map(|r| r.record_type.clone()),
            linked_id: self.linked_record.as_ref().map(|r| r.id),
        }
    }
}
