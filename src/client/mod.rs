// src/client/mod.rs

//! Persistence and hand-off facade.
//!
//! [`Client`] is the only component that reads or writes workflow state. It
//! owns the [`KeyValueStore`], the [`QueueBackend`] used to hand jobs to
//! workers, the [`MonitorStore`], the type [`Registry`], the validated
//! [`Configuration`] and the [`Hooks`]. It is cheap to clone.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ttl_from_secs, Configuration, Hooks};
use crate::dag::{Job, Registry, Workflow, WorkflowRecord};
use crate::errors::{FlowError, Result};
use crate::exec::{Delivery, QueueBackend};
use crate::monitor::{JobCounters, JobMonitorKey, MonitorStore, NoopMonitor, WorkflowRegistration};
use crate::store::KeyValueStore;
use crate::types::RecordRef;

pub mod keys;

pub use keys::Keys;

/// Tells whether a linked business record still exists.
#[async_trait]
pub trait LinkedRecords: Send + Sync {
    async fn exists(&self, record: &RecordRef) -> Result<bool>;
}

/// Scope for [`Client::find_not_finished_workflow_by`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowFilter {
    pub klass: String,
    pub linked_type: Option<String>,
    pub linked_id: Option<i64>,
}

impl WorkflowFilter {
    pub fn new(klass: impl Into<String>) -> Self {
        Self {
            klass: klass.into(),
            linked_type: None,
            linked_id: None,
        }
    }

    pub fn linked_to(mut self, record: &RecordRef) -> Self {
        self.linked_type = Some(record.record_type.clone());
        self.linked_id = Some(record.id);
        self
    }

    /// Same type, same linked record as `flow`.
    pub fn for_workflow(flow: &Workflow) -> Self {
        let filter = Self::new(flow.klass.clone());
        match flow.linked_record.as_ref() {
            Some(record) => filter.linked_to(record),
            None => filter,
        }
    }

    fn matches(&self, record: &WorkflowRecord) -> bool {
        if record.klass != self.klass {
            return false;
        }
        if self.linked_type.is_some() && record.linked_type != self.linked_type {
            return false;
        }
        if self.linked_id.is_some() && record.linked_id != self.linked_id {
            return false;
        }
        true
    }
}

#[derive(Clone)]
pub struct Client {
    store: Arc<dyn KeyValueStore>,
    queue: Arc<dyn QueueBackend>,
    monitor: Arc<dyn MonitorStore>,
    registry: Arc<Registry>,
    config: Arc<Configuration>,
    hooks: Hooks,
    linked_records: Option<Arc<dyn LinkedRecords>>,
    keys: Keys,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("namespace", &self.keys.namespace())
            .field("registry", &self.registry)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// A client with the default configuration, no hooks and a Monitor Store
    /// that records nothing.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        queue: Arc<dyn QueueBackend>,
        registry: Registry,
    ) -> Self {
        let config = Configuration::default();
        Self {
            store,
            queue,
            monitor: Arc::new(NoopMonitor),
            registry: Arc::new(registry),
            keys: Keys::new(config.namespace.clone()),
            config: Arc::new(config),
            hooks: Hooks::default(),
            linked_records: None,
        }
    }

    /// A client over the Redis instance at `config.redis_url`.
    #[cfg(feature = "redis-backend")]
    pub async fn connect(
        config: Configuration,
        queue: Arc<dyn QueueBackend>,
        registry: Registry,
    ) -> Result<Self> {
        let store = crate::store::RedisStore::connect(&config.redis_url).await?;
        Ok(Self::new(Arc::new(store), queue, registry).with_config(config))
    }

    pub fn with_config(mut self, config: Configuration) -> Self {
        self.keys = Keys::new(config.namespace.clone());
        self.config = Arc::new(config);
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn MonitorStore>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Without a resolver every linked record is assumed to exist.
    pub fn with_linked_records(mut self, resolver: Arc<dyn LinkedRecords>) -> Self {
        self.linked_records = Some(resolver);
        self
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn monitor(&self) -> &Arc<dyn MonitorStore> {
        &self.monitor
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn keys(&self) -> &Keys {
        &self.keys
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub async fn workflow_exists(&self, id: &str) -> Result<bool> {
        self.store.exists(&self.keys.workflow(id)).await
    }

    /// Reassemble a workflow from its stored records. The workflow type's
    /// definition is not run again.
    pub async fn find_workflow(&self, id: &str) -> Result<Workflow> {
        let raw = self
            .store
            .get(&self.keys.workflow(id))
            .await?
            .ok_or_else(|| FlowError::WorkflowNotFound(id.to_string()))?;
        let record: WorkflowRecord = serde_json::from_str(&raw)?;
        self.registry.workflow(&record.klass)?;

        let jobs = self.load_jobs(id).await?;
        Workflow::from_record(record, jobs)
    }

    async fn load_jobs(&self, workflow_id: &str) -> Result<Vec<Job>> {
        let mut keys = self.store.keys(&self.keys.jobs_prefix(workflow_id)).await?;
        keys.sort();

        let mut jobs = Vec::new();
        for key in keys.iter() {
            for raw in self.store.hvals(key).await? {
                jobs.push(Job::from_record(&raw, &self.registry)?);
            }
        }
        Ok(jobs)
    }

    /// Load one job from the store. `name` is either a full job name
    /// (`klass|id`) or a bare type, which returns the first job of that type.
    pub async fn find_job(&self, workflow_id: &str, name: &str) -> Result<Job> {
        let raw = match Job::split_name(name) {
            Some((klass, id)) => self.store.hget(&self.keys.jobs(workflow_id, klass), id).await?,
            None => self
                .store
                .hvals(&self.keys.jobs(workflow_id, name))
                .await?
                .into_iter()
                .next(),
        };

        let raw = raw.ok_or_else(|| FlowError::job_not_found(workflow_id, name))?;
        Job::from_record(&raw, &self.registry)
    }

    /// Every stored workflow. Workflows that vanish mid-scan (expired) are
    /// skipped.
    pub async fn all_workflows(&self) -> Result<Vec<Workflow>> {
        let mut keys = self.store.keys(&self.keys.workflows_prefix()).await?;
        keys.sort();

        let prefix = self.keys.workflows_prefix();
        let mut flows = Vec::new();
        for key in keys.iter() {
            let id = key.trim_start_matches(prefix.as_str());
            match self.find_workflow(id).await {
                Ok(flow) => flows.push(flow),
                Err(FlowError::WorkflowNotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(flows)
    }

    /// First unfinished workflow matching `filter` whose linked record (if
    /// any) still exists.
    pub async fn find_not_finished_workflow_by(
        &self,
        filter: &WorkflowFilter,
    ) -> Result<Option<Workflow>> {
        let mut keys = self.store.keys(&self.keys.workflows_prefix()).await?;
        keys.sort();

        for key in keys.iter() {
            let Some(raw) = self.store.get(key).await? else {
                continue;
            };
            let record: WorkflowRecord = serde_json::from_str(&raw)?;
            if !filter.matches(&record) {
                continue;
            }

            let flow = match self.find_workflow(&record.id).await {
                Ok(flow) => flow,
                Err(FlowError::WorkflowNotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            if flow.is_finished() {
                continue;
            }
            if let Some(linked) = flow.linked_record.as_ref() {
                if !self.linked_record_exists(linked).await? {
                    debug!(workflow = %flow.id, ?linked, "linked record is gone");
                    continue;
                }
            }
            return Ok(Some(flow));
        }

        Ok(None)
    }

    async fn linked_record_exists(&self, record: &RecordRef) -> Result<bool> {
        match self.linked_records.as_ref() {
            Some(resolver) => resolver.exists(record).await,
            None => Ok(true),
        }
    }

    pub async fn load_job_counters(&self, job: &Job) -> Result<Option<JobCounters>> {
        self.monitor.load_job(job).await
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Write the workflow record and every job record. The first write of a
    /// workflow also registers it with the Monitor Store.
    pub async fn persist_workflow(&self, flow: &mut Workflow) -> Result<()> {
        let first = !flow.persisted;
        self.persist_workflow_record(flow).await?;
        for job in flow.jobs.iter() {
            self.persist_job(&flow.id, job).await?;
        }
        flow.mark_as_persisted();
        debug!(workflow = %flow.id, jobs = flow.jobs.len(), "workflow persisted");

        if first {
            self.register_monitor(flow).await?;
        }
        Ok(())
    }

    /// Write only the workflow record, leaving job records untouched.
    pub async fn persist_workflow_record(&self, flow: &Workflow) -> Result<()> {
        let raw = serde_json::to_string(&flow.to_record())?;
        self.store.set(&self.keys.workflow(&flow.id), &raw).await
    }

    pub async fn persist_job(&self, workflow_id: &str, job: &Job) -> Result<()> {
        self.store
            .hset(&self.keys.jobs(workflow_id, &job.klass), &job.id, &job.to_record()?)
            .await
    }

    async fn register_monitor(&self, flow: &Workflow) -> Result<()> {
        let mut jobs = Vec::with_capacity(flow.jobs.len());
        for job in flow.jobs.iter() {
            let total = self.registry.instantiate(&job.klass)?.total_steps();
            jobs.push((JobMonitorKey::from(job), total));
        }

        self.monitor
            .create(&WorkflowRegistration {
                workflow: flow.klass.clone(),
                workflow_id: flow.id.clone(),
                monitorable: flow.linked_record.clone(),
                jobs,
            })
            .await
    }

    pub async fn destroy_workflow(&self, flow: &Workflow) -> Result<()> {
        self.store.del(&self.keys.workflow(&flow.id)).await?;
        for key in self.store.keys(&self.keys.jobs_prefix(&flow.id)).await? {
            self.store.del(&key).await?;
        }
        info!(workflow = %flow.id, "workflow destroyed");
        Ok(())
    }

    /// Apply a TTL to the workflow key and every job key. `None` uses the
    /// configured default; a non-positive TTL removes expiry instead.
    pub async fn expire_workflow(&self, flow: &Workflow, ttl_secs: Option<i64>) -> Result<()> {
        let ttl = ttl_from_secs(ttl_secs.unwrap_or(self.config.ttl));

        let mut keys = vec![self.keys.workflow(&flow.id)];
        keys.extend(self.store.keys(&self.keys.jobs_prefix(&flow.id)).await?);

        for key in keys.iter() {
            match ttl {
                Some(ttl) => {
                    self.store.expire(key, ttl).await?;
                }
                None => self.store.persist(key).await?,
            }
        }
        debug!(workflow = %flow.id, ?ttl, keys = keys.len(), "workflow expiry updated");
        Ok(())
    }

    /// Clear `stopped`, persist, and enqueue every job without parents.
    pub async fn start_workflow(&self, flow: &mut Workflow) -> Result<()> {
        flow.mark_as_started();
        self.persist_workflow(flow).await?;

        let id = flow.id.clone();
        let mut started = 0usize;
        for job in flow.jobs.iter_mut().filter(|j| j.has_no_dependencies()) {
            self.enqueue_job(&id, job).await?;
            started += 1;
        }
        info!(workflow = %id, initial_jobs = started, "workflow started");
        Ok(())
    }

    pub async fn stop_workflow(&self, id: &str) -> Result<()> {
        let mut flow = self.find_workflow(id).await?;
        flow.mark_as_stopped();
        self.persist_workflow(&mut flow).await?;
        info!(workflow = %id, "workflow stopped");
        Ok(())
    }

    /// Mark `job` enqueued, persist it and hand it to a worker.
    pub async fn enqueue_job(&self, workflow_id: &str, job: &mut Job) -> Result<()> {
        job.enqueue();
        self.persist_job(workflow_id, job).await?;
        self.queue
            .enqueue(Delivery {
                workflow_id: workflow_id.to_string(),
                job_name: job.name(),
                delay: self.config.job_delay(),
                queue: job.queue.clone(),
            })
            .await?;
        debug!(workflow = %workflow_id, job = %job.name(), "job enqueued");
        Ok(())
    }

    /// Hand `job_name` to a worker again after `delay`, without touching its
    /// record.
    pub async fn redeliver(
        &self,
        workflow_id: &str,
        job: &Job,
        delay: Duration,
    ) -> Result<()> {
        warn!(workflow = %workflow_id, job = %job.name(), ?delay, "rescheduling job");
        self.queue
            .enqueue(Delivery {
                workflow_id: workflow_id.to_string(),
                job_name: job.name(),
                delay: Some(delay),
                queue: job.queue.clone(),
            })
            .await
    }

    pub async fn next_free_workflow_id(&self) -> Result<String> {
        loop {
            let id = Uuid::new_v4().to_string();
            if !self.store.exists(&self.keys.workflow(&id)).await? {
                return Ok(id);
            }
        }
    }

    pub async fn next_free_job_id(&self, workflow_id: &str, klass: &str) -> Result<String> {
        let key = self.keys.jobs(workflow_id, klass);
        loop {
            let id = Uuid::new_v4().to_string();
            if !self.store.hexists(&key, &id).await? {
                return Ok(id);
            }
        }
    }
}
