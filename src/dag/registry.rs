// src/dag/registry.rs

//! Explicit name → implementation registry.
//!
//! Stored records only carry type names. Decoding a record or executing a job
//! resolves the name here; an unregistered name is [`FlowError::UnknownJobType`]
//! or [`FlowError::UnknownWorkflowType`], never a silent fallback.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::GraphDefinitions;
use crate::dag::builder::WorkflowBuilder;
use crate::dag::context::JobContext;
use crate::errors::{FlowError, Result};

/// Executable body of a job type.
#[async_trait]
pub trait Perform: Send + Sync + 'static {
    async fn perform(&self, ctx: &mut JobContext) -> anyhow::Result<()>;

    /// Errors for which `JobContext::track` records a failure and carries on.
    fn is_recoverable(&self, _error: &anyhow::Error) -> bool {
        false
    }

    /// Declared step count, reported to the Monitor Store on registration.
    fn total_steps(&self) -> i64 {
        0
    }
}

/// A job type with a stable registered name.
pub trait JobType: Perform + Default {
    const NAME: &'static str;
}

/// Declares a workflow type's jobs and edges.
#[async_trait]
pub trait WorkflowDefinition: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn configure(&self, flow: &mut WorkflowBuilder<'_>, args: &[Value]) -> Result<()>;
}

pub type JobFactory = Arc<dyn Fn() -> Arc<dyn Perform> + Send + Sync>;

#[derive(Clone, Default)]
pub struct Registry {
    jobs: BTreeMap<String, JobFactory>,
    workflows: BTreeMap<String, Arc<dyn WorkflowDefinition>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("jobs", &self.jobs.keys().collect::<Vec<_>>())
            .field("workflows", &self.workflows.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_job<T: JobType>(&mut self) -> &mut Self {
        self.register_job_factory(T::NAME, || Arc::new(T::default()) as Arc<dyn Perform>)
    }

    /// Register a job type whose instances are built by `factory`, e.g. to
    /// share state between executions.
    pub fn register_job_factory<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn Perform> + Send + Sync + 'static,
    {
        self.jobs.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn register_workflow<W: WorkflowDefinition>(&mut self, definition: W) -> &mut Self {
        self.workflows
            .insert(definition.name().to_string(), Arc::new(definition));
        self
    }

    pub fn with_job<T: JobType>(mut self) -> Self {
        self.register_job::<T>();
        self
    }

    pub fn with_workflow<W: WorkflowDefinition>(mut self, definition: W) -> Self {
        self.register_workflow(definition);
        self
    }

    pub fn ensure_job(&self, klass: &str) -> Result<()> {
        if self.jobs.contains_key(klass) {
            Ok(())
        } else {
            Err(FlowError::UnknownJobType(klass.to_string()))
        }
    }

    pub fn instantiate(&self, klass: &str) -> Result<Arc<dyn Perform>> {
        self.jobs
            .get(klass)
            .map(|factory| factory())
            .ok_or_else(|| FlowError::UnknownJobType(klass.to_string()))
    }

    pub fn workflow(&self, klass: &str) -> Result<Arc<dyn WorkflowDefinition>> {
        self.workflows
            .get(klass)
            .cloned()
            .ok_or_else(|| FlowError::UnknownWorkflowType(klass.to_string()))
    }

    /// Check that every workflow named in a graph definition file is
    /// registered.
    pub fn ensure_declared(&self, definitions: &GraphDefinitions) -> Result<()> {
        for name in definitions.workflows.iter() {
            self.workflow(name)?;
        }
        Ok(())
    }
}
