// src/dag/builder.rs

//! Building a workflow's job graph.
//!
//! A [`WorkflowDefinition`](crate::dag::WorkflowDefinition) declares jobs with
//! [`WorkflowBuilder::run`]; `after` / `before` only record pending edges.
//! Edges are resolved once, when the builder is finished, so a definition may
//! refer to a job it declares later.

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde_json::{Map, Value};
use tracing::debug;

use crate::client::Client;
use crate::dag::job::Job;
use crate::dag::registry::JobType;
use crate::dag::workflow::Workflow;
use crate::errors::{FlowError, Result};
use crate::types::RecordRef;

/// A declared, not yet resolved, dependency. Endpoints are job names or bare
/// job types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

/// Options for one `run` declaration.
#[derive(Debug, Clone)]
pub struct RunOptions {
    params: Value,
    queue: Option<String>,
    after: Vec<String>,
    before: Vec<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            params: Value::Object(Map::new()),
            queue: None,
            after: Vec::new(),
            before: Vec::new(),
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    /// Route this job's deliveries to a named queue.
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn after(mut self, dependency: impl Into<String>) -> Self {
        self.after.push(dependency.into());
        self
    }

    pub fn after_all<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after.extend(dependencies.into_iter().map(Into::into));
        self
    }

    pub fn before(mut self, dependent: impl Into<String>) -> Self {
        self.before.push(dependent.into());
        self
    }

    pub fn before_all<I, S>(mut self, dependents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.before.extend(dependents.into_iter().map(Into::into));
        self
    }
}

pub struct WorkflowBuilder<'a> {
    client: &'a Client,
    flow: Workflow,
    dependencies: Vec<Edge>,
}

impl<'a> WorkflowBuilder<'a> {
    /// Start a new workflow of type `klass` with a fresh, unused id.
    pub async fn new(client: &'a Client, klass: &str, arguments: Vec<Value>) -> Result<Self> {
        let id = client.next_free_workflow_id().await?;
        Ok(Self {
            client,
            flow: Workflow::new(id, klass, arguments),
            dependencies: Vec::new(),
        })
    }

    pub fn workflow(&self) -> &Workflow {
        &self.flow
    }

    pub fn workflow_id(&self) -> &str {
        &self.flow.id
    }

    /// Associate the workflow with an external business record.
    pub fn link(&mut self, record: RecordRef) -> &mut Self {
        self.flow.linked_record = Some(record);
        self
    }

    /// Declare a job of type `T`. Returns its job name.
    pub async fn run<T: JobType>(&mut self, options: RunOptions) -> Result<String> {
        self.run_named(T::NAME, options).await
    }

    /// Declare a job by registered type name. Returns its job name.
    pub async fn run_named(&mut self, klass: &str, options: RunOptions) -> Result<String> {
        self.client.registry().ensure_job(klass)?;

        let id = self.client.next_free_job_id(&self.flow.id, klass).await?;
        let mut job = Job::new(self.flow.id.clone(), klass, id);
        job.params = options.params;
        job.queue = options.queue;
        let name = job.name();
        self.flow.jobs.push(job);

        for dependency in options.after {
            self.dependencies.push(Edge {
                from: dependency,
                to: name.clone(),
            });
        }
        for dependent in options.before {
            self.dependencies.push(Edge {
                from: name.clone(),
                to: dependent,
            });
        }

        Ok(name)
    }

    /// Resolve all declared edges and return the workflow.
    pub fn finish(mut self) -> Result<Workflow> {
        self.resolve_dependencies()?;
        Ok(self.flow)
    }

    fn resolve_dependencies(&mut self) -> Result<()> {
        let edges = std::mem::take(&mut self.dependencies);

        for edge in edges.iter() {
            let from = self.resolve_endpoint(&edge.from, &edge.to)?;
            let to = self.resolve_endpoint(&edge.to, &edge.from)?;

            if let Some(job) = self.flow.find_job_mut(&from) {
                if !job.outgoing.contains(&to) {
                    job.outgoing.push(to.clone());
                }
            }
            if let Some(job) = self.flow.find_job_mut(&to) {
                if !job.incoming.contains(&from) {
                    job.incoming.push(from.clone());
                }
            }
        }

        debug!(
            workflow = %self.flow.id,
            jobs = self.flow.jobs.len(),
            edges = edges.len(),
            "resolved workflow dependencies"
        );

        ensure_acyclic(&self.flow)
    }

    fn resolve_endpoint(&self, endpoint: &str, other: &str) -> Result<String> {
        self.flow
            .find_job(endpoint)
            .map(Job::name)
            .ok_or_else(|| FlowError::DependencyNotFound {
                job: other.to_string(),
                dependency: endpoint.to_string(),
            })
    }
}

/// Reject a job graph with a cycle (including a job depending on itself).
pub(crate) fn ensure_acyclic(flow: &Workflow) -> Result<()> {
    let names: Vec<String> = flow.jobs.iter().map(Job::name).collect();

    // Edge direction: parent -> child.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for name in names.iter() {
        graph.add_node(name.as_str());
    }
    for (job, name) in flow.jobs.iter().zip(names.iter()) {
        for child in job.outgoing.iter() {
            graph.add_edge(name.as_str(), child.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(FlowError::DagCycle(format!(
            "cycle detected in job DAG involving job '{}'",
            cycle.node_id()
        ))),
    }
}
