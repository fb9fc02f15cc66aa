// src/client/keys.rs

//! Store key layout.
//!
//! ```text
//! {ns}.workflows.{workflow_id}                          workflow record (string)
//! {ns}.jobs.{workflow_id}.{klass}                       job records (hash: id -> record)
//! {ns}.locks.enqueue_outgoing.{workflow_id}.{job_name}  edge lock
//! ```

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keys {
    namespace: String,
}

impl Keys {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn workflow(&self, workflow_id: &str) -> String {
        format!("{}.workflows.{}", self.namespace, workflow_id)
    }

    pub fn workflows_prefix(&self) -> String {
        format!("{}.workflows.", self.namespace)
    }

    pub fn jobs(&self, workflow_id: &str, klass: &str) -> String {
        format!("{}.jobs.{}.{}", self.namespace, workflow_id, klass)
    }

    pub fn jobs_prefix(&self, workflow_id: &str) -> String {
        format!("{}.jobs.{}.", self.namespace, workflow_id)
    }

    /// Guards the readiness check and enqueue of `job_name`.
    pub fn edge_lock(&self, workflow_id: &str, job_name: &str) -> String {
        format!(
            "{}.locks.enqueue_outgoing.{}.{}",
            self.namespace, workflow_id, job_name
        )
    }
}
